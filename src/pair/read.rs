//! 片段解析器的输入：带候选比对的 read，质量值来自 FASTQ 或常量。

use anyhow::Result;
use std::io::BufRead;

use crate::align::descriptor::{self, EditOp};
use crate::align::matches::MatchStatus;
use crate::error::ElandError;
use crate::io::eland::{ElandHit, ElandReader, ElandRecord};
use crate::io::fastq::FastqReader;

/// 未提供 FASTQ 时使用的碱基质量
pub const DEFAULT_QUALITY: u8 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasavaAlignment {
    pub reference: String,
    pub contig: Option<String>,
    /// 1-based，最左参考坐标
    pub position: u32,
    pub reverse: bool,
    pub descriptor: String,
    pub ops: Vec<EditOp>,
}

impl CasavaAlignment {
    /// 终点须落在 u32 坐标内
    pub fn from_hit(hit: &ElandHit) -> Result<Self> {
        let ops = descriptor::parse(&hit.descriptor)?;
        let span = u32::try_from(descriptor::ref_len(&ops)).ok();
        if hit.position == 0 || span.and_then(|s| hit.position.checked_add(s)).is_none() {
            return Err(ElandError::format(
                "alignment position",
                format!("{}:{}{}", hit.reference_label(), hit.position, hit.descriptor),
            )
            .into());
        }
        Ok(Self {
            reference: hit.reference.clone(),
            contig: hit.contig.clone(),
            position: hit.position,
            reverse: hit.reverse,
            descriptor: hit.descriptor.clone(),
            ops,
        })
    }

    /// 参考上覆盖的长度
    pub fn ref_span(&self) -> u32 {
        u32::try_from(descriptor::ref_len(&self.ops)).unwrap_or(u32::MAX)
    }

    /// 1-based 闭区间终点
    pub fn end(&self) -> u32 {
        self.position.saturating_add(self.ref_span().max(1) - 1)
    }

    pub fn mismatches(&self) -> usize {
        descriptor::read_mismatch_offsets(&self.ops).len()
            + self
                .ops
                .iter()
                .filter_map(|op| match op {
                    EditOp::Deletion(b) => Some(b.len()),
                    _ => None,
                })
                .sum::<usize>()
    }

    pub fn same_reference(&self, other: &CasavaAlignment) -> bool {
        self.reference == other.reference && self.contig == other.contig
    }
}

#[derive(Debug, Clone)]
pub struct CasavaRead {
    pub name: String,
    pub bases: Vec<u8>,
    /// Phred 值（已减去偏移）
    pub qualities: Vec<u8>,
    pub status: MatchStatus,
    pub alignments: Vec<CasavaAlignment>,
    /// false 的碱基不参与质量评分
    pub use_bases: Vec<bool>,
}

impl CasavaRead {
    pub fn from_eland(record: ElandRecord, qualities: Option<Vec<u8>>, use_bases: Option<&[bool]>) -> Result<Self> {
        let len = record.bases.len();
        let qualities = qualities.unwrap_or_else(|| vec![DEFAULT_QUALITY; len]);
        if qualities.len() != len {
            return Err(ElandError::format(
                format!("quality string for '{}' ({} bases)", record.name, len),
                format!("{} qualities", qualities.len()),
            )
            .into());
        }
        let use_bases = match use_bases {
            Some(mask) if mask.len() != len => {
                return Err(ElandError::Config(format!(
                    "use-bases mask covers {} bases but read '{}' has {}",
                    mask.len(),
                    record.name,
                    len
                ))
                .into())
            }
            Some(mask) => mask.to_vec(),
            None => vec![true; len],
        };
        let alignments = record.hits.iter().map(CasavaAlignment::from_hit).collect::<Result<Vec<_>>>()?;
        if let Some(a) = alignments.iter().find(|a| descriptor::read_len(&a.ops) != len) {
            return Err(ElandError::format(
                format!("match descriptor for '{}' ({} bases)", record.name, len),
                a.descriptor.clone(),
            )
            .into());
        }
        Ok(Self { name: record.name, bases: record.bases, qualities, status: record.status, alignments, use_bases })
    }

    pub fn is_aligned(&self) -> bool {
        !self.alignments.is_empty()
    }

    /// 唯一比对：只有一个候选且最佳等级没有其它邻居
    pub fn is_unique(&self) -> bool {
        self.alignments.len() == 1 && matches!(self.status.best_class_neighbors(), Some((_, 0)))
    }
}

/// 解析 `Y`/`n` 掩码，例如 `Y*n`、`Y50n*`、`nY*`；至多一个 `*`，展开后长度须为 `read_len`
pub fn parse_use_bases(spec: &str, read_len: usize) -> Result<Vec<bool>> {
    let bad = || ElandError::Config(format!("invalid use-bases string '{}' for {}-base reads", spec, read_len));
    let bytes = spec.as_bytes();
    let mut runs: Vec<(bool, Option<usize>)> = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let keep = match bytes[i] {
            b'Y' | b'y' => true,
            b'N' | b'n' => false,
            _ => return Err(bad().into()),
        };
        i += 1;
        let digits = bytes[i..].iter().take_while(|b| b.is_ascii_digit()).count();
        let count = if digits > 0 {
            let n: usize = spec[i..i + digits].parse().map_err(|_| bad())?;
            i += digits;
            Some(n)
        } else if bytes.get(i) == Some(&b'*') {
            i += 1;
            None
        } else {
            Some(1)
        };
        runs.push((keep, count));
    }
    let fixed: usize = runs.iter().filter_map(|r| r.1).sum();
    let stars = runs.iter().filter(|r| r.1.is_none()).count();
    if stars > 1 || fixed > read_len || (stars == 0 && fixed != read_len) {
        return Err(bad().into());
    }
    let mut mask = Vec::with_capacity(read_len);
    for (keep, count) in runs {
        let n = count.unwrap_or(read_len - fixed);
        mask.extend(std::iter::repeat(keep).take(n));
    }
    Ok(mask)
}

/// 逐条读取一个 mate 的 ELAND 记录，并按顺序拼上 FASTQ 质量值
pub struct MateSource<R: BufRead, Q: BufRead> {
    eland: ElandReader<R>,
    fastq: Option<FastqReader<Q>>,
    quality_offset: u8,
    use_bases: Option<String>,
    mask: Option<Vec<bool>>,
}

impl<R: BufRead, Q: BufRead> MateSource<R, Q> {
    pub fn new(eland: R, fastq: Option<Q>, quality_offset: u8, use_bases: Option<String>) -> Self {
        Self {
            eland: ElandReader::new(eland),
            fastq: fastq.map(FastqReader::new),
            quality_offset,
            use_bases,
            mask: None,
        }
    }

    pub fn next_read(&mut self) -> Result<Option<CasavaRead>> {
        let Some(record) = self.eland.next_record()? else {
            return Ok(None);
        };
        let qualities = match self.fastq.as_mut() {
            None => None,
            Some(fq) => {
                let q = fq.next_record()?.ok_or_else(|| {
                    ElandError::format("FASTQ quality file (fewer records than alignments)", record.name.clone())
                })?;
                if q.seq.len() != record.bases.len() {
                    return Err(ElandError::format(
                        format!("FASTQ record for '{}' ({} bases expected)", record.name, record.bases.len()),
                        q.id,
                    )
                    .into());
                }
                let offset = self.quality_offset;
                let phred = q
                    .qual
                    .iter()
                    .map(|&c| c.checked_sub(offset))
                    .collect::<Option<Vec<u8>>>()
                    .ok_or_else(|| ElandError::format("quality string", String::from_utf8_lossy(&q.qual)))?;
                Some(phred)
            }
        };
        if self.mask.is_none() {
            if let Some(spec) = &self.use_bases {
                self.mask = Some(parse_use_bases(spec, record.bases.len())?);
            }
        }
        CasavaRead::from_eland(record, qualities, self.mask.as_deref()).map(Some)
    }
}
