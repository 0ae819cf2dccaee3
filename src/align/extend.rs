//! 把候选位置延伸为整条 read 的比对并生成匹配描述串。

use anyhow::Result;

use crate::align::descriptor::{self, EditOp};
use crate::align::matches::MultiMatch;
use crate::align::sw::{glocal_sw_with_buf, SwBuffer, SwParams};
use crate::index::squash::{GenomeIndex, Locus, SquashReader};
use crate::util::dna;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedHit {
    pub locus: Locus,
    pub reverse: bool,
    pub ops: Vec<EditOp>,
    pub mismatches: u32,
    pub gapped: bool,
}

pub struct Extender<'g> {
    genome: &'g GenomeIndex,
    reader: SquashReader<'g>,
    oligo_len: usize,
    max_ungapped: u32,
    params: SwParams,
    buf: SwBuffer,
}

impl<'g> Extender<'g> {
    pub fn new(genome: &'g GenomeIndex, oligo_len: usize, max_ungapped: u32) -> Self {
        Self {
            genome,
            reader: SquashReader::new(genome),
            oligo_len,
            max_ungapped,
            params: SwParams::default(),
            buf: SwBuffer::new(),
        }
    }

    /// `oriented` 为参考正链方向的 read（反向命中时已取反向互补）
    pub fn extend(&mut self, oriented: &[u8], hit: &MultiMatch) -> Result<Option<ExtendedHit>> {
        let len = oriented.len();
        let Some(locus) = self.genome.locate_position(hit.position, len as u32) else {
            return Ok(None);
        };
        // 单种子且种子即整条 read：扫描时已得到全部错配（两端通配的 N 除外）
        if hit.seeds.count_ones() == 1
            && hit.scan_errors.count() as usize == hit.errors as usize
            && len == self.oligo_len
            && dna::end_n_runs(oriented) == (0, 0)
        {
            let mm = hit.scan_errors.mismatches();
            return Ok(Some(ExtendedHit {
                locus,
                reverse: hit.reverse,
                ops: descriptor::from_mismatches(len, &mm),
                mismatches: mm.len() as u32,
                gapped: false,
            }));
        }

        let Some((file, offset)) = self.genome.file_offset(hit.position.global()) else {
            return Ok(None);
        };
        let reference = self.reader.fetch(file, offset, len)?;
        if reference.len() < len {
            return Ok(None);
        }
        let (ops, mismatches) = descriptor::ungapped(oriented, &reference);
        let ungapped = ExtendedHit { locus, reverse: hit.reverse, ops, mismatches, gapped: false };
        if mismatches <= self.max_ungapped || hit.seeds.count_ones() < 2 {
            return Ok(Some(ungapped));
        }

        // 多种子候选可能含 indel：在 contig 内的带状窗口里重新对齐
        let contig = &self.genome.files[file].header.contigs[locus.contig];
        let contig_start = contig.offset as u64;
        let contig_end = contig_start + contig.len as u64;
        let band = self.params.band_width as u64;
        let win_start = offset.saturating_sub(band).max(contig_start);
        let win_end = (offset + len as u64 + band).min(contig_end);
        let window = self.reader.fetch(file, win_start, (win_end - win_start) as usize)?;
        match glocal_sw_with_buf(oriented, &window, self.params, &mut self.buf) {
            Some(res) if res.nm < mismatches => {
                let position = (win_start + res.ref_start as u64 - contig_start) as u32;
                log::trace!("gapped extension at {}:{} ({} -> {} edits)", locus.file, position, mismatches, res.nm);
                Ok(Some(ExtendedHit {
                    locus: Locus { position, ..locus },
                    reverse: hit.reverse,
                    ops: res.ops,
                    mismatches: res.nm,
                    gapped: true,
                }))
            }
            _ => Ok(Some(ungapped)),
        }
    }
}
