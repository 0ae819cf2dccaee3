//! 压缩参考（`.2bpb`）：每个碱基 2 bit，目录中每个文件一条参考序列（可含多个 contig）。
//!
//! 文件布局：`2BPB` 魔数 + bincode 序列化的 [`SquashHeader`] + 打包碱基。

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::ElandError;
use crate::index::record::{MatchPosition, BLOCK_BITS, BLOCK_SIZE, MAX_BLOCKS};
use crate::util::dna;

pub const SQUASH_SUFFIX: &str = ".2bpb";
const MAGIC: &[u8; 4] = b"2BPB";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Contig {
    pub name: String,
    pub len: u32,
    pub offset: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SquashHeader {
    pub contigs: Vec<Contig>,
    /// N 区段 (起点, 长度)，按起点升序，坐标为文件内偏移
    pub n_runs: Vec<(u32, u32)>,
    pub total_len: u64,
    pub build_timestamp: Option<String>,
}

impl SquashHeader {
    /// 将文件内坐标映射到 (contig 下标, contig 内偏移)
    pub fn map_offset(&self, pos: u32) -> Option<(usize, u32)> {
        let mut lo = 0usize;
        let mut hi = self.contigs.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let c = &self.contigs[mid];
            if pos < c.offset {
                hi = mid;
            } else if pos >= c.offset + c.len {
                lo = mid + 1;
            } else {
                return Some((mid, pos - c.offset));
            }
        }
        None
    }
}

/// 逐 contig 追加碱基并打包
pub struct SquashBuilder {
    header: SquashHeader,
    packed: Vec<u8>,
    open_n: Option<(u32, u32)>,
}

impl SquashBuilder {
    pub fn new() -> Self {
        Self { header: SquashHeader::default(), packed: Vec::new(), open_n: None }
    }

    pub fn add_contig(&mut self, name: &str, seq: &[u8]) -> Result<()> {
        let offset = self.header.total_len;
        if offset + seq.len() as u64 > u32::MAX as u64 {
            bail!("reference file too large while adding contig '{}'", name);
        }
        for &b in seq {
            let i = self.header.total_len;
            let code = match dna::to_code(b) {
                Some(c) => {
                    self.close_n_run();
                    c
                }
                None => {
                    match self.open_n.as_mut() {
                        Some(run) => run.1 += 1,
                        None => self.open_n = Some((i as u32, 1)),
                    }
                    0
                }
            };
            if i % 4 == 0 {
                self.packed.push(0);
            }
            let last = self.packed.len() - 1;
            self.packed[last] |= code << (6 - 2 * (i % 4) as u8);
            self.header.total_len += 1;
        }
        self.close_n_run();
        self.header.contigs.push(Contig { name: name.to_string(), len: seq.len() as u32, offset: offset as u32 });
        Ok(())
    }

    fn close_n_run(&mut self) {
        if let Some(run) = self.open_n.take() {
            self.header.n_runs.push(run);
        }
    }

    pub fn write_to<W: Write>(mut self, mut w: W) -> Result<SquashHeader> {
        self.close_n_run();
        self.header.build_timestamp = Some(chrono::Utc::now().to_rfc3339());
        w.write_all(MAGIC)?;
        bincode::serialize_into(&mut w, &self.header)?;
        w.write_all(&self.packed)?;
        w.flush()?;
        Ok(self.header)
    }

    pub fn save_to_file(self, path: &Path) -> Result<SquashHeader> {
        let f = File::create(path).map_err(|e| ElandError::io(path, e))?;
        self.write_to(BufWriter::new(f))
    }
}

impl Default for SquashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn read_header<R: Read>(r: &mut R) -> Result<SquashHeader> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        bail!("not a squashed reference file (bad magic)");
    }
    let header: SquashHeader = bincode::deserialize_from(r)?;
    Ok(header)
}

/// 基因组目录中的一个参考文件
#[derive(Debug, Clone)]
pub struct RefFile {
    /// 去掉 `.2bpb` 后缀的文件名，即输出中的参考名
    pub name: String,
    pub path: PathBuf,
    pub header: SquashHeader,
    pub first_block: u32,
    pub num_blocks: u32,
    data_offset: u64,
}

impl RefFile {
    pub fn open(path: &Path) -> Result<Self> {
        let f = File::open(path).map_err(|e| ElandError::io(path, e))?;
        let mut reader = BufReader::new(f);
        let header = read_header(&mut reader).map_err(|e| anyhow!("cannot read '{}': {}", path.display(), e))?;
        let data_offset = reader.stream_position()?;
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let name = file_name.strip_suffix(SQUASH_SUFFIX).unwrap_or(file_name).to_string();
        let num_blocks = ((header.total_len + BLOCK_SIZE - 1) / BLOCK_SIZE).max(1) as u32;
        Ok(Self { name, path: path.to_path_buf(), header, first_block: 0, num_blocks, data_offset })
    }

    /// 打开文件并定位到打包碱基的起点
    pub fn open_bases(&self) -> Result<BufReader<File>> {
        let mut f = File::open(&self.path).map_err(|e| ElandError::io(&self.path, e))?;
        f.seek(SeekFrom::Start(self.data_offset))?;
        Ok(BufReader::with_capacity(1 << 20, f))
    }

    pub fn total_len(&self) -> u64 {
        self.header.total_len
    }

    /// 输出用的参考名：单 contig 文件为文件名，否则为 `文件名/contig`
    pub fn display_name(&self, contig: usize) -> String {
        if self.header.contigs.len() <= 1 {
            self.name.clone()
        } else {
            format!("{}/{}", self.name, self.header.contigs[contig].name)
        }
    }
}

/// 基因组目录：按文件名排序的参考文件和累计块起点表
#[derive(Debug, Clone)]
pub struct GenomeIndex {
    pub files: Vec<RefFile>,
    block_file: Vec<usize>,
}

/// 基因组坐标翻译结果（0-based）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locus {
    pub file: usize,
    pub contig: usize,
    pub position: u32,
}

impl GenomeIndex {
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| ElandError::io(dir, e))?;
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let p = entry?.path();
            if p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(SQUASH_SUFFIX)) {
                paths.push(p);
            }
        }
        // 固定顺序，保证块号在多次运行间一致
        paths.sort();
        if paths.is_empty() {
            bail!("no '{}' files found in genome directory '{}'", SQUASH_SUFFIX, dir.display());
        }
        let files = paths.iter().map(|p| RefFile::open(p)).collect::<Result<Vec<_>>>()?;
        Self::from_files(files)
    }

    pub fn from_files(mut files: Vec<RefFile>) -> Result<Self> {
        let mut block_file = Vec::new();
        let mut next = 0u32;
        for (i, f) in files.iter_mut().enumerate() {
            f.first_block = next;
            next += f.num_blocks;
            if next > MAX_BLOCKS {
                return Err(ElandError::Config(format!(
                    "reference genome exceeds {} blocks of {} bases",
                    MAX_BLOCKS, BLOCK_SIZE
                ))
                .into());
            }
            block_file.extend(std::iter::repeat(i).take(f.num_blocks as usize));
        }
        Ok(Self { files, block_file })
    }

    pub fn total_len(&self) -> u64 {
        self.files.iter().map(RefFile::total_len).sum()
    }

    #[inline]
    pub fn global(&self, file: usize, offset: u64) -> u64 {
        ((self.files[file].first_block as u64) << BLOCK_BITS) + offset
    }

    /// 全局坐标 → (文件, 文件内偏移)
    pub fn file_offset(&self, global: u64) -> Option<(usize, u64)> {
        let block = (global >> BLOCK_BITS) as usize;
        let file = *self.block_file.get(block)?;
        let offset = global - ((self.files[file].first_block as u64) << BLOCK_BITS);
        (offset < self.files[file].total_len()).then_some((file, offset))
    }

    /// 全局坐标 → contig 内位置；跨 contig 或越界返回 None
    pub fn locate(&self, global: u64, span: u32) -> Option<Locus> {
        let (file, offset) = self.file_offset(global)?;
        let header = &self.files[file].header;
        let (contig, position) = header.map_offset(offset as u32)?;
        if position as u64 + span as u64 > header.contigs[contig].len as u64 {
            return None;
        }
        Some(Locus { file, contig, position })
    }

    pub fn locate_position(&self, pos: MatchPosition, span: u32) -> Option<Locus> {
        if pos.is_sentinel() {
            return None;
        }
        self.locate(pos.global(), span)
    }

    pub fn display_name(&self, locus: &Locus) -> String {
        self.files[locus.file].display_name(locus.contig)
    }
}

/// 随机读取参考碱基（延伸与孤儿 mate 救援使用）
pub struct SquashReader<'a> {
    genome: &'a GenomeIndex,
    handles: Vec<Option<BufReader<File>>>,
}

impl<'a> SquashReader<'a> {
    pub fn new(genome: &'a GenomeIndex) -> Self {
        Self { genome, handles: (0..genome.files.len()).map(|_| None).collect() }
    }

    /// 读取 [offset, offset+len) 的碱基（ASCII，N 已还原），越界部分被截断
    pub fn fetch(&mut self, file: usize, offset: u64, len: usize) -> Result<Vec<u8>> {
        let rf = &self.genome.files[file];
        let end = (offset + len as u64).min(rf.total_len());
        if offset >= end {
            return Ok(Vec::new());
        }
        if self.handles[file].is_none() {
            self.handles[file] = Some(rf.open_bases()?);
        }
        let reader = self.handles[file].as_mut().ok_or_else(|| anyhow!("reference handle unavailable"))?;
        let first_byte = offset / 4;
        let last_byte = (end - 1) / 4;
        reader.seek(SeekFrom::Start(rf.data_offset + first_byte))?;
        let mut buf = vec![0u8; (last_byte - first_byte + 1) as usize];
        reader.read_exact(&mut buf)?;

        let mut out = Vec::with_capacity((end - offset) as usize);
        for i in offset..end {
            let byte = buf[(i / 4 - first_byte) as usize];
            out.push(dna::from_code(byte >> (6 - 2 * (i % 4) as u8)));
        }
        for &(start, n) in &rf.header.n_runs {
            let (s, e) = (start as u64, start as u64 + n as u64);
            if e <= offset || s >= end {
                continue;
            }
            for i in s.max(offset)..e.min(end) {
                out[(i - offset) as usize] = b'N';
            }
        }
        Ok(out)
    }
}
