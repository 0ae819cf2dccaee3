//! 参考序列扫描：滚动窗口逐位置查询当前 pass 的两张哈希表。

use std::io::Read;

use anyhow::Result;

use crate::align::matches::MatchSink;
use crate::index::hash::PartitionedHashTable;
use crate::index::oligo::used_bits;
use crate::index::record::{MatchPosition, MatchRecord, BLOCK_BITS, BLOCK_SIZE};
use crate::index::score::SuffixScoreTable;
use crate::index::squash::SquashHeader;

/// 小批量缓存命中，攒满后一次性交给 `MatchSink`
pub struct MatchCache {
    pending: Vec<MatchRecord>,
    capacity: usize,
    flushed: u64,
}

impl MatchCache {
    pub fn new(capacity: usize) -> Self {
        Self { pending: Vec::with_capacity(capacity + 8), capacity: capacity.max(1), flushed: 0 }
    }

    #[inline]
    fn buffer(&mut self) -> &mut Vec<MatchRecord> {
        &mut self.pending
    }

    #[inline]
    fn maybe_flush<S: MatchSink>(&mut self, sink: &mut S) -> Result<()> {
        if self.pending.len() >= self.capacity {
            self.flush(sink)?;
        }
        Ok(())
    }

    pub fn flush<S: MatchSink>(&mut self, sink: &mut S) -> Result<()> {
        if !self.pending.is_empty() {
            sink.add_matches(&self.pending)?;
            self.flushed += self.pending.len() as u64;
            self.pending.clear();
        }
        Ok(())
    }

    /// 已交付的命中总数
    pub fn flushed(&self) -> u64 {
        self.flushed
    }
}

pub struct GenomeScanner<'t> {
    tables: &'t [PartitionedHashTable],
    scores: &'t SuffixScoreTable,
    oligo_len: usize,
}

impl<'t> GenomeScanner<'t> {
    pub fn new(tables: &'t [PartitionedHashTable], scores: &'t SuffixScoreTable, oligo_len: usize) -> Self {
        Self { tables, scores, oligo_len }
    }

    /// 扫描一个参考文件的打包碱基流，返回下一个文件的起始块号。
    ///
    /// 窗口在 contig 边界和 N 区间处清空，oligo 不会跨越二者。
    pub fn scan<R: Read, S: MatchSink>(
        &self,
        header: &SquashHeader,
        mut bases: R,
        first_block: u32,
        cache: &mut MatchCache,
        sink: &mut S,
    ) -> Result<u32> {
        let l = self.oligo_len;
        let used = used_bits(l);
        let base_global = (first_block as u64) << BLOCK_BITS;
        let contigs = &header.contigs;
        let n_runs = &header.n_runs;
        let total = header.total_len;

        let mut contig = 0usize;
        let mut n_run = 0usize;
        let mut window = 0u64;
        let mut filled = 0usize;
        let mut i = 0u64;
        let mut buf = vec![0u8; 1 << 16];

        'outer: while i < total {
            let n = bases.read(&mut buf)?;
            if n == 0 {
                anyhow::bail!("reference stream ended at base {} of {}", i, total);
            }
            for &byte in &buf[..n] {
                for k in 0..4u32 {
                    if i >= total {
                        break 'outer;
                    }
                    let pos = i;
                    i += 1;

                    while contig < contigs.len() && pos >= contigs[contig].offset as u64 + contigs[contig].len as u64 {
                        contig += 1;
                        filled = 0;
                    }
                    if contig == contigs.len() || pos < contigs[contig].offset as u64 {
                        filled = 0;
                        continue;
                    }
                    while n_run < n_runs.len() && pos >= n_runs[n_run].0 as u64 + n_runs[n_run].1 as u64 {
                        n_run += 1;
                    }
                    if n_run < n_runs.len() && pos >= n_runs[n_run].0 as u64 {
                        filled = 0;
                        continue;
                    }

                    let code = ((byte >> (6 - 2 * k)) & 3) as u64;
                    window = ((window << 2) | code) & used;
                    filled += 1;
                    if filled < l {
                        continue;
                    }
                    let position = MatchPosition::from_global(base_global + pos + 1 - l as u64);
                    for t in self.tables {
                        let (idx, cmp) = t.layout().split(window);
                        t.check(idx, cmp, position, self.scores, cache.buffer());
                    }
                    cache.maybe_flush(sink)?;
                }
            }
        }
        cache.flush(sink)?;
        let blocks = ((total + BLOCK_SIZE - 1) / BLOCK_SIZE).max(1) as u32;
        Ok(first_block + blocks)
    }
}
