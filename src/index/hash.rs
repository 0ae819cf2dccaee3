//! 单个 (pass, direction) 的分区哈希表。
//!
//! 构建分两遍：先 `count_key` 统计每个桶的条目数，`make_pointer_array`
//! 求前缀和，再 `hash_entry` 把条目写入预留位置，无需重新分配。
//! 下标部分超出 `max_hash_bits` 时进入 split-prefix 模式：多出来的低位
//! 显式存入条目，查找时在已排序的桶内二分定位。

use std::collections::HashMap;

use crate::index::oligo::{Oligo, OligoNumber};
use crate::index::partition::TableLayout;
use crate::index::record::{ErrorInfo, MatchPosition, MatchRecord};
use crate::index::score::SuffixScoreTable;

/// 记录"与更早的某条 oligo 完全相同"的关系
pub trait RepeatLinks {
    fn set_same_as(&mut self, duplicate: OligoNumber, representative: OligoNumber);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    /// split-prefix 模式下未进入桶号的下标低位
    pub low: u32,
    pub suffix: u32,
    /// 比较部分 (N 掩码, 通配掩码) 在 `masks` 中的下标
    pub mask: u16,
    /// 含通配 N 且由本表接受精确匹配
    pub exact: bool,
    pub oligo: OligoNumber,
}

impl TableEntry {
    const EMPTY: TableEntry = TableEntry { low: 0, suffix: 0, mask: 0, exact: false, oligo: OligoNumber(0) };

    #[inline]
    fn same_oligo(&self, other: &TableEntry) -> bool {
        self.low == other.low
            && self.mask == other.mask
            && self.suffix == other.suffix
            && self.oligo.seed() == other.oligo.seed()
            && self.oligo.is_reverse() == other.oligo.is_reverse()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TableStats {
    pub buckets: usize,
    pub entries: usize,
    pub repeats: usize,
    pub skipped_masked: usize,
}

pub struct PartitionedHashTable {
    layout: TableLayout,
    hash_bits: u32,
    low_bits: u32,
    /// 构建前为各桶计数，`make_pointer_array` 之后为 `buckets + 1` 个起点
    offsets: Vec<u32>,
    cursors: Vec<u32>,
    entries: Vec<TableEntry>,
    /// (强制错配, 通配)
    masks: Vec<(u32, u32)>,
    mask_index: HashMap<(u32, u32), u16>,
    stats: TableStats,
}

fn bits_for(n: usize) -> u32 {
    usize::BITS - n.leading_zeros()
}

impl PartitionedHashTable {
    pub fn new(layout: TableLayout, expected_oligos: usize, max_hash_bits: u32) -> Self {
        let index_bits = layout.index_bits();
        let sized = (bits_for(expected_oligos) + 1).max(8);
        let hash_bits = index_bits.min(max_hash_bits).min(sized);
        let buckets = 1usize << hash_bits;
        let mut mask_index = HashMap::new();
        // 下标 0 固定为"无掩码"，全 N 比较部分也能安全查到
        mask_index.insert((0u32, 0u32), 0u16);
        Self {
            layout,
            hash_bits,
            low_bits: index_bits - hash_bits,
            offsets: vec![0; buckets + 1],
            cursors: Vec::new(),
            entries: Vec::new(),
            masks: vec![(0, 0)],
            mask_index,
            stats: TableStats { buckets, ..TableStats::default() },
        }
    }

    /// 一次性构建：计数、分配、填充、去重
    pub fn build<L: RepeatLinks>(
        layout: TableLayout,
        oligos: &[(Oligo, OligoNumber)],
        max_hash_bits: u32,
        links: &mut L,
    ) -> Self {
        let mut table = Self::new(layout, oligos.len(), max_hash_bits);
        for (o, _) in oligos {
            table.count_key(o);
        }
        table.make_pointer_array();
        for (o, n) in oligos {
            table.hash_entry(o, *n);
        }
        table.remove_repeated_entries(links);
        log::debug!(
            "pass {} {:?}: {} buckets ({} hash bits, split-prefix={}), {} entries, {} repeats collapsed",
            layout.pass,
            layout.direction,
            table.stats.buckets,
            table.hash_bits,
            table.is_split_prefix(),
            table.stats.entries,
            table.stats.repeats
        );
        table
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    pub fn stats(&self) -> TableStats {
        self.stats
    }

    pub fn is_split_prefix(&self) -> bool {
        self.low_bits > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    fn bucket(&self, idx: u32) -> usize {
        (idx >> self.low_bits) as usize
    }

    #[inline]
    fn low(&self, idx: u32) -> u32 {
        idx & ((1u32 << self.low_bits) - 1)
    }

    /// 下标部分不含 N（包括通配的 N）的 oligo 才会入表
    #[inline]
    fn indexable(&self, o: &Oligo) -> Option<(u32, u32, (u32, u32))> {
        let (idx_n, _) = self.layout.split(o.mask | o.wild);
        if idx_n != 0 {
            return None;
        }
        let (_, cmp_mask) = self.layout.split(o.mask);
        let (_, cmp_wild) = self.layout.split(o.wild);
        let (idx, cmp) = self.layout.split(o.value);
        Some((idx, cmp, (cmp_mask, cmp_wild)))
    }

    pub fn count_key(&mut self, o: &Oligo) {
        match self.indexable(o) {
            Some((idx, _, _)) => {
                let b = self.bucket(idx);
                self.offsets[b] += 1;
            }
            None => self.stats.skipped_masked += 1,
        }
    }

    pub fn make_pointer_array(&mut self) {
        let mut acc = 0u32;
        for slot in self.offsets.iter_mut() {
            let n = *slot;
            *slot = acc;
            acc += n;
        }
        self.cursors = self.offsets[..self.offsets.len() - 1].to_vec();
        self.entries = vec![TableEntry::EMPTY; acc as usize];
    }

    pub fn hash_entry(&mut self, o: &Oligo, number: OligoNumber) {
        let Some((idx, cmp, cmp_masks)) = self.indexable(o) else {
            return;
        };
        let mask = match self.mask_index.get(&cmp_masks) {
            Some(&m) => m,
            None => {
                let m = self.masks.len() as u16;
                self.masks.push(cmp_masks);
                self.mask_index.insert(cmp_masks, m);
                m
            }
        };
        let b = self.bucket(idx);
        let at = self.cursors[b] as usize;
        self.cursors[b] += 1;
        let exact = self.layout.owns_exact_match(self.layout.wild_fragments(o.wild));
        self.entries[at] = TableEntry { low: self.low(idx), suffix: cmp, mask, exact, oligo: number };
    }

    /// 桶内排序后合并完全相同的 oligo，只保留编号最小的代表，其余登记为 same-as
    pub fn remove_repeated_entries<L: RepeatLinks>(&mut self, links: &mut L) {
        let buckets = self.offsets.len() - 1;
        let mut new_offsets = Vec::with_capacity(self.offsets.len());
        new_offsets.push(0u32);
        let mut write = 0usize;
        for b in 0..buckets {
            let (start, end) = (self.offsets[b] as usize, self.offsets[b + 1] as usize);
            self.entries[start..end].sort_unstable_by_key(|e| {
                (e.low, e.mask, e.suffix, e.oligo.seed(), e.oligo.is_reverse(), e.oligo.read_index())
            });
            let mut i = start;
            while i < end {
                let rep = self.entries[i];
                self.entries[write] = rep;
                write += 1;
                let mut j = i + 1;
                while j < end && self.entries[j].same_oligo(&rep) {
                    links.set_same_as(self.entries[j].oligo, rep.oligo);
                    self.stats.repeats += 1;
                    j += 1;
                }
                i = j;
            }
            new_offsets.push(write as u32);
        }
        self.entries.truncate(write);
        self.entries.shrink_to_fit();
        self.offsets = new_offsets;
        self.cursors = Vec::new();
        self.stats.entries = write;
    }

    /// split-prefix 模式下把桶缩小到低位一致的区间
    #[inline]
    fn narrow_to_prefix<'t>(&self, bucket: &'t [TableEntry], low: u32) -> &'t [TableEntry] {
        if !self.is_split_prefix() {
            return bucket;
        }
        let from = bucket.partition_point(|e| e.low < low);
        let to = from + bucket[from..].partition_point(|e| e.low == low);
        &bucket[from..to]
    }

    /// 以参考窗口的 (index, compare) 查表，通过 `want_match` 的命中追加到 `out`
    #[inline]
    pub fn check(
        &self,
        g_idx: u32,
        g_cmp: u32,
        position: MatchPosition,
        scores: &SuffixScoreTable,
        out: &mut Vec<MatchRecord>,
    ) {
        let b = self.bucket(g_idx);
        let (start, end) = (self.offsets[b] as usize, self.offsets[b + 1] as usize);
        if start == end {
            return;
        }
        let candidates = self.narrow_to_prefix(&self.entries[start..end], self.low(g_idx));
        let lower_bits = self.layout.compare_lower_bits();
        for e in candidates {
            let (force, wild) = self.masks[e.mask as usize];
            let diff = ((e.suffix ^ g_cmp) & !wild) | force;
            let (upper, lower) = scores.score_pair(diff, lower_bits);
            let (eu, el) = (upper.errors(), lower.errors());
            if !(self.layout.want_match(eu, el) || (e.exact && eu + el == 0)) {
                continue;
            }
            let mut errors = ErrorInfo::default();
            for p in lower.positions() {
                let base = ((g_cmp >> (2 * p)) & 3) as u8;
                errors = errors.push(self.layout.compare[1].offset_from_right(p), base);
            }
            for p in upper.positions() {
                let base = ((g_cmp >> (lower_bits as usize + 2 * p)) & 3) as u8;
                errors = errors.push(self.layout.compare[0].offset_from_right(p), base);
            }
            out.push(MatchRecord { oligo: e.oligo, position, errors });
        }
    }
}
