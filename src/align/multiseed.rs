//! 多种子合并：把同一条 read 的最多 4 个种子的命中归并为整条 read 的候选位置。

use crate::index::oligo::OligoNumber;
use crate::index::record::{MatchPosition, MatchRecord};

pub const MAX_SEEDS: usize = 4;

/// 种子在 read 上的摆放：第 k 个种子从 `k * oligo_len` 开始，互不重叠
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedLayout {
    pub read_len: usize,
    pub oligo_len: usize,
    pub seeds: usize,
}

impl SeedLayout {
    pub fn single(read_len: usize, oligo_len: usize) -> Self {
        Self { read_len, oligo_len, seeds: 1 }
    }

    pub fn multi(read_len: usize, oligo_len: usize) -> Self {
        Self { read_len, oligo_len, seeds: (read_len / oligo_len).min(MAX_SEEDS) }
    }

    #[inline]
    pub fn offset(&self, seed: u8) -> usize {
        seed as usize * self.oligo_len
    }

    /// 种子命中位置 → 整条 read 在参考正链上的最左坐标
    #[inline]
    pub fn read_start(&self, hit: u64, seed: u8, reverse: bool) -> Option<u64> {
        let off = self.offset(seed);
        let back = if reverse { self.read_len - off - self.oligo_len } else { off };
        hit.checked_sub(back as u64)
    }
}

/// 合并中的候选
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedMatch {
    pub start: u64,
    pub reverse: bool,
    pub errors: u8,
    /// 支持该候选的种子位图
    pub support: u8,
}

impl SeedMatch {
    #[inline]
    pub fn seed_count(&self) -> u32 {
        self.support.count_ones()
    }

    /// 到最近的支持种子的距离
    fn seed_distance(&self, seed: u8) -> u32 {
        (0..MAX_SEEDS as u8)
            .filter(|k| self.support & (1 << k) != 0)
            .map(|k| (k as i32 - seed as i32).unsigned_abs())
            .min()
            .unwrap_or(0)
    }
}

pub struct MultiSeedStateMachine {
    layout: SeedLayout,
    deviation: u32,
    candidates: Vec<SeedMatch>,
}

impl MultiSeedStateMachine {
    pub fn new(layout: SeedLayout, deviation: u32) -> Self {
        Self { layout, deviation, candidates: Vec::new() }
    }

    pub fn reset(&mut self) {
        self.candidates.clear();
    }

    pub fn candidates(&self) -> &[SeedMatch] {
        &self.candidates
    }

    pub fn insert_seed_hit(&mut self, rec: &MatchRecord) {
        self.insert(rec.position, rec.oligo, rec.errors.count());
    }

    pub fn insert(&mut self, raw: MatchPosition, code: OligoNumber, errors: u8) {
        if raw.is_sentinel() {
            return;
        }
        let (seed, reverse) = (code.seed(), code.is_reverse());
        let Some(start) = self.layout.read_start(raw.global(), seed, reverse) else {
            return;
        };
        let deviation = self.deviation as u64;
        let nearest = self
            .candidates
            .iter_mut()
            .filter(|c| c.reverse == reverse)
            .filter(|c| c.start.abs_diff(start) <= c.seed_distance(seed) as u64 * deviation)
            .min_by_key(|c| c.start.abs_diff(start));
        match nearest {
            Some(c) => {
                c.support |= 1 << seed;
                if errors < c.errors {
                    c.errors = errors;
                    c.start = start;
                }
            }
            None => self.candidates.push(SeedMatch { start, reverse, errors, support: 1 << seed }),
        }
    }

    /// 支持种子数最多的候选（按错配数、位置排序，至多 `max_items` 个），
    /// 以及并列候选的总数
    pub fn get_hits(&mut self, max_items: usize) -> (Vec<SeedMatch>, usize) {
        let Some(best) = self.candidates.iter().map(SeedMatch::seed_count).max() else {
            return (Vec::new(), 0);
        };
        let mut tied: Vec<SeedMatch> = self.candidates.iter().filter(|c| c.seed_count() == best).copied().collect();
        tied.sort_unstable_by_key(|c| (c.errors, c.start, c.reverse));
        let total = tied.len();
        tied.truncate(max_items);
        (tied, total)
    }
}
