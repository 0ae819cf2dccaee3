//! 把长度为 L 的 oligo 切成 A/B/C/D 四段，并为每个 (pass, direction)
//! 定义哪两段作为哈希下标（index），哪两段作为比较部分（compare）。
//!
//! 任意两个错配至多落在两个片段中；三个 pass 各自正反两个方向共覆盖了
//! 全部 6 种"两段无错"组合，因此 ≤2 错配的匹配至少被找到一次。

pub const NUM_PASSES: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// 第一对片段作下标，第二对作比较
    Forward,
    /// 角色互换
    Reverse,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Forward, Direction::Reverse];
}

/// 一个片段在 oligo 编码中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    /// 0..4 对应 A..D
    pub id: usize,
    /// 片段首碱基在 oligo 中的偏移
    pub start: usize,
    pub len: usize,
    /// 片段最低位在 64 位编码中的位移
    pub shift: u32,
    pub bits: u32,
}

impl Fragment {
    #[inline]
    pub fn extract(&self, v: u64) -> u32 {
        ((v >> self.shift) & ((1u64 << self.bits) - 1)) as u32
    }

    /// 从片段末尾数第 p 个碱基在 oligo 中的偏移
    #[inline]
    pub fn offset_from_right(&self, p: usize) -> usize {
        self.start + self.len - 1 - p
    }
}

/// 每个 (pass, direction) 的错误接受策略：参数为比较部分高位片段、低位片段的错配数（3 表示 >2）
pub type WantMatch = fn(u8, u8) -> bool;

fn want_pass0_forward(upper: u8, lower: u8) -> bool {
    upper + lower <= 2
}

// 精确匹配已在正向找到
fn want_pass0_reverse(upper: u8, lower: u8) -> bool {
    let e = upper + lower;
    e > 0 && e <= 2
}

// 单片段内的错误已由 pass 0 覆盖
fn want_split(upper: u8, lower: u8) -> bool {
    upper == 1 && lower == 1
}

/// 单张哈希表的布局与匹配策略
#[derive(Debug, Clone, Copy)]
pub struct TableLayout {
    pub pass: u8,
    pub direction: Direction,
    pub oligo_len: usize,
    /// [高位, 低位]
    pub index: [Fragment; 2],
    pub compare: [Fragment; 2],
    pub want: WantMatch,
}

impl TableLayout {
    /// 拆分为 (index, compare) 两半
    #[inline]
    pub fn split(&self, v: u64) -> (u32, u32) {
        let idx = (self.index[0].extract(v) << self.index[1].bits) | self.index[1].extract(v);
        let cmp = (self.compare[0].extract(v) << self.compare[1].bits) | self.compare[1].extract(v);
        (idx, cmp)
    }

    #[inline]
    pub fn index_bits(&self) -> u32 {
        self.index[0].bits + self.index[1].bits
    }

    #[inline]
    pub fn compare_lower_bits(&self) -> u32 {
        self.compare[1].bits
    }

    #[inline]
    pub fn want_match(&self, upper: u8, lower: u8) -> bool {
        (self.want)(upper, lower)
    }

    /// 比较部分里含通配 N 的片段位集
    pub fn wild_fragments(&self, wild: u64) -> u8 {
        self.compare.iter().filter(|f| f.extract(wild) != 0).fold(0, |acc, f| acc | (1 << f.id))
    }

    /// 含通配 N 的 oligo 可能进不了 pass 0 正向表；由它第一张能入表的表接受精确匹配
    pub fn owns_exact_match(&self, wild_fragments: u8) -> bool {
        wild_fragments != 0 && first_indexable(wild_fragments) == Some((self.pass, self.direction))
    }
}

/// 片段划分方案，由 oligo 长度静态决定
#[derive(Debug, Clone)]
pub struct PartitionScheme {
    pub oligo_len: usize,
    pub fragments: [Fragment; 4],
}

impl PartitionScheme {
    pub fn new(oligo_len: usize) -> Self {
        debug_assert!((4..=32).contains(&oligo_len));
        let base = oligo_len / 4;
        let rem = oligo_len % 4;
        let mut start = 0usize;
        let mut fragments = [Fragment { id: 0, start: 0, len: 0, shift: 0, bits: 0 }; 4];
        for (id, frag) in fragments.iter_mut().enumerate() {
            let len = base + usize::from(id < rem);
            *frag = Fragment {
                id,
                start,
                len,
                shift: (2 * (oligo_len - start - len)) as u32,
                bits: (2 * len) as u32,
            };
            start += len;
        }
        Self { oligo_len, fragments }
    }

    pub fn max_fragment_len(&self) -> usize {
        self.fragments.iter().map(|f| f.len).max().unwrap_or(0)
    }

    /// 通配的两端 N 只能落在首尾片段内：此时 pass 1 正向（下标 C+B）总能入表
    pub fn tolerates_end_ns(&self, leading: usize, trailing: usize) -> bool {
        leading <= self.fragments[0].len && trailing <= self.fragments[3].len
    }

    pub fn layout(&self, pass: u8, direction: Direction) -> TableLayout {
        let [i0, i1] = index_ids(pass, direction);
        let [c0, c1] = compare_ids(pass, direction);
        let f = self.fragments;
        let want: WantMatch = match (pass, direction) {
            (0, Direction::Forward) => want_pass0_forward,
            (0, Direction::Reverse) => want_pass0_reverse,
            _ => want_split,
        };
        TableLayout {
            pass,
            direction,
            oligo_len: self.oligo_len,
            index: [f[i0], f[i1]],
            compare: [f[c0], f[c1]],
            want,
        }
    }
}

/// 每个 pass 的两对片段：A+B / C+D，C+B / A+D，D+B / C+A
const PASS_PAIRS: [([usize; 2], [usize; 2]); 3] = [([0, 1], [2, 3]), ([2, 1], [0, 3]), ([3, 1], [2, 0])];

fn index_ids(pass: u8, direction: Direction) -> [usize; 2] {
    let (first, second) = PASS_PAIRS[pass.min(2) as usize];
    match direction {
        Direction::Forward => first,
        Direction::Reverse => second,
    }
}

fn compare_ids(pass: u8, direction: Direction) -> [usize; 2] {
    let (first, second) = PASS_PAIRS[pass.min(2) as usize];
    match direction {
        Direction::Forward => second,
        Direction::Reverse => first,
    }
}

/// 按 pass、方向顺序，第一张下标部分不含通配片段（`wild` 为片段位集）的表
pub fn first_indexable(wild: u8) -> Option<(u8, Direction)> {
    (0..NUM_PASSES)
        .flat_map(|p| Direction::BOTH.into_iter().map(move |d| (p, d)))
        .find(|&(p, d)| index_ids(p, d).iter().all(|&id| wild & (1 << id) == 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::oligo::Oligo;

    #[test]
    fn fragment_lengths_balanced() {
        for len in 16..=32 {
            let s = PartitionScheme::new(len);
            let lens: Vec<usize> = s.fragments.iter().map(|f| f.len).collect();
            assert_eq!(lens.iter().sum::<usize>(), len);
            let mx = *lens.iter().max().unwrap();
            let mn = *lens.iter().min().unwrap();
            assert!(mx - mn <= 1, "unbalanced fragments for len={}", len);
        }
    }

    #[test]
    fn every_fragment_pair_is_compared_exactly_once() {
        let s = PartitionScheme::new(30);
        let mut seen = std::collections::HashMap::new();
        for pass in 0..NUM_PASSES {
            for dir in Direction::BOTH {
                let l = s.layout(pass, dir);
                let mut key = [l.compare[0].id, l.compare[1].id];
                key.sort_unstable();
                *seen.entry(key).or_insert(0) += 1;
            }
        }
        assert_eq!(seen.len(), 6);
        assert!(seen.values().all(|&n| n == 1));
    }

    #[test]
    fn split_reassembles_fragments() {
        let seq = b"AAAACCCCGGGGTTTT";
        let (o, _) = Oligo::encode(seq);
        let s = PartitionScheme::new(16);
        let l = s.layout(1, Direction::Forward);
        let (idx, cmp) = l.split(o.value);
        // index = C+B, compare = A+D
        assert_eq!(idx, 0b10101010_01010101);
        assert_eq!(cmp, 0b00000000_11111111);
        let r = s.layout(2, Direction::Reverse);
        let (idx, cmp) = r.split(o.value);
        // reverse of pass 2: index = C+A, compare = D+B
        assert_eq!(idx, 0b10101010_00000000);
        assert_eq!(cmp, 0b11111111_01010101);
    }

    #[test]
    fn want_match_policies() {
        let s = PartitionScheme::new(32);
        let f0 = s.layout(0, Direction::Forward);
        let r0 = s.layout(0, Direction::Reverse);
        let f1 = s.layout(1, Direction::Forward);
        assert!(f0.want_match(0, 0));
        assert!(f0.want_match(2, 0));
        assert!(!f0.want_match(2, 1));
        assert!(!r0.want_match(0, 0));
        assert!(r0.want_match(0, 1));
        assert!(f1.want_match(1, 1));
        assert!(!f1.want_match(2, 0));
        assert!(!f1.want_match(0, 0));
    }

    #[test]
    fn exact_matches_with_wild_ends_have_one_owner() {
        let s = PartitionScheme::new(32);
        // 仅 D 通配：pass 0 正向本来就接受精确匹配
        assert_eq!(first_indexable(0b1000), Some((0, Direction::Forward)));
        assert_eq!(first_indexable(0b0001), Some((0, Direction::Reverse)));
        assert_eq!(first_indexable(0b1001), Some((1, Direction::Forward)));
        assert_eq!(first_indexable(0b1110), None);

        let (o, _) = Oligo::encode(b"NNACGTACGTACGTACGTACGTACGTACGTNN");
        let w = o.with_wildcard_ends(2, 2).wild;
        let owners: Vec<(u8, Direction)> = (0..NUM_PASSES)
            .flat_map(|p| Direction::BOTH.into_iter().map(move |d| (p, d)))
            .filter(|&(p, d)| {
                let l = s.layout(p, d);
                let (idx, _) = l.split(w);
                idx == 0 && l.owns_exact_match(l.wild_fragments(w))
            })
            .collect();
        assert_eq!(owners, vec![(1, Direction::Forward)]);
        assert!(s.tolerates_end_ns(8, 8));
        assert!(!s.tolerates_end_ns(9, 0));
    }
}
