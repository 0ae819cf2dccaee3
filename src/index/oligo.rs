//! Oligo 的二进制编码：每个碱基 2 bit，外加并行的 N 掩码。

use crate::error::ElandError;
use crate::util::dna;

/// 定长的 read 片段。
///
/// - 第 0 个碱基位于最高的已用位：`base(i)` 存放在 `2 * (len - 1 - i)` 处
/// - N 位置的值为 0，掩码为 `0b11`
/// - read 两端 N 串可移入 `wild`：比较时视为通配，不计错配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oligo {
    pub value: u64,
    pub mask: u64,
    pub wild: u64,
    pub len: u8,
}

#[inline]
pub fn used_bits(len: usize) -> u64 {
    if len >= 32 { u64::MAX } else { (1u64 << (2 * len)) - 1 }
}

/// 反转 64 位字中 32 个 2-bit 分组的顺序
#[inline]
fn reverse_pairs(mut x: u64) -> u64 {
    x = ((x >> 2) & 0x3333_3333_3333_3333) | ((x & 0x3333_3333_3333_3333) << 2);
    x = ((x >> 4) & 0x0F0F_0F0F_0F0F_0F0F) | ((x & 0x0F0F_0F0F_0F0F_0F0F) << 4);
    x.swap_bytes()
}

impl Oligo {
    /// 编码碱基序列，返回 oligo 以及其中 N 的数量。
    /// 全部为 N 时 `n_count == len`，由调用方拒绝。
    pub fn encode(bases: &[u8]) -> (Oligo, usize) {
        debug_assert!(!bases.is_empty() && bases.len() <= 32);
        let mut value = 0u64;
        let mut mask = 0u64;
        let mut n_count = 0usize;
        for &b in bases {
            value <<= 2;
            mask <<= 2;
            match dna::to_code(b) {
                Some(c) => value |= c as u64,
                None => {
                    mask |= 0b11;
                    n_count += 1;
                }
            }
        }
        (Oligo { value, mask, wild: 0, len: bases.len() as u8 }, n_count)
    }

    pub fn decode(&self) -> Vec<u8> {
        (0..self.len as usize)
            .map(|i| if self.is_masked(i) { b'N' } else { dna::from_code(self.base(i)) })
            .collect()
    }

    #[inline]
    pub fn base(&self, i: usize) -> u8 {
        ((self.value >> (2 * (self.len as usize - 1 - i))) & 3) as u8
    }

    #[inline]
    pub fn is_masked(&self, i: usize) -> bool {
        ((self.mask | self.wild) >> (2 * (self.len as usize - 1 - i))) & 3 != 0
    }

    /// 计入错配的 N 数，不含通配的两端 N
    pub fn n_count(&self) -> usize {
        (self.mask.count_ones() / 2) as usize
    }

    /// 把前 `leading` 个与后 `trailing` 个碱基中的 N 改为通配
    pub fn with_wildcard_ends(self, leading: usize, trailing: usize) -> Oligo {
        let len = self.len as usize;
        let mut ends = 0u64;
        for i in (0..leading.min(len)).chain(len - trailing.min(len)..len) {
            ends |= 0b11 << (2 * (len - 1 - i));
        }
        let moved = self.mask & ends;
        Oligo { mask: self.mask & !moved, wild: self.wild | moved, ..self }
    }

    pub fn reverse_complement(&self) -> Oligo {
        let len = self.len as usize;
        let used = used_bits(len);
        // N 位置保持 0，不做互补
        let comp = !self.value & used & !(self.mask | self.wild);
        // len == 32 时 shift 为 0，未用高位由 `used` 清掉
        let shift = 64 - 2 * len as u32;
        let flip = |x: u64| reverse_pairs(x) >> shift;
        Oligo {
            value: flip(comp) & used,
            mask: flip(self.mask) & used,
            wild: flip(self.wild) & used,
            len: self.len,
        }
    }
}

/// 每批次 read 数上限，由 `OligoNumber` 的位布局决定
pub const READ_INDEX_BITS: u32 = 27;
pub const MAX_READS: u32 = 1 << READ_INDEX_BITS;
const REVERSE_BIT: u32 = 1 << READ_INDEX_BITS;
const SEED_SHIFT: u32 = READ_INDEX_BITS + 1;

/// oligo 编号：{ read 下标 (27 bit), 反向链标志 (1 bit), 种子下标 (2 bit) }
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OligoNumber(pub u32);

impl OligoNumber {
    pub fn new(read_index: u32, reverse: bool, seed: u8) -> Result<Self, ElandError> {
        if read_index >= MAX_READS {
            return Err(ElandError::Invariant(format!(
                "read index {} exceeds the per-batch limit of {} reads",
                read_index, MAX_READS
            )));
        }
        if seed > 3 {
            return Err(ElandError::Invariant(format!("seed index {} out of range", seed)));
        }
        let rev = if reverse { REVERSE_BIT } else { 0 };
        Ok(OligoNumber(read_index | rev | ((seed as u32) << SEED_SHIFT)))
    }

    #[inline]
    pub fn read_index(self) -> u32 {
        self.0 & (MAX_READS - 1)
    }

    #[inline]
    pub fn is_reverse(self) -> bool {
        self.0 & REVERSE_BIT != 0
    }

    #[inline]
    pub fn seed(self) -> u8 {
        ((self.0 >> SEED_SHIFT) & 3) as u8
    }

    /// 同一 read 的同一种子、同一条链，但指向另一条 read
    #[inline]
    pub fn with_read_index(self, read_index: u32) -> Self {
        OligoNumber((self.0 & !(MAX_READS - 1)) | (read_index & (MAX_READS - 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_decode_plain() {
        let (o, n) = Oligo::encode(b"ACGTTGCA");
        assert_eq!(n, 0);
        assert_eq!(o.value, 0b00_01_10_11_11_10_01_00);
        assert_eq!(o.mask, 0);
        assert_eq!(o.decode(), b"ACGTTGCA".to_vec());
    }

    #[test]
    fn n_bases_are_masked_and_zero_filled() {
        let (o, n) = Oligo::encode(b"ANGT");
        assert_eq!(n, 1);
        assert_eq!(o.mask, 0b00_11_00_00);
        assert_eq!(o.value & o.mask, 0);
        assert!(o.is_masked(1));
        assert_eq!(o.decode(), b"ANGT".to_vec());
    }

    #[test]
    fn all_n_reports_full_count() {
        let (_, n) = Oligo::encode(b"NNNN");
        assert_eq!(n, 4);
    }

    #[test]
    fn reverse_complement_short_and_full_length() {
        let (o, _) = Oligo::encode(b"AACGN");
        assert_eq!(o.reverse_complement().decode(), b"NCGTT".to_vec());

        let seq = b"ACGTACGTTTGGCCAANACGTACGTTTGGCCA";
        assert_eq!(seq.len(), 32);
        let (o, _) = Oligo::encode(seq);
        let rc = o.reverse_complement();
        assert_eq!(rc.decode(), dna::revcomp(seq));
        assert_eq!(rc.reverse_complement(), o);
    }

    #[test]
    fn end_ns_become_wildcards() {
        let (o, n) = Oligo::encode(b"NACGNTTN");
        assert_eq!(n, 3);
        let w = o.with_wildcard_ends(1, 1);
        assert_eq!(w.n_count(), 1);
        assert_eq!(w.wild, 0b11_00_00_00_00_00_00_11);
        assert_eq!(w.mask, 0b00_00_00_00_11_00_00_00);
        assert_eq!(w.decode(), b"NACGNTTN".to_vec());

        let rc = w.reverse_complement();
        assert_eq!(rc.decode(), b"NAANCGTN".to_vec());
        assert_eq!(rc.wild, w.wild);
        assert_eq!(rc.n_count(), 1);
        assert!(rc.is_masked(3));
        assert_eq!(rc.reverse_complement(), w);
    }

    #[test]
    fn oligo_number_layout() {
        let n = OligoNumber::new(123_456, true, 3).unwrap();
        assert_eq!(n.read_index(), 123_456);
        assert!(n.is_reverse());
        assert_eq!(n.seed(), 3);
        let m = n.with_read_index(7);
        assert_eq!(m.read_index(), 7);
        assert!(m.is_reverse());
        assert_eq!(m.seed(), 3);
    }

    #[test]
    fn oligo_number_rejects_oversized_index() {
        assert!(OligoNumber::new(MAX_READS, false, 0).is_err());
        assert!(OligoNumber::new(MAX_READS - 1, false, 0).is_ok());
    }

    fn bases(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(prop::sample::select(b"ACGTN".to_vec()), 1..=max_len)
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(seq in bases(32)) {
            let (o, n) = Oligo::encode(&seq);
            prop_assert_eq!(o.decode(), seq.clone());
            prop_assert_eq!(n, seq.iter().filter(|&&b| b == b'N').count());
            prop_assert_eq!(o.n_count(), n);
        }

        #[test]
        fn reverse_complement_is_an_involution(seq in bases(32)) {
            let (o, _) = Oligo::encode(&seq);
            let rc = o.reverse_complement();
            prop_assert_eq!(rc.reverse_complement(), o);
            prop_assert_eq!(rc.decode(), dna::revcomp(&seq));
            prop_assert_eq!(rc.value & rc.mask, 0);
        }

        #[test]
        fn wildcard_ends_survive_reverse_complement(seq in bases(32), lead in 0usize..4, trail in 0usize..4) {
            let (o, n) = Oligo::encode(&seq);
            let w = o.with_wildcard_ends(lead, trail);
            prop_assert_eq!(w.mask | w.wild, o.mask);
            prop_assert!(w.n_count() <= n);
            prop_assert_eq!(w.decode(), seq.clone());
            prop_assert_eq!(w.reverse_complement().decode(), dna::revcomp(&seq));
            prop_assert_eq!(w.reverse_complement().reverse_complement(), w);
        }
    }
}
