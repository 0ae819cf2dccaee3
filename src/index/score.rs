/// 单个片段的错配描述（16 bit）：
/// - 0：无错配
/// - 低字节：第一个错配，`p`（从片段末尾数起）占低 6 位，XOR 类型占高 2 位
/// - 高字节：第二个错配，格式相同
/// - `0xFFFF`：超过两个错配
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragScore(pub u16);

impl FragScore {
    pub const NONE: FragScore = FragScore(0);
    pub const TOO_MANY: FragScore = FragScore(0xFFFF);

    /// 错配个数，3 表示 >2
    #[inline]
    pub fn errors(self) -> u8 {
        if self == Self::TOO_MANY {
            3
        } else {
            u8::from(self.0 & 0xFF != 0) + u8::from(self.0 >> 8 != 0)
        }
    }

    /// 错配位置（从片段末尾数起）
    pub fn positions(self) -> impl Iterator<Item = usize> {
        let fields = if self == Self::TOO_MANY { [0u8, 0u8] } else { [self.0 as u8, (self.0 >> 8) as u8] };
        fields.into_iter().filter(|&b| b != 0).map(|b| (b & 0x3F) as usize)
    }

    fn push(self, p: usize, xor_type: u8) -> FragScore {
        let field = (p as u16 & 0x3F) | ((xor_type as u16 & 3) << 6);
        match self.errors() {
            0 => FragScore(field),
            1 => FragScore(self.0 | (field << 8)),
            _ => Self::TOO_MANY,
        }
    }
}

/// 预计算的 XOR 差异 → 错配描述查找表，扫描时以 O(1) 代替逐碱基比较。
///
/// 下标为单个片段（至多 8 个碱基）内 `read ^ genome` 的差异；掩码位置（N）
/// 事先按 `0b11` 并入差异。
pub struct SuffixScoreTable {
    table: Vec<FragScore>,
    frag_len: usize,
}

impl SuffixScoreTable {
    pub fn new(max_fragment_len: usize) -> Self {
        assert!(max_fragment_len <= 8, "fragments longer than 8 bases are not supported");
        let size = 1usize << (2 * max_fragment_len);
        let mut table = Vec::with_capacity(size);
        for diff in 0..size {
            let mut s = FragScore::NONE;
            for p in 0..max_fragment_len {
                let t = ((diff >> (2 * p)) & 3) as u8;
                if t != 0 {
                    s = s.push(p, t);
                    if s == FragScore::TOO_MANY {
                        break;
                    }
                }
            }
            table.push(s);
        }
        Self { table, frag_len: max_fragment_len }
    }

    pub fn fragment_len(&self) -> usize {
        self.frag_len
    }

    #[inline]
    pub fn score(&self, diff: u32) -> FragScore {
        self.table[diff as usize]
    }

    /// 对比较部分的两段分别查表，返回 (高位片段, 低位片段)
    #[inline]
    pub fn score_pair(&self, diff: u32, lower_bits: u32) -> (FragScore, FragScore) {
        let lower = diff & ((1u32 << lower_bits) - 1);
        let upper = diff >> lower_bits;
        (self.score(upper), self.score(lower))
    }
}
