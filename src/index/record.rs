use crate::index::oligo::OligoNumber;

pub const BLOCK_BITS: u32 = 24;
pub const BLOCK_SIZE: u64 = 1 << BLOCK_BITS;
/// 块号 0xFC..=0xFF 保留给哨兵值
pub const MAX_BLOCKS: u32 = 0xFC;

/// 32 位编码的基因组坐标：低 24 位为块内偏移，高 8 位为块号或哨兵。
///
/// 块是互不重叠的 16M 窗口；参考文件按名字排序后依次分配连续的块，
/// 因此 `global()` 对同一基因组目录是确定的。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchPosition(pub u32);

impl MatchPosition {
    pub const NO_MATCH: MatchPosition = MatchPosition(0xFFFF_FFFF);
    pub const QC_FAILED: MatchPosition = MatchPosition(0xFE00_0000);
    pub const REPEAT_MASKED: MatchPosition = MatchPosition(0xFD00_0000);
    pub const SAME_AS: MatchPosition = MatchPosition(0xFC00_0000);

    #[inline]
    pub fn new(block: u32, offset: u32) -> Self {
        debug_assert!(block < MAX_BLOCKS);
        debug_assert!((offset as u64) < BLOCK_SIZE);
        MatchPosition((block << BLOCK_BITS) | offset)
    }

    /// 由全局线性坐标构造
    #[inline]
    pub fn from_global(global: u64) -> Self {
        MatchPosition(global as u32)
    }

    #[inline]
    pub fn block(self) -> u32 {
        self.0 >> BLOCK_BITS
    }

    #[inline]
    pub fn offset(self) -> u32 {
        self.0 & (BLOCK_SIZE as u32 - 1)
    }

    #[inline]
    pub fn is_sentinel(self) -> bool {
        self.block() >= MAX_BLOCKS
    }

    #[inline]
    pub fn global(self) -> u64 {
        self.0 as u64
    }
}

/// 一次种子命中内的错配：计数（2 bit）+ 至多两个 { 偏移 (6 bit), 参考碱基 (2 bit) }。
///
/// 偏移以参考正链方向计，即相对被哈希的 oligo（反向链时为 read 的反向互补）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ErrorInfo(pub u32);

impl ErrorInfo {
    #[inline]
    pub fn count(self) -> u8 {
        (self.0 & 3) as u8
    }

    #[inline]
    pub fn push(self, offset: usize, ref_base: u8) -> Self {
        let n = self.count();
        debug_assert!(n < 2);
        let field = ((offset as u32) & 0x3F) | (((ref_base as u32) & 3) << 6);
        ErrorInfo((self.0 & !3) | (field << (8 + 8 * n as u32)) | (n as u32 + 1))
    }

    /// (偏移, 参考碱基编码)，按偏移升序
    pub fn mismatches(self) -> Vec<(usize, u8)> {
        let mut v: Vec<(usize, u8)> = (0..self.count() as u32)
            .map(|k| {
                let field = (self.0 >> (8 + 8 * k)) & 0xFF;
                ((field & 0x3F) as usize, (field >> 6) as u8)
            })
            .collect();
        v.sort_unstable();
        v
    }
}

/// 扫描产生的一条命中记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRecord {
    pub oligo: OligoNumber,
    /// 被哈希 oligo 在参考正链上的起点
    pub position: MatchPosition,
    pub errors: ErrorInfo,
}
