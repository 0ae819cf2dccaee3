use std::path::PathBuf;

use crate::error::ElandError;

/// 允许的最短 / 最长 oligo 长度（每个片段至多 8 个碱基）
pub const MIN_OLIGO_LEN: usize = 16;
pub const MAX_OLIGO_LEN: usize = 32;

/// 比对器参数，启动时构造一次，以引用形式传入 `AlignmentDriver`。
#[derive(Debug, Clone)]
pub struct AlignConfig {
    /// 种子（oligo）长度
    pub oligo_len: usize,
    /// 每个错误等级（0/1/2 错配）最多保留的匹配数
    pub max_matches: [u32; 3],
    /// 哈希表下标最多使用的位数，超出时进入 split-prefix 模式
    pub max_hash_bits: u32,
    /// 计数饱和（255）的 read 仍参与多种子救援
    pub sensitive: bool,
    /// 只运行单种子阶段
    pub single_seed_only: bool,
    /// 多种子阶段每条 read 最多报告的候选数
    pub max_multi_hits: usize,
    /// 相邻种子间允许的位置偏移（吸收小 indel）
    pub seed_deviation: u32,
    /// 种子内部允许的 N 个数；read 两端的 N 串按通配处理，不计入
    pub max_ns: u32,
    /// 无间隙延伸错配数超过该值时，多种子候选改走带状 DP
    pub max_ungapped_mismatches: u32,
    /// 匹配缓存批大小
    pub cache_size: usize,
    pub threads: usize,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            oligo_len: 32,
            max_matches: [10, 10, 10],
            max_hash_bits: 25,
            sensitive: false,
            single_seed_only: false,
            max_multi_hits: 10,
            seed_deviation: 5,
            max_ns: 2,
            max_ungapped_mismatches: 4,
            cache_size: 200,
            threads: 1,
            scratch_dir: None,
        }
    }
}

impl AlignConfig {
    pub fn validate(&self) -> Result<(), ElandError> {
        if !(MIN_OLIGO_LEN..=MAX_OLIGO_LEN).contains(&self.oligo_len) {
            return Err(ElandError::Config(format!(
                "oligo length must be within {}..={}, got {}",
                MIN_OLIGO_LEN, MAX_OLIGO_LEN, self.oligo_len
            )));
        }
        if !(8..=30).contains(&self.max_hash_bits) {
            return Err(ElandError::Config(format!(
                "max hash bits must be within 8..=30, got {}",
                self.max_hash_bits
            )));
        }
        if let Some(m) = self.max_matches.iter().find(|&&m| m >= 255) {
            return Err(ElandError::Config(format!("per-class match cap must be below 255, got {}", m)));
        }
        if self.max_ns > 2 {
            return Err(ElandError::Config(format!("at most 2 Ns can be tolerated, got {}", self.max_ns)));
        }
        if self.threads == 0 {
            return Err(ElandError::Config("thread count must be positive".to_string()));
        }
        if self.cache_size == 0 {
            return Err(ElandError::Config("match cache size must be positive".to_string()));
        }
        if self.max_multi_hits == 0 {
            return Err(ElandError::Config("max multi-seed hits must be positive".to_string()));
        }
        Ok(())
    }
}

/// 片段解析器参数。
#[derive(Debug, Clone)]
pub struct PairConfig {
    /// 用于估计 rest-of-genome 先验的种子长度
    pub seed_len: usize,
    pub min_mate_quality: i32,
    pub min_fragment_quality: i32,
    /// 命令行覆盖的片段长度窗口
    pub min_fragment: Option<u32>,
    pub max_fragment: Option<u32>,
    /// 设置后以 median ± n·σ 作为窗口
    pub std_count: Option<f64>,
    pub confidence_interval: f64,
    pub min_unique_pair_percent: f64,
    pub min_consistent_pair_percent: f64,
    /// 估计所需的最少样本
    pub min_samples: usize,
    pub quality_offset: u8,
    pub circular: Vec<String>,
    pub use_bases: [Option<String>; 2],
    pub rescue: bool,
    pub max_rescue_mismatches: u32,
}

impl Default for PairConfig {
    fn default() -> Self {
        Self {
            seed_len: 32,
            min_mate_quality: 0,
            min_fragment_quality: 0,
            min_fragment: None,
            max_fragment: None,
            std_count: None,
            confidence_interval: 0.9973,
            min_unique_pair_percent: 10.0,
            min_consistent_pair_percent: 70.0,
            min_samples: 20,
            quality_offset: 33,
            circular: Vec::new(),
            use_bases: [None, None],
            rescue: false,
            max_rescue_mismatches: 4,
        }
    }
}

impl PairConfig {
    pub fn validate(&self) -> Result<(), ElandError> {
        if !(self.confidence_interval > 0.0 && self.confidence_interval < 1.0) {
            return Err(ElandError::Config(format!(
                "confidence interval must be within (0, 1), got {}",
                self.confidence_interval
            )));
        }
        for (name, v) in [
            ("unique pair percent", self.min_unique_pair_percent),
            ("consistent pair percent", self.min_consistent_pair_percent),
        ] {
            if !(0.0..=100.0).contains(&v) {
                return Err(ElandError::Config(format!("{} must be within 0..=100, got {}", name, v)));
            }
        }
        if let (Some(lo), Some(hi)) = (self.min_fragment, self.max_fragment) {
            if lo > hi {
                return Err(ElandError::Config(format!(
                    "minimum fragment length {} exceeds maximum {}",
                    lo, hi
                )));
            }
        }
        if let Some(n) = self.std_count {
            if !(n > 0.0) {
                return Err(ElandError::Config(format!("standard deviation count must be positive, got {}", n)));
            }
        }
        if self.seed_len == 0 {
            return Err(ElandError::Config("seed length must be positive".to_string()));
        }
        Ok(())
    }

    pub fn is_circular(&self, reference: &str) -> bool {
        self.circular.iter().any(|c| c == reference)
    }
}
