//! 片段长度分布估计。
//!
//! 只用两端都唯一比对到同一参考的 read 对；按 [`AlignmentModel`] 分桶统计长度直方图，
//! 每积累 [`REESTIMATE_INTERVAL`] 个样本用最多的两个模型重估一次，连续两次结果完全相同即收敛。

use std::collections::BTreeMap;

use crate::config::PairConfig;
use crate::error::ElandError;
use crate::pair::model::{AlignmentModel, CircularReferences, NUM_MODELS};
use crate::pair::read::CasavaRead;

pub const REESTIMATE_INTERVAL: u64 = 10_000;

const LOW_SIGMA_PERCENTILE: f64 = 0.1587;
const HIGH_SIGMA_PERCENTILE: f64 = 0.8413;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentLengthStatistics {
    pub min: u32,
    pub median: u32,
    pub max: u32,
    pub low_std_dev: f64,
    pub high_std_dev: f64,
}

impl FragmentLengthStatistics {
    pub fn contains(&self, len: u32) -> bool {
        (self.min..=self.max).contains(&len)
    }

    /// 命令行覆盖：先按 σ 倍数重设窗口，再用显式给出的 min/max 替换；结果上下界颠倒时报错
    pub fn with_overrides(mut self, cfg: &PairConfig) -> Result<Self, ElandError> {
        if let Some(n) = cfg.std_count {
            self.min = (self.median as f64 - n * self.low_std_dev).floor().max(0.0) as u32;
            self.max = (self.median as f64 + n * self.high_std_dev).ceil() as u32;
        }
        if let Some(lo) = cfg.min_fragment {
            self.min = lo;
        }
        if let Some(hi) = cfg.max_fragment {
            self.max = hi;
        }
        if self.min > self.max {
            return Err(ElandError::Config(format!(
                "fragment length window is empty after overrides: min {} > max {} (estimated median {})",
                self.min, self.max, self.median
            )));
        }
        Ok(self)
    }
}

/// 整个运行只决定一次的配对策略
#[derive(Debug, Clone, PartialEq)]
pub enum PairingStrategy {
    Paired { stats: FragmentLengthStatistics, models: [AlignmentModel; 2] },
    /// 样本不足或文库不一致：每个 mate 独立评分
    Independent,
}

#[derive(Debug, Clone, Default)]
pub struct FragmentLengthEstimator {
    confidence_interval: f64,
    histograms: Vec<BTreeMap<u32, u64>>,
    model_counts: [u64; NUM_MODELS],
    /// 检查过的 read 对
    pairs: u64,
    /// 两端均唯一比对的 read 对
    unique_pairs: u64,
    samples: u64,
    circular_corrections: u64,
    last: Option<FragmentLengthStatistics>,
    converged: bool,
}

impl FragmentLengthEstimator {
    pub fn new(confidence_interval: f64) -> Self {
        Self { confidence_interval, histograms: vec![BTreeMap::new(); NUM_MODELS], ..Self::default() }
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn pairs(&self) -> u64 {
        self.pairs
    }

    pub fn circular_corrections(&self) -> u64 {
        self.circular_corrections
    }

    pub fn model_counts(&self) -> &[u64; NUM_MODELS] {
        &self.model_counts
    }

    /// 加入一对 read；返回是否已收敛（收敛后不再采样）
    pub fn add_pair(&mut self, m1: &CasavaRead, m2: &CasavaRead, circular: &CircularReferences) -> bool {
        if self.converged {
            return true;
        }
        self.pairs += 1;
        if !(m1.is_unique() && m2.is_unique()) {
            return false;
        }
        self.unique_pairs += 1;
        if let Some(g) = circular.geometry(&m1.alignments[0], &m2.alignments[0]) {
            self.add_sample(g.model, g.fragment_len);
            if g.circular {
                self.circular_corrections += 1;
            }
        }
        self.converged
    }

    pub fn add_sample(&mut self, model: AlignmentModel, fragment_len: u32) {
        *self.histograms[model.index()].entry(fragment_len).or_insert(0) += 1;
        self.model_counts[model.index()] += 1;
        self.samples += 1;
        if self.samples % REESTIMATE_INTERVAL == 0 {
            let current = self.estimate();
            if current.is_some() && current == self.last {
                log::info!("fragment length estimate converged after {} samples", self.samples);
                self.converged = true;
            }
            self.last = current;
        }
    }

    /// 样本最多的两个模型；计数相同时下标小的优先
    pub fn dominant_models(&self) -> [AlignmentModel; 2] {
        let mut order: Vec<usize> = (0..NUM_MODELS).collect();
        order.sort_by(|&a, &b| self.model_counts[b].cmp(&self.model_counts[a]).then(a.cmp(&b)));
        [AlignmentModel(order[0] as u8), AlignmentModel(order[1] as u8)]
    }

    /// 用两个主导模型的合并直方图计算统计量，取最近秩百分位
    pub fn estimate(&self) -> Option<FragmentLengthStatistics> {
        let [a, b] = self.dominant_models();
        let mut merged: BTreeMap<u32, u64> = self.histograms[a.index()].clone();
        for (&len, &n) in &self.histograms[b.index()] {
            *merged.entry(len).or_insert(0) += n;
        }
        let total: u64 = merged.values().sum();
        if total == 0 {
            return None;
        }
        let percentile = |p: f64| -> u32 {
            // 抵消 (1 - ci) / 2 之类运算的舍入误差
            let rank = ((p * total as f64 - 1e-9).ceil() as u64).clamp(1, total);
            let mut seen = 0u64;
            for (&len, &n) in &merged {
                seen += n;
                if seen >= rank {
                    return len;
                }
            }
            // total > 0 时循环必然返回
            *merged.keys().next_back().unwrap_or(&0)
        };
        let tail = (1.0 - self.confidence_interval) / 2.0;
        let median = percentile(0.5);
        Some(FragmentLengthStatistics {
            min: percentile(tail),
            median,
            max: percentile(1.0 - tail),
            low_std_dev: median as f64 - percentile(LOW_SIGMA_PERCENTILE) as f64,
            high_std_dev: percentile(HIGH_SIGMA_PERCENTILE) as f64 - median as f64,
        })
    }

    /// 采样结束后的策略判定
    pub fn strategy(&self, cfg: &PairConfig) -> Result<PairingStrategy, ElandError> {
        if self.samples < cfg.min_samples as u64 {
            log::warn!(
                "only {} usable read pairs (need {}); resolving mates independently",
                self.samples,
                cfg.min_samples
            );
            return Ok(PairingStrategy::Independent);
        }
        let unique_pct = 100.0 * self.unique_pairs as f64 / self.pairs.max(1) as f64;
        if self.pairs > 0 && unique_pct < cfg.min_unique_pair_percent {
            log::warn!(
                "{:.2}% unique pairs is below {:.2}%; resolving mates independently",
                unique_pct,
                cfg.min_unique_pair_percent
            );
            return Ok(PairingStrategy::Independent);
        }
        let models = self.dominant_models();
        let consistent = self.model_counts[models[0].index()] + self.model_counts[models[1].index()];
        let consistent_pct = 100.0 * consistent as f64 / self.samples as f64;
        if consistent_pct < cfg.min_consistent_pair_percent {
            log::warn!(
                "{:.2}% of pairs agree with models {}/{}, below {:.2}%; resolving mates independently",
                consistent_pct,
                models[0],
                models[1],
                cfg.min_consistent_pair_percent
            );
            return Ok(PairingStrategy::Independent);
        }
        let Some(stats) = self.estimate() else {
            return Ok(PairingStrategy::Independent);
        };
        let stats = stats.with_overrides(cfg)?;
        log::info!(
            "fragment length: min {} median {} max {} (sigma -{:.1}/+{:.1}), models {} and {}",
            stats.min,
            stats.median,
            stats.max,
            stats.low_std_dev,
            stats.high_std_dev,
            models[0],
            models[1]
        );
        Ok(PairingStrategy::Paired { stats, models })
    }
}
