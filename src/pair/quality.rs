//! 比对质量：由碱基质量推出"该位置正确"的对数概率，并与竞争位置的概率质量比较。

use crate::align::descriptor;
use crate::pair::read::{CasavaAlignment, CasavaRead};

pub const QUALITY_TABLE_SIZE: usize = 100;
/// 输出质量上限
pub const MAX_ALIGNMENT_QUALITY: i32 = 255;

/// Q=0 时 p_correct 为 0，取对数前夹在该值之上
const MIN_PCORRECT: f64 = 0.25;

/// ln(p_correct) 与错配修正量 ln((1-p)/3) - ln(p) 的查找表
#[derive(Debug, Clone)]
pub struct QualityTable {
    ln_correct: [f64; QUALITY_TABLE_SIZE],
    ln_mismatch_delta: [f64; QUALITY_TABLE_SIZE],
}

impl QualityTable {
    pub fn new() -> Self {
        let mut ln_correct = [0.0; QUALITY_TABLE_SIZE];
        let mut ln_mismatch_delta = [0.0; QUALITY_TABLE_SIZE];
        for q in 0..QUALITY_TABLE_SIZE {
            let p = (1.0 - 10f64.powf(-(q as f64) / 10.0)).max(MIN_PCORRECT);
            ln_correct[q] = p.ln();
            ln_mismatch_delta[q] = ((1.0 - p) / 3.0).ln() - p.ln();
        }
        Self { ln_correct, ln_mismatch_delta }
    }

    #[inline]
    fn idx(q: u8) -> usize {
        (q as usize).min(QUALITY_TABLE_SIZE - 1)
    }

    #[inline]
    pub fn ln_correct(&self, q: u8) -> f64 {
        self.ln_correct[Self::idx(q)]
    }

    #[inline]
    pub fn mismatch_delta(&self, q: u8) -> f64 {
        self.ln_mismatch_delta[Self::idx(q)]
    }

    /// 全部（可用）碱基都正确的对数概率
    pub fn base_ln_pcorrect(&self, qualities: &[u8], use_bases: &[bool]) -> f64 {
        qualities
            .iter()
            .zip(use_bases.iter().chain(std::iter::repeat(&true)))
            .filter(|(_, &keep)| keep)
            .map(|(&q, _)| self.ln_correct(q))
            .sum()
    }

    /// 在 `base` 的基础上，把描述串中错配位置的项换成错配项。
    ///
    /// 描述串按参考正链书写，反向比对的偏移需要翻转到 read 方向。
    pub fn update_ln_pcorrect(&self, qualities: &[u8], use_bases: &[bool], alignment: &CasavaAlignment, base: f64) -> f64 {
        let len = qualities.len();
        let mut ln = base;
        for offset in descriptor::read_mismatch_offsets(&alignment.ops) {
            if offset >= len {
                continue;
            }
            let i = if alignment.reverse { len - 1 - offset } else { offset };
            if use_bases.get(i).copied().unwrap_or(true) {
                ln += self.mismatch_delta(qualities[i]);
            }
        }
        ln
    }

    /// 可用碱基错配修正量的平均值，估计未列出的邻居时使用
    pub fn mean_mismatch_delta(&self, qualities: &[u8], use_bases: &[bool]) -> f64 {
        let (sum, n) = qualities
            .iter()
            .zip(use_bases.iter().chain(std::iter::repeat(&true)))
            .filter(|(_, &keep)| keep)
            .fold((0.0, 0usize), |(s, n), (&q, _)| (s + self.mismatch_delta(q), n + 1));
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    }
}

impl Default for QualityTable {
    fn default() -> Self {
        Self::new()
    }
}

/// 随机序列在基因组（双链）其它位置出现的先验概率 `2·G·4^-R`
pub fn rest_of_genome_correction(genome_size: u64, seed_len: usize) -> f64 {
    2.0 * genome_size as f64 * 4f64.powi(-(seed_len as i32))
}

/// `floor(-10·log10(others / (others + best)))`，夹在 `0..=MAX_ALIGNMENT_QUALITY`
pub fn alignment_quality_from_neighbors(best: f64, others: f64) -> i32 {
    if best <= 0.0 {
        return 0;
    }
    if others <= 0.0 {
        return MAX_ALIGNMENT_QUALITY;
    }
    let q = (-10.0 * (others / (others + best)).log10()).floor();
    if q.is_nan() {
        0
    } else {
        (q as i32).clamp(0, MAX_ALIGNMENT_QUALITY)
    }
}

/// 单条 read 的评分结果
#[derive(Debug, Clone, PartialEq)]
pub struct ReadScore {
    /// 每个候选的 ln p_correct，与 `alignments` 对齐
    pub ln_pcorrect: Vec<f64>,
    pub best: Option<usize>,
    /// 最佳候选之外的概率质量（含未列出的邻居和 rest-of-genome）
    pub others: f64,
    /// 未列出的邻居的概率质量
    pub unlisted: f64,
    pub rest_of_genome: f64,
    pub quality: i32,
}

impl ReadScore {
    pub fn best_probability(&self) -> f64 {
        self.best.map_or(0.0, |b| self.ln_pcorrect[b].exp())
    }

    pub fn probability(&self, i: usize) -> f64 {
        self.ln_pcorrect[i].exp()
    }

    /// 以第 `i` 个候选为最佳时的比对质量（片段解析选中的不一定是单端最佳）
    pub fn quality_of(&self, i: usize) -> i32 {
        let p = self.probability(i);
        let listed: f64 = self.ln_pcorrect.iter().enumerate().filter(|&(j, _)| j != i).map(|(_, l)| l.exp()).sum();
        alignment_quality_from_neighbors(p, listed + self.unlisted + self.rest_of_genome)
    }
}

pub fn score_read(table: &QualityTable, read: &CasavaRead, rest_of_genome: f64) -> ReadScore {
    let base = table.base_ln_pcorrect(&read.qualities, &read.use_bases);
    let ln_pcorrect: Vec<f64> = read
        .alignments
        .iter()
        .map(|a| table.update_ln_pcorrect(&read.qualities, &read.use_bases, a, base))
        .collect();
    let best = (0..ln_pcorrect.len()).max_by(|&a, &b| ln_pcorrect[a].total_cmp(&ln_pcorrect[b]).then(b.cmp(&a)));

    // 状态列里计数但没有列出的邻居按平均错配修正量估计
    let mut listed = [0u32; 3];
    for a in &read.alignments {
        listed[a.mismatches().min(2)] += 1;
    }
    let delta = table.mean_mismatch_delta(&read.qualities, &read.use_bases);
    let unlisted: f64 = match read.status {
        crate::align::matches::MatchStatus::Counts(r) => (0..3)
            .map(|e| {
                let extra = (r[e] as u32).saturating_sub(listed[e]) as f64;
                extra * (base + e as f64 * delta).exp()
            })
            .sum(),
        _ => 0.0,
    };

    let listed_others: f64 = ln_pcorrect
        .iter()
        .enumerate()
        .filter(|&(i, _)| Some(i) != best)
        .map(|(_, &l)| l.exp())
        .sum();
    let others = listed_others + unlisted + rest_of_genome;
    let quality = match best {
        Some(b) => alignment_quality_from_neighbors(ln_pcorrect[b].exp(), others),
        None => 0,
    };
    ReadScore { ln_pcorrect, best, others, unlisted, rest_of_genome, quality }
}
