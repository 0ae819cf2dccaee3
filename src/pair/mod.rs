//! 片段解析器：读入两个 mate 的 ELAND 扩展结果，估计片段长度分布，逐对解析并写出 export 文件。

pub mod insert;
pub mod model;
pub mod quality;
pub mod read;
pub mod rescue;
pub mod resolve;

use anyhow::Result;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::config::PairConfig;
use crate::error::ElandError;
use crate::index::squash::GenomeIndex;
use crate::io::export::write_export;
use crate::io::reads::open_input;

pub use insert::{FragmentLengthEstimator, FragmentLengthStatistics, PairingStrategy};
pub use model::{AlignmentModel, CircularReferences};
pub use read::{CasavaAlignment, CasavaRead, MateSource};
pub use resolve::{FragmentResolver, PairOutcome, PairSummary, ResolvedPair};

/// 一个 mate 的输入文件
#[derive(Debug, Clone)]
pub struct MateInput {
    pub eland: PathBuf,
    pub fastq: Option<PathBuf>,
}

type BoxedSource = MateSource<Box<dyn BufRead>, Box<dyn BufRead>>;

fn open_sources(cfg: &PairConfig, inputs: &[MateInput; 2]) -> Result<[BoxedSource; 2]> {
    let open = |k: usize| -> Result<BoxedSource> {
        let eland = open_input(&inputs[k].eland)?;
        let fastq = inputs[k].fastq.as_deref().map(open_input).transpose()?;
        Ok(MateSource::new(eland, fastq, cfg.quality_offset, cfg.use_bases[k].clone()))
    };
    Ok([open(0)?, open(1)?])
}

/// 两个文件逐条同步读取；条数不一致是格式错误
fn next_pair(sources: &mut [BoxedSource; 2]) -> Result<Option<(CasavaRead, CasavaRead)>> {
    let [s1, s2] = sources;
    match (s1.next_read()?, s2.next_read()?) {
        (Some(a), Some(b)) => Ok(Some((a, b))),
        (None, None) => Ok(None),
        (Some(a), None) | (None, Some(a)) => {
            Err(ElandError::format("paired input (mate files have different record counts)", a.name).into())
        }
    }
}

/// 第一遍：采样直到估计收敛或文件读完，返回本次运行的配对策略
pub fn estimate_strategy(cfg: &PairConfig, inputs: &[MateInput; 2], circular: &CircularReferences) -> Result<PairingStrategy> {
    let mut sources = open_sources(cfg, inputs)?;
    let mut estimator = FragmentLengthEstimator::new(cfg.confidence_interval);
    while let Some((m1, m2)) = next_pair(&mut sources)? {
        if estimator.add_pair(&m1, &m2, circular) {
            break;
        }
    }
    log::info!(
        "sampled {} read pairs, {} usable for fragment length ({} circular corrections)",
        estimator.pairs(),
        estimator.samples(),
        estimator.circular_corrections()
    );
    log::debug!("pairs per alignment model: {:?}", estimator.model_counts());
    Ok(estimator.strategy(cfg)?)
}

/// 第二遍：逐对解析，每个 mate 写一个 export 流
pub fn resolve_pairs<W1: Write, W2: Write>(
    cfg: &PairConfig,
    inputs: &[MateInput; 2],
    strategy: PairingStrategy,
    circular: CircularReferences,
    genome: Option<&GenomeIndex>,
    out1: &mut W1,
    out2: &mut W2,
) -> Result<PairSummary> {
    let mut sources = open_sources(cfg, inputs)?;
    let mut resolver = FragmentResolver::new(cfg, strategy, circular, genome)?;
    while let Some((m1, m2)) = next_pair(&mut sources)? {
        let pair = resolver.resolve(&m1, &m2)?;
        let [e1, e2] = resolver.export_records(&pair, &m1, &m2);
        write_export(out1, &e1)?;
        write_export(out2, &e2)?;
    }
    let summary = resolver.summary().clone();
    if summary.pairs == 0 {
        log::warn!("no read pairs in input; export files are empty");
    }
    summary.log();
    Ok(summary)
}
