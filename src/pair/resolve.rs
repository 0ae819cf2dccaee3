//! 逐对解析：在候选比对的笛卡尔积中挑出最可能的片段，或退回到单端评分。

use anyhow::Result;
use std::fmt;

use crate::align::matches::MatchStatus;
use crate::config::PairConfig;
use crate::index::squash::GenomeIndex;
use crate::io::export::{parse_read_name, ExportAlignment, ExportRecord, PartnerInfo};
use crate::pair::insert::PairingStrategy;
use crate::pair::model::{AlignmentModel, CircularReferences, PairGeometry};
use crate::pair::quality::{alignment_quality_from_neighbors, rest_of_genome_correction, score_read, QualityTable, ReadScore};
use crate::pair::read::{CasavaAlignment, CasavaRead};
use crate::pair::rescue::OrphanRescuer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairOutcome {
    BothUnaligned,
    SingleMate,
    Discordant,
    ResolvedUnique,
    ResolvedMultiple,
    /// 存在合格的配对，但片段质量低于阈值
    Unresolved,
}

impl PairOutcome {
    pub const ALL: [PairOutcome; 6] = [
        PairOutcome::BothUnaligned,
        PairOutcome::SingleMate,
        PairOutcome::Discordant,
        PairOutcome::ResolvedUnique,
        PairOutcome::ResolvedMultiple,
        PairOutcome::Unresolved,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PairOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PairOutcome::BothUnaligned => "both unaligned",
            PairOutcome::SingleMate => "single mate",
            PairOutcome::Discordant => "discordant",
            PairOutcome::ResolvedUnique => "resolved unique",
            PairOutcome::ResolvedMultiple => "resolved multiple",
            PairOutcome::Unresolved => "unresolved",
        };
        f.write_str(s)
    }
}

/// 一个 mate 的最终结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MateCall {
    pub alignment: Option<CasavaAlignment>,
    pub quality: Option<i32>,
    pub rescued: bool,
}

impl MateCall {
    fn aligned(alignment: &CasavaAlignment, quality: i32) -> Self {
        Self { alignment: Some(alignment.clone()), quality: Some(quality), rescued: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPair {
    pub outcome: PairOutcome,
    pub mates: [MateCall; 2],
    pub fragment_quality: Option<i32>,
    pub model: Option<AlignmentModel>,
    pub circular: bool,
}

impl ResolvedPair {
    fn new(outcome: PairOutcome, mates: [MateCall; 2]) -> Self {
        Self { outcome, mates, fragment_quality: None, model: None, circular: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairSummary {
    pub pairs: u64,
    outcomes: [u64; 6],
    pub circular: u64,
    pub rescued: u64,
}

impl PairSummary {
    pub fn count(&self, outcome: PairOutcome) -> u64 {
        self.outcomes[outcome.index()]
    }

    fn record(&mut self, pair: &ResolvedPair) {
        self.pairs += 1;
        self.outcomes[pair.outcome.index()] += 1;
        if pair.circular {
            self.circular += 1;
        }
        if pair.mates.iter().any(|m| m.rescued) {
            self.rescued += 1;
        }
    }

    pub fn log(&self) {
        log::info!("resolved {} read pairs", self.pairs);
        for outcome in PairOutcome::ALL {
            log::info!("  {:<18} {}", outcome.to_string(), self.count(outcome));
        }
        if self.circular > 0 {
            log::info!("  circular corrections {}", self.circular);
        }
        if self.rescued > 0 {
            log::info!("  rescued mates {}", self.rescued);
        }
    }
}

pub struct FragmentResolver<'g> {
    cfg: &'g PairConfig,
    strategy: PairingStrategy,
    circular: CircularReferences,
    table: QualityTable,
    rest_of_genome: f64,
    rescuer: Option<OrphanRescuer<'g>>,
    summary: PairSummary,
}

impl<'g> FragmentResolver<'g> {
    /// `genome` 只在开启救援时使用
    pub fn new(
        cfg: &'g PairConfig,
        strategy: PairingStrategy,
        circular: CircularReferences,
        genome: Option<&'g GenomeIndex>,
    ) -> Result<Self> {
        cfg.validate()?;
        let mut genome_size = circular.sizes().total_bases();
        if genome_size == 0 {
            genome_size = genome.map_or(0, GenomeIndex::total_len);
        }
        let rescuer = match (cfg.rescue, genome) {
            (true, Some(g)) => Some(OrphanRescuer::new(g, cfg.max_rescue_mismatches)),
            (true, None) => {
                log::warn!("orphan rescue requested without a reference genome; disabled");
                None
            }
            _ => None,
        };
        Ok(Self {
            cfg,
            strategy,
            circular,
            table: QualityTable::new(),
            rest_of_genome: rest_of_genome_correction(genome_size, cfg.seed_len),
            rescuer,
            summary: PairSummary::default(),
        })
    }

    pub fn strategy(&self) -> &PairingStrategy {
        &self.strategy
    }

    pub fn summary(&self) -> &PairSummary {
        &self.summary
    }

    pub fn resolve(&mut self, m1: &CasavaRead, m2: &CasavaRead) -> Result<ResolvedPair> {
        let s1 = score_read(&self.table, m1, self.rest_of_genome);
        let s2 = score_read(&self.table, m2, self.rest_of_genome);
        let pair = match self.strategy.clone() {
            PairingStrategy::Independent => self.independent(m1, m2, &s1, &s2),
            PairingStrategy::Paired { .. } if !m1.is_aligned() || !m2.is_aligned() => self.orphan(m1, m2, &s1, &s2)?,
            PairingStrategy::Paired { stats, models } => {
                let mut survivors = Vec::new();
                for (i, a) in m1.alignments.iter().enumerate() {
                    for (j, b) in m2.alignments.iter().enumerate() {
                        let Some(g) = self.circular.geometry(a, b) else {
                            continue;
                        };
                        if models.contains(&g.model) && stats.contains(g.fragment_len) {
                            survivors.push((i, j, s1.ln_pcorrect[i] + s2.ln_pcorrect[j], g));
                        }
                    }
                }
                if survivors.is_empty() {
                    self.independent(m1, m2, &s1, &s2)
                } else {
                    self.best_fragment(m1, m2, &s1, &s2, &survivors)
                }
            }
        };
        log::trace!("{} / {}: {}", m1.name, m2.name, pair.outcome);
        self.summary.record(&pair);
        Ok(pair)
    }

    fn best_fragment(
        &self,
        m1: &CasavaRead,
        m2: &CasavaRead,
        s1: &ReadScore,
        s2: &ReadScore,
        survivors: &[(usize, usize, f64, PairGeometry)],
    ) -> ResolvedPair {
        let best = (0..survivors.len())
            .max_by(|&a, &b| survivors[a].2.total_cmp(&survivors[b].2).then(b.cmp(&a)))
            .unwrap_or(0);
        let (i, j, ln, geometry) = survivors[best];
        let p_best = ln.exp();
        let rog_pair = self.rest_of_genome * self.rest_of_genome;
        let others = if survivors.len() == 1 {
            s1.unlisted * s2.probability(j) + s1.probability(i) * s2.unlisted + rog_pair
        } else {
            survivors.iter().enumerate().filter(|&(k, _)| k != best).map(|(_, s)| s.2.exp()).sum::<f64>() + rog_pair
        };
        let fragment_quality = alignment_quality_from_neighbors(p_best, others);
        if fragment_quality < self.cfg.min_fragment_quality {
            let mut pair = ResolvedPair::new(PairOutcome::Unresolved, Default::default());
            pair.fragment_quality = Some(fragment_quality);
            return pair;
        }
        let outcome = if survivors.len() == 1 { PairOutcome::ResolvedUnique } else { PairOutcome::ResolvedMultiple };
        let mates = [
            MateCall::aligned(&m1.alignments[i], s1.quality_of(i)),
            MateCall::aligned(&m2.alignments[j], s2.quality_of(j)),
        ];
        ResolvedPair {
            outcome,
            mates,
            fragment_quality: Some(fragment_quality),
            model: Some(geometry.model),
            circular: geometry.circular,
        }
    }

    /// 单端最佳比对，质量达到阈值才保留
    fn single_call(&self, read: &CasavaRead, score: &ReadScore) -> MateCall {
        match score.best {
            Some(b) if score.quality >= self.cfg.min_mate_quality => MateCall::aligned(&read.alignments[b], score.quality),
            _ => MateCall::default(),
        }
    }

    fn independent(&self, m1: &CasavaRead, m2: &CasavaRead, s1: &ReadScore, s2: &ReadScore) -> ResolvedPair {
        let mates = [self.single_call(m1, s1), self.single_call(m2, s2)];
        let outcome = match (mates[0].alignment.is_some(), mates[1].alignment.is_some()) {
            (true, true) => PairOutcome::Discordant,
            (false, false) => PairOutcome::BothUnaligned,
            _ => PairOutcome::SingleMate,
        };
        ResolvedPair::new(outcome, mates)
    }

    fn orphan(&mut self, m1: &CasavaRead, m2: &CasavaRead, s1: &ReadScore, s2: &ReadScore) -> Result<ResolvedPair> {
        let mut pair = self.independent(m1, m2, s1, s2);
        if pair.outcome != PairOutcome::SingleMate {
            return Ok(pair);
        }
        let PairingStrategy::Paired { stats, models } = &self.strategy else {
            return Ok(pair);
        };
        let Some(rescuer) = self.rescuer.as_mut() else {
            return Ok(pair);
        };
        let (anchor_mate, orphan) = if pair.mates[0].alignment.is_some() { (1u8, m2) } else { (2u8, m1) };
        let anchor_idx = anchor_mate as usize - 1;
        let Some(anchor) = pair.mates[anchor_idx].alignment.clone() else {
            return Ok(pair);
        };
        // QC 失败的 read 不参与救援
        if orphan.status == MatchStatus::QcFailed {
            return Ok(pair);
        }
        if let Some(found) = rescuer.rescue(&anchor, anchor_mate, orphan, models, stats)? {
            let (a1, a2) = if anchor_mate == 1 { (&anchor, &found) } else { (&found, &anchor) };
            let geometry = self.circular.geometry(a1, a2);
            let orphan_quality = pair.mates[anchor_idx].quality;
            pair.mates[1 - anchor_idx] = MateCall { alignment: Some(found), quality: orphan_quality, rescued: true };
            pair.outcome = PairOutcome::ResolvedUnique;
            pair.fragment_quality = orphan_quality;
            pair.model = geometry.map(|g| g.model);
            pair.circular = geometry.is_some_and(|g| g.circular);
        }
        Ok(pair)
    }

    /// 两个 mate 的 export 记录
    pub fn export_records(&self, pair: &ResolvedPair, m1: &CasavaRead, m2: &CasavaRead) -> [ExportRecord; 2] {
        let reads = [m1, m2];
        let make = |k: usize| {
            let read = reads[k];
            let call = &pair.mates[k];
            let partner = pair.mates[1 - k].alignment.as_ref();
            let alignment = call.alignment.as_ref();
            ExportRecord {
                name: parse_read_name(&read.name, k as u8 + 1),
                bases: read.bases.clone(),
                qualities: read.qualities.iter().map(|&q| q.saturating_add(self.cfg.quality_offset)).collect(),
                alignment: alignment.map(|a| ExportAlignment {
                    reference: a.reference.clone(),
                    contig: a.contig.clone(),
                    position: a.position,
                    reverse: a.reverse,
                    descriptor: a.descriptor.clone(),
                }),
                status: read.status.to_string(),
                read_quality: call.quality.filter(|_| alignment.is_some()),
                partner: match (alignment, partner) {
                    (Some(a), Some(p)) => Some(PartnerInfo {
                        reference: p.reference.clone(),
                        contig: p.contig.clone(),
                        fragment_offset: a.same_reference(p).then(|| p.position as i64 - a.position as i64),
                        reverse: p.reverse,
                    }),
                    _ => None,
                },
                fragment_quality: pair.fragment_quality.filter(|_| alignment.is_some() && partner.is_some()),
                passed_filter: read.status != MatchStatus::QcFailed,
            }
        };
        [make(0), make(1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::eland::ElandHit;
    use crate::io::genome_size::{ChromosomeSize, GenomeSizes};
    use crate::pair::insert::FragmentLengthStatistics;

    fn read(name: &str, status: MatchStatus, hits: &[(u32, bool)]) -> CasavaRead {
        let alignments = hits
            .iter()
            .map(|&(p, rev)| {
                CasavaAlignment::from_hit(&ElandHit {
                    reference: "chr".into(),
                    contig: None,
                    position: p,
                    reverse: rev,
                    descriptor: "50".into(),
                })
                .unwrap()
            })
            .collect();
        CasavaRead {
            name: name.into(),
            bases: vec![b'A'; 50],
            qualities: vec![30; 50],
            status,
            alignments,
            use_bases: vec![true; 50],
        }
    }

    fn refs() -> CircularReferences {
        CircularReferences::new(
            GenomeSizes {
                chromosomes: vec![ChromosomeSize {
                    file_name: "chr".into(),
                    contig_name: "chr".into(),
                    total_bases: 1_000_000,
                    is_circular: false,
                }],
            },
            Vec::new(),
        )
    }

    fn paired() -> PairingStrategy {
        PairingStrategy::Paired {
            stats: FragmentLengthStatistics { min: 250, median: 300, max: 350, low_std_dev: 15.0, high_std_dev: 15.0 },
            models: [AlignmentModel(0b010), AlignmentModel(0b110)],
        }
    }

    const UNIQUE: MatchStatus = MatchStatus::Counts([1, 0, 0]);

    #[test]
    fn unique_concordant_pair() {
        let cfg = PairConfig::default();
        let mut r = FragmentResolver::new(&cfg, paired(), refs(), None).unwrap();
        let m1 = read("p/1", UNIQUE, &[(1001, false)]);
        let m2 = read("p/2", UNIQUE, &[(1251, true)]);
        let pair = r.resolve(&m1, &m2).unwrap();
        assert_eq!(pair.outcome, PairOutcome::ResolvedUnique);
        assert!(pair.fragment_quality.unwrap() > 0);
        assert_eq!(pair.model.unwrap().to_string(), "1F2R");

        let [e1, e2] = r.export_records(&pair, &m1, &m2);
        assert_eq!(e1.partner.as_ref().unwrap().fragment_offset, Some(250));
        assert_eq!(e2.partner.as_ref().unwrap().fragment_offset, Some(-250));
        assert_eq!(r.summary().count(PairOutcome::ResolvedUnique), 1);
    }

    #[test]
    fn ambiguous_survivors_pick_best_and_lower_quality() {
        let cfg = PairConfig::default();
        let mut r = FragmentResolver::new(&cfg, paired(), refs(), None).unwrap();
        let m1 = read("p/1", MatchStatus::Counts([2, 0, 0]), &[(1001, false), (5001, false)]);
        let m2 = read("p/2", MatchStatus::Counts([2, 0, 0]), &[(1251, true), (5261, true)]);
        let pair = r.resolve(&m1, &m2).unwrap();
        assert_eq!(pair.outcome, PairOutcome::ResolvedMultiple);
        assert_eq!(pair.mates[0].alignment.as_ref().unwrap().position, 1001);
        assert_eq!(pair.fragment_quality, Some(3));

        let strict = PairConfig { min_fragment_quality: 10, ..PairConfig::default() };
        let mut r = FragmentResolver::new(&strict, paired(), refs(), None).unwrap();
        let pair = r.resolve(&m1, &m2).unwrap();
        assert_eq!(pair.outcome, PairOutcome::Unresolved);
        assert!(pair.mates.iter().all(|m| m.alignment.is_none()));
    }

    #[test]
    fn orphan_keeps_status_verbatim() {
        let cfg = PairConfig::default();
        let mut r = FragmentResolver::new(&cfg, paired(), refs(), None).unwrap();
        let m1 = read("p/1", UNIQUE, &[(1001, false)]);
        let m2 = read("p/2", MatchStatus::RepeatMasked, &[]);
        let pair = r.resolve(&m1, &m2).unwrap();
        assert_eq!(pair.outcome, PairOutcome::SingleMate);
        let [e1, e2] = r.export_records(&pair, &m1, &m2);
        assert!(e1.alignment.is_some() && e1.partner.is_none());
        assert!(e2.alignment.is_none());
        assert_eq!(e2.status, "RM");

        let picky = PairConfig { min_mate_quality: 300, ..PairConfig::default() };
        let mut r = FragmentResolver::new(&picky, paired(), refs(), None).unwrap();
        assert_eq!(r.resolve(&m1, &m2).unwrap().outcome, PairOutcome::BothUnaligned);
    }

    #[test]
    fn discordant_and_independent_strategies() {
        let cfg = PairConfig::default();
        let mut r = FragmentResolver::new(&cfg, paired(), refs(), None).unwrap();
        // 长度 5050，超出窗口
        let m1 = read("p/1", UNIQUE, &[(1001, false)]);
        let m2 = read("p/2", UNIQUE, &[(6001, true)]);
        let pair = r.resolve(&m1, &m2).unwrap();
        assert_eq!(pair.outcome, PairOutcome::Discordant);
        let [e1, _] = r.export_records(&pair, &m1, &m2);
        assert_eq!(e1.partner.unwrap().fragment_offset, Some(5000));
        assert_eq!(e1.fragment_quality, None);

        let mut ind = FragmentResolver::new(&cfg, PairingStrategy::Independent, refs(), None).unwrap();
        let close = read("p/2", UNIQUE, &[(1251, true)]);
        assert_eq!(ind.resolve(&m1, &close).unwrap().outcome, PairOutcome::Discordant);
        let none = read("p/2", MatchStatus::NoMatch, &[]);
        assert_eq!(ind.resolve(&m1, &none).unwrap().outcome, PairOutcome::SingleMate);
        assert_eq!(ind.summary().pairs, 2);
    }
}
