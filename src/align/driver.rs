//! 两级比对流程：单种子三遍扫描 → 收集未比对 read → 多种子三遍扫描 →
//! 合并候选 → 并回第一级结果。每一步由 [`AlignmentDriver::step`] 推进。

use std::collections::HashSet;
use std::io::Write;

use anyhow::Result;
use rayon::prelude::*;

use crate::align::descriptor;
use crate::align::extend::{ExtendedHit, Extender};
use crate::align::matches::{MatchStatus, MatchTable, UnmappedReads, SATURATED};
use crate::align::multiseed::SeedLayout;
use crate::align::scan::{GenomeScanner, MatchCache};
use crate::align::spill::SpillFile;
use crate::config::AlignConfig;
use crate::error::ElandError;
use crate::index::hash::PartitionedHashTable;
use crate::index::oligo::{Oligo, OligoNumber};
use crate::index::partition::{Direction, PartitionScheme, NUM_PASSES};
use crate::index::score::SuffixScoreTable;
use crate::index::squash::GenomeIndex;
use crate::io::eland::{self, ElandHit, ElandRecord};
use crate::io::reads::ReadRecord;
use crate::util::dna;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SingleSeed(u8),
    CollectUnmapped,
    MultiSeed(u8),
    BuildMultiTable,
    Merge,
    Done,
}

/// 一次运行的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignSummary {
    pub reads: usize,
    pub qc_failed: usize,
    pub repeat_masked: usize,
    pub no_match: usize,
    pub unique: usize,
    pub multiple: usize,
    pub rescued: usize,
}

pub struct AlignmentDriver<'a> {
    config: &'a AlignConfig,
    genome: &'a GenomeIndex,
    reads: Vec<ReadRecord>,
    read_len: usize,
    scheme: PartitionScheme,
    scores: SuffixScoreTable,
    pool: Option<rayon::ThreadPool>,
    stage: Stage,
    single: Option<MatchTable>,
    single_oligos: Vec<(Oligo, OligoNumber)>,
    unmapped: UnmappedReads,
    multi: Option<MatchTable>,
    multi_oligos: Vec<(Oligo, OligoNumber)>,
}

impl<'a> AlignmentDriver<'a> {
    /// 所有 read 必须等长且不短于种子长度（见 [`crate::io::reads::common_read_length`]）
    pub fn new(
        config: &'a AlignConfig,
        genome: &'a GenomeIndex,
        reads: Vec<ReadRecord>,
        repeats: Option<&HashSet<Vec<u8>>>,
    ) -> Result<Self> {
        config.validate()?;
        let l = config.oligo_len;
        let read_len = crate::io::reads::common_read_length(&reads, l)?.unwrap_or(l);
        let scheme = PartitionScheme::new(l);
        let scores = SuffixScoreTable::new(scheme.max_fragment_len());
        let pool = if config.threads > 1 {
            Some(rayon::ThreadPoolBuilder::new().num_threads(config.threads).build()?)
        } else {
            None
        };

        let (stage, single, single_oligos) = if reads.is_empty() {
            log::warn!("no reads to align; output will be empty");
            (Stage::Done, None, Vec::new())
        } else {
            let mut table = MatchTable::new(
                reads.len(),
                SeedLayout::single(read_len, l),
                config.max_matches,
                config.scratch_dir.as_deref(),
            )?;
            let oligos = Self::single_seed_oligos(config, &scheme, &reads, repeats, &mut table)?;
            (Stage::SingleSeed(0), Some(table), oligos)
        };

        Ok(Self {
            config,
            genome,
            reads,
            read_len,
            scheme,
            scores,
            pool,
            stage,
            single,
            single_oligos,
            unmapped: UnmappedReads::default(),
            multi: None,
            multi_oligos: Vec::new(),
        })
    }

    /// 每条 read 的第一个种子及其反向互补；N 过多的标为 QC，命中重复列表的标为 RM
    fn single_seed_oligos(
        config: &AlignConfig,
        scheme: &PartitionScheme,
        reads: &[ReadRecord],
        repeats: Option<&HashSet<Vec<u8>>>,
        table: &mut MatchTable,
    ) -> Result<Vec<(Oligo, OligoNumber)>> {
        let l = config.oligo_len;
        let mut oligos = Vec::with_capacity(reads.len() * 2);
        let (mut qc, mut rm) = (0usize, 0usize);
        for (i, read) in reads.iter().enumerate() {
            let seed = &read.bases[..l];
            let Some(o) = seed_oligo(config, scheme, &read.bases, 0) else {
                table.set_qc_failed(i);
                qc += 1;
                continue;
            };
            if repeats.is_some_and(|r| r.contains(seed) || r.contains(&dna::revcomp(seed))) {
                table.set_repeat_masked(i);
                rm += 1;
                continue;
            }
            if dna::count_ns(seed) > 0 {
                table.set_has_ns(i);
            }
            push_strands(&mut oligos, o, i as u32, 0, is_palindrome(&read.bases))?;
        }
        log::info!("{} reads of {} bases: {} QC failed, {} repeat masked", reads.len(), reads[0].bases.len(), qc, rm);
        Ok(oligos)
    }

    /// 未比对 read 的全部种子，按压缩下标编号
    fn multi_seed_oligos(&self, layout: &SeedLayout) -> Result<Vec<(Oligo, OligoNumber)>> {
        let mut oligos = Vec::with_capacity(self.unmapped.len() * layout.seeds * 2);
        for (compact, original) in self.unmapped.iter().enumerate() {
            let bases = &self.reads[original as usize].bases;
            let palindrome = is_palindrome(bases);
            for seed in 0..layout.seeds as u8 {
                if let Some(o) = seed_oligo(self.config, &self.scheme, bases, layout.offset(seed)) {
                    push_strands(&mut oligos, o, compact as u32, seed, palindrome)?;
                }
            }
        }
        Ok(oligos)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn unmapped(&self) -> &UnmappedReads {
        &self.unmapped
    }

    /// 建当前 pass 的两张表，按文件名顺序扫描全部参考文件
    fn run_pass(&self, mut table: MatchTable, oligos: &[(Oligo, OligoNumber)], pass: u8) -> Result<MatchTable> {
        let mut tables = Vec::with_capacity(2);
        for d in Direction::BOTH {
            tables.push(PartitionedHashTable::build(
                self.scheme.layout(pass, d),
                oligos,
                self.config.max_hash_bits,
                &mut table,
            ));
        }
        let scanner = GenomeScanner::new(&tables, &self.scores, self.config.oligo_len);
        let files = &self.genome.files;

        match &self.pool {
            None => {
                let mut cache = MatchCache::new(self.config.cache_size);
                for (i, f) in files.iter().enumerate() {
                    log::debug!("pass {}: scanning {}", pass, f.name);
                    let next = scanner.scan(&f.header, f.open_bases()?, f.first_block, &mut cache, &mut table)?;
                    if let Some(following) = files.get(i + 1) {
                        if following.first_block != next {
                            return Err(ElandError::Invariant(format!(
                                "block table out of step after '{}': expected {}, scanned up to {}",
                                f.name, following.first_block, next
                            ))
                            .into());
                        }
                    }
                }
                log::info!("pass {}: {} matches over {} files", pass, cache.flushed(), files.len());
            }
            Some(pool) => {
                let cache_size = self.config.cache_size;
                let scratch = self.config.scratch_dir.as_deref();
                let spills: Vec<SpillFile> = pool.install(|| {
                    files
                        .par_iter()
                        .map(|f| -> Result<SpillFile> {
                            log::debug!("pass {}: scanning {}", pass, f.name);
                            let mut cache = MatchCache::new(cache_size);
                            let mut spill = SpillFile::create(scratch)?;
                            scanner.scan(&f.header, f.open_bases()?, f.first_block, &mut cache, &mut spill)?;
                            Ok(spill)
                        })
                        .collect::<Result<Vec<_>>>()
                })?;
                // 按文件顺序并入，命中到达顺序与单线程扫描相同
                let mut total = 0u64;
                for spill in spills {
                    total += table.absorb(spill, cache_size)?;
                }
                log::info!("pass {}: {} matches over {} files", pass, total, files.len());
            }
        }
        Ok(table)
    }

    /// 推进一步，返回新的阶段
    pub fn step(&mut self) -> Result<Stage> {
        let missing = || ElandError::Invariant("match table missing for the current stage".to_string());
        self.stage = match self.stage {
            Stage::SingleSeed(pass) => {
                let table = self.single.take().ok_or_else(missing)?;
                log::info!("single-seed pass {}: {} oligos", pass, self.single_oligos.len());
                self.single = Some(self.run_pass(table, &self.single_oligos, pass)?);
                if pass + 1 < NUM_PASSES {
                    Stage::SingleSeed(pass + 1)
                } else {
                    Stage::CollectUnmapped
                }
            }
            Stage::CollectUnmapped => {
                let table = self.single.as_mut().ok_or_else(missing)?;
                table.resolve_same_as();
                self.unmapped = table.get_unmapped_reads(self.config.sensitive);
                log::info!(
                    "single-seed tier done: {} records kept, {} reads left for multi-seed rescue",
                    table.spilled_records(),
                    self.unmapped.len()
                );
                table.build_hit_list()?;
                self.single_oligos = Vec::new();

                let layout = SeedLayout::multi(self.read_len, self.config.oligo_len);
                if self.config.single_seed_only || layout.seeds < 2 || self.unmapped.is_empty() {
                    log::info!("multi-seed tier skipped");
                    Stage::Done
                } else {
                    self.multi_oligos = self.multi_seed_oligos(&layout)?;
                    self.multi = Some(MatchTable::new(
                        self.unmapped.len(),
                        layout,
                        self.config.max_matches,
                        self.config.scratch_dir.as_deref(),
                    )?);
                    Stage::MultiSeed(0)
                }
            }
            Stage::MultiSeed(pass) => {
                let table = self.multi.take().ok_or_else(missing)?;
                log::info!("multi-seed pass {}: {} oligos", pass, self.multi_oligos.len());
                self.multi = Some(self.run_pass(table, &self.multi_oligos, pass)?);
                if pass + 1 < NUM_PASSES {
                    Stage::MultiSeed(pass + 1)
                } else {
                    Stage::BuildMultiTable
                }
            }
            Stage::BuildMultiTable => {
                let table = self.multi.as_mut().ok_or_else(missing)?;
                table.build_match_table(self.config.seed_deviation, self.config.max_multi_hits)?;
                self.multi_oligos = Vec::new();
                Stage::Merge
            }
            Stage::Merge => {
                let source = self.multi.take().ok_or_else(missing)?;
                let target = self.single.as_mut().ok_or_else(missing)?;
                if !target.merge_table(source, &self.unmapped)? {
                    log::warn!("multi-seed tier produced no match list; keeping single-seed results");
                }
                Stage::Done
            }
            Stage::Done => Stage::Done,
        };
        Ok(self.stage)
    }

    pub fn run(&mut self) -> Result<()> {
        while self.stage != Stage::Done {
            self.step()?;
        }
        Ok(())
    }

    /// 延伸全部候选并按 (文件, contig, 位置) 排序去重
    fn extended_hits(&self, extender: &mut Extender<'_>, table: &MatchTable, read: usize) -> Result<Vec<ExtendedHit>> {
        let Some(list) = table.hits() else {
            return Ok(Vec::new());
        };
        let bases = &self.reads[read].bases;
        let mut reverse_bases: Option<Vec<u8>> = None;
        let mut out = Vec::new();
        for hit in list.get(read) {
            let oriented: &[u8] = if hit.reverse {
                reverse_bases.get_or_insert_with(|| dna::revcomp(bases)).as_slice()
            } else {
                bases.as_slice()
            };
            if let Some(e) = extender.extend(oriented, hit)? {
                out.push(e);
            }
        }
        out.sort_by_key(|e| (e.locus.file, e.locus.contig, e.locus.position, e.reverse));
        out.dedup_by_key(|e| (e.locus.file, e.locus.contig, e.locus.position, e.reverse));
        Ok(out)
    }

    fn to_eland_hit(&self, e: &ExtendedHit) -> ElandHit {
        let file = &self.genome.files[e.locus.file];
        let contig = (file.header.contigs.len() > 1).then(|| file.header.contigs[e.locus.contig].name.clone());
        ElandHit {
            reference: file.name.clone(),
            contig,
            position: e.locus.position + 1,
            reverse: e.reverse,
            descriptor: descriptor::format(&e.ops),
        }
    }

    /// 按输入顺序输出 ELAND 扩展格式
    pub fn write_eland_extended<W: Write>(&self, out: &mut W) -> Result<AlignSummary> {
        let mut summary = AlignSummary { reads: self.reads.len(), ..AlignSummary::default() };
        let Some(table) = self.single.as_ref() else {
            out.flush()?;
            return Ok(summary);
        };
        if self.stage != Stage::Done {
            return Err(ElandError::Invariant(format!("alignment not finished (at {:?})", self.stage)).into());
        }
        let mut extender = Extender::new(self.genome, self.config.oligo_len, self.config.max_ungapped_mismatches);
        for (i, read) in self.reads.iter().enumerate() {
            let mut status = table.read_descriptor(i).status();
            let rescued = self.unmapped.compact_index(i as u32).is_some();
            let hits = if status.is_aligned() {
                let extended = self.extended_hits(&mut extender, table, i)?;
                if rescued && !extended.is_empty() {
                    status = rescued_status(&extended, table.truncated(i));
                }
                extended.iter().map(|e| self.to_eland_hit(e)).collect()
            } else {
                Vec::new()
            };
            match status {
                MatchStatus::QcFailed => summary.qc_failed += 1,
                MatchStatus::RepeatMasked => summary.repeat_masked += 1,
                MatchStatus::NoMatch => summary.no_match += 1,
                MatchStatus::Counts(_) => match status.best_class_neighbors() {
                    Some((_, 0)) => summary.unique += 1,
                    _ => summary.multiple += 1,
                },
            }
            if rescued && status.is_aligned() {
                summary.rescued += 1;
            }
            eland::write_record(
                out,
                &ElandRecord { name: read.name.clone(), bases: read.bases.clone(), status, hits },
            )?;
        }
        out.flush()?;
        log::info!(
            "{} reads: {} unique, {} multiple, {} no match, {} QC, {} RM ({} rescued by multi-seed tier)",
            summary.reads,
            summary.unique,
            summary.multiple,
            summary.no_match,
            summary.qc_failed,
            summary.repeat_masked,
            summary.rescued
        );
        Ok(summary)
    }
}

/// 多种子救回的 read 按整条 read 的编辑数归类，两处及以上计入最后一类；
/// 截断掉的并列候选计入最佳一类
fn rescued_status(hits: &[ExtendedHit], truncated: u32) -> MatchStatus {
    let mut r = [0u32; 3];
    for h in hits {
        r[(h.mismatches as usize).min(2)] += 1;
    }
    if let Some(best) = r.iter().position(|&n| n > 0) {
        r[best] += truncated;
    }
    MatchStatus::Counts(r.map(|n| n.min(SATURATED as u32) as u8))
}

/// 从 `offset` 起编码一个种子。read 两端的 N 串在种子内改为通配；
/// 内部 N 超过 `max_ns`，或两端 N 超出首尾片段时返回 `None`
fn seed_oligo(config: &AlignConfig, scheme: &PartitionScheme, bases: &[u8], offset: usize) -> Option<Oligo> {
    let l = config.oligo_len;
    let (leading, trailing) = dna::end_n_runs(bases);
    let lead = leading.saturating_sub(offset).min(l);
    let trail = (offset + l + trailing).saturating_sub(bases.len()).min(l);
    if !scheme.tolerates_end_ns(lead, trail) {
        return None;
    }
    let (o, _) = Oligo::encode(&bases[offset..offset + l]);
    let o = o.with_wildcard_ends(lead, trail);
    (o.n_count() <= config.max_ns as usize).then_some(o)
}

/// read 与自身反向互补相同时，两条链的比对完全重合
fn is_palindrome(bases: &[u8]) -> bool {
    bases.iter().zip(bases.iter().rev()).all(|(&a, &b)| dna::to_code(a).is_some() && a == dna::complement(b))
}

/// 正链 oligo 及其反向互补；回文 read 只登记正链
fn push_strands(
    oligos: &mut Vec<(Oligo, OligoNumber)>,
    o: Oligo,
    read: u32,
    seed: u8,
    palindrome: bool,
) -> Result<()> {
    oligos.push((o, OligoNumber::new(read, false, seed)?));
    if !palindrome {
        oligos.push((o.reverse_complement(), OligoNumber::new(read, true, seed)?));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::squash::tests::write_reference;
    use crate::io::eland::ElandReader;
    use std::io::Cursor;

    fn random_seq(len: usize, mut state: u64) -> Vec<u8> {
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                b"ACGT"[(state >> 62) as usize]
            })
            .collect()
    }

    fn read(name: &str, bases: &[u8]) -> ReadRecord {
        ReadRecord { name: name.to_string(), bases: bases.to_vec(), qualities: None }
    }

    fn align(genome_seq: &[u8], reads: Vec<ReadRecord>, config: &AlignConfig) -> Vec<ElandRecord> {
        let dir = tempfile::tempdir().unwrap();
        write_reference(dir.path(), "chr1", &[("chr1", genome_seq)]);
        let genome = GenomeIndex::open(dir.path()).unwrap();
        let mut driver = AlignmentDriver::new(config, &genome, reads, None).unwrap();
        driver.run().unwrap();
        let mut out = Vec::new();
        driver.write_eland_extended(&mut out).unwrap();
        ElandReader::new(Cursor::new(out)).collect::<Result<_>>().unwrap()
    }

    #[test]
    fn single_seed_forward_reverse_and_qc() {
        let genome = random_seq(600, 21);
        let fwd = genome[100..132].to_vec();
        let mut rev = dna::revcomp(&genome[300..332]);
        rev[7] = if rev[7] == b'A' { b'C' } else { b'A' };
        let qc = b"ACGTNACGTNACGTNACGTACGTACGTACGTA".to_vec();
        let config = AlignConfig::default();
        let recs = align(&genome, vec![read("f", &fwd), read("r", &rev), read("q", &qc)], &config);

        assert_eq!(recs[0].status.to_string(), "1:0:0");
        assert_eq!(eland::format_hit_list(&recs[0].hits), "chr1:101F32");

        assert_eq!(recs[1].status.to_string(), "0:1:0");
        assert_eq!(recs[1].hits.len(), 1);
        assert_eq!(recs[1].hits[0].position, 301);
        assert!(recs[1].hits[0].reverse);
        // 反向命中的描述串按参考正链方向书写，错配在从左数第 24 位
        assert_eq!(recs[1].hits[0].descriptor, format!("24{}7", genome[324] as char));

        assert_eq!(recs[2].status.to_string(), "QC");
        assert!(recs[2].hits.is_empty());
    }

    #[test]
    fn end_ns_shorten_the_exact_match() {
        let genome = random_seq(600, 29);
        let mut tail = genome[100..132].to_vec();
        tail[29..].copy_from_slice(b"NNN");
        let mut head = genome[200..232].to_vec();
        head[..2].copy_from_slice(b"NN");
        let mut both = genome[400..432].to_vec();
        both[0] = b'N';
        both[31] = b'N';
        let long_run = [&b"NNNNNNNNN"[..], &genome[9..32]].concat();
        let recs = align(
            &genome,
            vec![read("t", &tail), read("h", &head), read("b", &both), read("l", &long_run)],
            &AlignConfig::default(),
        );

        assert_eq!(recs[0].status.to_string(), "1:0:0");
        assert_eq!(recs[0].hits.len(), 1);
        assert_eq!(recs[0].hits[0].position, 101);
        assert!(!recs[0].hits[0].reverse);
        // N 位置照常写出参考碱基
        assert_eq!(recs[0].hits[0].descriptor, format!("29{}", String::from_utf8_lossy(&genome[129..132])));

        assert_eq!(recs[1].status.to_string(), "1:0:0");
        assert_eq!(recs[1].hits[0].position, 201);
        assert_eq!(recs[1].hits[0].descriptor, format!("{}30", String::from_utf8_lossy(&genome[200..202])));

        assert_eq!(recs[2].status.to_string(), "1:0:0");
        assert_eq!(recs[2].hits[0].position, 401);

        assert_eq!(recs[3].status.to_string(), "QC");
    }

    #[test]
    fn palindromic_read_reported_once() {
        let mut genome = random_seq(400, 31);
        let half = random_seq(16, 37);
        let pal = [&half[..], &dna::revcomp(&half)[..]].concat();
        genome[100..132].copy_from_slice(&pal);
        let config = AlignConfig { single_seed_only: true, ..AlignConfig::default() };
        let recs = align(&genome, vec![read("p", &pal), read("q", &pal)], &config);
        for rec in &recs {
            assert_eq!(rec.status.to_string(), "1:0:0");
            assert_eq!(eland::format_hit_list(&rec.hits), "chr1:101F32");
        }
        assert!(is_palindrome(&pal));
        assert!(!is_palindrome(&genome[..32]));
    }

    #[test]
    fn stages_advance_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let genome_seq = random_seq(500, 5);
        write_reference(dir.path(), "chr1", &[("chr1", &genome_seq[..])]);
        let genome = GenomeIndex::open(dir.path()).unwrap();
        let config = AlignConfig { oligo_len: 16, ..AlignConfig::default() };
        // 第一个种子带 3 个错配，只能靠后续种子救回
        let mut r = genome_seq[200..264].to_vec();
        for k in [1usize, 6, 12] {
            r[k] = if r[k] == b'T' { b'G' } else { b'T' };
        }
        let mut driver = AlignmentDriver::new(&config, &genome, vec![read("m", &r)], None).unwrap();
        let mut seen = vec![driver.stage()];
        while driver.stage() != Stage::Done {
            seen.push(driver.step().unwrap());
        }
        assert_eq!(
            seen,
            vec![
                Stage::SingleSeed(0),
                Stage::SingleSeed(1),
                Stage::SingleSeed(2),
                Stage::CollectUnmapped,
                Stage::MultiSeed(0),
                Stage::MultiSeed(1),
                Stage::MultiSeed(2),
                Stage::BuildMultiTable,
                Stage::Merge,
                Stage::Done
            ]
        );
        assert_eq!(driver.unmapped().len(), 1);
        let mut out = Vec::new();
        let summary = driver.write_eland_extended(&mut out).unwrap();
        assert_eq!(summary.rescued, 1);
        let rec = ElandReader::new(Cursor::new(out)).next_record().unwrap().unwrap();
        // 种子 1..3 无错，但整条 read 有 3 处错配
        assert_eq!(rec.status.to_string(), "0:0:1");
        assert_eq!(rec.hits.len(), 1);
        assert_eq!(rec.hits[0].position, 201);
        let ops = descriptor::parse(&rec.hits[0].descriptor).unwrap();
        assert_eq!(descriptor::read_mismatch_offsets(&ops), vec![1, 6, 12]);
    }

    #[test]
    fn rescued_status_counts_full_read_edits() {
        let hit = |position: u32, mismatches: u32| ExtendedHit {
            locus: crate::index::squash::Locus { file: 0, contig: 0, position },
            reverse: false,
            ops: Vec::new(),
            mismatches,
            gapped: false,
        };
        assert_eq!(rescued_status(&[hit(5, 3)], 0), MatchStatus::Counts([0, 0, 1]));
        assert_eq!(rescued_status(&[hit(5, 1), hit(90, 4)], 2), MatchStatus::Counts([0, 3, 1]));
        assert_eq!(rescued_status(&[hit(5, 0)], 400), MatchStatus::Counts([SATURATED, 0, 0]));
    }

    #[test]
    fn single_seed_only_and_empty_input() {
        let genome = random_seq(300, 9);
        let config = AlignConfig { oligo_len: 16, single_seed_only: true, ..AlignConfig::default() };
        let mut r = genome[50..82].to_vec();
        for k in [0usize, 4, 9] {
            r[k] = if r[k] == b'C' { b'A' } else { b'C' };
        }
        let recs = align(&genome, vec![read("x", &r)], &config);
        assert_eq!(recs[0].status.to_string(), "NM");
        assert_eq!(eland::format_hit_list(&recs[0].hits), "-");

        assert!(align(&genome, Vec::new(), &config).is_empty());
    }

    #[test]
    fn duplicate_reads_share_results() {
        let genome = random_seq(400, 13);
        let r = genome[10..42].to_vec();
        let recs = align(&genome, vec![read("a", &r), read("b", &r), read("c", &r)], &AlignConfig::default());
        for rec in &recs {
            assert_eq!(rec.status.to_string(), "1:0:0");
            assert_eq!(eland::format_hit_list(&rec.hits), "chr1:11F32");
        }
    }

    #[test]
    fn threaded_over_cap_seeds_match_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let unit = random_seq(64, 41);
        for (k, name) in ["chrA", "chrB", "chrC"].iter().enumerate() {
            let mut seq = Vec::new();
            for copy in 0..5u64 {
                seq.extend(random_seq(40, 100 + 10 * k as u64 + copy));
                seq.extend_from_slice(&unit);
            }
            write_reference(dir.path(), name, &[(*name, &seq[..])]);
        }
        let genome = GenomeIndex::open(dir.path()).unwrap();
        // 每个种子 15 处精确命中，超过上限 10，落盘的只有前 10 条
        let reads = vec![read("u", &unit)];
        let mut outputs = Vec::new();
        for threads in [1usize, 4, 4] {
            let config = AlignConfig { oligo_len: 16, threads, ..AlignConfig::default() };
            let mut driver = AlignmentDriver::new(&config, &genome, reads.clone(), None).unwrap();
            driver.run().unwrap();
            assert_eq!(driver.unmapped().len(), 1);
            let mut out = Vec::new();
            driver.write_eland_extended(&mut out).unwrap();
            outputs.push(String::from_utf8(out).unwrap());
        }
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[0], outputs[2]);
        assert!(outputs[0].contains("chrA:41F64"), "{}", outputs[0]);
    }

    #[test]
    fn threaded_scan_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let a = random_seq(300, 17);
        let b = random_seq(300, 19);
        write_reference(dir.path(), "chrA", &[("chrA", &a[..])]);
        write_reference(dir.path(), "chrB", &[("chrB", &b[..])]);
        let genome = GenomeIndex::open(dir.path()).unwrap();
        let reads = vec![read("a", &a[20..52]), read("b", &b[220..252])];
        let mut outputs = Vec::new();
        for threads in [1usize, 3] {
            let config = AlignConfig { threads, ..AlignConfig::default() };
            let mut driver = AlignmentDriver::new(&config, &genome, reads.clone(), None).unwrap();
            driver.run().unwrap();
            let mut out = Vec::new();
            driver.write_eland_extended(&mut out).unwrap();
            outputs.push(String::from_utf8(out).unwrap());
        }
        assert_eq!(outputs[0], outputs[1]);
        assert!(outputs[0].contains("chrB:221F32"));
    }
}
