//! 每个 oligo 的匹配簿记：错误等级计数、重复 oligo 链接、命中记录溢写与回放。

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;

use crate::align::multiseed::{MultiSeedStateMachine, SeedLayout};
use crate::align::spill::SpillFile;
use crate::error::ElandError;
use crate::index::hash::RepeatLinks;
use crate::index::oligo::OligoNumber;
use crate::index::record::{ErrorInfo, MatchPosition, MatchRecord};

pub const SATURATED: u8 = u8::MAX;

const BEST_MASK: u8 = 0b0000_0011;
const REVERSE_FLAG: u8 = 0b0000_0100;
const QC_FLAG: u8 = 0b0000_1000;
const RM_FLAG: u8 = 0b0001_0000;
const N_FLAG: u8 = 0b0010_0000;

/// 每个 oligo 的匹配摘要。
///
/// `error_type` 低 2 位为"最佳错配数 + 1"（0 表示尚无命中），其余位为最佳命中的
/// 方向以及 QC / RM / 含 N 标志；`r[e]` 是 e 错配命中的个数，在 255 处饱和。
/// 扫描期间只会单调改进或累加。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchDescriptor {
    pub error_type: u8,
    pub r: [u8; 3],
}

impl MatchDescriptor {
    /// 记一次命中，返回该错误等级更新后的计数
    #[inline]
    pub fn record(&mut self, errors: u8, reverse: bool) -> u8 {
        let e = errors.min(2) as usize;
        self.r[e] = self.r[e].saturating_add(1);
        if self.best_errors().map_or(true, |b| (e as u8) < b) {
            self.error_type = (self.error_type & !(BEST_MASK | REVERSE_FLAG))
                | (e as u8 + 1)
                | if reverse { REVERSE_FLAG } else { 0 };
        }
        self.r[e]
    }

    pub fn best_errors(&self) -> Option<u8> {
        match self.error_type & BEST_MASK {
            0 => None,
            b => Some(b - 1),
        }
    }

    pub fn is_reverse(&self) -> bool {
        self.error_type & REVERSE_FLAG != 0
    }

    pub fn is_qc_failed(&self) -> bool {
        self.error_type & QC_FLAG != 0
    }

    pub fn is_repeat_masked(&self) -> bool {
        self.error_type & RM_FLAG != 0
    }

    pub fn has_ns(&self) -> bool {
        self.error_type & N_FLAG != 0
    }

    pub fn mark_qc_failed(&mut self) {
        self.error_type |= QC_FLAG;
    }

    pub fn mark_repeat_masked(&mut self) {
        self.error_type |= RM_FLAG;
    }

    pub fn mark_ns(&mut self) {
        self.error_type |= N_FLAG;
    }

    pub fn is_saturated(&self) -> bool {
        self.r.iter().any(|&n| n == SATURATED)
    }

    pub fn total(&self) -> u32 {
        self.r.iter().map(|&n| n as u32).sum()
    }

    /// 逐类取最大计数，最佳错配取较小者
    pub fn merge(&mut self, other: &MatchDescriptor) {
        for e in 0..3 {
            self.r[e] = self.r[e].max(other.r[e]);
        }
        if let Some(b) = other.best_errors() {
            if self.best_errors().map_or(true, |own| b < own) {
                self.error_type = (self.error_type & !(BEST_MASK | REVERSE_FLAG)) | (other.error_type & (BEST_MASK | REVERSE_FLAG));
            }
        }
        self.error_type |= other.error_type & (QC_FLAG | RM_FLAG | N_FLAG);
    }

    /// 每个错误等级要么为空、要么超出上限时需要多种子救援；
    /// 非 sensitive 模式下计数已饱和的 read 视为真实重复，不再救援
    pub fn needs_rescue(&self, caps: &[u32; 3], sensitive: bool) -> bool {
        if self.is_qc_failed() || self.is_repeat_masked() {
            return false;
        }
        let unresolved = (0..3).all(|e| self.r[e] == 0 || self.r[e] as u32 > caps[e]);
        unresolved && (sensitive || !self.is_saturated())
    }

    pub fn status(&self) -> MatchStatus {
        if self.is_qc_failed() {
            MatchStatus::QcFailed
        } else if self.is_repeat_masked() {
            MatchStatus::RepeatMasked
        } else if self.total() == 0 {
            MatchStatus::NoMatch
        } else {
            MatchStatus::Counts(self.r)
        }
    }
}

/// ELAND 扩展格式的第三列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    NoMatch,
    QcFailed,
    RepeatMasked,
    Counts([u8; 3]),
}

impl MatchStatus {
    pub fn is_aligned(&self) -> bool {
        matches!(self, MatchStatus::Counts(_))
    }

    /// 与最佳命中同等级的其它位置数（不含自身）
    pub fn best_class_neighbors(&self) -> Option<(u8, u32)> {
        match self {
            MatchStatus::Counts(r) => (0..3).find(|&e| r[e] > 0).map(|e| (e as u8, r[e] as u32 - 1)),
            _ => None,
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::NoMatch => f.write_str("NM"),
            MatchStatus::QcFailed => f.write_str("QC"),
            MatchStatus::RepeatMasked => f.write_str("RM"),
            MatchStatus::Counts(r) => write!(f, "{}:{}:{}", r[0], r[1], r[2]),
        }
    }
}

impl FromStr for MatchStatus {
    type Err = ElandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NM" => Ok(MatchStatus::NoMatch),
            "QC" => Ok(MatchStatus::QcFailed),
            "RM" => Ok(MatchStatus::RepeatMasked),
            _ => {
                let parts: Vec<&str> = s.split(':').collect();
                if parts.len() != 3 {
                    return Err(ElandError::format("match status", s));
                }
                let mut r = [0u8; 3];
                for (slot, p) in r.iter_mut().zip(&parts) {
                    // 计数在输出时已饱和于 255
                    let n: u32 = p.parse().map_err(|_| ElandError::format("match status", s))?;
                    *slot = n.min(SATURATED as u32) as u8;
                }
                Ok(MatchStatus::Counts(r))
            }
        }
    }
}

/// 合并后的整条 read 候选
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiMatch {
    /// read 在参考正链上的最左位置
    pub position: MatchPosition,
    pub reverse: bool,
    /// 种子内的错配数
    pub errors: u8,
    /// 支持该候选的种子位图；单种子阶段恒为 1
    pub seeds: u8,
    /// 单种子命中的错配明细，多种子候选为空
    pub scan_errors: ErrorInfo,
}

/// 按 read 分组的候选（CSR 布局）
#[derive(Debug, Clone, Default)]
pub struct HitList {
    offsets: Vec<u32>,
    hits: Vec<MultiMatch>,
}

impl HitList {
    fn from_groups(groups: Vec<Vec<MultiMatch>>) -> Self {
        let mut offsets = Vec::with_capacity(groups.len() + 1);
        let mut hits = Vec::with_capacity(groups.iter().map(Vec::len).sum());
        offsets.push(0u32);
        for g in groups {
            hits.extend(g);
            offsets.push(hits.len() as u32);
        }
        Self { offsets, hits }
    }

    pub fn get(&self, read: usize) -> &[MultiMatch] {
        match (self.offsets.get(read), self.offsets.get(read + 1)) {
            (Some(&s), Some(&e)) => &self.hits[s as usize..e as usize],
            _ => &[],
        }
    }

    pub fn num_reads(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// 单种子阶段之后仍需救援的 read：压缩下标 → 原始下标
#[derive(Debug, Clone, Default)]
pub struct UnmappedReads {
    original: Vec<u32>,
}

impl UnmappedReads {
    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    pub fn original(&self, compact: usize) -> u32 {
        self.original[compact]
    }

    pub fn compact_index(&self, original: u32) -> Option<usize> {
        self.original.binary_search(&original).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.original.iter().copied()
    }
}

/// 扫描命中的接收端
pub trait MatchSink {
    fn add_matches(&mut self, records: &[MatchRecord]) -> Result<()>;
}

/// 多线程扫描时每个参考文件先写入自己的溢写文件
impl MatchSink for SpillFile {
    fn add_matches(&mut self, records: &[MatchRecord]) -> Result<()> {
        records.iter().try_for_each(|r| self.push(r))
    }
}

pub struct MatchTable {
    num_reads: usize,
    layout: SeedLayout,
    caps: [u32; 3],
    descriptors: Vec<MatchDescriptor>,
    first_hit: Vec<MatchPosition>,
    same_as: HashMap<u32, u32>,
    spill: Option<SpillFile>,
    hits: Option<HitList>,
    summaries: Vec<MatchDescriptor>,
    /// 多种子阶段因 `max_hits` 截断、未列出的并列候选数
    truncated: Vec<u32>,
}

impl MatchTable {
    pub fn new(num_reads: usize, layout: SeedLayout, caps: [u32; 3], scratch: Option<&Path>) -> Result<Self> {
        let slots = num_reads * layout.seeds;
        Ok(Self {
            num_reads,
            layout,
            caps,
            descriptors: vec![MatchDescriptor::default(); slots],
            first_hit: vec![MatchPosition::NO_MATCH; slots],
            same_as: HashMap::new(),
            spill: Some(SpillFile::create(scratch)?),
            hits: None,
            summaries: Vec::new(),
            truncated: Vec::new(),
        })
    }

    pub fn num_reads(&self) -> usize {
        self.num_reads
    }

    pub fn layout(&self) -> &SeedLayout {
        &self.layout
    }

    #[inline]
    fn slot(&self, oligo: OligoNumber) -> usize {
        oligo.read_index() as usize * self.layout.seeds + oligo.seed() as usize
    }

    fn read_slots(&self, read: usize) -> std::ops::Range<usize> {
        read * self.layout.seeds..(read + 1) * self.layout.seeds
    }

    pub fn descriptor(&self, read: usize, seed: u8) -> &MatchDescriptor {
        &self.descriptors[read * self.layout.seeds + seed as usize]
    }

    /// 首个命中位置，或 QC / RM / same-as / 无匹配哨兵
    pub fn first_hit(&self, read: usize, seed: u8) -> MatchPosition {
        self.first_hit[read * self.layout.seeds + seed as usize]
    }

    pub fn set_qc_failed(&mut self, read: usize) {
        for s in self.read_slots(read) {
            self.descriptors[s].mark_qc_failed();
            self.first_hit[s] = MatchPosition::QC_FAILED;
        }
    }

    pub fn set_repeat_masked(&mut self, read: usize) {
        for s in self.read_slots(read) {
            self.descriptors[s].mark_repeat_masked();
            self.first_hit[s] = MatchPosition::REPEAT_MASKED;
        }
    }

    pub fn set_has_ns(&mut self, read: usize) {
        for s in self.read_slots(read) {
            self.descriptors[s].mark_ns();
        }
    }

    pub fn spilled_records(&self) -> u64 {
        self.spill.as_ref().map_or(0, SpillFile::len)
    }

    /// same-as 链接的代表 slot
    fn representative(&self, mut slot: u32) -> u32 {
        // 代表总是编号最小的 oligo，链不会成环；步数上限只防御坏数据
        for _ in 0..8 {
            match self.same_as.get(&slot) {
                Some(&rep) if rep != slot => slot = rep,
                _ => break,
            }
        }
        slot
    }

    /// 重复 oligo 继承代表的匹配摘要
    pub fn resolve_same_as(&mut self) {
        let links: Vec<(u32, u32)> = self.same_as.keys().map(|&d| (d, self.representative(d))).collect();
        for (dup, rep) in links {
            let flags = self.descriptors[dup as usize].error_type & (QC_FLAG | RM_FLAG | N_FLAG);
            let mut d = self.descriptors[rep as usize];
            d.error_type = (d.error_type & (BEST_MASK | REVERSE_FLAG)) | flags;
            self.descriptors[dup as usize] = d;
        }
    }

    /// 非 sensitive 模式下，计数饱和的 read 不参与救援
    pub fn get_unmapped_reads(&self, sensitive: bool) -> UnmappedReads {
        let original = (0..self.num_reads)
            .filter(|&read| {
                self.read_slots(read)
                    .all(|s| self.descriptors[s].needs_rescue(&self.caps, sensitive))
            })
            .map(|read| read as u32)
            .collect();
        UnmappedReads { original }
    }

    #[inline]
    fn persisted(&self, slot: usize, over_cap_classes: bool) -> usize {
        let d = &self.descriptors[slot];
        (0..3)
            .map(|e| {
                let n = d.r[e] as u32;
                if n <= self.caps[e] {
                    n
                } else if over_cap_classes {
                    self.caps[e]
                } else {
                    0
                }
            })
            .sum::<u32>() as usize
    }

    /// 按写入顺序并入一个参考文件的全部命中，返回记录数。
    /// 各文件按名字顺序依次并入时，计数与落盘上限的取舍和单线程扫描完全一致
    pub fn absorb(&mut self, spill: SpillFile, batch: usize) -> Result<u64> {
        let total = spill.len();
        let mut buf = Vec::with_capacity(batch.max(1));
        for rec in spill.into_reader()? {
            buf.push(rec?);
            if buf.len() >= batch.max(1) {
                self.add_matches(&buf)?;
                buf.clear();
            }
        }
        self.add_matches(&buf)?;
        Ok(total)
    }

    /// 回放溢写文件，按 slot 分组；重复 oligo 得到代表记录的副本
    fn replay_by_slot(&mut self, over_cap_classes: bool) -> Result<Vec<Vec<MatchRecord>>> {
        let spill = self
            .spill
            .take()
            .ok_or_else(|| ElandError::Invariant("match records already replayed".to_string()))?;
        self.resolve_same_as();
        let mut dups: HashMap<u32, Vec<u32>> = HashMap::new();
        for &d in self.same_as.keys() {
            dups.entry(self.representative(d)).or_default().push(d);
        }
        let mut groups: Vec<Vec<MatchRecord>> = (0..self.descriptors.len())
            .map(|s| Vec::with_capacity(self.persisted(s, over_cap_classes)))
            .collect();
        for rec in spill.into_reader()? {
            let rec = rec?;
            let slot = self.slot(rec.oligo);
            let e = rec.errors.count() as usize;
            if !over_cap_classes && self.descriptors[slot].r[e] as u32 > self.caps[e] {
                continue;
            }
            groups[slot].push(rec);
            if let Some(ds) = dups.get(&(slot as u32)) {
                for &d in ds {
                    let oligo = rec.oligo.with_read_index(d / self.layout.seeds as u32);
                    groups[d as usize].push(MatchRecord { oligo, ..rec });
                }
            }
        }
        Ok(groups)
    }

    /// 单种子阶段：只保留未超出上限的错误等级
    pub fn build_hit_list(&mut self) -> Result<()> {
        let groups = self.replay_by_slot(false)?;
        let layout = self.layout;
        let per_read: Vec<Vec<MultiMatch>> = groups
            .into_iter()
            .map(|g| {
                let mut hits: Vec<MultiMatch> = g
                    .iter()
                    .filter_map(|rec| {
                        let start = layout.read_start(rec.position.global(), rec.oligo.seed(), rec.oligo.is_reverse())?;
                        Some(MultiMatch {
                            position: MatchPosition::from_global(start),
                            reverse: rec.oligo.is_reverse(),
                            errors: rec.errors.count(),
                            seeds: 1,
                            scan_errors: rec.errors,
                        })
                    })
                    .collect();
                hits.sort_unstable_by_key(|h| (h.position, h.reverse));
                hits.dedup_by_key(|h| (h.position, h.reverse));
                hits
            })
            .collect();
        self.summaries = self.descriptors.clone();
        self.hits = Some(HitList::from_groups(per_read));
        Ok(())
    }

    /// 多种子阶段：逐 read 回放全部种子命中并交给状态机合并
    pub fn build_match_table(&mut self, seed_deviation: u32, max_hits: usize) -> Result<()> {
        let groups = self.replay_by_slot(true)?;
        let mut machine = MultiSeedStateMachine::new(self.layout, seed_deviation);
        let mut per_read = Vec::with_capacity(self.num_reads);
        let mut summaries = Vec::with_capacity(self.num_reads);
        let mut truncated = Vec::with_capacity(self.num_reads);
        for read in 0..self.num_reads {
            machine.reset();
            let mut summary = MatchDescriptor::default();
            for s in self.read_slots(read) {
                summary.error_type |= self.descriptors[s].error_type & (QC_FLAG | RM_FLAG | N_FLAG);
                for rec in &groups[s] {
                    machine.insert_seed_hit(rec);
                }
            }
            let (hits, total) = machine.get_hits(max_hits);
            for h in &hits {
                summary.record(h.errors, h.reverse);
            }
            // 截断掉的并列候选仍计入最佳等级
            if let Some(first) = hits.first() {
                for _ in hits.len()..total {
                    summary.record(first.errors, first.reverse);
                }
            }
            summaries.push(summary);
            truncated.push((total - hits.len()) as u32);
            per_read.push(
                hits.into_iter()
                    .map(|h| MultiMatch {
                        position: MatchPosition::from_global(h.start),
                        reverse: h.reverse,
                        errors: h.errors,
                        seeds: h.support,
                        scan_errors: ErrorInfo::default(),
                    })
                    .collect(),
            );
        }
        self.summaries = summaries;
        self.truncated = truncated;
        self.hits = Some(HitList::from_groups(per_read));
        Ok(())
    }

    /// 该 read 在多种子阶段被截断的并列候选数
    pub fn truncated(&self, read: usize) -> u32 {
        self.truncated.get(read).copied().unwrap_or(0)
    }

    pub fn hits(&self) -> Option<&HitList> {
        self.hits.as_ref()
    }

    /// 整条 read 的匹配摘要（需先构建命中列表）
    pub fn read_descriptor(&self, read: usize) -> MatchDescriptor {
        self.summaries.get(read).copied().unwrap_or_default()
    }

    /// 把第二阶段的结果并回本表；来源表没有命中列表时返回 false
    pub fn merge_table(&mut self, source: MatchTable, unmapped: &UnmappedReads) -> Result<bool> {
        let Some(extra) = source.hits.as_ref() else {
            return Ok(false);
        };
        if extra.num_reads() != unmapped.len() {
            return Err(ElandError::Invariant(format!(
                "second-tier table covers {} reads, {} were selected",
                extra.num_reads(),
                unmapped.len()
            ))
            .into());
        }
        let own = self
            .hits
            .take()
            .ok_or_else(|| ElandError::Invariant("first-tier hit list not built".to_string()))?;
        let mut per_read = Vec::with_capacity(self.num_reads);
        for read in 0..self.num_reads {
            let mut hits = own.get(read).to_vec();
            if let Some(u) = unmapped.compact_index(read as u32) {
                for h in extra.get(u) {
                    match hits.iter_mut().find(|x| x.position == h.position && x.reverse == h.reverse) {
                        Some(x) => x.errors = x.errors.min(h.errors),
                        None => hits.push(*h),
                    }
                }
                self.summaries[read].merge(&source.summaries[u]);
                if self.truncated.len() < self.num_reads {
                    self.truncated.resize(self.num_reads, 0);
                }
                self.truncated[read] = source.truncated(u);
            }
            per_read.push(hits);
        }
        self.hits = Some(HitList::from_groups(per_read));
        Ok(true)
    }
}

impl MatchSink for MatchTable {
    /// 计数无条件更新；只有未超出该等级上限的记录才写入溢写文件
    fn add_matches(&mut self, records: &[MatchRecord]) -> Result<()> {
        for rec in records {
            let slot = self.slot(rec.oligo);
            if slot >= self.descriptors.len() {
                return Err(ElandError::Invariant(format!(
                    "oligo {} outside match table of {} slots",
                    rec.oligo.0,
                    self.descriptors.len()
                ))
                .into());
            }
            let e = rec.errors.count();
            let n = self.descriptors[slot].record(e, rec.oligo.is_reverse());
            if self.first_hit[slot] == MatchPosition::NO_MATCH {
                self.first_hit[slot] = rec.position;
            }
            if n as u32 <= self.caps[e as usize] {
                let spill = self
                    .spill
                    .as_mut()
                    .ok_or_else(|| ElandError::Invariant("match added after replay".to_string()))?;
                spill.push(rec)?;
            }
        }
        Ok(())
    }
}

impl RepeatLinks for MatchTable {
    fn set_same_as(&mut self, duplicate: OligoNumber, representative: OligoNumber) {
        let (d, r) = (self.slot(duplicate), self.slot(representative));
        if d != r {
            self.same_as.insert(d as u32, r as u32);
            self.first_hit[d] = MatchPosition::SAME_AS;
        }
    }
}
