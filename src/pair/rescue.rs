//! 孤儿 mate 救援：另一端可信比对时，在期望的片段窗口内用 glocal DP 重新寻找未比对的 mate。

use anyhow::Result;

use crate::align::descriptor;
use crate::align::sw::{glocal_sw_with_buf, SwBuffer, SwParams};
use crate::index::squash::{GenomeIndex, SquashReader};
use crate::pair::insert::FragmentLengthStatistics;
use crate::pair::model::{pair_geometry, AlignmentModel};
use crate::pair::read::{CasavaAlignment, CasavaRead};
use crate::util::dna;

pub struct OrphanRescuer<'g> {
    genome: &'g GenomeIndex,
    reader: SquashReader<'g>,
    params: SwParams,
    buf: SwBuffer,
    max_mismatches: u32,
}

impl<'g> OrphanRescuer<'g> {
    pub fn new(genome: &'g GenomeIndex, max_mismatches: u32) -> Self {
        Self {
            genome,
            reader: SquashReader::new(genome),
            params: SwParams::default(),
            buf: SwBuffer::new(),
            max_mismatches,
        }
    }

    /// (文件下标, contig 文件内起点, contig 长度)
    fn find_contig(&self, a: &CasavaAlignment) -> Option<(usize, u64, u64)> {
        let file = self.genome.files.iter().position(|f| f.name == a.reference)?;
        let contigs = &self.genome.files[file].header.contigs;
        let contig = match &a.contig {
            Some(name) => contigs.iter().find(|c| &c.name == name)?,
            None if contigs.len() == 1 => &contigs[0],
            None => return None,
        };
        Some((file, contig.offset as u64, contig.len as u64))
    }

    /// `anchor_mate` 为锚定端的 mate 编号（1 或 2）。返回错配最少的救援比对。
    pub fn rescue(
        &mut self,
        anchor: &CasavaAlignment,
        anchor_mate: u8,
        orphan: &CasavaRead,
        models: &[AlignmentModel; 2],
        stats: &FragmentLengthStatistics,
    ) -> Result<Option<CasavaAlignment>> {
        let Some((file, contig_start, contig_len)) = self.find_contig(anchor) else {
            return Ok(None);
        };
        let read_len = orphan.bases.len() as u64;
        if read_len == 0 || stats.max == 0 {
            return Ok(None);
        }
        let max = stats.max as u64;
        let mut best: Option<CasavaAlignment> = None;
        for (k, &model) in models.iter().enumerate() {
            if k == 1 && model == models[0] {
                continue;
            }
            let anchor_left = (anchor_mate == 2) == model.mate2_left();
            let (anchor_rev, orphan_rev) = if anchor_left {
                (model.left_reverse(), model.right_reverse())
            } else {
                (model.right_reverse(), model.left_reverse())
            };
            if anchor_rev != anchor.reverse {
                continue;
            }

            // 1-based 闭区间窗口
            let (win_start, win_end) = if anchor_left {
                (anchor.position as u64, anchor.position as u64 + max - 1)
            } else {
                let end = anchor.end() as u64;
                ((end + 1).saturating_sub(max).max(1), end)
            };
            let win_end = win_end.min(contig_len);
            if win_end < win_start || win_end - win_start + 1 < read_len {
                continue;
            }
            let window = self.reader.fetch(file, contig_start + win_start - 1, (win_end - win_start + 1) as usize)?;
            let query = if orphan_rev { dna::revcomp(&orphan.bases) } else { orphan.bases.clone() };
            let Some(res) = glocal_sw_with_buf(&query, &window, self.params, &mut self.buf) else {
                continue;
            };
            if res.nm > self.max_mismatches {
                continue;
            }
            let candidate = CasavaAlignment {
                reference: anchor.reference.clone(),
                contig: anchor.contig.clone(),
                position: (win_start + res.ref_start as u64) as u32,
                reverse: orphan_rev,
                descriptor: descriptor::format(&res.ops),
                ops: res.ops,
            };
            let (m1, m2) = if anchor_mate == 1 { (anchor, &candidate) } else { (&candidate, anchor) };
            let fits = pair_geometry(m1, m2, None).is_some_and(|g| g.model == model && stats.contains(g.fragment_len));
            if !fits {
                continue;
            }
            log::trace!(
                "rescued {} at {}:{}{} ({} edits)",
                orphan.name,
                candidate.reference,
                candidate.position,
                if orphan_rev { 'R' } else { 'F' },
                res.nm
            );
            if best.as_ref().map_or(true, |b| candidate.mismatches() < b.mismatches()) {
                best = Some(candidate);
            }
        }
        Ok(best)
    }
}
