//! 8 种 mate 排列/方向模型，以及片段长度（含环状参考的跨原点修正）。

use std::fmt;

use crate::io::genome_size::GenomeSizes;
use crate::pair::read::CasavaAlignment;

pub const NUM_MODELS: usize = 8;

/// bit 0：左侧 read 为反向；bit 1：右侧 read 为反向；bit 2：左侧 read 为 mate 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlignmentModel(pub u8);

impl AlignmentModel {
    pub fn new(left_reverse: bool, right_reverse: bool, mate2_left: bool) -> Self {
        Self(left_reverse as u8 | (right_reverse as u8) << 1 | (mate2_left as u8) << 2)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn left_reverse(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn right_reverse(self) -> bool {
        self.0 & 2 != 0
    }

    pub fn mate2_left(self) -> bool {
        self.0 & 4 != 0
    }

    /// mate 1 / mate 2 各自的方向
    pub fn mate_strands(self) -> (bool, bool) {
        if self.mate2_left() {
            (self.right_reverse(), self.left_reverse())
        } else {
            (self.left_reverse(), self.right_reverse())
        }
    }

    pub fn all() -> impl Iterator<Item = AlignmentModel> {
        (0..NUM_MODELS as u8).map(AlignmentModel)
    }
}

impl fmt::Display for AlignmentModel {
    /// 例如 `1F2R`：左侧为正向的 mate 1，右侧为反向的 mate 2
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (l, r) = if self.mate2_left() { ('2', '1') } else { ('1', '2') };
        let s = |rev: bool| if rev { 'R' } else { 'F' };
        write!(f, "{}{}{}{}", l, s(self.left_reverse()), r, s(self.right_reverse()))
    }
}

/// 一对比对的几何关系
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairGeometry {
    pub model: AlignmentModel,
    /// 最左起点到最右终点（含）的长度
    pub fragment_len: u32,
    /// 使用了跨原点修正
    pub circular: bool,
}

fn geometry(s1: i64, e1: i64, r1: bool, s2: i64, e2: i64, r2: bool) -> (AlignmentModel, i64) {
    // 起点相同时 mate 1 视为左侧
    let mate2_left = (s2, e2) < (s1, e1);
    let (left_rev, right_rev) = if mate2_left { (r2, r1) } else { (r1, r2) };
    let len = e1.max(e2) - s1.min(s2) + 1;
    (AlignmentModel::new(left_rev, right_rev, mate2_left), len)
}

/// 两个 mate 必须落在同一参考上；`circular_len` 为环状参考的长度。
///
/// 环状参考上跨度超过一半长度时，认为片段跨越了原点：把较右的 mate 平移一个参考长度后重算。
pub fn pair_geometry(m1: &CasavaAlignment, m2: &CasavaAlignment, circular_len: Option<u64>) -> Option<PairGeometry> {
    if !m1.same_reference(m2) {
        return None;
    }
    let (s1, e1) = (m1.position as i64, m1.end() as i64);
    let (s2, e2) = (m2.position as i64, m2.end() as i64);
    let (model, len) = geometry(s1, e1, m1.reverse, s2, e2, m2.reverse);
    if let Some(ref_len) = circular_len {
        let ref_len = ref_len as i64;
        if ref_len > 0 && len > ref_len / 2 {
            let (cs1, ce1, cs2, ce2) = if s1 > s2 {
                (s1 - ref_len, e1 - ref_len, s2, e2)
            } else {
                (s1, e1, s2 - ref_len, e2 - ref_len)
            };
            let (cmodel, clen) = geometry(cs1, ce1, m1.reverse, cs2, ce2, m2.reverse);
            if clen > 0 && clen < len {
                return Some(PairGeometry { model: cmodel, fragment_len: clen as u32, circular: true });
            }
        }
    }
    Some(PairGeometry { model, fragment_len: len.max(0) as u32, circular: false })
}

/// 环状参考的判定：命令行列出的名字，或 genome size 文件中 `isCircular` 的条目
#[derive(Debug, Clone, Default)]
pub struct CircularReferences {
    sizes: GenomeSizes,
    names: Vec<String>,
}

impl CircularReferences {
    pub fn new(sizes: GenomeSizes, names: Vec<String>) -> Self {
        Self { sizes, names }
    }

    pub fn sizes(&self) -> &GenomeSizes {
        &self.sizes
    }

    /// 环状参考的长度；线性参考或长度未知时为 None
    pub fn length(&self, a: &CasavaAlignment) -> Option<u64> {
        let contig = a.contig.as_deref();
        let named = |n: &str| self.names.iter().any(|c| c == n);
        let circular = named(&a.reference)
            || contig.is_some_and(named)
            || self.sizes.is_circular(&a.reference)
            || contig.is_some_and(|c| self.sizes.is_circular(c));
        if !circular {
            return None;
        }
        self.sizes.length_of(&a.reference, contig)
    }

    pub fn geometry(&self, m1: &CasavaAlignment, m2: &CasavaAlignment) -> Option<PairGeometry> {
        pair_geometry(m1, m2, self.length(m1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::descriptor::EditOp;

    fn aln(pos: u32, reverse: bool, len: usize) -> CasavaAlignment {
        CasavaAlignment {
            reference: "chr".into(),
            contig: None,
            position: pos,
            reverse,
            descriptor: len.to_string(),
            ops: vec![EditOp::Match(len)],
        }
    }

    #[test]
    fn fr_pairs_in_both_orders() {
        let g = pair_geometry(&aln(100, false, 50), &aln(350, true, 50), None).unwrap();
        assert_eq!(g.fragment_len, 300);
        assert_eq!(g.model.to_string(), "1F2R");
        assert_eq!(g.model.mate_strands(), (false, true));

        let g = pair_geometry(&aln(350, true, 50), &aln(100, false, 50), None).unwrap();
        assert_eq!(g.fragment_len, 300);
        assert_eq!(g.model.to_string(), "2F1R");
        assert_eq!(g.model.mate_strands(), (true, false));
        assert!(!g.circular);
    }

    #[test]
    fn different_references_have_no_geometry() {
        let mut other = aln(10, true, 50);
        other.reference = "chr2".into();
        assert!(pair_geometry(&aln(100, false, 50), &other, None).is_none());
    }

    #[test]
    fn circular_wrap_around() {
        // 长 1000 的环状参考：mate 2 在原点之前的 951..1000，mate 1 在 101..150
        let m1 = aln(101, true, 50);
        let m2 = aln(951, false, 50);
        let naive = pair_geometry(&m1, &m2, None).unwrap();
        assert_eq!(naive.fragment_len, 900);
        let g = pair_geometry(&m1, &m2, Some(1000)).unwrap();
        assert!(g.circular);
        assert_eq!(g.fragment_len, 200);
        assert_eq!(g.model.to_string(), "2F1R");
    }

    #[test]
    fn circular_names_come_from_cli_or_sizes() {
        use crate::io::genome_size::ChromosomeSize;
        let sizes = GenomeSizes {
            chromosomes: vec![
                ChromosomeSize { file_name: "chr".into(), contig_name: "chr".into(), total_bases: 1000, is_circular: false },
                ChromosomeSize { file_name: "chrM".into(), contig_name: "chrM".into(), total_bases: 500, is_circular: true },
            ],
        };
        let linear = CircularReferences::new(sizes.clone(), Vec::new());
        assert_eq!(linear.length(&aln(1, false, 10)), None);
        let mut m = aln(1, false, 10);
        m.reference = "chrM".into();
        assert_eq!(linear.length(&m), Some(500));
        let named = CircularReferences::new(sizes, vec!["chr".into()]);
        assert_eq!(named.length(&aln(1, false, 10)), Some(1000));
        let g = named.geometry(&aln(101, true, 50), &aln(951, false, 50)).unwrap();
        assert!(g.circular);
    }

    #[test]
    fn models_are_distinct() {
        let names: std::collections::HashSet<String> = AlignmentModel::all().map(|m| m.to_string()).collect();
        assert_eq!(names.len(), NUM_MODELS);
    }
}
