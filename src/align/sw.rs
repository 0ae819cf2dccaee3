use crate::align::descriptor::EditOp;
use crate::util::dna;

const NEG_INF: i32 = i32::MIN / 4;

#[derive(Clone, Copy, Debug)]
pub struct SwParams {
    pub match_score: i32,
    pub mismatch_penalty: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
    /// 允许偏离参考窗口对角线的碱基数
    pub band_width: usize,
}

impl Default for SwParams {
    fn default() -> Self {
        Self { match_score: 1, mismatch_penalty: 4, gap_open: 6, gap_extend: 1, band_width: 8 }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct SwResult {
    pub score: i32,
    /// 比对在参考窗口中的 [ref_start, ref_end)
    pub ref_start: usize,
    pub ref_end: usize,
    pub ops: Vec<EditOp>,
    /// 错配 + 插入碱基 + 缺失碱基
    pub nm: u32,
}

/// 带状仿射间隙 glocal 对齐：read 必须完整比对，参考窗口两端不计罚分
pub fn glocal_sw(query: &[u8], reference: &[u8], p: SwParams) -> Option<SwResult> {
    glocal_sw_with_buf(query, reference, p, &mut SwBuffer::new())
}

/// DP 工作缓冲区，可跨调用复用
pub struct SwBuffer {
    h: Vec<i32>,
    e: Vec<i32>,
    f: Vec<i32>,
}

impl SwBuffer {
    pub fn new() -> Self {
        Self { h: Vec::new(), e: Vec::new(), f: Vec::new() }
    }

    fn reset(&mut self, size: usize) {
        for v in [&mut self.h, &mut self.e, &mut self.f] {
            v.clear();
            v.resize(size, NEG_INF);
        }
    }
}

impl Default for SwBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn is_match(q: u8, r: u8) -> bool {
    q == r && dna::to_code(q).is_some()
}

#[inline]
fn subst(q: u8, r: u8, p: &SwParams) -> i32 {
    if is_match(q, r) {
        p.match_score
    } else {
        -p.mismatch_penalty
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    H,
    E,
    F,
}

pub fn glocal_sw_with_buf(query: &[u8], reference: &[u8], p: SwParams, buf: &mut SwBuffer) -> Option<SwResult> {
    let m = query.len();
    let n = reference.len();
    if m == 0 || n == 0 {
        return None;
    }

    let cols = n + 1;
    buf.reset((m + 1) * cols);
    let (h, e, f) = (&mut buf.h, &mut buf.e, &mut buf.f);

    // 参考窗口起点自由
    h[..=n].fill(0);
    for i in 1..=m {
        let ins = -(p.gap_open + p.gap_extend * i as i32);
        h[i * cols] = ins;
        e[i * cols] = ins;
    }

    let band = p.band_width as isize;
    let slack = n as isize - m as isize;
    for i in 1..=m {
        let i_isize = i as isize;
        let j_start = (i_isize - band).max(1) as usize;
        let j_end = (i_isize + slack.max(0) + band).min(n as isize) as usize;
        for j in j_start..=j_end {
            let idx = i * cols + j;
            let up_idx = (i - 1) * cols + j;
            let left_idx = i * cols + (j - 1);
            let diag_idx = (i - 1) * cols + (j - 1);

            e[idx] = (h[up_idx] - p.gap_open - p.gap_extend).max(e[up_idx] - p.gap_extend);
            f[idx] = (h[left_idx] - p.gap_open - p.gap_extend).max(f[left_idx] - p.gap_extend);
            h[idx] = (h[diag_idx] + subst(query[i - 1], reference[j - 1], &p)).max(e[idx]).max(f[idx]);
        }
    }

    // read 末端必须落在最后一行，参考终点自由
    let last = m * cols;
    let (best_j, best_score) = (1..=n).map(|j| (j, h[last + j])).max_by_key(|&(j, s)| (s, std::cmp::Reverse(j)))?;
    if best_score <= NEG_INF / 2 {
        return None;
    }

    let mut trace: Vec<char> = Vec::new();
    let (mut i, mut j) = (m, best_j);
    let mut state = State::H;
    while i > 0 {
        if j == 0 {
            trace.extend(std::iter::repeat('I').take(i));
            break;
        }
        let idx = i * cols + j;
        match state {
            State::H => {
                let diag = h[(i - 1) * cols + (j - 1)] + subst(query[i - 1], reference[j - 1], &p);
                if h[idx] == diag {
                    trace.push('M');
                    i -= 1;
                    j -= 1;
                } else if h[idx] == e[idx] {
                    state = State::E;
                } else if h[idx] == f[idx] {
                    state = State::F;
                } else {
                    return None;
                }
            }
            State::E => {
                trace.push('I');
                if e[idx] == h[(i - 1) * cols + j] - p.gap_open - p.gap_extend {
                    state = State::H;
                }
                i -= 1;
            }
            State::F => {
                trace.push('D');
                if f[idx] == h[i * cols + j - 1] - p.gap_open - p.gap_extend {
                    state = State::H;
                }
                j -= 1;
            }
        }
    }
    trace.reverse();

    let ref_start = j;
    let (ops, nm) = trace_to_ops(&trace, query, &reference[ref_start..]);
    Some(SwResult { score: best_score, ref_start, ref_end: best_j, ops, nm })
}

fn trace_to_ops(trace: &[char], query: &[u8], reference: &[u8]) -> (Vec<EditOp>, u32) {
    let mut ops: Vec<EditOp> = Vec::new();
    let mut nm = 0u32;
    let (mut qi, mut rj) = (0usize, 0usize);
    for &t in trace {
        match t {
            'M' => {
                if is_match(query[qi], reference[rj]) {
                    match ops.last_mut() {
                        Some(EditOp::Match(n)) => *n += 1,
                        _ => ops.push(EditOp::Match(1)),
                    }
                } else {
                    ops.push(EditOp::Mismatch(reference[rj].to_ascii_uppercase()));
                    nm += 1;
                }
                qi += 1;
                rj += 1;
            }
            'I' => {
                match ops.last_mut() {
                    Some(EditOp::Insertion(n)) => *n += 1,
                    _ => ops.push(EditOp::Insertion(1)),
                }
                nm += 1;
                qi += 1;
            }
            _ => {
                match ops.last_mut() {
                    Some(EditOp::Deletion(b)) => b.push(reference[rj].to_ascii_uppercase()),
                    _ => ops.push(EditOp::Deletion(vec![reference[rj].to_ascii_uppercase()])),
                }
                nm += 1;
                rj += 1;
            }
        }
    }
    (ops, nm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::descriptor::format;

    #[test]
    fn sw_perfect_match_inside_window() {
        let res = glocal_sw(b"ACGTTGCA", b"GGGACGTTGCAGGG", SwParams::default()).unwrap();
        assert_eq!(res.score, 8);
        assert_eq!(res.ref_start, 3);
        assert_eq!(res.ref_end, 11);
        assert_eq!(format(&res.ops), "8");
        assert_eq!(res.nm, 0);
    }

    #[test]
    fn sw_single_mismatch() {
        let res = glocal_sw(b"ACGATGCATTGA", b"ACGTTGCATTGA", SwParams::default()).unwrap();
        assert_eq!(format(&res.ops), "3T8");
        assert_eq!(res.nm, 1);
    }

    #[test]
    fn sw_deletion_from_read() {
        let r = b"TTACGTACGGATCCAGTCAGGCATTT";
        let q = b"ACGTACGGATAGTCAGGCA"; // 缺失 "CC"
        let res = glocal_sw(q, r, SwParams::default()).unwrap();
        assert_eq!(format(&res.ops), "10^CC$9");
        assert_eq!(res.nm, 2);
        assert_eq!(res.ref_start, 2);
    }

    #[test]
    fn sw_insertion_in_read() {
        let r = b"ACGTACGGATCCAGTCAGGCA";
        let q = b"ACGTACGGATCCTTAGTCAGGCA";
        let res = glocal_sw(q, r, SwParams::default()).unwrap();
        assert_eq!(crate::align::descriptor::read_len(&res.ops), q.len());
        assert_eq!(res.nm, 2);
        assert!(format(&res.ops).contains("^2$"));
    }

    #[test]
    fn sw_empty_inputs() {
        assert!(glocal_sw(b"", b"ACGT", SwParams::default()).is_none());
        assert!(glocal_sw(b"ACGT", b"", SwParams::default()).is_none());
    }

    #[test]
    fn sw_buffer_reuse() {
        let mut buf = SwBuffer::new();
        let r1 = glocal_sw_with_buf(b"ACGT", b"ACGT", SwParams::default(), &mut buf).unwrap();
        assert_eq!(r1.score, 4);
        let r2 = glocal_sw_with_buf(b"AGGTAC", b"ACGTAC", SwParams::default(), &mut buf).unwrap();
        assert_eq!(r2.nm, 1);
    }
}
