/// 2-bit 编码：A=0, C=1, G=2, T=3；其它字符（N 等）为 0xFF。
pub static CODE_LUT: [u8; 256] = {
    const X: u8 = 0xFF;
    let mut t = [X; 256];
    t[b'A' as usize] = 0;
    t[b'a' as usize] = 0;
    t[b'C' as usize] = 1;
    t[b'c' as usize] = 1;
    t[b'G' as usize] = 2;
    t[b'g' as usize] = 2;
    t[b'T' as usize] = 3;
    t[b't' as usize] = 3;
    t[b'U' as usize] = 3;
    t[b'u' as usize] = 3;
    t
};

pub const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

#[inline]
pub fn to_code(b: u8) -> Option<u8> {
    let v = CODE_LUT[b as usize];
    if v <= 3 { Some(v) } else { None }
}

#[inline]
pub fn from_code(c: u8) -> u8 {
    BASES[(c & 3) as usize]
}

pub fn normalize_seq(seq: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(seq.len());
    for &b in seq {
        let up = b.to_ascii_uppercase();
        let nb = match up {
            b'A' | b'C' | b'G' | b'T' | b'N' => up,
            b'U' => b'T',
            _ => b'N',
        };
        out.push(nb);
    }
    out
}

#[inline]
pub fn complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' | b'U' => b'A',
        _ => b'N',
    }
}

pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(seq.len());
    for &b in seq.iter().rev() {
        out.push(complement(b));
    }
    out
}

pub fn count_ns(seq: &[u8]) -> usize {
    seq.iter().filter(|&&b| to_code(b).is_none()).count()
}

/// 首尾 N 串的长度；全为 N 时整串算作首部
pub fn end_n_runs(seq: &[u8]) -> (usize, usize) {
    let leading = seq.iter().take_while(|&&b| to_code(b).is_none()).count();
    let trailing = seq[leading..].iter().rev().take_while(|&&b| to_code(b).is_none()).count();
    (leading, trailing)
}
