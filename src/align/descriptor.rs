//! ELAND 匹配描述串（edit script）的构造与解析。
//!
//! 语法：数字为连续匹配的长度；字母为该位置上的参考碱基（错配）；
//! `^ACG$` 表示 read 相对参考缺失了这些参考碱基，`^2$` 表示 read 多出 2 个碱基。
//! 位置一律按参考正链方向计。

use std::fmt::Write as _;

use anyhow::Result;

use crate::error::ElandError;
use crate::util::dna;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    Match(usize),
    /// 参考碱基（ASCII）
    Mismatch(u8),
    /// read 中缺失的参考碱基
    Deletion(Vec<u8>),
    /// read 中多出的碱基数
    Insertion(usize),
}

pub fn format(ops: &[EditOp]) -> String {
    let mut s = String::new();
    for op in ops {
        match op {
            EditOp::Match(0) => {}
            EditOp::Match(n) => {
                let _ = write!(&mut s, "{}", n);
            }
            EditOp::Mismatch(b) => s.push(*b as char),
            EditOp::Deletion(bases) => {
                s.push('^');
                s.push_str(&String::from_utf8_lossy(bases));
                s.push('$');
            }
            EditOp::Insertion(n) => {
                let _ = write!(&mut s, "^{}$", n);
            }
        }
    }
    s
}

pub fn parse(descriptor: &str) -> Result<Vec<EditOp>> {
    let bad = || ElandError::format("match descriptor", descriptor);
    let bytes = descriptor.as_bytes();
    let mut ops = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_digit() {
            let mut n = 0usize;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                n = n
                    .checked_mul(10)
                    .and_then(|n| n.checked_add((bytes[i] - b'0') as usize))
                    .ok_or_else(bad)?;
                i += 1;
            }
            ops.push(EditOp::Match(n));
        } else if c == b'^' {
            let end = bytes[i + 1..].iter().position(|&b| b == b'$').ok_or_else(bad)? + i + 1;
            let inner = &bytes[i + 1..end];
            if inner.is_empty() {
                return Err(bad().into());
            }
            if inner.iter().all(u8::is_ascii_digit) {
                let n: usize = std::str::from_utf8(inner).map_err(|_| bad())?.parse().map_err(|_| bad())?;
                ops.push(EditOp::Insertion(n));
            } else if inner.iter().all(|b| b.is_ascii_alphabetic()) {
                ops.push(EditOp::Deletion(inner.to_ascii_uppercase()));
            } else {
                return Err(bad().into());
            }
            i = end + 1;
        } else if c.is_ascii_alphabetic() {
            ops.push(EditOp::Mismatch(c.to_ascii_uppercase()));
            i += 1;
        } else {
            return Err(bad().into());
        }
    }
    Ok(ops)
}

/// 错配与插入碱基在 read（参考正链方向）中的偏移
pub fn read_mismatch_offsets(ops: &[EditOp]) -> Vec<usize> {
    let mut out = Vec::new();
    let mut q = 0usize;
    for op in ops {
        match op {
            EditOp::Match(n) => q += n,
            EditOp::Mismatch(_) => {
                out.push(q);
                q += 1;
            }
            EditOp::Insertion(n) => {
                out.extend(q..q + n);
                q += n;
            }
            EditOp::Deletion(_) => {}
        }
    }
    out
}

pub fn read_len(ops: &[EditOp]) -> usize {
    ops.iter()
        .map(|op| match op {
            EditOp::Match(n) | EditOp::Insertion(n) => *n,
            EditOp::Mismatch(_) => 1,
            EditOp::Deletion(_) => 0,
        })
        .fold(0usize, usize::saturating_add)
}

pub fn ref_len(ops: &[EditOp]) -> usize {
    ops.iter()
        .map(|op| match op {
            EditOp::Match(n) => *n,
            EditOp::Mismatch(_) => 1,
            EditOp::Deletion(b) => b.len(),
            EditOp::Insertion(_) => 0,
        })
        .fold(0usize, usize::saturating_add)
}

/// 等长比较；read 或参考上的 N 都算错配
pub fn ungapped(read: &[u8], reference: &[u8]) -> (Vec<EditOp>, u32) {
    debug_assert_eq!(read.len(), reference.len());
    let mut ops = Vec::new();
    let mut run = 0usize;
    let mut mismatches = 0u32;
    for (&q, &r) in read.iter().zip(reference) {
        let (q, r) = (q.to_ascii_uppercase(), r.to_ascii_uppercase());
        if q == r && dna::to_code(q).is_some() {
            run += 1;
        } else {
            if run > 0 {
                ops.push(EditOp::Match(run));
                run = 0;
            }
            ops.push(EditOp::Mismatch(r));
            mismatches += 1;
        }
    }
    if run > 0 {
        ops.push(EditOp::Match(run));
    }
    (ops, mismatches)
}

/// 由扫描阶段记录的错配（偏移, 参考碱基编码）直接构造
pub fn from_mismatches(len: usize, mismatches: &[(usize, u8)]) -> Vec<EditOp> {
    let mut ops = Vec::new();
    let mut at = 0usize;
    for &(offset, code) in mismatches {
        if offset > at {
            ops.push(EditOp::Match(offset - at));
        }
        ops.push(EditOp::Mismatch(dna::from_code(code)));
        at = offset + 1;
    }
    if len > at {
        ops.push(EditOp::Match(len - at));
    }
    ops
}
