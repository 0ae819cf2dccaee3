//! 待比对 read 与重复 oligo 列表的加载。

use anyhow::{bail, Result};
use flate2::read::MultiGzDecoder;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::ElandError;
use crate::io::fasta::FastaReader;
use crate::io::fastq::FastqReader;
use crate::util::dna;

const BUFFER_SIZE: usize = 1 << 16;

/// 打开文本输入，`.gz` 后缀按 gzip 解压
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| ElandError::io(path, e))?;
    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    pub name: String,
    /// 已规范化为 ACGTN
    pub bases: Vec<u8>,
    pub qualities: Option<Vec<u8>>,
}

/// 按首个非空字符判断 FASTA / FASTQ 并读入全部 read
pub fn read_records<R: BufRead>(mut input: R) -> Result<Vec<ReadRecord>> {
    let first = loop {
        let buf = input.fill_buf()?;
        if buf.is_empty() {
            return Ok(Vec::new());
        }
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(i) => break buf[i],
            None => {
                let n = buf.len();
                input.consume(n);
            }
        }
    };
    let records = match first {
        b'>' => FastaReader::new(input)
            .map(|r| {
                r.map(|rec| ReadRecord { name: rec.id, bases: dna::normalize_seq(&rec.seq), qualities: None })
            })
            .collect::<Result<Vec<_>>>()?,
        b'@' => FastqReader::new(input)
            .map(|r| {
                r.map(|rec| ReadRecord {
                    name: rec.id,
                    bases: dna::normalize_seq(&rec.seq),
                    qualities: Some(rec.qual),
                })
            })
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(ElandError::format("read file (expected FASTA or FASTQ)", (other as char).to_string()).into())
        }
    };
    Ok(records)
}

pub fn load_reads(path: &Path) -> Result<Vec<ReadRecord>> {
    read_records(open_input(path)?).map_err(|e| e.context(format!("while reading '{}'", path.display())))
}

/// 所有 read 必须等长且不短于种子长度；返回该长度（无 read 时为 None）
pub fn common_read_length(reads: &[ReadRecord], oligo_len: usize) -> Result<Option<usize>> {
    let Some(first) = reads.first() else {
        return Ok(None);
    };
    let len = first.bases.len();
    if len < oligo_len {
        return Err(ElandError::Config(format!(
            "reads of length {} are shorter than the oligo length {}",
            len, oligo_len
        ))
        .into());
    }
    if let Some(bad) = reads.iter().find(|r| r.bases.len() != len) {
        return Err(ElandError::format(
            format!("read length (expected {} bases)", len),
            format!("{}\t{}", bad.name, String::from_utf8_lossy(&bad.bases)),
        )
        .into());
    }
    Ok(Some(len))
}

/// 重复 oligo 列表：每行一条长度为 `oligo_len` 的序列，`#` 与 `>` 开头的行被忽略
pub fn load_repeats(path: &Path, oligo_len: usize) -> Result<HashSet<Vec<u8>>> {
    let mut repeats = HashSet::new();
    for (i, line) in open_input(path)?.lines().enumerate() {
        let line = line.map_err(|e| ElandError::io(path, e))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('>') {
            continue;
        }
        let seq = dna::normalize_seq(line.as_bytes());
        if seq.len() != oligo_len {
            return Err(ElandError::format(
                format!("repeat list '{}' line {} (expected {} bases)", path.display(), i + 1, oligo_len),
                line,
            )
            .into());
        }
        repeats.insert(seq);
    }
    if repeats.is_empty() {
        bail!("repeat list '{}' contains no oligos", path.display());
    }
    log::info!("loaded {} repeat oligos from {}", repeats.len(), path.display());
    Ok(repeats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    #[test]
    fn detects_fasta_and_fastq() {
        let fa = read_records(Cursor::new(&b"\n>r1\nacgu\n>r2\nACGT\n"[..])).unwrap();
        assert_eq!(fa.len(), 2);
        assert_eq!(fa[0].bases, b"ACGT");
        assert!(fa[0].qualities.is_none());

        let fq = read_records(Cursor::new(&b"@r1\nACGT\n+\nIIII\n"[..])).unwrap();
        assert_eq!(fq[0].qualities.as_deref(), Some(&b"IIII"[..]));

        assert!(read_records(Cursor::new(&b"ACGT\n"[..])).is_err());
        assert!(read_records(Cursor::new(&b"  \n"[..])).unwrap().is_empty());
    }

    #[test]
    fn gz_input_is_decompressed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fa.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b">r1\nACGTACGT\n").unwrap();
        enc.finish().unwrap();
        let reads = load_reads(&path).unwrap();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].bases, b"ACGTACGT");
    }

    #[test]
    fn read_lengths_must_agree() {
        let mk = |s: &[u8]| ReadRecord { name: "r".into(), bases: s.to_vec(), qualities: None };
        assert_eq!(common_read_length(&[], 16).unwrap(), None);
        assert_eq!(common_read_length(&[mk(&[b'A'; 20]), mk(&[b'C'; 20])], 16).unwrap(), Some(20));
        assert!(common_read_length(&[mk(&[b'A'; 20]), mk(&[b'C'; 21])], 16).is_err());
        assert!(common_read_length(&[mk(&[b'A'; 10])], 16).is_err());
    }

    #[test]
    fn repeat_list_checks_lengths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repeats.txt");
        std::fs::write(&path, "# header\nACGTACGTACGTACGT\n\nacgtacgtacgtacgt\n").unwrap();
        let set = load_repeats(&path, 16).unwrap();
        assert_eq!(set.len(), 1);
        assert!(load_repeats(&path, 20).is_err());
    }
}
