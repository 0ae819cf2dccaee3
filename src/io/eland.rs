//! ELAND 扩展格式：`>name\tSEQ\tSTATUS\tLIST`。
//!
//! LIST 为 `-` 或逗号分隔的 `参考[/contig]:位置 链 描述串`，参考名只在变化时写出。

use anyhow::Result;
use std::io::{BufRead, Write};

use crate::align::matches::MatchStatus;
use crate::error::ElandError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElandHit {
    pub reference: String,
    pub contig: Option<String>,
    /// 1-based
    pub position: u32,
    pub reverse: bool,
    pub descriptor: String,
}

impl ElandHit {
    pub fn reference_label(&self) -> String {
        match &self.contig {
            Some(c) => format!("{}/{}", self.reference, c),
            None => self.reference.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElandRecord {
    pub name: String,
    pub bases: Vec<u8>,
    pub status: MatchStatus,
    pub hits: Vec<ElandHit>,
}

pub fn format_hit_list(hits: &[ElandHit]) -> String {
    if hits.is_empty() {
        return "-".to_string();
    }
    let mut out = String::new();
    let mut last: Option<String> = None;
    for (i, h) in hits.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let label = h.reference_label();
        if last.as_deref() != Some(label.as_str()) {
            out.push_str(&label);
            out.push(':');
            last = Some(label);
        }
        out.push_str(&h.position.to_string());
        out.push(if h.reverse { 'R' } else { 'F' });
        out.push_str(&h.descriptor);
    }
    out
}

pub fn write_record<W: Write>(w: &mut W, rec: &ElandRecord) -> Result<()> {
    writeln!(
        w,
        ">{}\t{}\t{}\t{}",
        rec.name,
        String::from_utf8_lossy(&rec.bases),
        rec.status,
        format_hit_list(&rec.hits)
    )?;
    Ok(())
}

fn parse_hit_list(list: &str, line: &str) -> Result<Vec<ElandHit>> {
    let bad = || ElandError::format("ELAND match list", line);
    if list == "-" || list.is_empty() {
        return Ok(Vec::new());
    }
    let mut hits = Vec::new();
    let mut current: Option<(String, Option<String>)> = None;
    for token in list.split(',') {
        let body = match token.rsplit_once(':') {
            Some((label, body)) => {
                let (reference, contig) = match label.split_once('/') {
                    Some((r, c)) => (r.to_string(), Some(c.to_string())),
                    None => (label.to_string(), None),
                };
                current = Some((reference, contig));
                body
            }
            None => token,
        };
        let (reference, contig) = current.clone().ok_or_else(bad)?;
        let digits = body.bytes().take_while(u8::is_ascii_digit).count();
        let position: u32 = body[..digits].parse().map_err(|_| bad())?;
        let reverse = match body.as_bytes().get(digits) {
            Some(b'F') => false,
            Some(b'R') => true,
            _ => return Err(bad().into()),
        };
        hits.push(ElandHit { reference, contig, position, reverse, descriptor: body[digits + 1..].to_string() });
    }
    Ok(hits)
}

pub fn parse_line(line: &str) -> Result<ElandRecord> {
    let bad = || ElandError::format("ELAND extended record", line);
    let mut cols = line.split('\t');
    let name = cols.next().ok_or_else(bad)?;
    let name = name.strip_prefix('>').unwrap_or(name).to_string();
    let bases = cols.next().ok_or_else(bad)?.as_bytes().to_vec();
    let status: MatchStatus = cols.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let hits = match cols.next() {
        Some(list) => parse_hit_list(list, line)?,
        None => Vec::new(),
    };
    Ok(ElandRecord { name, bases, status, hits })
}

pub struct ElandReader<R: BufRead> {
    reader: R,
    buf: String,
}

impl<R: BufRead> ElandReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: String::new() }
    }

    pub fn next_record(&mut self) -> Result<Option<ElandRecord>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            let line = self.buf.trim_end_matches(['\n', '\r']);
            if !line.is_empty() {
                return parse_line(line).map(Some);
            }
        }
    }
}

impl<R: BufRead> Iterator for ElandReader<R> {
    type Item = Result<ElandRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn hit_list_groups_references() {
        let hit = |r: &str, c: Option<&str>, p: u32, rev: bool, d: &str| ElandHit {
            reference: r.into(),
            contig: c.map(Into::into),
            position: p,
            reverse: rev,
            descriptor: d.into(),
        };
        let hits = vec![
            hit("chr1.fa", None, 51, false, "32"),
            hit("chr1.fa", None, 900, true, "10A21"),
            hit("chr2.fa", Some("c7"), 4, false, "12^AC$20"),
        ];
        let list = format_hit_list(&hits);
        assert_eq!(list, "chr1.fa:51F32,900R10A21,chr2.fa/c7:4F12^AC$20");
        assert_eq!(parse_hit_list(&list, &list).unwrap(), hits);
    }

    #[test]
    fn reads_status_lines() {
        let data = ">r1\tACGT\tNM\t-\n>r2\tACGT\t1:0:3\tchr1:7R4\n\n>r3\tNNNN\tQC\n";
        let recs: Vec<ElandRecord> = ElandReader::new(Cursor::new(data)).collect::<Result<_>>().unwrap();
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].status, MatchStatus::NoMatch);
        assert_eq!(recs[1].status, MatchStatus::Counts([1, 0, 3]));
        assert_eq!(recs[1].hits[0].position, 7);
        assert!(recs[1].hits[0].reverse);
        assert_eq!(recs[2].status, MatchStatus::QcFailed);
        assert!(recs[2].hits.is_empty());
    }

    #[test]
    fn malformed_lines_embed_content() {
        let err = parse_line(">r1\tACGT\t1:0").unwrap_err();
        assert!(err.to_string().contains("1:0"));
        assert!(parse_line(">r1\tACGT\t1:0:0\tchr1:7X4").is_err());
        assert!(parse_line(">r1\tACGT\t1:0:0\t7F4").is_err());
    }
}
