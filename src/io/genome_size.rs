//! `sequenceSizes.xml`：每条参考序列的碱基数与是否环状。
//!
//! 只识别 `<chromosome .../>` 元素的属性，足以读写本工具自己产生的文件以及
//! 常见流水线输出的同名文件。

use anyhow::Result;
use std::io::{BufRead, Read, Write};

use crate::error::ElandError;
use crate::index::squash::GenomeIndex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromosomeSize {
    pub file_name: String,
    pub contig_name: String,
    pub total_bases: u64,
    pub is_circular: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenomeSizes {
    pub chromosomes: Vec<ChromosomeSize>,
}

fn attribute<'l>(element: &'l str, name: &str) -> Option<&'l str> {
    let mut rest = element;
    while let Some(at) = rest.find(name) {
        let before_ok = at == 0 || rest.as_bytes()[at - 1].is_ascii_whitespace();
        let after = rest[at + name.len()..].trim_start();
        if before_ok {
            if let Some(value) = after.strip_prefix('=') {
                let value = value.trim_start();
                let quote = value.chars().next()?;
                if quote == '"' || quote == '\'' {
                    let end = value[1..].find(quote)?;
                    return Some(&value[1..1 + end]);
                }
            }
        }
        rest = &rest[at + name.len()..];
    }
    None
}

impl GenomeSizes {
    pub fn total_bases(&self) -> u64 {
        self.chromosomes.iter().map(|c| c.total_bases).sum()
    }

    /// 按文件名或 contig 名查找
    pub fn find(&self, name: &str) -> Option<&ChromosomeSize> {
        self.chromosomes.iter().find(|c| c.file_name == name || c.contig_name == name)
    }

    /// 参考长度；ELAND 输出中的名字可能是 `文件/contig` 形式
    pub fn length_of(&self, reference: &str, contig: Option<&str>) -> Option<u64> {
        let by_contig = contig.and_then(|c| {
            self.chromosomes.iter().find(|x| x.contig_name == c && (x.file_name == reference || x.file_name.is_empty()))
        });
        by_contig.or_else(|| self.find(reference)).map(|c| c.total_bases)
    }

    pub fn is_circular(&self, reference: &str) -> bool {
        self.find(reference).is_some_and(|c| c.is_circular)
    }

    pub fn from_genome(genome: &GenomeIndex) -> Self {
        let chromosomes = genome
            .files
            .iter()
            .flat_map(|f| {
                f.header.contigs.iter().map(move |c| ChromosomeSize {
                    file_name: f.name.clone(),
                    contig_name: c.name.clone(),
                    total_bases: c.len as u64,
                    is_circular: false,
                })
            })
            .collect();
        Self { chromosomes }
    }

    pub fn read<R: BufRead>(mut input: R) -> Result<Self> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        let mut chromosomes = Vec::new();
        let mut rest = text.as_str();
        while let Some(start) = rest.find("<chromosome") {
            let tail = &rest[start..];
            let end = tail.find('>').ok_or_else(|| ElandError::format("genome size XML", tail.lines().next().unwrap_or("")))?;
            let element = &tail[..end];
            let bad = || ElandError::format("genome size chromosome element", element);
            let file_name = attribute(element, "fileName").unwrap_or("").to_string();
            let contig_name = attribute(element, "contigName").unwrap_or("").to_string();
            if file_name.is_empty() && contig_name.is_empty() {
                return Err(bad().into());
            }
            let total_bases = attribute(element, "totalBases").ok_or_else(bad)?.parse().map_err(|_| bad())?;
            let is_circular = match attribute(element, "isCircular") {
                None | Some("false") | Some("0") => false,
                Some("true") | Some("1") => true,
                Some(_) => return Err(bad().into()),
            };
            chromosomes.push(ChromosomeSize { file_name, contig_name, total_bases, is_circular });
            rest = &tail[end..];
        }
        if chromosomes.is_empty() {
            return Err(ElandError::format("genome size XML", "no <chromosome> elements").into());
        }
        Ok(Self { chromosomes })
    }

    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "<?xml version=\"1.0\"?>")?;
        writeln!(out, "<sequenceSizes>")?;
        for c in &self.chromosomes {
            writeln!(
                out,
                "  <chromosome fileName=\"{}\" contigName=\"{}\" totalBases=\"{}\" isCircular=\"{}\"/>",
                c.file_name, c.contig_name, c.total_bases, c.is_circular
            )?;
        }
        writeln!(out, "</sequenceSizes>")?;
        Ok(())
    }
}
