//! 22 列的 export 格式，每个 mate 一个文件。
//!
//! 列顺序：machine, run, lane, tile, x, y, index, readNum, bases, qualities,
//! reference, contig, position, strand, descriptor, mateAQ(本 read), mateReference,
//! mateContig, fragmentOffset, mateStrand, fragmentAQ, passedFilter。

use anyhow::Result;
use std::io::Write;

/// 从 read 名中解析出的仪器字段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadNameFields {
    pub machine: String,
    pub run: String,
    pub lane: String,
    pub tile: String,
    pub x: String,
    pub y: String,
    pub index: String,
    pub read_number: String,
}

/// 识别 `MACHINE[_RUN]:LANE:TILE:X:Y[#INDEX][/READ]` 与
/// `MACHINE:RUN:FLOWCELL:LANE:TILE:X:Y[ ...]` 两种命名；其它名字整体放进 machine 列。
pub fn parse_read_name(name: &str, mate: u8) -> ReadNameFields {
    let name = name.trim_start_matches(['>', '@']);
    let name = name.split_whitespace().next().unwrap_or(name);
    let (rest, read_number) = match name.rsplit_once('/') {
        Some((r, n)) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => (r, n.to_string()),
        _ => (name, mate.to_string()),
    };
    let (rest, index) = match rest.rsplit_once('#') {
        Some((r, i)) => (r, i.to_string()),
        None => (rest, String::new()),
    };
    let fields: Vec<&str> = rest.split(':').collect();
    let numeric = |s: &[&str]| s.iter().all(|f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit() || b == b'-'));
    match fields.as_slice() {
        [machine, lane, tile, x, y] if numeric(&fields[1..]) => {
            let (machine, run) = match machine.rsplit_once('_') {
                Some((m, r)) => (m.to_string(), r.to_string()),
                None => (machine.to_string(), String::new()),
            };
            ReadNameFields {
                machine,
                run,
                lane: lane.to_string(),
                tile: tile.to_string(),
                x: x.to_string(),
                y: y.to_string(),
                index,
                read_number,
            }
        }
        [machine, run, _flowcell, lane, tile, x, y] if numeric(&fields[3..]) => ReadNameFields {
            machine: machine.to_string(),
            run: run.to_string(),
            lane: lane.to_string(),
            tile: tile.to_string(),
            x: x.to_string(),
            y: y.to_string(),
            index,
            read_number,
        },
        _ => ReadNameFields { machine: name.to_string(), read_number: mate.to_string(), ..ReadNameFields::default() },
    }
}

/// 比对上的 mate 的另一端信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerInfo {
    pub reference: String,
    pub contig: Option<String>,
    /// 同一参考时 partner 起点减去本 read 起点
    pub fragment_offset: Option<i64>,
    pub reverse: bool,
}

/// 本 read 的比对位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportAlignment {
    pub reference: String,
    pub contig: Option<String>,
    pub position: u32,
    pub reverse: bool,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    pub name: ReadNameFields,
    pub bases: Vec<u8>,
    /// 已加偏移的 ASCII 质量串
    pub qualities: Vec<u8>,
    /// 未比对时为 None，reference 列写入 `status`
    pub alignment: Option<ExportAlignment>,
    pub status: String,
    pub read_quality: Option<i32>,
    pub partner: Option<PartnerInfo>,
    pub fragment_quality: Option<i32>,
    pub passed_filter: bool,
}

fn opt<T: ToString>(v: &Option<T>) -> String {
    v.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn strand(reverse: bool) -> char {
    if reverse {
        'R'
    } else {
        'F'
    }
}

pub fn write_export<W: Write>(w: &mut W, rec: &ExportRecord) -> Result<()> {
    let n = &rec.name;
    write!(
        w,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t",
        n.machine,
        n.run,
        n.lane,
        n.tile,
        n.x,
        n.y,
        n.index,
        n.read_number,
        String::from_utf8_lossy(&rec.bases),
        String::from_utf8_lossy(&rec.qualities)
    )?;
    match &rec.alignment {
        Some(a) => write!(
            w,
            "{}\t{}\t{}\t{}\t{}\t",
            a.reference,
            opt(&a.contig),
            a.position,
            strand(a.reverse),
            a.descriptor
        )?,
        None => write!(w, "{}\t\t\t\t\t", rec.status)?,
    }
    match &rec.partner {
        Some(p) => write!(
            w,
            "{}\t{}\t{}\t{}\t{}\t",
            opt(&rec.read_quality),
            p.reference,
            opt(&p.contig),
            opt(&p.fragment_offset),
            strand(p.reverse)
        )?,
        None => write!(w, "{}\t\t\t\t\t", opt(&rec.read_quality))?,
    }
    writeln!(w, "{}\t{}", opt(&rec.fragment_quality), if rec.passed_filter { 'Y' } else { 'N' })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_name_layouts() {
        let old = parse_read_name("HWUSI-EAS100R_0042:6:73:941:1973#ACGT/2", 1);
        assert_eq!(old.machine, "HWUSI-EAS100R");
        assert_eq!(old.run, "0042");
        assert_eq!((old.lane.as_str(), old.tile.as_str()), ("6", "73"));
        assert_eq!((old.x.as_str(), old.y.as_str()), ("941", "1973"));
        assert_eq!(old.index, "ACGT");
        assert_eq!(old.read_number, "2");

        let new = parse_read_name("@EAS139:136:FC706VJ:2:2104:15343:197393 1:Y:18:ATCACG", 1);
        assert_eq!(new.machine, "EAS139");
        assert_eq!(new.run, "136");
        assert_eq!(new.lane, "2");
        assert_eq!(new.y, "197393");
        assert_eq!(new.read_number, "1");

        let other = parse_read_name("pair_17", 2);
        assert_eq!(other.machine, "pair_17");
        assert_eq!(other.read_number, "2");
        assert!(other.lane.is_empty());
    }

    #[test]
    fn writes_22_columns() {
        let rec = ExportRecord {
            name: parse_read_name("m_1:1:2:3:4#0/1", 1),
            bases: b"ACGT".to_vec(),
            qualities: b"IIII".to_vec(),
            alignment: Some(ExportAlignment {
                reference: "chr1".into(),
                contig: None,
                position: 51,
                reverse: false,
                descriptor: "4".into(),
            }),
            status: "1:0:0".into(),
            read_quality: Some(40),
            partner: Some(PartnerInfo { reference: "chr1".into(), contig: None, fragment_offset: Some(250), reverse: true }),
            fragment_quality: Some(80),
            passed_filter: true,
        };
        let mut buf = Vec::new();
        write_export(&mut buf, &rec).unwrap();
        let line = String::from_utf8(buf).unwrap();
        let cols: Vec<&str> = line.trim_end().split('\t').collect();
        assert_eq!(cols.len(), 22);
        assert_eq!(cols[10..15], ["chr1", "", "51", "F", "4"]);
        assert_eq!(cols[15..22], ["40", "chr1", "", "250", "R", "80", "Y"]);

        let unaligned = ExportRecord { alignment: None, partner: None, status: "QC".into(), passed_filter: false, read_quality: None, fragment_quality: None, ..rec };
        let mut buf = Vec::new();
        write_export(&mut buf, &unaligned).unwrap();
        let line = String::from_utf8(buf).unwrap();
        let cols: Vec<&str> = line.trim_end_matches('\n').split('\t').collect();
        assert_eq!(cols.len(), 22);
        assert_eq!(cols[10], "QC");
        assert_eq!(cols[21], "N");
    }
}
