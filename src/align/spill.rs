//! 命中记录的临时溢写文件。
//!
//! 格式：8 字节头（magic `ESPL` + u16 版本 + u16 记录字节数），之后是定长
//! 记录 `{oligo: u32, position: u32, errors: u32}`，全部小端序。扫描期间只追加，
//! 扫描结束后顺序回放一次。

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::ElandError;
use crate::index::oligo::OligoNumber;
use crate::index::record::{ErrorInfo, MatchPosition, MatchRecord};

const SPILL_MAGIC: &[u8; 4] = b"ESPL";
const SPILL_VERSION: u16 = 1;
pub const RECORD_BYTES: usize = 12;

pub fn write_header<W: Write>(w: &mut W) -> std::io::Result<()> {
    w.write_all(SPILL_MAGIC)?;
    w.write_u16::<LittleEndian>(SPILL_VERSION)?;
    w.write_u16::<LittleEndian>(RECORD_BYTES as u16)
}

pub fn write_record<W: Write>(w: &mut W, rec: &MatchRecord) -> std::io::Result<()> {
    w.write_u32::<LittleEndian>(rec.oligo.0)?;
    w.write_u32::<LittleEndian>(rec.position.0)?;
    w.write_u32::<LittleEndian>(rec.errors.0)
}

/// 顺序读取溢写记录
pub struct SpillReader<R: Read> {
    inner: R,
}

impl<R: Read> SpillReader<R> {
    /// 校验文件头后返回读取器
    pub fn new(mut inner: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        inner
            .read_exact(&mut magic)
            .map_err(|e| anyhow!("cannot read spill header: {}", e))?;
        if &magic != SPILL_MAGIC {
            bail!(ElandError::format("spill file", "bad magic"));
        }
        let version = inner.read_u16::<LittleEndian>()?;
        let width = inner.read_u16::<LittleEndian>()?;
        if version != SPILL_VERSION || width as usize != RECORD_BYTES {
            bail!(ElandError::format(
                "spill file",
                format!("unsupported version {} / record width {}", version, width)
            ));
        }
        Ok(Self { inner })
    }

    pub fn next_record(&mut self) -> Result<Option<MatchRecord>> {
        let mut buf = [0u8; RECORD_BYTES];
        let mut filled = 0usize;
        while filled < RECORD_BYTES {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < RECORD_BYTES {
            bail!(ElandError::format(
                "spill file",
                format!("truncated record: {} of {} bytes", filled, RECORD_BYTES)
            ));
        }
        let mut c = &buf[..];
        let oligo = OligoNumber(c.read_u32::<LittleEndian>()?);
        let position = MatchPosition(c.read_u32::<LittleEndian>()?);
        let errors = ErrorInfo(c.read_u32::<LittleEndian>()?);
        Ok(Some(MatchRecord { oligo, position, errors }))
    }
}

impl<R: Read> Iterator for SpillReader<R> {
    type Item = Result<MatchRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// 匿名临时文件上的只追加写入端
pub struct SpillFile {
    writer: BufWriter<File>,
    records: u64,
}

impl SpillFile {
    /// `dir` 为空时使用系统临时目录；文件在关闭后自动删除
    pub fn create(dir: Option<&Path>) -> Result<Self> {
        let file = match dir {
            Some(d) => tempfile::tempfile_in(d).map_err(|e| ElandError::io(d, e))?,
            None => tempfile::tempfile()?,
        };
        let mut writer = BufWriter::with_capacity(1 << 20, file);
        write_header(&mut writer)?;
        Ok(Self { writer, records: 0 })
    }

    #[inline]
    pub fn push(&mut self, rec: &MatchRecord) -> Result<()> {
        write_record(&mut self.writer, rec)?;
        self.records += 1;
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// 结束写入，回到文件头准备回放
    pub fn into_reader(self) -> Result<SpillReader<BufReader<File>>> {
        let mut file = self.writer.into_inner().map_err(|e| anyhow!("cannot flush spill file: {}", e.error()))?;
        file.seek(SeekFrom::Start(0))?;
        SpillReader::new(BufReader::with_capacity(1 << 20, file))
    }
}
