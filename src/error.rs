use std::path::PathBuf;

/// 比对与片段解析过程中可能出现的致命错误。
///
/// "无匹配"、"匹配过多"、QC 失败等情况属于正常数据状态，不在此列。
#[derive(Debug, thiserror::Error)]
pub enum ElandError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot access '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {context}: '{line}'")]
    DataFormat { context: String, line: String },

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl ElandError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ElandError::Io { path: path.into(), source }
    }

    pub fn format(context: impl Into<String>, line: impl Into<String>) -> Self {
        ElandError::DataFormat { context: context.into(), line: line.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_format_error_embeds_line() {
        let e = ElandError::format("ELAND record", ">r1\tACGT");
        let msg = e.to_string();
        assert!(msg.contains("ELAND record"));
        assert!(msg.contains(">r1\tACGT"));
    }

    #[test]
    fn io_error_names_path() {
        let e = ElandError::io("/no/such/file", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(e.to_string().contains("/no/such/file"));
    }
}
