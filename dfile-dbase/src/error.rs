use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DbaseError {
    #[error("Failed to open dBase file {path}: {source}")]
    FileOpenError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot open memo file {path}: {source}")]
    MemoFileOpenError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read memo file: {0}")]
    MemoReadError(std::io::Error),
    #[error("Header announces memo fields but no memo store was supplied")]
    MissingMemoStore,
    #[error("Not a dBase III file (version byte {0:#04x})")]
    UnsupportedVersion(u8),
    #[error("Truncated dBase header: {0}")]
    TruncatedHeader(std::io::Error),
    #[error("Corrupt dBase header: {0}")]
    CorruptHeader(String),
    #[error("Failed to read record: {0}")]
    RecordReadError(std::io::Error),
}

pub type DbaseResult<T> = std::result::Result<T, DbaseError>;
