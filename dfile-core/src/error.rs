use std::path::PathBuf;

use crate::{driver::ConversionState, source::FieldType, BlockAddress};

#[derive(Debug, thiserror::Error)]
pub enum DfileError {
    #[error("Failed to write store {path}: {source}")]
    StoreWrite {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write index {path}: {source}")]
    IndexWrite {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Record {record} is {actual} bytes, expected {expected}")]
    ShortRecord {
        record: u64,
        expected: usize,
        actual: usize,
    },
    #[error("Failed to read source record {record}: {source}")]
    Source {
        record: u64,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Source header declares {record_width} byte records but its fields span {field_width} bytes")]
    InconsistentHeader {
        record_width: usize,
        field_width: usize,
    },
    #[error("Routing field {field} is out of range 1..={available}")]
    RoutingFieldOutOfRange { field: usize, available: usize },
    #[error("Routing field {field} ({name}) is {field_type:?}, expected Text")]
    InvalidRoutingField {
        field: usize,
        name: String,
        field_type: FieldType,
    },
    #[error("Failed to read memo at block {address} for record {record}: {source}")]
    MemoRead {
        record: u64,
        address: BlockAddress,
        source: std::io::Error,
    },
    #[error("Invalid option: {0}")]
    InvalidOption(String),
    #[error("Converter already left the Init state ({0:?})")]
    AlreadyStarted(ConversionState),
}

impl DfileError {
    /// Source record the error was raised for, if it is tied to one.
    pub fn record(&self) -> Option<u64> {
        match self {
            Self::ShortRecord { record, .. }
            | Self::Source { record, .. }
            | Self::MemoRead { record, .. } => Some(*record),
            _ => None,
        }
    }
}
