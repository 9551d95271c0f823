//! Interface to the source-format reader.
//!
//! The core does not decode any source header itself. A reader hands it a
//! [`SourceHeader`] of typed field descriptors and then streams fixed-width
//! [`RawRecord`]s, optionally backed by a [`BlobStore`] for memo text.

use serde::{Deserialize, Serialize};

use crate::memo::BlobStore;

/// Semantic type of a source field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Boolean,
    Date,
    Number,
    /// Block number of an out-of-line memo in the blob store
    MemoRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Declared width in bytes
    pub width: usize,
    /// Digits after the decimal point, only meaningful for `Number`
    pub decimals: u8,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType, width: usize) -> Self {
        Self {
            name: name.into(),
            field_type,
            width,
            decimals: 0,
        }
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHeader {
    pub fields: Vec<FieldDescriptor>,
    pub record_count: u64,
    /// Bytes of field data per record, excluding any deletion flag
    pub record_width: usize,
    pub has_memo_store: bool,
}

impl SourceHeader {
    pub fn new(fields: Vec<FieldDescriptor>, record_count: u64, has_memo_store: bool) -> Self {
        let record_width = fields.iter().map(|field| field.width).sum();
        Self {
            fields,
            record_count,
            record_width,
            has_memo_store,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Flagged deleted by the source
    pub tombstoned: bool,
    /// Concatenated field bytes in descriptor order
    pub bytes: Vec<u8>,
}

impl RawRecord {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            tombstoned: false,
            bytes: bytes.into(),
        }
    }

    pub fn tombstoned(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            tombstoned: true,
            bytes: bytes.into(),
        }
    }
}

/// A finite, single-pass stream of source records.
pub trait RecordSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn header(&self) -> &SourceHeader;

    /// Next record, `None` once the stream is exhausted.
    fn next_record(&mut self) -> Option<Result<RawRecord, Self::Error>>;

    /// The memo store backing `MemoRef` fields, if the source has one.
    fn memo_store(&mut self) -> Option<&mut dyn BlobStore>;
}
