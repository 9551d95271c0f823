//! dBase III `.dbf` reader.
//!
//! Decodes the table header into typed field descriptors and streams the
//! fixed-width records behind it. Memo fields are backed by the sibling
//! `.dbt` file, exposed to the converter as a [`BlobStore`].

use std::{
    ffi::OsString,
    fs::File,
    io::{BufReader, Read, Seek},
    path::{Path, PathBuf},
};

use dfile_core::{
    memo::{BlobStore, MemoStore},
    source::{FieldDescriptor, FieldType, RawRecord, RecordSource, SourceHeader},
};

use crate::error::{DbaseError, DbaseResult};

pub const DBF_EXTENSION: &str = "dbf";
pub const DBT_EXTENSION: &str = "dbt";

/// Version byte of a table without memo fields.
pub const DBASE_COOKIE: u8 = 0x03;
/// Version byte of a table with a `.dbt` memo file.
pub const DBASE_MEMO_COOKIE: u8 = 0x83;

const HEADER_SIZE: usize = 32;
const DESCRIPTOR_SIZE: usize = 32;
const FIELD_NAME_LEN: usize = 11;
const HEADER_TERMINATOR: u8 = 0x0D;
const DELETED_FLAG: u8 = b'*';

/// Fixed part of the table header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TableHeader {
    has_memo: bool,
    record_count: u32,
    header_length: u16,
    record_length: u16,
}

pub struct DbaseReader<R, M = File> {
    inner: R,
    header: SourceHeader,
    /// Bytes per record including the deletion flag
    record_length: usize,
    remaining: u64,
    memo: Option<MemoStore<M>>,
}

impl DbaseReader<BufReader<File>, File> {
    /// Open `path` (with or without its `.dbf` extension) and, when the
    /// header announces memos, the `.dbt` file next to it.
    pub fn open(path: impl AsRef<Path>) -> DbaseResult<Self> {
        let dbf = dbf_path(path.as_ref());
        let file = File::open(&dbf).map_err(|source| DbaseError::FileOpenError {
            path: dbf.clone(),
            source,
        })?;
        let mut inner = BufReader::new(file);
        let table = read_table_header(&mut inner)?;

        let memo = if table.has_memo {
            let dbt = dbf.with_extension(DBT_EXTENSION);
            let file = File::open(&dbt).map_err(|source| DbaseError::MemoFileOpenError {
                path: dbt.clone(),
                source,
            })?;
            Some(file)
        } else {
            None
        };

        Self::from_table(inner, table, memo)
    }
}

impl<R: Read, M: Read + Seek> DbaseReader<R, M> {
    /// Build a reader over an already opened table and optional memo file.
    pub fn from_parts(mut reader: R, memo: Option<M>) -> DbaseResult<Self> {
        let table = read_table_header(&mut reader)?;
        Self::from_table(reader, table, memo)
    }

    fn from_table(mut inner: R, table: TableHeader, memo: Option<M>) -> DbaseResult<Self> {
        if table.has_memo && memo.is_none() {
            return Err(DbaseError::MissingMemoStore);
        }

        let fields = read_field_descriptors(&mut inner, &table)?;
        let memo = match memo {
            Some(memo) => Some(MemoStore::new(memo).map_err(DbaseError::MemoReadError)?),
            None => None,
        };

        let header = SourceHeader::new(fields, u64::from(table.record_count), memo.is_some());
        if header.record_width + 1 != usize::from(table.record_length) {
            return Err(DbaseError::CorruptHeader(format!(
                "fields span {} bytes but records are {} bytes",
                header.record_width + 1,
                table.record_length
            )));
        }

        tracing::debug!(
            fields = header.fields.len(),
            records = header.record_count,
            memo = header.has_memo_store,
            "read dBase header"
        );

        Ok(Self {
            inner,
            record_length: usize::from(table.record_length),
            remaining: header.record_count,
            header,
            memo,
        })
    }

    fn read_record(&mut self) -> DbaseResult<RawRecord> {
        let mut buffer = Vec::with_capacity(self.record_length);
        (&mut self.inner)
            .take(self.record_length as u64)
            .read_to_end(&mut buffer)
            .map_err(DbaseError::RecordReadError)?;

        if buffer.len() < self.record_length {
            // Later records cannot be aligned after a short read.
            self.remaining = 0;
        }

        Ok(match buffer.split_first() {
            Some((&flag, bytes)) => RawRecord {
                tombstoned: flag == DELETED_FLAG,
                bytes: bytes.to_vec(),
            },
            None => RawRecord::new(Vec::new()),
        })
    }
}

impl<R: Read, M: Read + Seek> RecordSource for DbaseReader<R, M> {
    type Error = DbaseError;

    fn header(&self) -> &SourceHeader {
        &self.header
    }

    fn next_record(&mut self) -> Option<Result<RawRecord, Self::Error>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.read_record())
    }

    fn memo_store(&mut self) -> Option<&mut dyn BlobStore> {
        self.memo
            .as_mut()
            .map(|memo| memo as &mut dyn BlobStore)
    }
}

/// `FILE` and `FILE.dbf` both name `FILE.dbf`.
pub fn dbf_path(path: &Path) -> PathBuf {
    let has_extension = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case(DBF_EXTENSION));
    if has_extension {
        return path.to_path_buf();
    }
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(DBF_EXTENSION);
    PathBuf::from(name)
}

fn read_table_header<R: Read>(reader: &mut R) -> DbaseResult<TableHeader> {
    let mut bytes = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut bytes)
        .map_err(DbaseError::TruncatedHeader)?;

    let has_memo = match bytes[0] {
        DBASE_COOKIE => false,
        DBASE_MEMO_COOKIE => true,
        other => return Err(DbaseError::UnsupportedVersion(other)),
    };

    Ok(TableHeader {
        has_memo,
        record_count: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        header_length: u16::from_le_bytes([bytes[8], bytes[9]]),
        record_length: u16::from_le_bytes([bytes[10], bytes[11]]),
    })
}

/// Read descriptors up to the header terminator, then skip to the first
/// record.
fn read_field_descriptors<R: Read>(
    reader: &mut R,
    table: &TableHeader,
) -> DbaseResult<Vec<FieldDescriptor>> {
    let header_length = usize::from(table.header_length);
    let mut consumed = HEADER_SIZE;
    let mut fields = Vec::new();

    loop {
        let mut first = [0u8; 1];
        reader
            .read_exact(&mut first)
            .map_err(DbaseError::TruncatedHeader)?;
        consumed += 1;
        if first[0] == HEADER_TERMINATOR {
            break;
        }

        let mut rest = [0u8; DESCRIPTOR_SIZE - 1];
        reader
            .read_exact(&mut rest)
            .map_err(DbaseError::TruncatedHeader)?;
        consumed += rest.len();
        if consumed > header_length {
            return Err(DbaseError::CorruptHeader(format!(
                "field descriptors run past the {header_length} byte header"
            )));
        }

        let mut descriptor = [0u8; DESCRIPTOR_SIZE];
        descriptor[0] = first[0];
        descriptor[1..].copy_from_slice(&rest);
        fields.push(parse_descriptor(&descriptor));
    }

    if consumed > header_length {
        return Err(DbaseError::CorruptHeader(format!(
            "header terminator found after the {header_length} byte header"
        )));
    }
    let padding = (header_length - consumed) as u64;
    let skipped = std::io::copy(&mut reader.take(padding), &mut std::io::sink())
        .map_err(DbaseError::TruncatedHeader)?;
    if skipped < padding {
        return Err(DbaseError::CorruptHeader(
            "file ends inside the header".to_string(),
        ));
    }

    Ok(fields)
}

fn parse_descriptor(bytes: &[u8; DESCRIPTOR_SIZE]) -> FieldDescriptor {
    let name_bytes = &bytes[..FIELD_NAME_LEN];
    let name_end = name_bytes
        .iter()
        .position(|&byte| byte == 0)
        .unwrap_or(FIELD_NAME_LEN);
    let name = String::from_utf8_lossy(&name_bytes[..name_end])
        .trim()
        .to_string();

    let field_type = match bytes[11] {
        b'C' => FieldType::Text,
        b'L' => FieldType::Boolean,
        b'D' => FieldType::Date,
        b'N' | b'F' => FieldType::Number,
        b'M' => FieldType::MemoRef,
        other => {
            tracing::debug!(field = %name, "unknown field type {:?}, reading as text", other as char);
            FieldType::Text
        }
    };

    FieldDescriptor::new(name, field_type, usize::from(bytes[16])).with_decimals(bytes[17])
}
