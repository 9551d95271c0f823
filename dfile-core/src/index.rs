//! Address index builder.
//!
//! Rows are appended to a scratch file while the partition is being filled.
//! The permanent index needs the row count in its header, which is only
//! known once the input is exhausted, so [`IndexBuilder::finalize`] replays
//! the scratch rows behind a freshly written header and then drops the
//! scratch file.

use std::{
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::{
    error::DfileError,
    layout::{SCRATCH_INDEX_EXTENSION, VERSION_TAG},
    BlockAddress, DfileResult,
};

/// How a partition's conversion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Fields of the permanent index header.
#[derive(Debug, Clone)]
pub struct IndexHeader {
    pub model: String,
    pub file_protected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalized {
    /// The permanent index was written with this many rows
    Committed { path: PathBuf, rows: u64 },
    /// Nothing survives: failure, or no rows were ever appended
    Discarded,
}

pub struct IndexBuilder {
    path: PathBuf,
    scratch: BufWriter<NamedTempFile>,
    rows: u64,
    protect_records: bool,
}

impl IndexBuilder {
    /// Start an index that will be finalized into `path`. The scratch file is
    /// created next to it.
    pub fn create(path: PathBuf, protect_records: bool) -> DfileResult<Self> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prefix = path
            .file_stem()
            .map(|stem| format!("{}.", stem.to_string_lossy()))
            .unwrap_or_default();

        let scratch = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&format!(".{SCRATCH_INDEX_EXTENSION}"))
            .tempfile_in(&dir)
            .map_err(|source| DfileError::IndexWrite {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            scratch: BufWriter::new(scratch),
            rows: 0,
            protect_records,
        })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical id the next appended row must carry.
    pub fn next_logical_id(&self) -> u64 {
        self.rows + 1
    }

    /// Record that `logical_id` starts at block `address`.
    pub fn append(&mut self, logical_id: u64, address: BlockAddress) -> DfileResult<()> {
        debug_assert_eq!(logical_id, self.next_logical_id());
        let marker = if self.protect_records { '-' } else { ' ' };
        writeln!(self.scratch, "{marker}{logical_id}\t{address}").map_err(|source| {
            DfileError::IndexWrite {
                path: self.path.clone(),
                source,
            }
        })?;
        self.rows += 1;
        Ok(())
    }

    /// Turn the scratch rows into the permanent index, or discard everything.
    ///
    /// On [`Outcome::Failure`] or with zero rows the scratch file is removed
    /// and no index is left on disk. A failure while writing the permanent
    /// index removes the partial file before the error is returned.
    pub fn finalize(self, outcome: Outcome, header: &IndexHeader) -> DfileResult<Finalized> {
        let Self {
            path, scratch, rows, ..
        } = self;

        if outcome == Outcome::Failure || rows == 0 {
            drop(scratch);
            remove_if_exists(&path);
            return Ok(Finalized::Discarded);
        }

        let write = |path: &Path| -> std::io::Result<()> {
            let mut scratch = scratch.into_inner().map_err(|e| e.into_error())?;
            scratch.as_file_mut().seek(SeekFrom::Start(0))?;

            let mut out = BufWriter::new(File::create(path)?);
            write_header(&mut out, header, rows)?;
            std::io::copy(scratch.as_file_mut(), &mut out)?;
            out.flush()?;
            Ok(())
        };

        match write(&path) {
            Ok(()) => Ok(Finalized::Committed { path, rows }),
            Err(source) => {
                remove_if_exists(&path);
                Err(DfileError::IndexWrite { path, source })
            }
        }
    }
}

fn write_comment<W: Write>(writer: &mut W, text: &str) -> std::io::Result<()> {
    writeln!(writer, "#\n#\t{text}\n#")
}

fn write_header<W: Write>(writer: &mut W, header: &IndexHeader, rows: u64) -> std::io::Result<()> {
    write_comment(writer, "Dfile Version")?;
    writeln!(writer, "char\tVersion\t{{{VERSION_TAG}}}")?;
    write_comment(writer, "Dfile Model name")?;
    writeln!(writer, "char\tModel\t{{{}}}", header.model)?;
    writeln!(
        writer,
        "char\tFileProtected\t{{{}}}",
        if header.file_protected { "yes" } else { "no" }
    )?;
    writeln!(writer, "long\tNumRecords\t{rows}")?;
    write_comment(writer, "a `-' marks a record as protected")?;
    writeln!(writer, "long\tRecordAddresses[{}]", rows * 2)
}

/// Best-effort removal of an artifact during cleanup.
pub(crate) fn remove_if_exists(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), "failed to remove: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> IndexHeader {
        IndexHeader {
            model: "soils".to_string(),
            file_protected: false,
        }
    }

    fn scratch_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == SCRATCH_INDEX_EXTENSION)
            })
            .count()
    }

    #[test]
    fn committed_index_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.dfa");
        let mut index = IndexBuilder::create(path.clone(), false).unwrap();
        assert_eq!(scratch_files(dir.path()), 1);

        index.append(1, 1).unwrap();
        index.append(2, 4).unwrap();
        let finalized = index.finalize(Outcome::Success, &header()).unwrap();
        assert_eq!(
            finalized,
            Finalized::Committed {
                path: path.clone(),
                rows: 2
            }
        );

        let content = std::fs::read_to_string(&path).unwrap();
        let expected = "#\n#\tDfile Version\n#\n\
                        char\tVersion\t{Dfile01}\n\
                        #\n#\tDfile Model name\n#\n\
                        char\tModel\t{soils}\n\
                        char\tFileProtected\t{no}\n\
                        long\tNumRecords\t2\n\
                        #\n#\ta `-' marks a record as protected\n#\n\
                        long\tRecordAddresses[4]\n \
                        1\t1\n \
                        2\t4\n";
        assert_eq!(content, expected);
        assert_eq!(scratch_files(dir.path()), 0);
    }

    #[test]
    fn protection_markers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.dfa");
        let mut index = IndexBuilder::create(path.clone(), true).unwrap();
        index.append(1, 7).unwrap();
        let header = IndexHeader {
            file_protected: true,
            ..header()
        };
        index.finalize(Outcome::Success, &header).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("char\tFileProtected\t{yes}\n"));
        assert!(content.ends_with("long\tRecordAddresses[2]\n-1\t7\n"));
    }

    #[test]
    fn empty_index_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.dfa");
        let index = IndexBuilder::create(path.clone(), false).unwrap();
        assert_eq!(
            index.finalize(Outcome::Success, &header()).unwrap(),
            Finalized::Discarded
        );
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn failure_discards_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed.dfa");
        let mut index = IndexBuilder::create(path.clone(), false).unwrap();
        index.append(1, 1).unwrap();
        assert_eq!(
            index.finalize(Outcome::Failure, &header()).unwrap(),
            Finalized::Discarded
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
