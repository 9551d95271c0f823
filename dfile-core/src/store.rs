//! Block allocator and chain writer.
//!
//! A store is an append-only text file of fixed-width lines. Line 0 is the
//! header carrying the version tag, the model name and the free-list head.
//! Every following line is one block: a payload padded to
//! [`PAYLOAD_WIDTH`] and a right-justified forward pointer of
//! [`ADDR_WIDTH`] characters. A chain is the run of blocks holding one
//! record or one memo; every block but the last points at the next block
//! number and the last carries [`CHAIN_END`].

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::{
    error::DfileError,
    layout::{ADDR_WIDTH, CHAIN_END, FREE_LIST_EMPTY, PAYLOAD_WIDTH, VERSION_TAG},
    BlockAddress, DfileResult,
};

/// Opens the writer behind a newly created store file.
pub trait StoreOpener {
    type Writer: Write;

    fn open(&self, path: &Path) -> std::io::Result<Self::Writer>;
}

/// Creates (or truncates) store files on the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileOpener;

impl StoreOpener for FileOpener {
    type Writer = BufWriter<File>;

    fn open(&self, path: &Path) -> std::io::Result<Self::Writer> {
        Ok(BufWriter::new(File::create(path)?))
    }
}

pub struct Store<W: Write> {
    path: PathBuf,
    writer: W,
    /// Data blocks emitted so far; the header block is not counted
    blocks_written: u64,
}

impl<W: Write> Store<W> {
    /// Start a new store on `writer` and write its header block.
    pub fn create(path: PathBuf, mut writer: W, model: &str) -> DfileResult<Self> {
        let header = Self::header_line(model);
        if let Err(source) = writer.write_all(header.as_bytes()) {
            return Err(DfileError::StoreWrite { path, source });
        }
        Ok(Self {
            path,
            writer,
            blocks_written: 0,
        })
    }

    /// The header line, right-padded so the free-list head ends where block
    /// pointers end.
    pub fn header_line(model: &str) -> String {
        let prefix = format!("Version={{{VERSION_TAG}}} Model={{{model}}}");
        let width = (PAYLOAD_WIDTH + ADDR_WIDTH).saturating_sub(prefix.len());
        format!("{prefix}{:>width$}\n", FREE_LIST_EMPTY, width = width)
    }

    /// Write `text` as a new chain and return the address of its first block.
    ///
    /// The text is split into `max(1, ceil(len / PAYLOAD_WIDTH))` blocks.
    pub fn write(&mut self, text: &str) -> DfileResult<BlockAddress> {
        let start = self.blocks_written + 1;
        let bytes = text.as_bytes();
        let chunks: Vec<&[u8]> = if bytes.is_empty() {
            vec![bytes]
        } else {
            bytes.chunks(PAYLOAD_WIDTH).collect()
        };

        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let pointer = if i == last {
                CHAIN_END
            } else {
                (start + i as u64 + 1) as i64
            };
            self.write_block(chunk, pointer)?;
        }

        Ok(start)
    }

    fn write_block(&mut self, payload: &[u8], pointer: i64) -> DfileResult<()> {
        let mut line = Vec::with_capacity(PAYLOAD_WIDTH + ADDR_WIDTH + 1);
        line.extend_from_slice(payload);
        line.resize(PAYLOAD_WIDTH, b' ');
        let pointer = format!("{:>width$}\n", pointer, width = ADDR_WIDTH);
        line.extend_from_slice(pointer.as_bytes());

        self.writer
            .write_all(&line)
            .map_err(|source| DfileError::StoreWrite {
                path: self.path.clone(),
                source,
            })?;
        self.blocks_written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> DfileResult<()> {
        self.writer
            .flush()
            .map_err(|source| DfileError::StoreWrite {
                path: self.path.clone(),
                source,
            })
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Split the store back into its path and writer.
    pub fn into_parts(self) -> (PathBuf, W) {
        (self.path, self.writer)
    }
}
