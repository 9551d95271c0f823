//! Memo resolution: fetching out-of-line memo text from the source blob store.

use std::io::{Read, Seek, SeekFrom};

use crate::{
    layout::{MEMO_BLOCK_SIZE, MEMO_END, MEMO_MAX_BYTES, NO_MEMO},
    transcoder::trim_text,
};

/// Random-access byte source addressed by `block × MEMO_BLOCK_SIZE`.
pub trait BlobStore {
    /// Total length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read up to `limit` bytes starting at `offset`. Short reads at the end
    /// of the store are not errors.
    fn read_at(&mut self, offset: u64, limit: usize) -> std::io::Result<Vec<u8>>;
}

/// [`BlobStore`] over any seekable reader, typically a `.dbt` file.
pub struct MemoStore<R> {
    inner: R,
    len: u64,
}

impl<R: Read + Seek> MemoStore<R> {
    pub fn new(mut inner: R) -> std::io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        Ok(Self { inner, len })
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> BlobStore for MemoStore<R> {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, offset: u64, limit: usize) -> std::io::Result<Vec<u8>> {
        self.inner.seek(SeekFrom::Start(offset))?;
        let mut buffer = Vec::with_capacity(limit);
        (&mut self.inner).take(limit as u64).read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

/// Fetch and trim the memo starting at block `address`.
///
/// Returns `Ok(None)` when there is no store, the address is `0`, or the
/// address lies past the end of the store. Memos longer than
/// [`MEMO_MAX_BYTES`] are silently truncated. I/O failures on an otherwise
/// valid read are returned to the caller.
pub fn resolve(
    store: Option<&mut dyn BlobStore>,
    address: u64,
) -> std::io::Result<Option<String>> {
    let Some(store) = store else {
        if address != NO_MEMO {
            tracing::debug!(address, "memo referenced but source has no memo store");
        }
        return Ok(None);
    };
    if address == NO_MEMO {
        return Ok(None);
    }

    let offset = match address.checked_mul(MEMO_BLOCK_SIZE) {
        Some(offset) if offset < store.len() => offset,
        _ => {
            tracing::debug!(address, store_len = store.len(), "memo address out of range");
            return Ok(None);
        }
    };

    let mut bytes = store.read_at(offset, MEMO_MAX_BYTES)?;
    if let Some(end) = bytes.iter().position(|&byte| byte == MEMO_END) {
        bytes.truncate(end);
    }

    Ok(Some(trim_text(&bytes)))
}
