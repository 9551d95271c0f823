//! One store/index pair and the per-record write sequence into it.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    error::DfileError,
    index::{remove_if_exists, Finalized, IndexBuilder, IndexHeader, Outcome},
    layout::{INDEX_EXTENSION, NO_MEMO, STORE_EXTENSION},
    options::ConvertOptions,
    router::PartitionId,
    store::{Store, StoreOpener},
    transcoder::{join_fields, FieldValue, TranscodedRecord},
    BlockAddress, DfileResult,
};

pub struct Partition<W: Write> {
    id: PartitionId,
    store: Store<W>,
    index: IndexBuilder,
    header: IndexHeader,
}

/// A partition whose store and index are both on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommittedPartition {
    pub id: PartitionId,
    pub store_path: PathBuf,
    pub index_path: PathBuf,
    pub records: u64,
    pub blocks: u64,
}

impl CommittedPartition {
    /// Remove both artifacts, used to roll back a run that fails after this
    /// partition was committed.
    pub fn remove(&self) {
        remove_if_exists(&self.store_path);
        remove_if_exists(&self.index_path);
    }
}

impl<W: Write> Partition<W> {
    /// Create the store (writing its header) and the scratch index for `id`.
    pub fn open<O>(id: PartitionId, opener: &O, options: &ConvertOptions) -> DfileResult<Self>
    where
        O: StoreOpener<Writer = W>,
    {
        let stem = id.file_stem(&options.destination);
        let dir = options.output_dir();
        let store_path = artifact_path(dir, &stem, STORE_EXTENSION);
        let index_path = artifact_path(dir, &stem, INDEX_EXTENSION);

        let writer = opener
            .open(&store_path)
            .map_err(|source| DfileError::StoreWrite {
                path: store_path.clone(),
                source,
            })?;
        let store = match Store::create(store_path.clone(), writer, options.model_name()) {
            Ok(store) => store,
            Err(err) => {
                remove_if_exists(&store_path);
                return Err(err);
            }
        };

        let index = match IndexBuilder::create(index_path, options.protect_records) {
            Ok(index) => index,
            Err(err) => {
                let (path, writer) = store.into_parts();
                drop(writer);
                remove_if_exists(&path);
                return Err(err);
            }
        };

        tracing::debug!(partition = %id, store = %store.path().display(), "opened partition");
        Ok(Self {
            id,
            store,
            index,
            header: IndexHeader {
                model: options.model_name().to_string(),
                file_protected: options.protect_file,
            },
        })
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    pub fn records(&self) -> u64 {
        self.index.rows()
    }

    /// Write a record's memo chains, then the record chain, then its index
    /// row. Returns the record's logical id and chain-start address.
    pub fn write_record(&mut self, record: &TranscodedRecord) -> DfileResult<(u64, BlockAddress)> {
        let mut texts = Vec::with_capacity(record.fields.len());
        for field in &record.fields {
            let text = match field {
                FieldValue::Text(text) => text.clone(),
                FieldValue::Memo(Some(memo)) => self.store.write(memo)?.to_string(),
                FieldValue::Memo(None) => NO_MEMO.to_string(),
            };
            texts.push(text);
        }

        let address = self.store.write(&join_fields(texts.iter().map(String::as_str)))?;
        let logical_id = self.index.next_logical_id();
        self.index.append(logical_id, address)?;
        Ok((logical_id, address))
    }

    /// Close the partition. A successful, non-empty partition is committed;
    /// anything else leaves no store, index or scratch file behind.
    pub fn finalize(self, outcome: Outcome) -> DfileResult<Option<CommittedPartition>> {
        let Self {
            id,
            mut store,
            index,
            header,
        } = self;

        let outcome = match (outcome, store.flush()) {
            (Outcome::Success, Err(err)) => {
                discard(store, index, &header);
                return Err(err);
            }
            (outcome, _) => outcome,
        };

        let blocks = store.blocks_written();
        let (store_path, writer) = store.into_parts();
        drop(writer);

        match index.finalize(outcome, &header) {
            Ok(Finalized::Committed { path, rows }) => {
                tracing::info!(partition = %id, records = rows, blocks, "committed {}", path.display());
                Ok(Some(CommittedPartition {
                    id,
                    store_path,
                    index_path: path,
                    records: rows,
                    blocks,
                }))
            }
            Ok(Finalized::Discarded) => {
                remove_if_exists(&store_path);
                Ok(None)
            }
            Err(err) => {
                remove_if_exists(&store_path);
                Err(err)
            }
        }
    }
}

fn discard<W: Write>(store: Store<W>, index: IndexBuilder, header: &IndexHeader) {
    let (store_path, writer) = store.into_parts();
    drop(writer);
    if let Err(err) = index.finalize(Outcome::Failure, header) {
        tracing::warn!("failed to discard index: {err}");
    }
    remove_if_exists(&store_path);
}

fn artifact_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    dir.join(format!("{stem}.{extension}"))
}
