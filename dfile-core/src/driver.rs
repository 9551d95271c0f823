//! Conversion driver.
//!
//! Pulls records from a [`RecordSource`], transcodes each one completely in
//! memory, routes it, and writes it into its partition. At the end of the
//! input every touched partition is committed; on the first fatal error
//! every touched partition is discarded instead, including partitions that
//! were already committed when the failure happened during commit.

use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    error::DfileError,
    index::Outcome,
    memo,
    options::{ConvertOptions, TombstonePolicy},
    partition::{CommittedPartition, Partition},
    router::{PartitionId, Router},
    source::{FieldDescriptor, RawRecord, RecordSource, SourceHeader},
    store::{FileOpener, StoreOpener},
    transcoder::{transcode, FieldValue, Transcoded, TranscodedRecord},
    DfileResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConversionState {
    Init,
    Streaming,
    Done,
    Aborted,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionReport {
    /// Source records pulled from the stream, skipped ones included
    pub records_read: u64,
    pub records_converted: u64,
    /// Tombstoned records dropped by [`TombstonePolicy::Skip`]
    pub records_skipped: u64,
    /// Committed partitions in order of first use
    pub partitions: Vec<CommittedPartition>,
}

pub struct Converter<O: StoreOpener = FileOpener> {
    options: ConvertOptions,
    opener: O,
    state: ConversionState,
    partitions: IndexMap<PartitionId, Partition<O::Writer>>,
    records_read: u64,
    records_converted: u64,
    records_skipped: u64,
}

impl Converter<FileOpener> {
    pub fn new(options: ConvertOptions) -> Self {
        Self::with_opener(options, FileOpener)
    }
}

impl<O: StoreOpener> Converter<O> {
    /// A converter writing its stores through `opener`.
    pub fn with_opener(options: ConvertOptions, opener: O) -> Self {
        Self {
            options,
            opener,
            state: ConversionState::Init,
            partitions: IndexMap::new(),
            records_read: 0,
            records_converted: 0,
            records_skipped: 0,
        }
    }

    pub fn state(&self) -> ConversionState {
        self.state
    }

    /// Records pulled from the source so far. After an abort this is the
    /// number of the record that failed, or the last one read.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert the whole `source`. A converter runs once.
    pub fn run<S: RecordSource>(&mut self, source: &mut S) -> DfileResult<ConversionReport> {
        if self.state != ConversionState::Init {
            return Err(DfileError::AlreadyStarted(self.state));
        }

        let setup = self
            .options
            .validate()
            .and_then(|()| check_header(source.header()))
            .and_then(|()| Router::new(self.options.split_field, &source.header().fields));
        let router = match setup {
            Ok(router) => router,
            Err(err) => {
                self.state = ConversionState::Aborted;
                return Err(err);
            }
        };

        self.state = ConversionState::Streaming;
        let result = self
            .stream(source, &router)
            .and_then(|()| self.commit_all());

        match result {
            Ok(partitions) => {
                self.state = ConversionState::Done;
                tracing::info!(
                    records = self.records_converted,
                    skipped = self.records_skipped,
                    partitions = partitions.len(),
                    "converted {} records",
                    self.records_converted
                );
                Ok(ConversionReport {
                    records_read: self.records_read,
                    records_converted: self.records_converted,
                    records_skipped: self.records_skipped,
                    partitions,
                })
            }
            Err(err) => {
                self.state = ConversionState::Aborted;
                tracing::error!(record = self.records_read, "conversion aborted: {err}");
                self.abort_all();
                Err(err)
            }
        }
    }

    fn stream<S: RecordSource>(&mut self, source: &mut S, router: &Router) -> DfileResult<()> {
        let total = source.header().record_count;
        let record_width = source.header().record_width;
        let fields = source.header().fields.clone();
        let step = total / 100 + 1;

        while let Some(next) = source.next_record() {
            self.records_read += 1;
            let record_number = self.records_read;
            let _span = tracing::debug_span!("record", number = record_number).entered();

            let raw = next.map_err(|err| DfileError::Source {
                record: record_number,
                source: Box::new(err),
            })?;

            if raw.bytes.len() < record_width {
                return Err(DfileError::ShortRecord {
                    record: record_number,
                    expected: record_width,
                    actual: raw.bytes.len(),
                });
            }

            if raw.tombstoned && self.options.tombstones == TombstonePolicy::Skip {
                tracing::warn!(record = record_number, "skipping deleted record");
                self.records_skipped += 1;
            } else {
                let record = transcode_record(source, &fields, &raw, record_number)?;
                let partition_id = router.route(&record);
                let partition = match self.partitions.entry(partition_id) {
                    indexmap::map::Entry::Occupied(entry) => entry.into_mut(),
                    indexmap::map::Entry::Vacant(entry) => {
                        let partition =
                            Partition::open(partition_id, &self.opener, &self.options)?;
                        entry.insert(partition)
                    }
                };
                let (logical_id, address) = partition.write_record(&record)?;
                tracing::trace!(partition = %partition_id, logical_id, address, "wrote record");
                self.records_converted += 1;
            }

            if self.options.report_progress && record_number % step == 0 && total > 0 {
                let percent = (record_number * 100 / total).min(100);
                tracing::info!(record = record_number, total, "{percent}% converted");
            }
        }
        Ok(())
    }

    /// Commit every partition. If any commit fails, the ones already
    /// committed are removed and the rest are discarded.
    fn commit_all(&mut self) -> DfileResult<Vec<CommittedPartition>> {
        let mut committed = Vec::with_capacity(self.partitions.len());
        while let Some((_, partition)) = self.partitions.shift_remove_index(0) {
            match partition.finalize(Outcome::Success) {
                Ok(Some(done)) => committed.push(done),
                Ok(None) => {}
                Err(err) => {
                    tracing::error!("rolling back {} committed partitions", committed.len());
                    for done in &committed {
                        done.remove();
                    }
                    return Err(err);
                }
            }
        }
        Ok(committed)
    }

    fn abort_all(&mut self) {
        for (id, partition) in self.partitions.drain(..) {
            if let Err(err) = partition.finalize(Outcome::Failure) {
                tracing::warn!(partition = %id, "cleanup failed: {err}");
            }
        }
    }
}

/// Field widths must add up to the declared record width, otherwise records
/// cannot be sliced into fields.
fn check_header(header: &SourceHeader) -> DfileResult<()> {
    let field_width: usize = header.fields.iter().map(|field| field.width).sum();
    if field_width != header.record_width {
        return Err(DfileError::InconsistentHeader {
            record_width: header.record_width,
            field_width,
        });
    }
    Ok(())
}

/// Transcode every field of `raw`, resolving memo references against the
/// source's memo store.
fn transcode_record<S: RecordSource>(
    source: &mut S,
    descriptors: &[FieldDescriptor],
    raw: &RawRecord,
    record_number: u64,
) -> DfileResult<TranscodedRecord> {
    let mut fields = Vec::with_capacity(descriptors.len());
    let mut offset = 0;
    for descriptor in descriptors {
        let end = offset + descriptor.width;
        let bytes = raw
            .bytes
            .get(offset..end)
            .ok_or(DfileError::ShortRecord {
                record: record_number,
                expected: end,
                actual: raw.bytes.len(),
            })?;
        offset = end;

        let value = match transcode(bytes, descriptor) {
            Transcoded::Text(text) => FieldValue::Text(text),
            Transcoded::MemoRef(address) => {
                let memo = memo::resolve(source.memo_store(), address).map_err(|source| {
                    DfileError::MemoRead {
                        record: record_number,
                        address,
                        source,
                    }
                })?;
                FieldValue::Memo(memo)
            }
        };
        fields.push(value);
    }
    Ok(TranscodedRecord::new(fields))
}
