//! Interchangeable import strategies
//!
//! Every variant implements [`Importer`]; the benchmark harness only ever sees
//! the trait object. Variants differ in how much they buffer, how they batch,
//! and which write path of the [`Connection`] they use.

mod bulk_load;
mod chunked;
mod collect;
mod partitioned;
mod per_record;
mod prepared;

pub use bulk_load::BulkLoadImport;
pub use chunked::{ChunkedImport, RecordFilter, WriteMode};
pub use collect::CollectAllImport;
pub use partitioned::PartitionedImport;
pub use per_record::PerRecordImport;
pub use prepared::PreparedChunkedImport;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::reader::{read_all, RecordReader};
use crate::record::Customer;
use crate::store::Store;
use crate::{Error, Result};

/// Default number of workers for the partitioned strategy.
pub const DEFAULT_WORKERS: usize = 10;

#[async_trait]
pub trait Importer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Load every surviving record of `path` into the store.
    async fn import(&self, store: Arc<dyn Store>, path: &Path) -> Result<ImportReport>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub strategy: &'static str,
    /// Records pulled from the source (before any filter).
    pub records_read: u64,
    pub rows_written: u64,
    /// Write statements issued.
    pub flushes: u64,
    /// Rows in the final flush.
    pub last_flush_rows: usize,
    /// Per-worker breakdown; empty for single-worker strategies.
    pub workers: Vec<WorkerReport>,
}

impl ImportReport {
    pub fn new(strategy: &'static str) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    pub(crate) fn record_flush(&mut self, rows: usize, written: u64) {
        self.flushes += 1;
        self.last_flush_rows = rows;
        self.rows_written += written;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub index: usize,
    /// Lines read, owned or not.
    pub records_scanned: u64,
    /// Lines this worker materialized.
    pub records_owned: u64,
    pub rows_written: u64,
    pub flushes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// Whole file read into memory before the first write.
    Buffered,
    /// One record resident at a time.
    Streaming,
}

/// Pull-based record source over either a buffered vector or a live reader.
pub(crate) enum RecordSource {
    Buffered(std::vec::IntoIter<Customer>),
    Streaming(RecordReader),
}

impl RecordSource {
    pub(crate) async fn open(path: &Path, mode: SourceMode) -> Result<Self> {
        Ok(match mode {
            SourceMode::Buffered => RecordSource::Buffered(read_all(path).await?.into_iter()),
            SourceMode::Streaming => RecordSource::Streaming(RecordReader::open(path).await?),
        })
    }

    pub(crate) async fn next(&mut self) -> Result<Option<Customer>> {
        match self {
            RecordSource::Buffered(records) => Ok(records.next()),
            RecordSource::Streaming(reader) => reader.next_record().await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    pub batch_size: usize,
    pub workers: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    PerRecord,
    StreamPerRecord,
    PreparedPerRecord,
    CollectAll,
    CollectChunked,
    StreamChunked,
    StreamChunkedRaw,
    StreamChunkedFiltered,
    PreparedChunked,
    BulkLoad,
    Partitioned,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 11] = [
        StrategyKind::PerRecord,
        StrategyKind::StreamPerRecord,
        StrategyKind::PreparedPerRecord,
        StrategyKind::CollectAll,
        StrategyKind::CollectChunked,
        StrategyKind::StreamChunked,
        StrategyKind::StreamChunkedRaw,
        StrategyKind::StreamChunkedFiltered,
        StrategyKind::PreparedChunked,
        StrategyKind::BulkLoad,
        StrategyKind::Partitioned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::PerRecord => "per-record",
            StrategyKind::StreamPerRecord => "stream-per-record",
            StrategyKind::PreparedPerRecord => "prepared-per-record",
            StrategyKind::CollectAll => "collect-all",
            StrategyKind::CollectChunked => "collect-chunked",
            StrategyKind::StreamChunked => "stream-chunked",
            StrategyKind::StreamChunkedRaw => "stream-chunked-raw",
            StrategyKind::StreamChunkedFiltered => "stream-chunked-filtered",
            StrategyKind::PreparedChunked => "prepared-chunked",
            StrategyKind::BulkLoad => "bulk-load",
            StrategyKind::Partitioned => "partitioned",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StrategyKind::PerRecord => "whole file in memory, one INSERT per record",
            StrategyKind::StreamPerRecord => "streamed read, one INSERT per record",
            StrategyKind::PreparedPerRecord => "streamed read, one-row prepared statement re-executed",
            StrategyKind::CollectAll => "whole file in memory, a single multi-row INSERT",
            StrategyKind::CollectChunked => "whole file in memory, multi-row INSERT per batch",
            StrategyKind::StreamChunked => "streamed read, multi-row INSERT per batch",
            StrategyKind::StreamChunkedRaw => "streamed read, statement prepared per batch",
            StrategyKind::StreamChunkedFiltered => {
                "streamed read, invalid emails dropped, statement prepared per batch"
            }
            StrategyKind::PreparedChunked => {
                "streamed read, one batch-sized prepared statement reused, remainder sized exactly"
            }
            StrategyKind::BulkLoad => "store-native bulk file load",
            StrategyKind::Partitioned => "N workers, modulo line partitioning, prepared batches",
        }
    }

    pub fn build(&self, options: &ImportOptions) -> Result<Box<dyn Importer>> {
        let batch_size = options.batch_size;
        if batch_size == 0 {
            return Err(Error::Config("batch size must be >= 1".to_string()));
        }

        let importer: Box<dyn Importer> = match self {
            StrategyKind::PerRecord => Box::new(PerRecordImport::new(
                self.as_str(),
                SourceMode::Buffered,
                false,
            )),
            StrategyKind::StreamPerRecord => Box::new(PerRecordImport::new(
                self.as_str(),
                SourceMode::Streaming,
                false,
            )),
            StrategyKind::PreparedPerRecord => Box::new(PerRecordImport::new(
                self.as_str(),
                SourceMode::Streaming,
                true,
            )),
            StrategyKind::CollectAll => Box::new(CollectAllImport),
            StrategyKind::CollectChunked => Box::new(ChunkedImport::new(
                self.as_str(),
                SourceMode::Buffered,
                WriteMode::Builder,
                RecordFilter::All,
                batch_size,
            )),
            StrategyKind::StreamChunked => Box::new(ChunkedImport::new(
                self.as_str(),
                SourceMode::Streaming,
                WriteMode::Builder,
                RecordFilter::All,
                batch_size,
            )),
            StrategyKind::StreamChunkedRaw => Box::new(ChunkedImport::new(
                self.as_str(),
                SourceMode::Streaming,
                WriteMode::PreparePerBatch,
                RecordFilter::All,
                batch_size,
            )),
            StrategyKind::StreamChunkedFiltered => Box::new(ChunkedImport::new(
                self.as_str(),
                SourceMode::Streaming,
                WriteMode::PreparePerBatch,
                RecordFilter::ValidEmail,
                batch_size,
            )),
            StrategyKind::PreparedChunked => Box::new(PreparedChunkedImport::new(batch_size)),
            StrategyKind::BulkLoad => Box::new(BulkLoadImport),
            StrategyKind::Partitioned => {
                Box::new(PartitionedImport::new(options.workers, batch_size)?)
            }
        };
        Ok(importer)
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StrategyKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                Error::Config(format!(
                    "unknown strategy '{s}' (expected one of: {})",
                    StrategyKind::ALL
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}
