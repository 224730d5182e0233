//! Partitioned concurrent import
//!
//! Spawns one task per [`Partition`]. Each task opens its own reader over the
//! whole file and its own store connection, then runs the prepared-batch loop
//! over the lines it owns. Workers share nothing but the audit stamp.
//!
//! A failed worker does not cancel its siblings and its partition is not
//! retried: the orchestrator waits for every task, then reports the failures
//! alongside whatever every worker committed before it stopped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use super::prepared::load_prepared_batches;
use super::{ImportReport, Importer, WorkerReport};
use crate::partition::Partition;
use crate::reader::RecordReader;
use crate::record::AuditStamp;
use crate::store::Store;
use crate::{truncate_message, Error, Result};

pub struct PartitionedImport {
    workers: usize,
    batch_size: usize,
}

impl PartitionedImport {
    pub fn new(workers: usize, batch_size: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Config("worker count must be >= 1".to_string()));
        }
        if batch_size == 0 {
            return Err(Error::Config("batch size must be >= 1".to_string()));
        }
        Ok(Self {
            workers,
            batch_size,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

#[async_trait]
impl Importer for PartitionedImport {
    fn name(&self) -> &'static str {
        "partitioned"
    }

    async fn import(&self, store: Arc<dyn Store>, path: &Path) -> Result<ImportReport> {
        let stamp = AuditStamp::now();
        let plan = Partition::plan(self.workers)?;

        tracing::debug!(workers = plan.len(), path = %path.display(), "Spawning partition workers");

        let handles = plan
            .into_iter()
            .map(|partition| {
                let store = Arc::clone(&store);
                let path = path.to_path_buf();
                let stamp = stamp.clone();
                let batch_size = self.batch_size;
                tokio::spawn(async move {
                    run_worker(store, path, partition, batch_size, stamp).await
                })
            })
            .collect::<Vec<_>>();

        let mut report = ImportReport::new(self.name());
        let mut failures = Vec::new();

        for (index, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok((worker, outcome)) => {
                    report.records_read += worker.records_owned;
                    report.rows_written += worker.rows_written;
                    report.flushes += worker.flushes;
                    report.workers.push(worker);
                    if let Err(e) = outcome {
                        tracing::error!(worker = index, error = %e, "Partition worker failed");
                        failures.push(e.to_string());
                    }
                }
                Err(e) => {
                    tracing::error!(worker = index, error = %e, "Partition worker task join error");
                    failures.push(format!("worker {index} panicked or was aborted: {e}"));
                }
            }
        }

        if let Some(first) = failures.first() {
            return Err(Error::WorkersFailed {
                failed: failures.len(),
                workers: self.workers,
                rows_written: report.rows_written,
                first: truncate_message(first, 200),
            });
        }

        Ok(report)
    }
}

async fn run_worker(
    store: Arc<dyn Store>,
    path: PathBuf,
    partition: Partition,
    batch_size: usize,
    stamp: AuditStamp,
) -> (WorkerReport, Result<()>) {
    let mut progress = ImportReport::new("partitioned");
    let mut scanned = 0;
    let outcome = async {
        let mut reader = RecordReader::open_partition(&path, partition).await?;
        let mut conn = store.connect().await?;
        let loaded = load_prepared_batches(
            conn.as_mut(),
            &mut reader,
            batch_size,
            &stamp,
            &mut progress,
        )
        .await;
        scanned = reader.records_seen();
        loaded
    }
    .await;

    tracing::debug!(
        worker = %partition,
        scanned,
        rows = progress.rows_written,
        flushes = progress.flushes,
        ok = outcome.is_ok(),
        "Partition worker finished"
    );

    let report = WorkerReport {
        index: partition.index(),
        records_scanned: scanned,
        records_owned: progress.records_read,
        rows_written: progress.rows_written,
        flushes: progress.flushes,
    };
    (report, outcome)
}
