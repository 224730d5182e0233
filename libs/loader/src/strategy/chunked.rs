//! Fixed-size batches, one multi-row statement per batch

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::{ImportReport, Importer, RecordSource, SourceMode};
use crate::batch::Batch;
use crate::record::{AuditStamp, Customer};
use crate::store::{Connection, Store};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Statement text rebuilt for every batch, not cached.
    Builder,
    /// Statement prepared for the batch's exact size, then executed.
    PreparePerBatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    /// Drop records whose email does not validate.
    ValidEmail,
}

impl RecordFilter {
    fn keeps(&self, record: &Customer) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::ValidEmail => record.has_valid_email(),
        }
    }
}

pub struct ChunkedImport {
    name: &'static str,
    source: SourceMode,
    write: WriteMode,
    filter: RecordFilter,
    batch_size: usize,
}

impl ChunkedImport {
    pub fn new(
        name: &'static str,
        source: SourceMode,
        write: WriteMode,
        filter: RecordFilter,
        batch_size: usize,
    ) -> Self {
        Self {
            name,
            source,
            write,
            filter,
            batch_size,
        }
    }

    async fn flush(
        &self,
        conn: &mut dyn Connection,
        batch: &mut Batch<Customer>,
        stamp: &AuditStamp,
        report: &mut ImportReport,
    ) -> Result<()> {
        let rows = batch.drain();
        let written = match self.write {
            WriteMode::Builder => conn.insert(&rows, stamp).await?,
            WriteMode::PreparePerBatch => {
                let statement = conn.prepare(rows.len()).await?;
                conn.execute(&statement, &rows, stamp).await?
            }
        };
        report.record_flush(rows.len(), written);
        tracing::trace!(strategy = self.name, rows = rows.len(), "Flushed batch");
        Ok(())
    }
}

#[async_trait]
impl Importer for ChunkedImport {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn import(&self, store: Arc<dyn Store>, path: &Path) -> Result<ImportReport> {
        let stamp = AuditStamp::now();
        let mut report = ImportReport::new(self.name);
        let mut batch = Batch::with_capacity(self.batch_size)?;
        let mut source = RecordSource::open(path, self.source).await?;
        let mut conn = store.connect().await?;

        while let Some(record) = source.next().await? {
            report.records_read += 1;
            if !self.filter.keeps(&record) {
                continue;
            }
            batch.push(record);
            if batch.is_full() {
                self.flush(conn.as_mut(), &mut batch, &stamp, &mut report)
                    .await?;
            }
        }

        if !batch.is_empty() {
            self.flush(conn.as_mut(), &mut batch, &stamp, &mut report)
                .await?;
        }

        tracing::debug!(
            strategy = self.name,
            read = report.records_read,
            rows = report.rows_written,
            flushes = report.flushes,
            "Chunked import finished"
        );
        Ok(report)
    }
}
