//! One batch-sized prepared statement, re-bound per batch

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::{ImportReport, Importer};
use crate::batch::Batch;
use crate::reader::RecordReader;
use crate::record::{AuditStamp, Customer};
use crate::store::{Connection, PreparedInsert, Store};
use crate::Result;

pub struct PreparedChunkedImport {
    batch_size: usize,
}

impl PreparedChunkedImport {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

#[async_trait]
impl Importer for PreparedChunkedImport {
    fn name(&self) -> &'static str {
        "prepared-chunked"
    }

    async fn import(&self, store: Arc<dyn Store>, path: &Path) -> Result<ImportReport> {
        let stamp = AuditStamp::now();
        let mut report = ImportReport::new(self.name());
        let mut reader = RecordReader::open(path).await?;
        let mut conn = store.connect().await?;

        load_prepared_batches(
            conn.as_mut(),
            &mut reader,
            self.batch_size,
            &stamp,
            &mut report,
        )
        .await?;
        Ok(report)
    }
}

/// Streams `reader` into `conn` through a statement prepared for
/// `batch_size` rows. The trailing partial batch gets a second statement
/// prepared for exactly its own row count.
pub(crate) async fn load_prepared_batches(
    conn: &mut dyn Connection,
    reader: &mut RecordReader,
    batch_size: usize,
    stamp: &AuditStamp,
    report: &mut ImportReport,
) -> Result<()> {
    let mut batch: Batch<Customer> = Batch::with_capacity(batch_size)?;
    let mut full: Option<PreparedInsert> = None;

    while let Some(record) = reader.next_record().await? {
        report.records_read += 1;
        batch.push(record);
        if !batch.is_full() {
            continue;
        }
        if full.is_none() {
            full = Some(conn.prepare(batch_size).await?);
        }
        if let Some(statement) = &full {
            let rows = batch.drain();
            let written = conn.execute(statement, &rows, stamp).await?;
            report.record_flush(rows.len(), written);
        }
    }

    if !batch.is_empty() {
        let rows = batch.drain();
        let remainder = conn.prepare(rows.len()).await?;
        let written = conn.execute(&remainder, &rows, stamp).await?;
        report.record_flush(rows.len(), written);
    }

    Ok(())
}
