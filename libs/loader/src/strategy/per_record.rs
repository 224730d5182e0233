//! One statement per record

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::{ImportReport, Importer, RecordSource, SourceMode};
use crate::record::AuditStamp;
use crate::store::Store;
use crate::Result;

/// Writes each record with its own statement.
///
/// With `prepared` set, a single-row statement is prepared once and
/// re-executed; otherwise every record gets a freshly built INSERT.
pub struct PerRecordImport {
    name: &'static str,
    source: SourceMode,
    prepared: bool,
}

impl PerRecordImport {
    pub fn new(name: &'static str, source: SourceMode, prepared: bool) -> Self {
        Self {
            name,
            source,
            prepared,
        }
    }
}

#[async_trait]
impl Importer for PerRecordImport {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn import(&self, store: Arc<dyn Store>, path: &Path) -> Result<ImportReport> {
        let stamp = AuditStamp::now();
        let mut report = ImportReport::new(self.name);
        let mut source = RecordSource::open(path, self.source).await?;
        let mut conn = store.connect().await?;

        let statement = if self.prepared {
            Some(conn.prepare(1).await?)
        } else {
            None
        };

        while let Some(record) = source.next().await? {
            report.records_read += 1;
            let row = std::slice::from_ref(&record);
            let written = match &statement {
                Some(statement) => conn.execute(statement, row, &stamp).await?,
                None => conn.insert(row, &stamp).await?,
            };
            report.record_flush(1, written);
        }

        tracing::debug!(
            strategy = self.name,
            rows = report.rows_written,
            "Per-record import finished"
        );
        Ok(report)
    }
}
