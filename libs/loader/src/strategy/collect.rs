//! Whole file, one statement

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::{ImportReport, Importer};
use crate::reader::read_all;
use crate::record::AuditStamp;
use crate::store::Store;
use crate::Result;

/// Reads the entire file, then writes it with a single multi-row INSERT.
///
/// Fails with the store's parameter ceiling once the file holds more than
/// `max_parameters / 9` records.
pub struct CollectAllImport;

#[async_trait]
impl Importer for CollectAllImport {
    fn name(&self) -> &'static str {
        "collect-all"
    }

    async fn import(&self, store: Arc<dyn Store>, path: &Path) -> Result<ImportReport> {
        let stamp = AuditStamp::now();
        let mut report = ImportReport::new(self.name());

        let records = read_all(path).await?;
        report.records_read = records.len() as u64;
        if records.is_empty() {
            return Ok(report);
        }

        let mut conn = store.connect().await?;
        let written = conn.insert(&records, &stamp).await?;
        report.record_flush(records.len(), written);
        Ok(report)
    }
}
