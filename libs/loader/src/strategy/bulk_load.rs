//! Store-native bulk file load

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use super::{ImportReport, Importer};
use crate::record::AuditStamp;
use crate::store::{BulkLoadSpec, LineTerminator, Store};
use crate::{Error, Result};

/// Hands the whole file to the store's native loader; no client-side rows.
pub struct BulkLoadImport;

#[async_trait]
impl Importer for BulkLoadImport {
    fn name(&self) -> &'static str {
        "bulk-load"
    }

    async fn import(&self, store: Arc<dyn Store>, path: &Path) -> Result<ImportReport> {
        if !store.capabilities().local_file_load {
            return Err(Error::Capability(format!(
                "{} store does not accept local files for bulk loading",
                store.name()
            )));
        }

        let line_terminator = detect_line_terminator(path).await?;
        let spec = BulkLoadSpec::customers(path, AuditStamp::now())
            .with_line_terminator(line_terminator);

        let mut report = ImportReport::new(self.name());
        let mut conn = store.connect().await?;
        let loaded = conn.bulk_load(&spec).await?;
        report.records_read = loaded;
        report.record_flush(loaded as usize, loaded);
        Ok(report)
    }
}

/// Looks at the first line ending of the file; LF when there is none.
pub(crate) async fn detect_line_terminator(path: &Path) -> Result<LineTerminator> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| Error::SourceOpen {
            path: path.to_path_buf(),
            source,
        })?;

    let mut buf = vec![0u8; 64 * 1024];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
        if let Some(pos) = buf[..filled].iter().position(|b| *b == b'\n') {
            let crlf = pos > 0 && buf[pos - 1] == b'\r';
            return Ok(if crlf {
                LineTerminator::CrLf
            } else {
                LineTerminator::Lf
            });
        }
    }
    Ok(LineTerminator::Lf)
}
