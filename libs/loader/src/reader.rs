//! Streaming CSV record reader
//!
//! Wraps a `csv_async` reader over a `tokio::fs::File`. The header line is
//! consumed by the CSV reader and never surfaces as data. Records are pulled
//! one at a time in source order, so memory stays bounded by one raw record
//! regardless of file size.

use std::path::{Path, PathBuf};

use csv_async::{AsyncReader, AsyncReaderBuilder, ByteRecord};
use tokio::fs::File;

use crate::{partition::Partition, record::Customer, Error, Result};

pub struct RecordReader {
    path: PathBuf,
    csv: AsyncReader<File>,
    raw: ByteRecord,
    partition: Partition,
    seen: u64,
    materialized: u64,
}

impl RecordReader {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_partition(path, Partition::whole()).await
    }

    /// Reader that scans every line but only materializes lines owned by `partition`.
    pub async fn open_partition(path: impl AsRef<Path>, partition: Partition) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|source| Error::SourceOpen {
            path: path.clone(),
            source,
        })?;

        let csv = AsyncReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(b',')
            .quote(b'"')
            .buffer_capacity(1 << 16)
            .create_reader(file);

        Ok(Self {
            path,
            csv,
            raw: ByteRecord::new(),
            partition,
            seen: 0,
            materialized: 0,
        })
    }

    /// Next owned record, or `None` once the source is exhausted.
    pub async fn next_record(&mut self) -> Result<Option<Customer>> {
        loop {
            if !self.csv.read_byte_record(&mut self.raw).await? {
                return Ok(None);
            }

            let line_index = self.seen;
            self.seen += 1;
            let line = self.line_number();

            if self.raw.len() != Customer::FIELD_COUNT {
                return Err(Error::MalformedRecord {
                    line,
                    expected: Customer::FIELD_COUNT,
                    found: self.raw.len(),
                });
            }

            if !self.partition.owns(line_index) {
                continue;
            }

            let fields = self
                .raw
                .iter()
                .map(|field| String::from_utf8(field.to_vec()))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| Error::Encoding { line })?;

            let customer = Customer::from_fields(fields).ok_or_else(|| {
                Error::Internal(format!("field count changed while decoding line {line}"))
            })?;
            self.materialized += 1;
            return Ok(Some(customer));
        }
    }

    /// Data lines scanned so far, owned or not.
    pub fn records_seen(&self) -> u64 {
        self.seen
    }

    pub fn records_materialized(&self) -> u64 {
        self.materialized
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // 1-based physical line of the current record; the header is line 1.
    fn line_number(&self) -> u64 {
        self.raw
            .position()
            .map(|pos| pos.line())
            .unwrap_or(self.seen + 1)
    }
}

/// Reads every record into memory. Only the buffered strategies use this.
pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<Customer>> {
    let mut reader = RecordReader::open(path).await?;
    let mut records = Vec::new();
    while let Some(record) = reader.next_record().await? {
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "Customer Id,Name,Email,Company,City,Country,Birthday";

    fn write_csv(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn skips_header_and_reads_in_order() {
        let file = write_csv(&format!(
            "{HEADER}\n1,Ann,ann@example.com,Acme,Oslo,Norway,1990-01-02\n2,Bob,bob@example.com,Initech,Rome,Italy,1985-07-30\n"
        ));
        let mut reader = RecordReader::open(file.path()).await.unwrap();

        let first = reader.next_record().await.unwrap().unwrap();
        assert_eq!(first.custom_id, "1");
        assert_eq!(first.birthday, "1990-01-02");
        let second = reader.next_record().await.unwrap().unwrap();
        assert_eq!(second.name, "Bob");
        assert!(reader.next_record().await.unwrap().is_none());
        assert_eq!(reader.records_seen(), 2);
    }

    #[tokio::test]
    async fn handles_quotes_and_crlf() {
        let file = write_csv(&format!(
            "{HEADER}\r\n\"7\",\"Smith, Jane\",jane@example.com,\"Foo \"\"Bar\"\"\",Lyon,France,2001-12-31\r\n"
        ));
        let records = read_all(file.path()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Smith, Jane");
        assert_eq!(records[0].company, "Foo \"Bar\"");
        assert_eq!(records[0].birthday, "2001-12-31");
    }

    #[tokio::test]
    async fn header_only_and_empty_files_yield_nothing() {
        let header_only = write_csv(&format!("{HEADER}\n"));
        assert!(read_all(header_only.path()).await.unwrap().is_empty());

        let empty = write_csv("");
        assert!(read_all(empty.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn short_line_is_reported_with_its_line_number() {
        let file = write_csv(&format!(
            "{HEADER}\n1,a,a@x.io,c,d,e,1990-01-01\n2,b,b@x.io,c,d,1990-01-01\n"
        ));
        let mut reader = RecordReader::open(file.path()).await.unwrap();
        assert!(reader.next_record().await.unwrap().is_some());
        match reader.next_record().await {
            Err(Error::MalformedRecord { line, found, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(found, 6);
            }
            other => panic!("expected malformed record, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_a_source_error() {
        let err = RecordReader::open("/nonexistent/customers.csv")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::SourceOpen { .. }));
    }

    #[tokio::test]
    async fn partition_materializes_only_owned_lines() {
        let mut body = format!("{HEADER}\n");
        for i in 0..10 {
            body.push_str(&format!("{i},n,e{i}@x.io,c,d,e,1990-01-01\n"));
        }
        let file = write_csv(&body);
        let partition = Partition::new(1, 3).unwrap();
        let mut reader = RecordReader::open_partition(file.path(), partition)
            .await
            .unwrap();

        let mut ids = Vec::new();
        while let Some(record) = reader.next_record().await.unwrap() {
            ids.push(record.custom_id);
        }
        assert_eq!(ids, vec!["1", "4", "7"]);
        assert_eq!(reader.records_seen(), 10);
        assert_eq!(reader.records_materialized(), 3);
    }
}
