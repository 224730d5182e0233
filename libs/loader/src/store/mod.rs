//! Destination store abstraction
//!
//! Strategies talk to a [`Store`], which hands out independent
//! [`Connection`]s. Workers of the partitioned strategy each open their own;
//! connections are never shared across tasks.

mod memory;
mod postgres;

pub use memory::{MemoryStore, MemoryStoreOptions, StatementKind, StatementLog};
pub use postgres::{PgStore, PgStoreOptions};

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::record::{AuditStamp, Customer, CUSTOMERS_TABLE, CUSTOMER_COLUMNS, PARAMS_PER_ROW};
use crate::{Error, Result};

/// Postgres' bind-parameter ceiling per statement.
pub const POSTGRES_MAX_PARAMETERS: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Store accepts a client-side file for native bulk ingestion.
    pub local_file_load: bool,
    /// Maximum bind parameters in one statement.
    pub max_parameters: usize,
}

#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Open a new, independent connection.
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

#[async_trait]
pub trait Connection: Send {
    /// One freshly built multi-row INSERT for `rows`.
    async fn insert(&mut self, rows: &[Customer], stamp: &AuditStamp) -> Result<u64>;

    /// Prepare a reusable INSERT template for exactly `rows` rows.
    async fn prepare(&mut self, rows: usize) -> Result<PreparedInsert>;

    /// Re-bind `statement` with `rows`; `rows.len()` must match its size.
    async fn execute(
        &mut self,
        statement: &PreparedInsert,
        rows: &[Customer],
        stamp: &AuditStamp,
    ) -> Result<u64>;

    /// Native file ingestion; fails before reading the file if unsupported.
    async fn bulk_load(&mut self, spec: &BulkLoadSpec) -> Result<u64>;

    async fn row_count(&mut self) -> Result<u64>;

    /// Store-wide cumulative count of statements issued by any connection.
    /// The read counts itself.
    async fn statement_count(&mut self) -> Result<u64>;

    async fn truncate(&mut self) -> Result<()>;
}

/// Shared, store-wide count of issued statements.
#[derive(Debug, Clone, Default)]
pub struct StatementCounter(Arc<AtomicU64>);

impl StatementCounter {
    pub fn record(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_many(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Handle to an INSERT template sized for a fixed number of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedInsert {
    rows: usize,
    sql: Arc<str>,
}

impl PreparedInsert {
    pub fn new(rows: usize, sql: impl Into<Arc<str>>) -> Self {
        Self {
            rows,
            sql: sql.into(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn parameters(&self) -> usize {
        self.rows * PARAMS_PER_ROW
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn check_arity(&self, rows: &[Customer]) -> Result<()> {
        if rows.len() != self.rows {
            return Err(Error::PreparedArity {
                expected: self.rows,
                actual: rows.len(),
            });
        }
        Ok(())
    }
}

/// Rejects statements binding more parameters than the store accepts.
pub fn check_parameter_limit(rows: usize, capabilities: &Capabilities) -> Result<()> {
    let params = rows * PARAMS_PER_ROW;
    if params > capabilities.max_parameters {
        return Err(Error::ParameterLimit {
            params,
            limit: capabilities.max_parameters,
        });
    }
    Ok(())
}

/// `INSERT INTO customers (...) VALUES ($1, ..., $9::timestamp), ...` for `rows` rows.
pub fn insert_sql(rows: usize) -> String {
    let mut sql = format!(
        "INSERT INTO {CUSTOMERS_TABLE} ({}) VALUES ",
        CUSTOMER_COLUMNS.join(", ")
    );
    sql.reserve(rows * 64);
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        let base = row * PARAMS_PER_ROW;
        sql.push_str(&format!(
            "(${}, ${}, ${}, ${}, ${}, ${}, ${}::date, ${}::timestamp, ${}::timestamp)",
            base + 1,
            base + 2,
            base + 3,
            base + 4,
            base + 5,
            base + 6,
            base + 7,
            base + 8,
            base + 9,
        ));
    }
    sql
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTerminator {
    Lf,
    CrLf,
}

impl LineTerminator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineTerminator::Lf => "\n",
            LineTerminator::CrLf => "\r\n",
        }
    }
}

/// What a store-native loader needs: the file, how to parse it, where fields go.
#[derive(Debug, Clone)]
pub struct BulkLoadSpec {
    pub path: PathBuf,
    pub table: String,
    /// `(source field index, destination column)` pairs.
    pub columns: Vec<(usize, String)>,
    pub delimiter: u8,
    pub quote: u8,
    /// Line ending detected in the file. Informational: Postgres `COPY` in
    /// CSV format and the in-process CSV reader both accept LF and CRLF.
    pub line_terminator: LineTerminator,
    /// Leading lines to skip (the header).
    pub skip_lines: usize,
    pub stamp: AuditStamp,
}

impl BulkLoadSpec {
    /// Canonical mapping of the 7-column customer file onto the customers table.
    pub fn customers(path: impl Into<PathBuf>, stamp: AuditStamp) -> Self {
        Self {
            path: path.into(),
            table: CUSTOMERS_TABLE.to_string(),
            columns: CUSTOMER_COLUMNS[..Customer::FIELD_COUNT]
                .iter()
                .enumerate()
                .map(|(i, column)| (i, column.to_string()))
                .collect(),
            delimiter: b',',
            quote: b'"',
            line_terminator: LineTerminator::Lf,
            skip_lines: 1,
            stamp,
        }
    }

    pub fn with_line_terminator(mut self, line_terminator: LineTerminator) -> Self {
        self.line_terminator = line_terminator;
        self
    }

    /// Destination column list in field order.
    pub fn column_list(&self) -> String {
        let mut columns = self.columns.clone();
        columns.sort_by_key(|(field, _)| *field);
        columns
            .into_iter()
            .map(|(_, column)| column)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
