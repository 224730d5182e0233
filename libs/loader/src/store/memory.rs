//! In-process store
//!
//! Keeps rows in a shared vector and logs every statement it receives, so
//! strategies can be exercised and measured without a database server.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    check_parameter_limit, insert_sql, BulkLoadSpec, Capabilities, Connection, PreparedInsert,
    StatementCounter, Store, POSTGRES_MAX_PARAMETERS,
};
use crate::reader::RecordReader;
use crate::record::{AuditStamp, Customer, CUSTOMERS_TABLE};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct MemoryStoreOptions {
    pub local_file_load: bool,
    pub max_parameters: usize,
}

impl Default for MemoryStoreOptions {
    fn default() -> Self {
        Self {
            local_file_load: true,
            max_parameters: POSTGRES_MAX_PARAMETERS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Insert,
    Execute,
    BulkLoad,
    RowCount,
    StatementCount,
    Truncate,
}

impl StatementKind {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            StatementKind::Insert | StatementKind::Execute | StatementKind::BulkLoad
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementLog {
    pub kind: StatementKind,
    /// Rows bound (writes) or zero (bookkeeping).
    pub rows: usize,
    pub connection: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub customer: Customer,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Default)]
struct MemoryState {
    rows: Vec<StoredRow>,
    log: Vec<StatementLog>,
    rejected_ids: HashSet<String>,
    failing_reads: HashSet<StatementKind>,
}

#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    counter: StatementCounter,
    connections: Arc<AtomicUsize>,
    options: MemoryStoreOptions,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_options(MemoryStoreOptions::default())
    }

    pub fn with_options(options: MemoryStoreOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            counter: StatementCounter::default(),
            connections: Arc::new(AtomicUsize::new(0)),
            options,
        }
    }

    /// Any statement carrying a row with this id fails as a constraint violation.
    pub fn reject_custom_id(&self, custom_id: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.rejected_ids.insert(custom_id.into());
        }
    }

    /// Makes every later `row_count` or `statement_count` call fail without
    /// reaching the store. Other kinds are ignored.
    pub fn fail_reads(&self, kind: StatementKind) {
        if !matches!(kind, StatementKind::RowCount | StatementKind::StatementCount) {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            state.failing_reads.insert(kind);
        }
    }

    pub fn rows(&self) -> Vec<StoredRow> {
        self.state
            .lock()
            .map(|state| state.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_total(&self) -> usize {
        self.state.lock().map(|state| state.rows.len()).unwrap_or(0)
    }

    pub fn statement_log(&self) -> Vec<StatementLog> {
        self.state
            .lock()
            .map(|state| state.log.clone())
            .unwrap_or_default()
    }

    /// Writes only, bookkeeping reads excluded.
    pub fn write_log(&self) -> Vec<StatementLog> {
        self.statement_log()
            .into_iter()
            .filter(|entry| entry.kind.is_write())
            .collect()
    }

    /// Connections opened so far.
    pub fn connections_opened(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }

    fn log(&self, state: &mut MemoryState, kind: StatementKind, rows: usize, connection: usize) {
        self.counter.record();
        state.log.push(StatementLog {
            kind,
            rows,
            connection,
        });
    }

    // A statement lands all of its rows or none of them.
    fn write(
        &self,
        kind: StatementKind,
        rows: &[Customer],
        stamp: &AuditStamp,
        connection: usize,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut state = self.lock()?;
        self.log(&mut state, kind, rows.len(), connection);

        check_parameter_limit(rows.len(), &self.options_capabilities())?;
        if let Some(bad) = rows
            .iter()
            .find(|row| state.rejected_ids.contains(&row.custom_id))
        {
            return Err(Error::Constraint(format!(
                "duplicate key value violates unique constraint (custom_id)=({})",
                bad.custom_id
            )));
        }

        state.rows.extend(rows.iter().map(|customer| StoredRow {
            customer: customer.clone(),
            created_at: stamp.as_str().to_string(),
            updated_at: stamp.as_str().to_string(),
        }));
        Ok(rows.len() as u64)
    }

    fn options_capabilities(&self) -> Capabilities {
        Capabilities {
            local_file_load: self.options.local_file_load,
            max_parameters: self.options.max_parameters,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        self.options_capabilities()
    }

    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let id = self.connections.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryConnection {
            id,
            store: self.clone(),
            prepared: HashSet::new(),
        }))
    }
}

struct MemoryConnection {
    id: usize,
    store: MemoryStore,
    prepared: HashSet<Arc<str>>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn insert(&mut self, rows: &[Customer], stamp: &AuditStamp) -> Result<u64> {
        self.store.write(StatementKind::Insert, rows, stamp, self.id)
    }

    async fn prepare(&mut self, rows: usize) -> Result<PreparedInsert> {
        if rows == 0 {
            return Err(Error::Internal(
                "cannot prepare an insert for zero rows".to_string(),
            ));
        }
        check_parameter_limit(rows, &self.store.capabilities())?;
        let statement = PreparedInsert::new(rows, insert_sql(rows));
        self.prepared.insert(Arc::from(statement.sql()));
        Ok(statement)
    }

    async fn execute(
        &mut self,
        statement: &PreparedInsert,
        rows: &[Customer],
        stamp: &AuditStamp,
    ) -> Result<u64> {
        if !self.prepared.contains(statement.sql()) {
            return Err(Error::Internal(format!(
                "statement for {} rows was not prepared on connection {}",
                statement.rows(),
                self.id
            )));
        }
        statement.check_arity(rows)?;
        self.store
            .write(StatementKind::Execute, rows, stamp, self.id)
    }

    async fn bulk_load(&mut self, spec: &BulkLoadSpec) -> Result<u64> {
        if !self.store.capabilities().local_file_load {
            return Err(Error::Capability(
                "local file loading is disabled for this store".to_string(),
            ));
        }
        if spec.table != CUSTOMERS_TABLE {
            return Err(Error::Config(format!("unknown table {}", spec.table)));
        }
        if spec.skip_lines != 1 || spec.delimiter != b',' || spec.quote != b'"' {
            return Err(Error::Capability(
                "memory store only parses comma-delimited, double-quoted files with one header line"
                    .to_string(),
            ));
        }

        let mut reader = RecordReader::open(&spec.path).await?;
        let mut parsed = Vec::new();
        while let Some(record) = reader.next_record().await? {
            parsed.push(map_columns(&record, &spec.columns)?);
        }

        let mut state = self.store.lock()?;
        self.store
            .log(&mut state, StatementKind::BulkLoad, parsed.len(), self.id);
        let stamp = spec.stamp.as_str();
        let loaded = parsed.len() as u64;
        state.rows.extend(parsed.into_iter().map(|customer| StoredRow {
            customer,
            created_at: stamp.to_string(),
            updated_at: stamp.to_string(),
        }));
        Ok(loaded)
    }

    async fn row_count(&mut self) -> Result<u64> {
        let mut state = self.store.lock()?;
        unavailable(&state, StatementKind::RowCount)?;
        self.store
            .log(&mut state, StatementKind::RowCount, 0, self.id);
        Ok(state.rows.len() as u64)
    }

    async fn statement_count(&mut self) -> Result<u64> {
        let mut state = self.store.lock()?;
        unavailable(&state, StatementKind::StatementCount)?;
        self.store
            .log(&mut state, StatementKind::StatementCount, 0, self.id);
        Ok(self.store.counter.get())
    }

    async fn truncate(&mut self) -> Result<()> {
        let mut state = self.store.lock()?;
        self.store
            .log(&mut state, StatementKind::Truncate, 0, self.id);
        state.rows.clear();
        Ok(())
    }
}

fn unavailable(state: &MemoryState, kind: StatementKind) -> Result<()> {
    if state.failing_reads.contains(&kind) {
        return Err(Error::Internal(format!("{kind:?} read is unavailable")));
    }
    Ok(())
}

/// Applies a bulk-load column mapping to one parsed line.
fn map_columns(record: &Customer, columns: &[(usize, String)]) -> Result<Customer> {
    let fields = record.fields();
    let mut mapped: [Option<String>; Customer::FIELD_COUNT] = Default::default();

    for (field, column) in columns {
        let value = fields.get(*field).ok_or_else(|| {
            Error::Config(format!("column {column} maps missing field {field}"))
        })?;
        let slot = match column.as_str() {
            "custom_id" => 0,
            "name" => 1,
            "email" => 2,
            "company" => 3,
            "city" => 4,
            "country" => 5,
            "birthday" => 6,
            other => return Err(Error::Config(format!("unknown column {other}"))),
        };
        mapped[slot] = Some((*value).to_string());
    }

    Customer::from_fields(mapped.into_iter().map(Option::unwrap_or_default))
        .ok_or_else(|| Error::Internal("column mapping produced a short row".to_string()))
}
