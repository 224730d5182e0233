//! Benchmark harness
//!
//! Wraps one strategy run with before/after measurements: destination row
//! count, wall-clock time, process memory and the store's statement counter.
//! All state lives in an explicit [`BenchmarkContext`] created on entry and
//! consumed on exit.

mod memory;

pub use memory::MemoryProbe;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::store::{Connection, Store};
use crate::strategy::{ImportReport, Importer};
use crate::{truncate_message, Error, Result};

/// Closing read of the statement counter, which counts itself.
pub const BOOKKEEPING_STATEMENTS: u64 = 1;

/// Longest failure message kept in a sample.
pub const MAX_FAILURE_MESSAGE: usize = 100;

/// Baseline captured on harness entry.
#[derive(Debug, Clone)]
pub struct BenchmarkContext {
    pub start_row_count: Option<u64>,
    pub started: Instant,
    pub start_memory: Option<i64>,
    pub start_statements: Option<u64>,
}

impl BenchmarkContext {
    /// Row count first, then clock, memory, and statement counter last, so the
    /// counter baseline already includes the row-count query.
    pub async fn capture(conn: &mut dyn Connection, probe: &MemoryProbe) -> Self {
        let start_row_count = measure("start row count", conn.row_count().await);
        let started = Instant::now();
        let start_memory = probe.resident_bytes();
        let start_statements = measure("start statement count", conn.statement_count().await);
        Self {
            start_row_count,
            started,
            start_memory,
            start_statements,
        }
    }

    /// Counterpart of [`BenchmarkContext::capture`], in reverse order.
    pub async fn finish(
        self,
        conn: &mut dyn Connection,
        probe: &MemoryProbe,
        failure: Option<String>,
        report: Option<ImportReport>,
    ) -> BenchmarkSample {
        let elapsed = self.started.elapsed();
        let end_memory = probe.resident_bytes();
        let end_statements = measure("end statement count", conn.statement_count().await);
        let end_row_count = measure("end row count", conn.row_count().await);

        let statement_count = match (self.start_statements, end_statements) {
            (Some(start), Some(end)) => {
                Some(end.saturating_sub(start).saturating_sub(BOOKKEEPING_STATEMENTS))
            }
            _ => None,
        };
        let memory_delta_bytes = match (self.start_memory, end_memory) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        };

        BenchmarkSample {
            start_row_count: self.start_row_count,
            end_row_count,
            elapsed,
            memory_delta_bytes,
            statement_count,
            failure,
            report,
        }
    }
}

fn measure(what: &str, result: Result<u64>) -> Option<u64> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(measurement = what, error = %e, "Benchmark measurement failed");
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkSample {
    pub start_row_count: Option<u64>,
    pub end_row_count: Option<u64>,
    pub elapsed: Duration,
    pub memory_delta_bytes: Option<i64>,
    /// Statements issued by the strategy, harness bookkeeping excluded.
    pub statement_count: Option<u64>,
    /// Truncated `Kind message` of a failed run.
    pub failure: Option<String>,
    pub report: Option<ImportReport>,
}

impl BenchmarkSample {
    pub fn row_delta(&self) -> Option<i64> {
        match (self.start_row_count, self.end_row_count) {
            (Some(start), Some(end)) => Some(end as i64 - start as i64),
            _ => None,
        }
    }

    pub fn memory_delta_mb(&self) -> Option<i64> {
        self.memory_delta_bytes
            .map(|bytes| (bytes as f64 / (1024.0 * 1024.0)).round() as i64)
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

impl fmt::Display for BenchmarkSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn or_na(value: Option<String>) -> String {
            value.unwrap_or_else(|| "n/a".to_string())
        }

        write!(
            f,
            "TIME: {} | MEM: {} | SQL: {} | ROWS: {}",
            format_elapsed(self.elapsed),
            or_na(self.memory_delta_mb().map(|mb| format!("{mb}MB"))),
            or_na(self.statement_count.map(|n| group_thousands(n as i64))),
            or_na(self.row_delta().map(group_thousands)),
        )
    }
}

/// `123ms` below a second, `4.56s` below a minute, `2m 5s` above.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 60.0 {
        let whole = elapsed.as_secs();
        format!("{}m {}s", whole / 60, whole % 60)
    } else if secs >= 1.0 {
        let rounded = (secs * 100.0).round() / 100.0;
        format!("{rounded}s")
    } else {
        format!("{}ms", (secs * 1000.0).round() as u64)
    }
}

/// `1234567` → `1,234,567`.
pub fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Runs strategies against one store and measures each run.
pub struct Harness {
    store: Arc<dyn Store>,
    probe: MemoryProbe,
}

impl Harness {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            probe: MemoryProbe::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Benchmarks one end-to-end import of `path`.
    ///
    /// Strategy failures are recorded in the sample, not returned; only a
    /// failure to open the measurement connection is an error.
    pub async fn run(&self, importer: &dyn Importer, path: &Path) -> Result<BenchmarkSample> {
        let mut conn = self.store.connect().await?;

        tracing::info!(
            strategy = importer.name(),
            store = self.store.name(),
            path = %path.display(),
            "Starting benchmark run"
        );

        let context = BenchmarkContext::capture(conn.as_mut(), &self.probe).await;
        let outcome = importer.import(Arc::clone(&self.store), path).await;

        let (failure, report) = match outcome {
            Ok(report) => (None, Some(report)),
            Err(e) => {
                let message = describe_failure(&e);
                tracing::error!(strategy = importer.name(), error = %message, "Import failed");
                (Some(message), None)
            }
        };

        let sample = context
            .finish(conn.as_mut(), &self.probe, failure, report)
            .await;

        tracing::info!(
            strategy = importer.name(),
            elapsed_ms = sample.elapsed.as_millis() as u64,
            statements = sample.statement_count,
            rows = sample.row_delta(),
            memory_mb = sample.memory_delta_mb(),
            ok = sample.succeeded(),
            "Benchmark run finished"
        );

        Ok(sample)
    }
}

/// `Kind message`, bounded to [`MAX_FAILURE_MESSAGE`] characters of message.
pub fn describe_failure(error: &Error) -> String {
    format!(
        "{} {}",
        error.kind(),
        truncate_message(&error.to_string(), MAX_FAILURE_MESSAGE)
    )
}
