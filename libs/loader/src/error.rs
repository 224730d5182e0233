//! Error types for the loader

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot open source {}: {source}", path.display())]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record on line {line}: expected {expected} fields, found {found}")]
    MalformedRecord {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("record on line {line} is not valid UTF-8")]
    Encoding { line: u64 },

    #[error(transparent)]
    Csv(#[from] csv_async::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("statement binds {params} parameters, store accepts at most {limit}")]
    ParameterLimit { params: usize, limit: usize },

    #[error("prepared statement is sized for {expected} rows, got {actual}")]
    PreparedArity { expected: usize, actual: usize },

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("store capability unavailable: {0}")]
    Capability(String),

    #[error("{failed} of {workers} workers failed ({rows_written} rows written): {first}")]
    WorkersFailed {
        failed: usize,
        workers: usize,
        rows_written: u64,
        first: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Short variant name used as a prefix in benchmark diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SourceOpen { .. } => "SourceOpen",
            Error::MalformedRecord { .. } => "MalformedRecord",
            Error::Encoding { .. } => "Encoding",
            Error::Csv(_) => "Csv",
            Error::Io(_) => "Io",
            Error::Database(_) => "Database",
            Error::ParameterLimit { .. } => "ParameterLimit",
            Error::PreparedArity { .. } => "PreparedArity",
            Error::Constraint(_) => "Constraint",
            Error::Capability(_) => "Capability",
            Error::WorkersFailed { .. } => "WorkersFailed",
            Error::Config(_) => "Config",
            Error::Internal(_) => "Internal",
        }
    }

    /// True for errors raised while reading the input file.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            Error::SourceOpen { .. }
                | Error::MalformedRecord { .. }
                | Error::Encoding { .. }
                | Error::Csv(_)
                | Error::Io(_)
        )
    }
}

/// Bounds a diagnostic to `limit` characters, appending `...` when cut.
pub fn truncate_message(message: &str, limit: usize) -> String {
    match message.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message.to_string(),
    }
}
