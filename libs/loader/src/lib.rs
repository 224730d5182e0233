//! Bulk CSV loading strategies and a harness for benchmarking them
//!
//! The pipeline is reader → batch → strategy → store:
//!
//! - [`reader::RecordReader`] streams customer records out of a CSV file.
//! - [`batch::Batch`] bounds how many records a strategy holds between flushes.
//! - [`strategy`] implements the interchangeable [`strategy::Importer`]s.
//! - [`partition::Partition`] splits one file across concurrent workers.
//! - [`store`] abstracts the destination (Postgres or in-memory).
//! - [`benchmark::Harness`] measures one run of any importer.

pub mod batch;
pub mod benchmark;
pub mod error;
pub mod partition;
pub mod reader;
pub mod record;
pub mod store;
pub mod strategy;

pub use benchmark::{BenchmarkSample, Harness};
pub use error::{truncate_message, Error, Result};
pub use record::{AuditStamp, Customer};
pub use strategy::{ImportOptions, ImportReport, Importer, StrategyKind};
