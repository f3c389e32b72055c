//! Core of dbprofiler.
//!
//! This crate crawls a relational source, computes structural and
//! statistical profiles of its schema and data, and reconciles them into a
//! separate metadata repository keyed by
//! `(server, catalog, schema, table[, column])`.
//!
//! # Guarantees
//! - Source databases are only read; every write goes to the repository
//! - Connection URLs are redacted in logs, errors and reports
//! - SQL differences between engines live in the dialect catalog only
//!
//! # Architecture
//! - [`dialect`]: one query template per `(operation, engine)` pair
//! - [`connection`]: URL-based connection parameters and driver dispatch
//! - [`repository`]: generic reconciliation of the six record sets
//! - [`stages`]: Columns, Tables, Uniques, Data Values, Dates, Stats
//! - [`profiler`]: the run itself, with bulk/per-column strategy selection

pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod logging;
pub mod models;
pub mod profiler;
pub mod report;
pub mod repository;
pub mod source;
pub mod stages;
pub mod strategy;

// Re-export commonly used types
pub use config::{ProfileOptions, StageName};
pub use connection::{ConnectionParams, test_connection};
pub use dialect::{DialectCatalog, Role};
pub use error::{ErrorKind, ProfilerError, Result};
pub use logging::init_logging;
pub use models::{ColumnKey, Engine, RecordSet, SchemaScope, TableKey};
pub use profiler::{create_repository, profile};
pub use report::{ProfileReport, StageReport, StageStatus};
pub use repository::{MetadataRepository, ReconcileOutcome};
pub use source::SourceReader;
