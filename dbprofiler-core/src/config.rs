//! Run configuration.
//!
//! This module provides [`ProfileOptions`], the knobs of a profiling run,
//! and [`StageName`], used to select which stages run.

use crate::error::ProfilerError;
use crate::repository::DEFAULT_CHUNK_SIZE;
use crate::strategy::{DEFAULT_MAX_COLUMNS_PER_QUERY, DEFAULT_MAX_ROWS_FOR_BULK};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default distinct-value ceiling for the Data Values stage.
pub const DEFAULT_CARDINALITY_THRESHOLD: i64 = 5_000;

/// Default maximum length, in characters, of a stored data value.
pub const DEFAULT_MAX_VALUE_LENGTH: usize = 255;

/// The six pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Columns,
    Tables,
    Uniques,
    DataValues,
    Dates,
    Stats,
}

impl StageName {
    /// Every stage in execution order.
    pub const ALL: [Self; 6] = [
        Self::Columns,
        Self::Tables,
        Self::Uniques,
        Self::DataValues,
        Self::Dates,
        Self::Stats,
    ];

    /// Stages that run once per table of the inventory.
    pub const PER_TABLE: [Self; 4] = [Self::Uniques, Self::DataValues, Self::Dates, Self::Stats];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Columns => "columns",
            Self::Tables => "tables",
            Self::Uniques => "uniques",
            Self::DataValues => "data_values",
            Self::Dates => "dates",
            Self::Stats => "stats",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = ProfilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| {
                ProfilerError::configuration(format!(
                    "unknown stage '{}', expected one of: columns, tables, uniques, data_values, dates, stats",
                    s
                ))
            })
    }
}

/// Options of a profiling run.
///
/// # Example
/// ```rust
/// use dbprofiler_core::config::{ProfileOptions, StageName};
///
/// let options = ProfileOptions::new()
///     .with_overwrite(false)
///     .with_percentiles(true)
///     .with_stages(vec![StageName::Columns, StageName::Tables, StageName::Stats]);
///
/// assert!(options.validate().is_ok());
/// assert!(!options.runs(StageName::Uniques));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOptions {
    /// Replace rows of keys that already exist in the repository
    pub overwrite: bool,
    /// Maximum recorded distinct count for a column's value histogram
    pub cardinality_threshold: i64,
    /// Tables with a known row count below this are not profiled
    pub min_rows: i64,
    /// Compute the percentile ladder in the Stats stage
    pub with_percentiles: bool,
    /// Row count from which tables are profiled per column (exclusive bound for bulk)
    pub max_rows_for_bulk: i64,
    /// Columns per bulk query (1-1000)
    pub max_columns_per_query: usize,
    /// Rows per committed insert chunk (1-100000)
    pub insert_chunk_size: usize,
    /// Longest data value kept, in characters
    pub max_value_length: usize,
    /// Tables profiled concurrently (1-32)
    pub max_concurrent_tables: usize,
    /// Stages to run
    pub stages: Vec<StageName>,
    /// Restricts the run to one table
    pub table: Option<String>,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            overwrite: true,
            cardinality_threshold: DEFAULT_CARDINALITY_THRESHOLD,
            min_rows: 0,
            with_percentiles: false,
            max_rows_for_bulk: DEFAULT_MAX_ROWS_FOR_BULK,
            max_columns_per_query: DEFAULT_MAX_COLUMNS_PER_QUERY,
            insert_chunk_size: DEFAULT_CHUNK_SIZE,
            max_value_length: DEFAULT_MAX_VALUE_LENGTH,
            max_concurrent_tables: 1,
            stages: StageName::ALL.to_vec(),
            table: None,
        }
    }
}

impl ProfileOptions {
    /// Creates options with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates option ranges.
    ///
    /// # Errors
    /// Returns a configuration error naming the offending option.
    pub fn validate(&self) -> crate::Result<()> {
        if self.cardinality_threshold < 0 {
            return Err(ProfilerError::configuration(
                "cardinality_threshold cannot be negative",
            ));
        }

        if self.min_rows < 0 {
            return Err(ProfilerError::configuration("min_rows cannot be negative"));
        }

        if self.max_rows_for_bulk < 0 {
            return Err(ProfilerError::configuration(
                "max_rows_for_bulk cannot be negative",
            ));
        }

        if !(1..=1_000).contains(&self.max_columns_per_query) {
            return Err(ProfilerError::configuration(
                "max_columns_per_query must be between 1 and 1000",
            ));
        }

        if !(1..=100_000).contains(&self.insert_chunk_size) {
            return Err(ProfilerError::configuration(
                "insert_chunk_size must be between 1 and 100000",
            ));
        }

        if self.max_value_length == 0 {
            return Err(ProfilerError::configuration(
                "max_value_length must be greater than 0",
            ));
        }

        if !(1..=32).contains(&self.max_concurrent_tables) {
            return Err(ProfilerError::configuration(
                "max_concurrent_tables must be between 1 and 32",
            ));
        }

        if self.stages.is_empty() {
            return Err(ProfilerError::configuration("at least one stage must run"));
        }

        if self.table.as_ref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ProfilerError::configuration("table cannot be empty"));
        }

        Ok(())
    }

    /// Whether a stage is selected.
    pub fn runs(&self, stage: StageName) -> bool {
        self.stages.contains(&stage)
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_cardinality_threshold(mut self, threshold: i64) -> Self {
        self.cardinality_threshold = threshold;
        self
    }

    pub fn with_min_rows(mut self, min_rows: i64) -> Self {
        self.min_rows = min_rows;
        self
    }

    pub fn with_percentiles(mut self, enabled: bool) -> Self {
        self.with_percentiles = enabled;
        self
    }

    pub fn with_max_rows_for_bulk(mut self, max_rows: i64) -> Self {
        self.max_rows_for_bulk = max_rows;
        self
    }

    pub fn with_max_columns_per_query(mut self, max_columns: usize) -> Self {
        self.max_columns_per_query = max_columns;
        self
    }

    pub fn with_insert_chunk_size(mut self, chunk_size: usize) -> Self {
        self.insert_chunk_size = chunk_size;
        self
    }

    pub fn with_max_value_length(mut self, max_length: usize) -> Self {
        self.max_value_length = max_length;
        self
    }

    /// Builder method to set per-table concurrency with validation.
    ///
    /// # Errors
    /// Returns a configuration error outside 1-32.
    pub fn with_max_concurrent_tables(mut self, max: usize) -> crate::Result<Self> {
        if !(1..=32).contains(&max) {
            return Err(ProfilerError::configuration(
                "max_concurrent_tables must be between 1 and 32",
            ));
        }
        self.max_concurrent_tables = max;
        Ok(self)
    }

    /// Selects the stages to run; order and duplicates are irrelevant.
    pub fn with_stages(mut self, mut stages: Vec<StageName>) -> Self {
        stages.sort();
        stages.dedup();
        self.stages = stages;
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}
