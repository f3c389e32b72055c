//! Per-stage outcomes of a profiling run.

use crate::config::StageName;
use crate::error::{ErrorKind, ProfilerError};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

/// Final state of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Every unit was processed or skipped
    #[default]
    Succeeded,
    /// Some units failed, the rest were written
    Partial,
    /// The stage could not run, or every attempted unit failed
    Failed,
}

/// One unit (table or column) that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub key: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Counters and failures of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageName,
    pub status: StageStatus,
    pub units_processed: u64,
    pub units_skipped: u64,
    pub units_failed: u64,
    pub rows_written: u64,
    pub elapsed_ms: u64,
    pub failures: Vec<UnitFailure>,
    /// Stage-level error that stopped the stage before its units ran
    pub error: Option<String>,
}

impl StageReport {
    /// Empty report for a stage.
    pub const fn new(stage: StageName) -> Self {
        Self {
            stage,
            status: StageStatus::Succeeded,
            units_processed: 0,
            units_skipped: 0,
            units_failed: 0,
            rows_written: 0,
            elapsed_ms: 0,
            failures: Vec::new(),
            error: None,
        }
    }

    /// Counts a unit that was reconciled.
    pub const fn record_success(&mut self, rows_written: u64) {
        self.units_processed = self.units_processed.saturating_add(1);
        self.rows_written = self.rows_written.saturating_add(rows_written);
    }

    /// Counts a unit that was left alone.
    pub const fn record_skip(&mut self) {
        self.units_skipped = self.units_skipped.saturating_add(1);
    }

    /// Counts and logs a failed unit; the stage carries on.
    pub fn record_failure(&mut self, key: impl fmt::Display, error: &ProfilerError) {
        warn!("{} failed for {}: {}", self.stage, key, error.detailed_message());
        self.units_failed = self.units_failed.saturating_add(1);
        self.failures.push(UnitFailure {
            key: key.to_string(),
            kind: error.kind(),
            message: error.detailed_message(),
        });
    }

    /// Marks the whole stage as failed.
    pub fn fail(&mut self, error: &ProfilerError) {
        self.error = Some(error.detailed_message());
        self.status = StageStatus::Failed;
    }

    /// Folds the counters of another report for the same stage in.
    pub fn merge(&mut self, other: Self) {
        self.units_processed = self.units_processed.saturating_add(other.units_processed);
        self.units_skipped = self.units_skipped.saturating_add(other.units_skipped);
        self.units_failed = self.units_failed.saturating_add(other.units_failed);
        self.rows_written = self.rows_written.saturating_add(other.rows_written);
        self.elapsed_ms = self.elapsed_ms.saturating_add(other.elapsed_ms);
        self.failures.extend(other.failures);
        if self.error.is_none() {
            self.error = other.error;
        }
    }

    /// Adds the time since `started` and settles the status.
    pub fn finish(&mut self, started: Instant) {
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.elapsed_ms = self.elapsed_ms.saturating_add(elapsed);
        self.settle();
    }

    /// Derives the status from the counters.
    pub fn settle(&mut self) {
        self.status = if self.error.is_some()
            || (self.units_failed > 0 && self.units_processed == 0)
        {
            StageStatus::Failed
        } else if self.units_failed > 0 {
            StageStatus::Partial
        } else {
            StageStatus::Succeeded
        };
    }
}

/// Outcome of [`crate::profile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Source description with credentials redacted
    pub source: String,
    /// Repository description with credentials redacted
    pub target: String,
    pub tables_profiled: u64,
    pub stages: Vec<StageReport>,
}

impl ProfileReport {
    /// Starts a report for a run.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            source: source.into(),
            target: target.into(),
            tables_profiled: 0,
            stages: Vec::new(),
        }
    }

    /// Report of one stage, if it ran.
    pub fn stage(&self, stage: StageName) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }

    /// Whether any stage ended `Failed`.
    pub fn has_failures(&self) -> bool {
        self.stages
            .iter()
            .any(|report| report.status == StageStatus::Failed)
    }

    /// Rows written across all stages.
    pub fn rows_written(&self) -> u64 {
        self.stages
            .iter()
            .fold(0u64, |total, report| total.saturating_add(report.rows_written))
    }

    /// Pretty JSON rendering.
    ///
    /// # Errors
    /// Returns a serialization error.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ProfilerError::serialization("profile report", e))
    }

    /// Writes the JSON rendering to a file.
    ///
    /// # Errors
    /// Returns a serialization or I/O error.
    pub async fn write_json(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| ProfilerError::io(format!("Failed to write to {}", path.display()), e))
    }
}
