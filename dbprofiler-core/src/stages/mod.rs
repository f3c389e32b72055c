//! Stage runners.
//!
//! Each stage enumerates its parent records, reconciles the repository for
//! every key and writes the child rows it produced. Units (tables or
//! columns) fail on their own: the error is logged with the unit key,
//! counted in the [`StageReport`] and the stage moves on.
//!
//! Columns and Tables run once over the whole scope. The remaining stages
//! implement [`TableStage`] and are driven per table by the orchestrator,
//! in the order of [`StageName::PER_TABLE`].

mod columns;
mod data_values;
mod dates;
mod stats;
mod tables;
mod uniques;

pub use columns::run as run_columns;
pub use data_values::DataValuesStage;
pub use dates::DatesStage;
pub use stats::StatsStage;
pub use tables::run as run_tables;
pub use uniques::UniquesStage;

use crate::config::{ProfileOptions, StageName};
use crate::models::{RecordSet, TableRecord};
use crate::report::StageReport;
use crate::repository::{MetadataRepository, ReconcileOutcome, RecordKey};
use crate::source::SourceReader;
use crate::Result;
use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;

/// Everything a stage needs: the source, the repository and the options.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub reader: SourceReader,
    pub repository: MetadataRepository,
    pub options: ProfileOptions,
}

impl StageContext {
    pub const fn new(
        reader: SourceReader,
        repository: MetadataRepository,
        options: ProfileOptions,
    ) -> Self {
        Self {
            reader,
            repository,
            options,
        }
    }

    /// Whether the key is already recorded and must be left alone.
    ///
    /// Stages check this before fetching anything from the source so that
    /// a run with `overwrite` off does not pay for work it will discard.
    pub(crate) async fn keep_existing<K: RecordKey>(
        &self,
        set: RecordSet,
        key: &K,
    ) -> Result<bool> {
        if self.options.overwrite {
            return Ok(false);
        }
        self.repository.exists(set, key).await
    }
}

/// A stage that profiles one table at a time.
///
/// Object safe; the orchestrator holds the per-table stages as
/// `&'static dyn TableStage`.
#[async_trait]
pub trait TableStage: Send + Sync {
    /// Name reported for this stage.
    fn name(&self) -> StageName;

    /// Profiles one table, recording per-column outcomes in `report`.
    ///
    /// # Errors
    /// Returns an error when the table itself cannot be processed (its
    /// recorded columns cannot be read, for instance); the caller records
    /// it as a failed unit.
    async fn profile_table(
        &self,
        ctx: &StageContext,
        table: &TableRecord,
        report: &mut StageReport,
    ) -> Result<()>;
}

/// The per-table stage registered under a name.
pub fn table_stage(name: StageName) -> Option<&'static dyn TableStage> {
    match name {
        StageName::Uniques => Some(&UniquesStage),
        StageName::DataValues => Some(&DataValuesStage),
        StageName::Dates => Some(&DatesStage),
        StageName::Stats => Some(&StatsStage),
        StageName::Columns | StageName::Tables => None,
    }
}

/// Runs one per-table stage against one table and times it.
pub async fn run_table_stage(
    stage: &dyn TableStage,
    ctx: &StageContext,
    table: &TableRecord,
) -> StageReport {
    let started = Instant::now();
    let mut report = StageReport::new(stage.name());
    debug!("{} starting for {}", stage.name(), table.table);
    if let Err(e) = stage.profile_table(ctx, table, &mut report).await {
        report.record_failure(&table.table, &e);
    }
    report.finish(started);
    report
}

/// Counts a reconciliation in a report.
pub(crate) fn record_outcome(report: &mut StageReport, outcome: ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Skipped => report.record_skip(),
        written => report.record_success(written.rows_written()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_stage_registry() {
        for name in StageName::PER_TABLE {
            let stage = table_stage(name).unwrap();
            assert_eq!(stage.name(), name);
        }
        assert!(table_stage(StageName::Columns).is_none());
        assert!(table_stage(StageName::Tables).is_none());
    }

    #[test]
    fn test_record_outcome() {
        let mut report = StageReport::new(StageName::Dates);
        record_outcome(&mut report, ReconcileOutcome::Inserted(4));
        record_outcome(
            &mut report,
            ReconcileOutcome::Replaced {
                deleted: 2,
                inserted: 3,
            },
        );
        record_outcome(&mut report, ReconcileOutcome::Skipped);
        assert_eq!(report.units_processed, 2);
        assert_eq!(report.units_skipped, 1);
        assert_eq!(report.rows_written, 7);
    }
}
