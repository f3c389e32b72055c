//! Tables stage: column and row counts of every recorded table.

use super::{record_outcome, StageContext};
use crate::config::StageName;
use crate::models::{TableKey, TableRecord};
use crate::report::StageReport;
use crate::repository::ReconcileOutcome;
use crate::Result;
use std::time::Instant;
use tracing::{error, info, warn};

/// Counts columns and rows of every table seen by the Columns stage.
///
/// A failed row count leaves `N_ROWS` NULL on new rows. An existing row
/// that is not overwritten still gets its `N_ROWS` refreshed, unless the
/// count failed.
pub async fn run(ctx: &StageContext) -> StageReport {
    let started = Instant::now();
    let mut report = StageReport::new(StageName::Tables);
    let scope = ctx.reader.scope();
    info!("Tables stage starting for {}", scope);

    match ctx.repository.column_tables(&scope).await {
        Ok(names) => {
            for name in names {
                if ctx.options.table.as_ref().is_some_and(|only| *only != name) {
                    continue;
                }
                let key = scope.table(name);
                if let Err(e) = count_table(ctx, &key, &mut report).await {
                    report.record_failure(&key, &e);
                }
            }
        }
        Err(e) => {
            error!("Tables stage failed: {}", e.detailed_message());
            report.fail(&e);
        }
    }

    report.finish(started);
    info!(
        "Tables stage finished: {} tables written, {} skipped, {} failed in {}ms",
        report.units_processed, report.units_skipped, report.units_failed, report.elapsed_ms
    );
    report
}

async fn count_table(ctx: &StageContext, key: &TableKey, report: &mut StageReport) -> Result<()> {
    let n_columns = ctx.reader.column_count(key).await?;
    let n_rows = match ctx.reader.row_count(key).await {
        Ok(n) => Some(n),
        Err(e) => {
            warn!("Row count failed for {}: {}", key, e.detailed_message());
            None
        }
    };

    let record = TableRecord {
        table: key.clone(),
        n_columns: Some(n_columns),
        n_rows,
    };
    let outcome = ctx
        .repository
        .reconcile(key, &[record], ctx.options.overwrite)
        .await?;

    if outcome == ReconcileOutcome::Skipped {
        // A failed count must not erase one recorded earlier.
        if n_rows.is_some() {
            let updated = ctx.repository.refresh_row_count(key, n_rows).await?;
            report.record_success(updated);
        } else {
            report.record_skip();
        }
    } else {
        record_outcome(report, outcome);
    }
    Ok(())
}
