//! Columns stage: the source catalog, reconciled per table.

use super::{record_outcome, StageContext};
use crate::config::StageName;
use crate::report::StageReport;
use std::time::Instant;
use tracing::{error, info};

/// Reads the base-table columns of the source scope and reconciles them
/// table by table.
///
/// A failed catalog query fails the stage; a failed reconciliation fails
/// only its table.
pub async fn run(ctx: &StageContext) -> StageReport {
    let started = Instant::now();
    let mut report = StageReport::new(StageName::Columns);
    info!("Columns stage starting for {}", ctx.reader.scope());

    match ctx.reader.columns().await {
        Ok(tables) => {
            for (key, columns) in tables {
                if ctx
                    .options
                    .table
                    .as_ref()
                    .is_some_and(|only| *only != key.table)
                {
                    continue;
                }
                match ctx
                    .repository
                    .reconcile(&key, &columns, ctx.options.overwrite)
                    .await
                {
                    Ok(outcome) => record_outcome(&mut report, outcome),
                    Err(e) => report.record_failure(&key, &e),
                }
            }
        }
        Err(e) => {
            error!("Columns stage failed: {}", e.detailed_message());
            report.fail(&e);
        }
    }

    report.finish(started);
    info!(
        "Columns stage finished: {} tables written, {} skipped, {} failed in {}ms",
        report.units_processed, report.units_skipped, report.units_failed, report.elapsed_ms
    );
    report
}
