//! The profiling run.
//!
//! `profile` checks options and engine capabilities, runs Columns then
//! Tables over the whole scope, reads the table inventory back from the
//! repository and drives the per-table stages over it. Per-table work runs
//! on a bounded `futures` stream; each table is handled by exactly one
//! worker and every worker opens its own connections.

use crate::config::{ProfileOptions, StageName};
use crate::connection::ConnectionParams;
use crate::models::TableRecord;
use crate::report::{ProfileReport, StageReport};
use crate::repository::{InventoryFilter, MetadataRepository};
use crate::source::SourceReader;
use crate::stages::{self, StageContext, TableStage};
use crate::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{error, info};

/// Profiles the source into the repository.
///
/// Unit failures never fail the call; they are reported per stage.
///
/// # Errors
/// Returns a configuration error for invalid options or connection
/// parameters, and `UnsupportedOperation` when the source engine cannot be
/// profiled or the target engine cannot host the repository.
///
/// # Example
/// ```no_run
/// use dbprofiler_core::{profile, ConnectionParams, ProfileOptions, Role};
///
/// # async fn run() -> dbprofiler_core::Result<()> {
/// let source = ConnectionParams::from_url("sqlite://shop.db", Role::Source)?;
/// let target = ConnectionParams::from_url("sqlite://meta.db", Role::Repository)?;
/// let report = profile(source, target, ProfileOptions::default()).await?;
/// assert!(!report.has_failures());
/// # Ok(())
/// # }
/// ```
pub async fn profile(
    source: ConnectionParams,
    target: ConnectionParams,
    options: ProfileOptions,
) -> Result<ProfileReport> {
    options.validate()?;
    let reader = SourceReader::new(source)?;
    let repository =
        MetadataRepository::new(target)?.with_chunk_size(options.insert_chunk_size);

    let mut report = ProfileReport::new(reader.params().to_string(), repository.params().to_string());
    info!(
        "Profiling {} into {} (run {})",
        report.source, report.target, report.run_id
    );
    let ctx = StageContext::new(reader, repository, options);

    if ctx.options.runs(StageName::Columns) {
        report.stages.push(stages::run_columns(&ctx).await);
    }
    if ctx.options.runs(StageName::Tables) {
        report.stages.push(stages::run_tables(&ctx).await);
    }

    let per_table: Vec<&'static dyn TableStage> = StageName::PER_TABLE
        .into_iter()
        .filter(|name| ctx.options.runs(*name))
        .filter_map(stages::table_stage)
        .collect();

    if !per_table.is_empty() {
        match ctx.repository.table_inventory(&ctx.reader.scope()).await {
            Ok(inventory) => {
                let filter = InventoryFilter {
                    min_rows: ctx.options.min_rows,
                    table: ctx.options.table.clone(),
                };
                let tables: Vec<TableRecord> =
                    inventory.into_iter().filter(|t| filter.admits(t)).collect();
                report.tables_profiled = u64::try_from(tables.len()).unwrap_or(u64::MAX);
                info!("{} tables to profile", tables.len());
                report
                    .stages
                    .extend(profile_tables(&ctx, &per_table, &tables).await);
            }
            Err(e) => {
                error!("Table inventory failed: {}", e.detailed_message());
                for stage in &per_table {
                    let mut failed = StageReport::new(stage.name());
                    failed.fail(&e);
                    report.stages.push(failed);
                }
            }
        }
    }

    report.finished_at = Some(Utc::now());
    info!(
        "Run {} finished: {} rows written{}",
        report.run_id,
        report.rows_written(),
        if report.has_failures() {
            ", with failed stages"
        } else {
            ""
        }
    );
    Ok(report)
}

/// Runs the per-table stages over every table, at most
/// `max_concurrent_tables` tables at a time, and folds the results into
/// one report per stage.
async fn profile_tables(
    ctx: &StageContext,
    per_table: &[&'static dyn TableStage],
    tables: &[TableRecord],
) -> Vec<StageReport> {
    let mut totals: Vec<StageReport> = per_table
        .iter()
        .map(|stage| StageReport::new(stage.name()))
        .collect();

    let mut results = stream::iter(tables)
        .map(|table| profile_table(ctx, per_table, table))
        .buffer_unordered(ctx.options.max_concurrent_tables);

    while let Some(reports) = results.next().await {
        for (total, report) in totals.iter_mut().zip(reports) {
            total.merge(report);
        }
    }

    for total in &mut totals {
        total.settle();
        info!(
            "{} stage finished: {} processed, {} skipped, {} failed, {} rows written",
            total.stage,
            total.units_processed,
            total.units_skipped,
            total.units_failed,
            total.rows_written
        );
    }
    totals
}

/// Stages of one table run in order; Data Values reads what Uniques wrote.
async fn profile_table(
    ctx: &StageContext,
    per_table: &[&'static dyn TableStage],
    table: &TableRecord,
) -> Vec<StageReport> {
    let mut reports = Vec::with_capacity(per_table.len());
    for stage in per_table {
        reports.push(stages::run_table_stage(*stage, ctx, table).await);
    }
    reports
}

/// Creates the repository record sets on the target.
///
/// # Errors
/// Returns `UnsupportedOperation` for engines that cannot host the
/// repository, or the first failing statement.
pub async fn create_repository(target: ConnectionParams, overwrite: bool) -> Result<()> {
    let repository = MetadataRepository::new(target)?;
    info!("Creating repository in {}", repository.params());
    repository.create_schema(overwrite).await
}
