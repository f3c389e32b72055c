//! Uniques stage: distinct and NULL counts per column.

use super::{record_outcome, StageContext, TableStage};
use crate::config::StageName;
use crate::dialect::types;
use crate::models::{ColumnRecord, RecordSet, TableRecord, UniqueRecord};
use crate::report::StageReport;
use crate::source::UniqueCount;
use crate::strategy::{self, ExecutionPath};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Counts distinct and NULL values of every recorded column of a table.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniquesStage;

#[async_trait]
impl TableStage for UniquesStage {
    fn name(&self) -> StageName {
        StageName::Uniques
    }

    async fn profile_table(
        &self,
        ctx: &StageContext,
        table: &TableRecord,
        report: &mut StageReport,
    ) -> Result<()> {
        let key = &table.table;
        if ctx.keep_existing(RecordSet::Uniques, key).await? {
            report.record_skip();
            return Ok(());
        }

        // Empty tables clear their stale rows and produce nothing.
        if table.n_rows == Some(0) {
            let outcome = ctx
                .repository
                .reconcile::<UniqueRecord>(key, &[], ctx.options.overwrite)
                .await?;
            record_outcome(report, outcome);
            return Ok(());
        }

        let columns = ctx.repository.table_columns(key).await?;
        let path = ExecutionPath::select(table.n_rows, ctx.options.max_rows_for_bulk);
        debug!("Uniques for {} via {:?} ({} columns)", key, path, columns.len());

        let failed_before = report.units_failed;
        let counts = match path {
            ExecutionPath::Bulk => bulk_counts(ctx, &columns, report).await,
            ExecutionPath::PerColumn => per_column_counts(ctx, columns.iter(), report).await,
        };

        // Rows are replaced per table; replacing them with a partial set
        // would erase the failed columns' counts, and with them the input
        // of the Data Values stage.
        let failed = report.units_failed.saturating_sub(failed_before);
        if failed > 0 {
            warn!(
                "Keeping recorded uniques of {}: {} of {} columns failed",
                key,
                failed,
                columns.len()
            );
            report.record_skip();
            return Ok(());
        }

        let rows: Vec<UniqueRecord> = columns
            .iter()
            .filter_map(|column| {
                counts
                    .get(column.column.as_str())
                    .map(|count| unique_record(column, *count))
            })
            .collect();

        let outcome = ctx
            .repository
            .reconcile(key, &rows, ctx.options.overwrite)
            .await?;
        record_outcome(report, outcome);
        Ok(())
    }
}

/// Loads non-filtered columns in batches and counts client side; filtered
/// columns are still counted by the source.
async fn bulk_counts<'a>(
    ctx: &StageContext,
    columns: &'a [ColumnRecord],
    report: &mut StageReport,
) -> HashMap<&'a str, UniqueCount> {
    let (filtered, loadable): (Vec<&ColumnRecord>, Vec<&ColumnRecord>) = columns
        .iter()
        .partition(|column| types::is_filtered(&column.data_type));

    let mut counts = per_column_counts(ctx, filtered.into_iter(), report).await;
    for batch in strategy::batches(&loadable, ctx.options.max_columns_per_query) {
        let Some(first) = batch.first() else {
            continue;
        };
        let names: Vec<String> = batch.iter().map(|column| column.column.clone()).collect();
        match ctx.reader.bulk_text(&first.table, &names).await {
            Ok(rows) => {
                for (index, column) in batch.iter().enumerate() {
                    let (distinct_values, null_values) =
                        strategy::distinct_and_nulls(strategy::column_cells(&rows, index));
                    counts.insert(
                        column.column.as_str(),
                        UniqueCount {
                            distinct_values,
                            null_values,
                        },
                    );
                }
            }
            Err(e) => {
                for column in batch {
                    report.record_failure(column.key(), &e);
                }
            }
        }
    }
    counts
}

async fn per_column_counts<'a>(
    ctx: &StageContext,
    columns: impl Iterator<Item = &'a ColumnRecord> + Send,
    report: &mut StageReport,
) -> HashMap<&'a str, UniqueCount> {
    let mut counts = HashMap::new();
    for column in columns {
        match ctx.reader.unique_count(&column.key()).await {
            Ok(count) => {
                counts.insert(column.column.as_str(), count);
            }
            Err(e) => report.record_failure(column.key(), &e),
        }
    }
    counts
}

fn unique_record(column: &ColumnRecord, count: UniqueCount) -> UniqueRecord {
    UniqueRecord {
        table: column.table.clone(),
        column: column.column.clone(),
        ordinal_position: column.ordinal_position,
        data_type: column.data_type.clone(),
        distinct_values: count.distinct_values,
        null_values: count.null_values,
    }
}
