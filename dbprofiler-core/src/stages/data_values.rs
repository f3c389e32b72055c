//! Data Values stage: value histograms of low-cardinality columns.

use super::{record_outcome, StageContext, TableStage};
use crate::config::StageName;
use crate::dialect::types;
use crate::error::ProfilerError;
use crate::models::{ColumnKey, ColumnRecord, DataValueRecord, RecordSet, TableRecord};
use crate::report::StageReport;
use crate::strategy::{self, ExecutionPath};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

/// Records `(value, frequency)` for every column whose recorded distinct
/// count is within the cardinality threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataValuesStage;

#[async_trait]
impl TableStage for DataValuesStage {
    fn name(&self) -> StageName {
        StageName::DataValues
    }

    async fn profile_table(
        &self,
        ctx: &StageContext,
        table: &TableRecord,
        report: &mut StageReport,
    ) -> Result<()> {
        let key = &table.table;
        let columns = ctx.repository.table_columns(key).await?;
        let distinct = ctx.repository.distinct_value_counts(key).await?;

        let mut pending: Vec<&ColumnRecord> = Vec::new();
        for column in &columns {
            let column_key = column.key();
            if !eligible(column, &distinct, ctx.options.cardinality_threshold) {
                debug!("Skipping data values of {}", column_key);
                report.record_skip();
                if ctx.options.overwrite
                    && let Err(e) = ctx
                        .repository
                        .delete(RecordSet::DataValues, &column_key)
                        .await
                {
                    report.record_failure(&column_key, &e);
                }
                continue;
            }
            match ctx.keep_existing(RecordSet::DataValues, &column_key).await {
                Ok(true) => report.record_skip(),
                Ok(false) => pending.push(column),
                Err(e) => report.record_failure(&column_key, &e),
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        match ExecutionPath::select(table.n_rows, ctx.options.max_rows_for_bulk) {
            ExecutionPath::Bulk => {
                for batch in strategy::batches(&pending, ctx.options.max_columns_per_query) {
                    let names: Vec<String> =
                        batch.iter().map(|column| column.column.clone()).collect();
                    match ctx.reader.bulk_text(key, &names).await {
                        Ok(rows) => {
                            for (index, column) in batch.iter().enumerate() {
                                let frequencies =
                                    strategy::frequency_map(strategy::column_cells(&rows, index));
                                write_column(ctx, &column.key(), frequencies, report).await;
                            }
                        }
                        Err(e) => {
                            for column in batch {
                                report.record_failure(column.key(), &e);
                            }
                        }
                    }
                }
            }
            ExecutionPath::PerColumn => {
                for column in pending {
                    let column_key = column.key();
                    match ctx.reader.frequencies(&column_key).await {
                        Ok(frequencies) => write_column(ctx, &column_key, frequencies, report).await,
                        Err(e) => report.record_failure(&column_key, &e),
                    }
                }
            }
        }
        Ok(())
    }
}

/// Non-filtered columns with a recorded distinct count at or below the
/// threshold. Columns without a recorded count are not eligible.
fn eligible(column: &ColumnRecord, distinct: &HashMap<String, i64>, threshold: i64) -> bool {
    !types::is_filtered(&column.data_type)
        && distinct
            .get(&column.column)
            .is_some_and(|count| *count <= threshold)
}

async fn write_column(
    ctx: &StageContext,
    key: &ColumnKey,
    frequencies: Vec<(Option<String>, i64)>,
    report: &mut StageReport,
) {
    let rows = bounded_values(key, frequencies, ctx.options.max_value_length);
    match ctx
        .repository
        .reconcile(key, &rows, ctx.options.overwrite)
        .await
    {
        Ok(outcome) => record_outcome(report, outcome),
        Err(e) => report.record_failure(key, &e),
    }
}

/// Turns frequencies into records, dropping values longer than
/// `max_length` characters. NULL is kept as its own value.
fn bounded_values(
    key: &ColumnKey,
    frequencies: Vec<(Option<String>, i64)>,
    max_length: usize,
) -> Vec<DataValueRecord> {
    frequencies
        .into_iter()
        .filter(|(value, _)| {
            let length = value.as_ref().map_or(0, |v| v.chars().count());
            if length > max_length {
                debug!(
                    "{}",
                    ProfilerError::data_integrity(format!(
                        "value of {} is {} characters long, limit is {}",
                        key, length, max_length
                    ))
                );
                return false;
            }
            true
        })
        .map(|(value, frequency)| DataValueRecord {
            column: key.clone(),
            value,
            frequency,
        })
        .collect()
}
