//! Stats stage: aggregates and percentiles of numeric columns.

use super::{record_outcome, StageContext, TableStage};
use crate::config::StageName;
use crate::dialect::types;
use crate::models::{ColumnKey, RecordSet, StatRecord, TableRecord};
use crate::report::StageReport;
use crate::Result;
use async_trait::async_trait;
use tracing::debug;

/// Computes basic statistics, and percentiles when requested, for every
/// numeric column.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsStage;

#[async_trait]
impl TableStage for StatsStage {
    fn name(&self) -> StageName {
        StageName::Stats
    }

    async fn profile_table(
        &self,
        ctx: &StageContext,
        table: &TableRecord,
        report: &mut StageReport,
    ) -> Result<()> {
        let columns = ctx.repository.table_columns(&table.table).await?;
        for column in columns.iter().filter(|c| types::is_numeric(&c.data_type)) {
            let key = column.key();
            if let Err(e) = profile_column(ctx, &key, report).await {
                report.record_failure(&key, &e);
            }
        }
        Ok(())
    }
}

async fn profile_column(ctx: &StageContext, key: &ColumnKey, report: &mut StageReport) -> Result<()> {
    let with_percentiles = ctx.options.with_percentiles;

    if ctx.keep_existing(RecordSet::Stats, key).await? {
        if !with_percentiles {
            report.record_skip();
            return Ok(());
        }
        match ctx.reader.percentiles(key).await? {
            Some(percentiles) => {
                let updated = ctx.repository.refresh_percentiles(key, &percentiles).await?;
                report.record_success(updated);
            }
            None => report.record_skip(),
        }
        return Ok(());
    }

    let stats = ctx.reader.basic_stats(key).await?;
    let rows = if stats.is_empty() {
        debug!("{} has no values", key);
        Vec::new()
    } else {
        let percentiles = if with_percentiles {
            ctx.reader.percentiles(key).await?
        } else {
            None
        };
        vec![StatRecord {
            column: key.clone(),
            stats,
            percentiles,
        }]
    };

    let outcome = ctx
        .repository
        .reconcile(key, &rows, ctx.options.overwrite)
        .await?;
    record_outcome(report, outcome);
    Ok(())
}
