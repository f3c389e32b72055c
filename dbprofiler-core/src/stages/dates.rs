//! Dates stage: month histograms of date columns.
//!
//! Values the source cannot read as a date are left out of the histogram
//! and the column is reported as a `DataIntegrity` failure; the buckets
//! that could be placed are still written.

use super::{record_outcome, StageContext, TableStage};
use crate::config::StageName;
use crate::dialect::types;
use crate::error::ProfilerError;
use crate::models::{ColumnKey, DateBucketRecord, RecordSet, TableRecord};
use crate::report::StageReport;
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Buckets the non-NULL values of every date column by month.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatesStage;

#[async_trait]
impl TableStage for DatesStage {
    fn name(&self) -> StageName {
        StageName::Dates
    }

    async fn profile_table(
        &self,
        ctx: &StageContext,
        table: &TableRecord,
        report: &mut StageReport,
    ) -> Result<()> {
        let columns = ctx.repository.table_columns(&table.table).await?;
        for column in columns.iter().filter(|c| types::is_date(&c.data_type)) {
            let key = column.key();
            if let Err(e) = profile_column(ctx, &key, report).await {
                report.record_failure(&key, &e);
            }
        }
        Ok(())
    }
}

async fn profile_column(ctx: &StageContext, key: &ColumnKey, report: &mut StageReport) -> Result<()> {
    if ctx.keep_existing(RecordSet::Dates, key).await? {
        report.record_skip();
        return Ok(());
    }

    let histogram = ctx.reader.month_histogram(key).await?;
    let mut rows = Vec::with_capacity(histogram.len());
    let mut unplaced: i64 = 0;
    for (bucket, frequency) in histogram {
        match bucket {
            Some(bucket) => rows.push(DateBucketRecord {
                column: key.clone(),
                bucket: month_bucket(&bucket)?,
                frequency,
            }),
            // Only non-NULL values are bucketed, so this is a value the
            // engine could not read as a date.
            None => unplaced = unplaced.saturating_add(frequency),
        }
    }

    let outcome = ctx
        .repository
        .reconcile(key, &rows, ctx.options.overwrite)
        .await?;
    record_outcome(report, outcome);

    if unplaced > 0 {
        return Err(ProfilerError::data_integrity(format!(
            "{} non-NULL values of {} are not dates and were left out of its histogram",
            unplaced, key
        )));
    }
    Ok(())
}

/// Parses the `YYYY-MM-DD` prefix the month templates produce.
fn month_bucket(text: &str) -> Result<NaiveDate> {
    text.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        .ok_or_else(|| {
            ProfilerError::unexpected_result(format!("'{}' is not a month bucket", text))
        })
}
