//! Read-only queries against the profiled source.

use crate::connection::{self, ConnectionParams, Value};
use crate::dialect::{
    dialect_for, DialectCatalog, Identifiers, Role, SourceDialect, SourceOperation,
};
use crate::error::ProfilerError;
use crate::models::{
    BasicStats, ColumnKey, ColumnRecord, Engine, Percentiles, SchemaScope, TableKey,
};
use crate::Result;
use std::collections::BTreeMap;
use tracing::trace;

/// Distinct and NULL counts of one column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniqueCount {
    pub distinct_values: i64,
    pub null_values: i64,
}

/// Issues the dialect's source templates against one database.
///
/// Like the repository, every call opens and closes its own connection.
#[derive(Debug, Clone)]
pub struct SourceReader {
    params: ConnectionParams,
    dialect: &'static dyn SourceDialect,
    catalog: &'static DialectCatalog,
}

impl SourceReader {
    /// Creates a reader after checking that the engine supports every
    /// source operation.
    ///
    /// # Errors
    /// Returns `UnsupportedOperation` or a configuration error.
    pub fn new(params: ConnectionParams) -> Result<Self> {
        params.validate()?;
        let catalog = DialectCatalog::global();
        catalog.require(params.engine(), Role::Source)?;
        Ok(Self {
            dialect: dialect_for(params.engine()),
            params,
            catalog,
        })
    }

    pub const fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn engine(&self) -> Engine {
        self.dialect.engine()
    }

    /// Scope the source's rows are keyed with.
    pub fn scope(&self) -> SchemaScope {
        self.params.scope()
    }

    async fn run(
        &self,
        operation: SourceOperation,
        identifiers: &Identifiers,
        key: &TableKey,
    ) -> Result<Vec<Vec<Value>>> {
        let template = self.catalog.source(operation, self.engine())?;
        let sql = template.render(identifiers)?;
        trace!("{:?} on {}: {}", operation, key, sql);

        let mut conn = connection::open(&self.params).await?;
        let result = conn.fetch_all(&sql, &template.bind_values(key)).await;
        conn.close().await;
        let rows = result?;

        if let Some(arity) = operation.result_arity()
            && let Some(row) = rows.iter().find(|row| row.len() != arity)
        {
            return Err(ProfilerError::unexpected_result(format!(
                "{:?} on {} returned {} columns, expected {}",
                operation,
                self.engine(),
                row.len(),
                arity
            )));
        }
        Ok(rows)
    }

    /// Every base-table column of the scope, grouped by table name.
    ///
    /// # Errors
    /// Returns a connection, query or unexpected-result error.
    pub async fn columns(&self) -> Result<BTreeMap<TableKey, Vec<ColumnRecord>>> {
        let scope = self.scope();
        let rows = self
            .run(
                SourceOperation::ColumnCatalog,
                &Identifiers::new(),
                &scope.table(String::new()),
            )
            .await?;

        let mut tables: BTreeMap<TableKey, Vec<ColumnRecord>> = BTreeMap::new();
        for row in rows {
            let table = scope.table(text(&row[0], "table name")?);
            let record = ColumnRecord {
                column: text(&row[1], "column name")?,
                ordinal_position: int(&row[2], "ordinal position")?,
                data_type: row[3].as_text().unwrap_or_default(),
                table: table.clone(),
            };
            tables.entry(table).or_default().push(record);
        }
        Ok(tables)
    }

    /// Number of columns of a table, from the catalog.
    ///
    /// # Errors
    /// Returns a connection, query or unexpected-result error.
    pub async fn column_count(&self, key: &TableKey) -> Result<i64> {
        let rows = self
            .run(SourceOperation::ColumnCount, &Identifiers::new(), key)
            .await?;
        single_int(&rows, "column count")
    }

    /// `COUNT(*)` of a table.
    ///
    /// # Errors
    /// Returns a connection, query or unexpected-result error.
    pub async fn row_count(&self, key: &TableKey) -> Result<i64> {
        let rows = self
            .run(SourceOperation::RowCount, &Identifiers::table(key), key)
            .await?;
        single_int(&rows, "row count")
    }

    /// Distinct and NULL counts of one column, computed by the source.
    ///
    /// # Errors
    /// Returns a connection, query or unexpected-result error.
    pub async fn unique_count(&self, key: &ColumnKey) -> Result<UniqueCount> {
        let rows = self
            .run(
                SourceOperation::UniqueCount,
                &column_identifiers(key),
                &key.table,
            )
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| ProfilerError::unexpected_result("unique count returned no rows"))?;
        Ok(UniqueCount {
            distinct_values: int(&row[0], "distinct values")?,
            null_values: row[1].as_i64().unwrap_or(0),
        })
    }

    /// Every row of the given columns, each cell cast to text by the source.
    ///
    /// # Errors
    /// Returns a connection, query or unexpected-result error.
    pub async fn bulk_text(
        &self,
        key: &TableKey,
        columns: &[String],
    ) -> Result<Vec<Vec<Option<String>>>> {
        if columns.is_empty() {
            return Ok(Vec::new());
        }
        let projection = self
            .catalog
            .source(SourceOperation::TextProjection, self.engine())?;
        let fragments = columns
            .iter()
            .map(|column| projection.render(&Identifiers::new().identifier("column", column)))
            .collect::<Result<Vec<_>>>()?;

        let identifiers = Identifiers::table(key).fragment("columns", fragments.join(", "));
        let rows = self
            .run(SourceOperation::BulkSelect, &identifiers, key)
            .await?;

        rows.into_iter()
            .map(|row| {
                if row.len() == columns.len() {
                    Ok(row.into_iter().map(Value::into_text).collect())
                } else {
                    Err(ProfilerError::unexpected_result(format!(
                        "bulk select on {} returned {} columns, expected {}",
                        key,
                        row.len(),
                        columns.len()
                    )))
                }
            })
            .collect()
    }

    /// `(value, frequency)` for every distinct value of a column; NULL is
    /// its own group.
    ///
    /// # Errors
    /// Returns a connection, query or unexpected-result error.
    pub async fn frequencies(&self, key: &ColumnKey) -> Result<Vec<(Option<String>, i64)>> {
        let rows = self
            .run(
                SourceOperation::Frequency,
                &column_identifiers(key),
                &key.table,
            )
            .await?;
        grouped(rows, "frequency")
    }

    /// `(first day of month, frequency)` for a date column; NULL dates are
    /// excluded by the query.
    ///
    /// # Errors
    /// Returns a connection, query or unexpected-result error.
    pub async fn month_histogram(&self, key: &ColumnKey) -> Result<Vec<(Option<String>, i64)>> {
        let rows = self
            .run(
                SourceOperation::MonthHistogram,
                &column_identifiers(key),
                &key.table,
            )
            .await?;
        grouped(rows, "month frequency")
    }

    /// Aggregate statistics of a numeric column.
    ///
    /// Engines without a standard deviation aggregate report NULL for it;
    /// it is then derived from the variance.
    ///
    /// # Errors
    /// Returns a connection, query or unexpected-result error.
    pub async fn basic_stats(&self, key: &ColumnKey) -> Result<BasicStats> {
        let rows = self
            .run(
                SourceOperation::BasicStats,
                &column_identifiers(key),
                &key.table,
            )
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| ProfilerError::unexpected_result("basic stats returned no rows"))?;

        let variance = row[2].as_f64();
        Ok(BasicStats {
            avg: row[0].as_f64(),
            stdev: row[1]
                .as_f64()
                .or_else(|| variance.map(|v| v.max(0.0).sqrt())),
            variance,
            sum: row[3].as_f64(),
            max: row[4].as_f64(),
            min: row[5].as_f64(),
            range: row[6].as_f64(),
        })
    }

    /// Percentile ladder of a numeric column, `None` when it has no
    /// non-null values.
    ///
    /// # Errors
    /// Returns a connection, query or unexpected-result error.
    pub async fn percentiles(&self, key: &ColumnKey) -> Result<Option<Percentiles>> {
        let rows = self
            .run(
                SourceOperation::Percentiles,
                &column_identifiers(key),
                &key.table,
            )
            .await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };

        let mut ladder = [None; 12];
        for (slot, cell) in ladder.iter_mut().zip(row) {
            *slot = cell.as_f64();
        }
        if ladder.iter().all(Option::is_none) {
            return Ok(None);
        }
        Ok(Some(Percentiles::from_ladder(ladder)))
    }
}

fn column_identifiers(key: &ColumnKey) -> Identifiers {
    Identifiers::table(&key.table).identifier("column", &key.column)
}

fn text(value: &Value, what: &str) -> Result<String> {
    value
        .as_text()
        .ok_or_else(|| ProfilerError::unexpected_result(format!("{} is NULL", what)))
}

fn int(value: &Value, what: &str) -> Result<i64> {
    value.as_i64().ok_or_else(|| {
        ProfilerError::unexpected_result(format!("{} is not an integer: {}", what, value))
    })
}

fn single_int(rows: &[Vec<Value>], what: &str) -> Result<i64> {
    let row = rows
        .first()
        .ok_or_else(|| ProfilerError::unexpected_result(format!("{} returned no rows", what)))?;
    int(&row[0], what)
}

fn grouped(rows: Vec<Vec<Value>>, what: &str) -> Result<Vec<(Option<String>, i64)>> {
    rows.into_iter()
        .map(|mut row| {
            let frequency = int(&row[1], what)?;
            let value = std::mem::replace(&mut row[0], Value::Null).into_text();
            Ok((value, frequency))
        })
        .collect()
}
