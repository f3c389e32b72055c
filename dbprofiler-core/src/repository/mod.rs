//! Metadata repository.
//!
//! The repository stores the six record sets keyed by natural keys. Writes
//! are reconciled per key: absent keys are inserted, present keys are
//! replaced (delete then insert) when overwriting and left alone otherwise.
//! Inserts are always batched; each chunk is committed on its own.
//!
//! Every public operation opens its own connection and closes it before
//! returning, so concurrent stage workers never share one.

mod records;

pub use records::{Record, RecordKey};

use crate::connection::{self, ConnectionParams, DbConnection, SqlValue, Value};
use crate::dialect::{split_statements, DialectCatalog, QueryTemplate, RepositoryOperation, Role};
use crate::error::ProfilerError;
use crate::models::{
    ColumnKey, ColumnRecord, Percentiles, RecordSet, SchemaScope, TableKey, TableRecord,
};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Default number of rows per committed insert chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 5_000;

/// What [`MetadataRepository::reconcile`] did for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The key was absent and the rows were inserted.
    Inserted(u64),
    /// The key was present and its rows were replaced.
    Replaced { deleted: u64, inserted: u64 },
    /// The key was present and overwriting was off.
    Skipped,
}

impl ReconcileOutcome {
    /// Rows inserted by this reconciliation.
    pub const fn rows_written(self) -> u64 {
        match self {
            Self::Inserted(n) | Self::Replaced { inserted: n, .. } => n,
            Self::Skipped => 0,
        }
    }
}

/// Which inventory rows a run works on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryFilter {
    /// Tables with a known row count below this are skipped
    pub min_rows: i64,
    /// Restricts the run to one table
    pub table: Option<String>,
}

impl InventoryFilter {
    /// Whether a table takes part in the run. Tables whose row count is
    /// unknown are kept.
    pub fn admits(&self, record: &TableRecord) -> bool {
        if self
            .table
            .as_ref()
            .is_some_and(|name| *name != record.table.table)
        {
            return false;
        }
        !record.n_rows.is_some_and(|n| n < self.min_rows)
    }
}

/// Handle on the metadata repository.
#[derive(Debug, Clone)]
pub struct MetadataRepository {
    params: ConnectionParams,
    catalog: &'static DialectCatalog,
    chunk_size: usize,
}

impl MetadataRepository {
    /// Creates a handle after checking that the engine can host the
    /// repository.
    ///
    /// # Errors
    /// Returns `UnsupportedOperation` if the engine lacks a repository
    /// template, or a configuration error for incomplete parameters.
    pub fn new(params: ConnectionParams) -> Result<Self> {
        params.validate()?;
        let catalog = DialectCatalog::global();
        catalog.require(params.engine(), Role::Repository)?;
        Ok(Self {
            params,
            catalog,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Sets the number of rows per committed insert chunk (at least 1).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Connection parameters of the repository.
    pub const fn params(&self) -> &ConnectionParams {
        &self.params
    }

    fn template(&self, operation: RepositoryOperation) -> Result<&'static QueryTemplate> {
        self.catalog.repository(operation, self.params.engine())
    }

    async fn connect(&self) -> Result<DbConnection> {
        connection::open(&self.params).await
    }

    /// Creates the six record sets and their key indexes.
    ///
    /// With `overwrite` existing record sets are dropped first.
    ///
    /// # Errors
    /// Returns the first failing statement.
    pub async fn create_schema(&self, overwrite: bool) -> Result<()> {
        let mut conn = self.connect().await?;
        let result = self.create_schema_on(&mut conn, overwrite).await;
        conn.close().await;
        result
    }

    async fn create_schema_on(&self, conn: &mut DbConnection, overwrite: bool) -> Result<()> {
        if overwrite {
            for set in RecordSet::ALL.iter().rev() {
                let template = self.template(RepositoryOperation::DropRecordSet(*set))?;
                conn.execute(template.body(), &[]).await?;
                debug!("Dropped record set {}", set);
            }
        }
        for set in RecordSet::ALL {
            let template = self.template(RepositoryOperation::CreateRecordSet(set))?;
            for statement in split_statements(template.body()) {
                conn.execute(statement, &[]).await?;
            }
            debug!("Created record set {}", set);
        }
        info!(
            "Metadata repository ready on {} ({} record sets)",
            self.params,
            RecordSet::ALL.len()
        );
        Ok(())
    }

    /// Number of rows recorded under a key.
    ///
    /// # Errors
    /// Returns a query error or an unexpected-result error.
    pub async fn count<K: RecordKey>(&self, set: RecordSet, key: &K) -> Result<i64> {
        let mut conn = self.connect().await?;
        let result = self.count_on(&mut conn, set, key).await;
        conn.close().await;
        result
    }

    async fn count_on<K: RecordKey>(
        &self,
        conn: &mut DbConnection,
        set: RecordSet,
        key: &K,
    ) -> Result<i64> {
        let template = self.template(RepositoryOperation::Exists(set, K::DEPTH))?;
        let rows = conn.fetch_all(template.body(), &key.key_values()).await?;
        single_int(&rows, || format!("count of {} for {}", set, key))
    }

    /// Whether any row is recorded under a key.
    ///
    /// # Errors
    /// Returns a query error or an unexpected-result error.
    pub async fn exists<K: RecordKey>(&self, set: RecordSet, key: &K) -> Result<bool> {
        Ok(self.count(set, key).await? > 0)
    }

    /// Deletes every row recorded under a key.
    ///
    /// # Errors
    /// Returns a query error.
    pub async fn delete<K: RecordKey>(&self, set: RecordSet, key: &K) -> Result<u64> {
        let mut conn = self.connect().await?;
        let result = self.delete_on(&mut conn, set, key).await;
        conn.close().await;
        result
    }

    async fn delete_on<K: RecordKey>(
        &self,
        conn: &mut DbConnection,
        set: RecordSet,
        key: &K,
    ) -> Result<u64> {
        let template = self.template(RepositoryOperation::Delete(set, K::DEPTH))?;
        let deleted = conn.execute(template.body(), &key.key_values()).await?;
        debug!("Deleted {} {} rows for {}", deleted, set, key);
        Ok(deleted)
    }

    /// Inserts rows in committed chunks.
    ///
    /// # Errors
    /// Returns the first failing chunk's error; earlier chunks stay
    /// committed.
    pub async fn insert_many<R: Record>(&self, rows: &[R]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connect().await?;
        let result = self.insert_on(&mut conn, rows).await;
        conn.close().await;
        result
    }

    async fn insert_on<R: Record>(&self, conn: &mut DbConnection, rows: &[R]) -> Result<u64> {
        let template = self.template(RepositoryOperation::Insert(R::SET))?;
        let mut inserted: u64 = 0;
        for chunk in rows.chunks(self.chunk_size) {
            let values: Vec<Vec<SqlValue>> = chunk.iter().map(Record::values).collect();
            inserted = inserted.saturating_add(conn.execute_batch(template.body(), &values).await?);
            debug!("Committed {} {} rows", chunk.len(), R::SET);
        }
        Ok(inserted)
    }

    /// Reconciles the rows of one key.
    ///
    /// - key absent: insert
    /// - key present and `overwrite`: delete, then insert
    /// - key present otherwise: nothing
    ///
    /// # Errors
    /// Returns the first failing statement. A failed insert after a delete
    /// leaves the key empty; rerunning with `overwrite` repairs it.
    pub async fn reconcile<R: Record>(
        &self,
        key: &R::Key,
        rows: &[R],
        overwrite: bool,
    ) -> Result<ReconcileOutcome> {
        let mut conn = self.connect().await?;
        let result = self.reconcile_on(&mut conn, key, rows, overwrite).await;
        conn.close().await;
        result
    }

    async fn reconcile_on<R: Record>(
        &self,
        conn: &mut DbConnection,
        key: &R::Key,
        rows: &[R],
        overwrite: bool,
    ) -> Result<ReconcileOutcome> {
        let present = self.count_on(conn, R::SET, key).await? > 0;
        let outcome = match (present, overwrite) {
            (false, _) => ReconcileOutcome::Inserted(self.insert_on(conn, rows).await?),
            (true, true) => {
                let deleted = self.delete_on(conn, R::SET, key).await?;
                let inserted = self.insert_on(conn, rows).await?;
                ReconcileOutcome::Replaced { deleted, inserted }
            }
            (true, false) => ReconcileOutcome::Skipped,
        };
        debug!("Reconciled {} for {}: {:?}", R::SET, key, outcome);
        Ok(outcome)
    }

    /// Distinct table names recorded in `columns` for a scope.
    ///
    /// # Errors
    /// Returns a query error or an unexpected-result error.
    pub async fn column_tables(&self, scope: &SchemaScope) -> Result<Vec<String>> {
        let rows = self
            .query(RepositoryOperation::ColumnTables, &scope_values(scope))
            .await?;
        rows.iter()
            .map(|row| text_at(row, 0, "TABLE_NAME"))
            .collect()
    }

    /// `tables` rows of a scope, ordered by table name.
    ///
    /// # Errors
    /// Returns a query error or an unexpected-result error.
    pub async fn table_inventory(&self, scope: &SchemaScope) -> Result<Vec<TableRecord>> {
        let rows = self
            .query(RepositoryOperation::TableInventory, &scope_values(scope))
            .await?;
        rows.iter()
            .map(|row| {
                Ok(TableRecord {
                    table: scope.table(text_at(row, 0, "TABLE_NAME")?),
                    n_columns: optional_int_at(row, 1, "N_COLUMNS")?,
                    n_rows: optional_int_at(row, 2, "N_ROWS")?,
                })
            })
            .collect()
    }

    /// Recorded columns of a table, by ordinal position.
    ///
    /// # Errors
    /// Returns a query error or an unexpected-result error.
    pub async fn table_columns(&self, key: &TableKey) -> Result<Vec<ColumnRecord>> {
        let rows = self
            .query(RepositoryOperation::TableColumns, &key.key_values())
            .await?;
        rows.iter()
            .map(|row| {
                Ok(ColumnRecord {
                    table: key.clone(),
                    column: text_at(row, 0, "COLUMN_NAME")?,
                    ordinal_position: optional_int_at(row, 1, "ORDINAL_POSITION")?.ok_or_else(
                        || ProfilerError::unexpected_result("ORDINAL_POSITION is NULL"),
                    )?,
                    data_type: text_at(row, 2, "DATA_TYPE")?,
                })
            })
            .collect()
    }

    /// Recorded distinct-value count per column of a table.
    ///
    /// # Errors
    /// Returns a query error or an unexpected-result error.
    pub async fn distinct_value_counts(&self, key: &TableKey) -> Result<HashMap<String, i64>> {
        let rows = self
            .query(RepositoryOperation::DistinctValueCounts, &key.key_values())
            .await?;
        let mut counts = HashMap::with_capacity(rows.len());
        for row in &rows {
            if let Some(count) = optional_int_at(row, 1, "DISTINCT_VALUES")? {
                counts.insert(text_at(row, 0, "COLUMN_NAME")?, count);
            }
        }
        Ok(counts)
    }

    /// Updates `N_ROWS` of an existing table row in place.
    ///
    /// # Errors
    /// Returns a query error.
    pub async fn refresh_row_count(&self, key: &TableKey, n_rows: Option<i64>) -> Result<u64> {
        let mut values = vec![SqlValue::from(n_rows)];
        values.extend(key.key_values());
        self.update(RepositoryOperation::RefreshRowCount, &values).await
    }

    /// Updates the percentile ladder of an existing stats row in place.
    ///
    /// # Errors
    /// Returns a query error.
    pub async fn refresh_percentiles(
        &self,
        key: &ColumnKey,
        percentiles: &Percentiles,
    ) -> Result<u64> {
        let mut values: Vec<SqlValue> = percentiles.ladder().map(SqlValue::from).to_vec();
        values.extend(key.key_values());
        self.update(RepositoryOperation::RefreshPercentiles, &values)
            .await
    }

    async fn query(
        &self,
        operation: RepositoryOperation,
        values: &[SqlValue],
    ) -> Result<Vec<Vec<Value>>> {
        let template = self.template(operation)?;
        let mut conn = self.connect().await?;
        let result = conn.fetch_all(template.body(), values).await;
        conn.close().await;
        result
    }

    async fn update(&self, operation: RepositoryOperation, values: &[SqlValue]) -> Result<u64> {
        let template = self.template(operation)?;
        let mut conn = self.connect().await?;
        let result = conn.execute(template.body(), values).await;
        conn.close().await;
        result
    }
}

fn scope_values(scope: &SchemaScope) -> Vec<SqlValue> {
    vec![
        SqlValue::from(scope.server.as_str()),
        SqlValue::from(scope.catalog.as_str()),
        SqlValue::from(scope.schema.as_str()),
    ]
}

fn text_at(row: &[Value], index: usize, field: &str) -> Result<String> {
    row.get(index)
        .and_then(Value::as_text)
        .ok_or_else(|| ProfilerError::unexpected_result(format!("{} is missing or NULL", field)))
}

fn optional_int_at(row: &[Value], index: usize, field: &str) -> Result<Option<i64>> {
    match row.get(index) {
        None => Err(ProfilerError::unexpected_result(format!(
            "{} is missing",
            field
        ))),
        Some(Value::Null) => Ok(None),
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            ProfilerError::unexpected_result(format!("{} is not an integer: {}", field, value))
        }),
    }
}

fn single_int(rows: &[Vec<Value>], what: impl FnOnce() -> String) -> Result<i64> {
    rows.first()
        .and_then(|row| row.first())
        .and_then(Value::as_i64)
        .ok_or_else(|| ProfilerError::unexpected_result(format!("{} returned no value", what())))
}
