//! End-to-end profiling runs against SQLite files.
//!
//! This test suite covers:
//! - Repository creation and direct reconciliation
//! - A full run over a small orders database
//! - Reconciliation with and without overwrite
//! - Cardinality threshold and table filters
//! - Bulk and per-column paths producing the same rows
//! - Percentile refresh in place
//! - Partial stages keeping what was recorded before a failure
//!
//! Note: SQLite tests use temporary files, so no testcontainers needed.

#![cfg(feature = "sqlite")]
#![allow(clippy::unwrap_used)]

use dbprofiler_core::{
    ConnectionParams, ErrorKind, MetadataRepository, ProfileOptions, ProfilerError, ReconcileOutcome, Result,
    Role, StageName, StageStatus, create_repository,
    models::{ColumnRecord, RecordSet, SchemaScope},
    profile,
};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn db(e: sqlx::Error) -> ProfilerError {
    ProfilerError::query_failed("test setup", e)
}

/// Source and repository files in one temporary directory
struct Fixture {
    _dir: TempDir,
    source: PathBuf,
    target: PathBuf,
}

impl Fixture {
    async fn new() -> Result<Self> {
        let dir = tempfile::tempdir().map_err(|e| ProfilerError::io("tempdir", e))?;
        let source = dir.path().join("shop.db");
        let target = dir.path().join("meta.db");
        let fixture = Self {
            _dir: dir,
            source,
            target,
        };
        fixture
            .exec_source(&[
                "CREATE TABLE orders (id INTEGER, status VARCHAR(20), amount REAL, created DATE, notes TEXT)",
                "INSERT INTO orders VALUES \
                 (1, 'shipped', 10.0, '2024-01-05', 'a'), \
                 (2, 'shipped', 20.0, '2024-01-20', NULL), \
                 (3, 'shipped', 30.0, '2024-02-03', 'b'), \
                 (4, 'pending', 40.0, NULL, NULL), \
                 (5, 'pending', 50.0, '2024-02-28', 'c'), \
                 (6, NULL, 60.0, '2024-03-15', NULL)",
                "CREATE TABLE audit (id INTEGER, at DATE)",
            ])
            .await?;
        create_repository(fixture.target_params()?, false).await?;
        Ok(fixture)
    }

    fn source_params(&self) -> Result<ConnectionParams> {
        ConnectionParams::from_url(&url(&self.source), Role::Source)
    }

    fn target_params(&self) -> Result<ConnectionParams> {
        ConnectionParams::from_url(&url(&self.target), Role::Repository)
    }

    async fn run(&self, options: ProfileOptions) -> Result<dbprofiler_core::ProfileReport> {
        profile(self.source_params()?, self.target_params()?, options).await
    }

    async fn exec_source(&self, statements: &[&str]) -> Result<()> {
        let options = SqliteConnectOptions::new()
            .filename(&self.source)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);
        let pool = SqlitePool::connect_with(options).await.map_err(db)?;
        for statement in statements {
            sqlx::query(statement).execute(&pool).await.map_err(db)?;
        }
        pool.close().await;
        Ok(())
    }

    async fn repository(&self) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::new().filename(&self.target);
        SqlitePool::connect_with(options).await.map_err(db)
    }

    async fn count(&self, set: &str, table: &str) -> Result<i64> {
        let pool = self.repository().await?;
        let sql = format!("SELECT COUNT(*) FROM {} WHERE \"TABLE_NAME\" = ?", set);
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(table)
            .fetch_one(&pool)
            .await
            .map_err(db)?;
        pool.close().await;
        Ok(count)
    }

    async fn data_values(&self, table: &str, column: &str) -> Result<Vec<(Option<String>, i64)>> {
        let pool = self.repository().await?;
        let rows = sqlx::query_as(
            "SELECT \"DATA_VALUE\", \"FREQUENCY_NUMBER\" FROM data_values \
             WHERE \"TABLE_NAME\" = ? AND \"COLUMN_NAME\" = ? \
             ORDER BY \"FREQUENCY_NUMBER\" DESC, \"DATA_VALUE\"",
        )
        .bind(table)
        .bind(column)
        .fetch_all(&pool)
        .await
        .map_err(db)?;
        pool.close().await;
        Ok(rows)
    }

    async fn uniques(&self, table: &str) -> Result<Vec<(String, i64, i64)>> {
        let pool = self.repository().await?;
        let rows = sqlx::query_as(
            "SELECT \"COLUMN_NAME\", \"DISTINCT_VALUES\", \"NULL_VALUES\" FROM uniques \
             WHERE \"TABLE_NAME\" = ? ORDER BY \"ORDINAL_POSITION\"",
        )
        .bind(table)
        .fetch_all(&pool)
        .await
        .map_err(db)?;
        pool.close().await;
        Ok(rows)
    }

    async fn n_rows(&self, table: &str) -> Result<Option<i64>> {
        let pool = self.repository().await?;
        let n_rows = sqlx::query_scalar("SELECT \"N_ROWS\" FROM tables WHERE \"TABLE_NAME\" = ?")
            .bind(table)
            .fetch_one(&pool)
            .await
            .map_err(db)?;
        pool.close().await;
        Ok(n_rows)
    }

    async fn amount_stats(&self) -> Result<(Option<f64>, Option<f64>, Option<f64>, Option<f64>)> {
        let pool = self.repository().await?;
        let row = sqlx::query_as(
            "SELECT \"AVG\", \"VAR\", \"Q2\", \"IQR\" FROM stats \
             WHERE \"TABLE_NAME\" = 'orders' AND \"COLUMN_NAME\" = 'amount'",
        )
        .fetch_one(&pool)
        .await
        .map_err(db)?;
        pool.close().await;
        Ok(row)
    }
}

fn url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

fn approx(actual: Option<f64>, expected: f64) -> bool {
    actual.is_some_and(|v| (v - expected).abs() < 1e-9)
}

// =============================================================================
// Repository
// =============================================================================

/// Creating the repository twice is harmless; overwrite recreates it empty
#[tokio::test]
async fn test_create_repository_is_idempotent() -> Result<()> {
    let fixture = Fixture::new().await?;
    create_repository(fixture.target_params()?, false).await?;
    fixture.run(ProfileOptions::default()).await?;
    assert!(fixture.count("columns", "orders").await? > 0);

    create_repository(fixture.target_params()?, true).await?;
    assert_eq!(fixture.count("columns", "orders").await?, 0);
    Ok(())
}

/// Reconciliation outcomes for absent and present keys
#[tokio::test]
async fn test_reconcile_outcomes() -> Result<()> {
    let fixture = Fixture::new().await?;
    let repository = MetadataRepository::new(fixture.target_params()?)?.with_chunk_size(1);
    let key = SchemaScope::new("localhost", "shop.db", "main").table("t");
    let rows: Vec<ColumnRecord> = ["a", "b", "c"]
        .iter()
        .zip(1..)
        .map(|(name, position)| ColumnRecord {
            table: key.clone(),
            column: (*name).to_string(),
            ordinal_position: position,
            data_type: "INTEGER".to_string(),
        })
        .collect();

    assert!(!repository.exists(RecordSet::Columns, &key).await?);
    assert_eq!(
        repository.reconcile(&key, &rows, false).await?,
        ReconcileOutcome::Inserted(3)
    );
    assert_eq!(repository.count(RecordSet::Columns, &key).await?, 3);
    assert_eq!(
        repository.reconcile(&key, &rows[..1], false).await?,
        ReconcileOutcome::Skipped
    );
    assert_eq!(
        repository.reconcile(&key, &rows[..1], true).await?,
        ReconcileOutcome::Replaced {
            deleted: 3,
            inserted: 1
        }
    );
    assert_eq!(repository.table_columns(&key).await?.len(), 1);
    Ok(())
}

// =============================================================================
// Full runs
// =============================================================================

/// Every stage writes what the orders database implies
#[tokio::test]
async fn test_profile_orders() -> Result<()> {
    let fixture = Fixture::new().await?;
    let report = fixture
        .run(ProfileOptions::default().with_percentiles(true))
        .await?;

    assert!(!report.has_failures(), "{}", report.to_json()?);
    assert_eq!(report.stages.len(), 6);
    assert!(report.stages.iter().all(|s| s.status == StageStatus::Succeeded));
    assert_eq!(report.tables_profiled, 2);
    let columns = report.stage(StageName::Columns).unwrap();
    assert_eq!(columns.units_processed, 2);
    assert_eq!(columns.rows_written, 7);

    assert_eq!(fixture.count("columns", "orders").await?, 5);
    assert_eq!(fixture.n_rows("orders").await?, Some(6));
    assert_eq!(fixture.n_rows("audit").await?, Some(0));

    let uniques = fixture.uniques("orders").await?;
    assert_eq!(
        uniques,
        vec![
            ("id".to_string(), 6, 0),
            ("status".to_string(), 2, 1),
            ("amount".to_string(), 6, 0),
            ("created".to_string(), 5, 1),
            ("notes".to_string(), 3, 3),
        ]
    );

    assert_eq!(
        fixture.data_values("orders", "status").await?,
        vec![
            (Some("shipped".to_string()), 3),
            (Some("pending".to_string()), 2),
            (None, 1),
        ]
    );
    assert!(fixture.data_values("orders", "notes").await?.is_empty());
    assert_eq!(fixture.count("data_values", "orders").await?, 21);

    let pool = fixture.repository().await?;
    let buckets: Vec<(String, i64)> = sqlx::query_as(
        "SELECT CAST(\"DATA_VALUE\" AS TEXT), \"FREQUENCY_NUMBER\" FROM dates \
         WHERE \"TABLE_NAME\" = 'orders' AND \"COLUMN_NAME\" = 'created' ORDER BY 1",
    )
    .fetch_all(&pool)
    .await
    .map_err(db)?;
    pool.close().await;
    assert_eq!(
        buckets,
        vec![
            ("2024-01-01".to_string(), 2),
            ("2024-02-01".to_string(), 2),
            ("2024-03-01".to_string(), 1),
        ]
    );

    let (avg, var, q2, iqr) = fixture.amount_stats().await?;
    assert!(approx(avg, 35.0));
    assert!(approx(var, 350.0));
    assert!(approx(q2, 30.0));
    assert!(approx(iqr, 30.0));
    Ok(())
}

/// An empty table is inventoried but produces no child rows
#[tokio::test]
async fn test_empty_table_has_no_child_rows() -> Result<()> {
    let fixture = Fixture::new().await?;
    fixture.run(ProfileOptions::default()).await?;

    assert_eq!(fixture.count("columns", "audit").await?, 2);
    for set in ["uniques", "data_values", "dates", "stats"] {
        assert_eq!(fixture.count(set, "audit").await?, 0, "{} rows for audit", set);
    }
    Ok(())
}

/// Running twice with overwrite yields the same repository content
#[tokio::test]
async fn test_rerun_is_idempotent() -> Result<()> {
    let fixture = Fixture::new().await?;
    fixture.run(ProfileOptions::default()).await?;
    let mut first = Vec::new();
    for set in ["columns", "tables", "uniques", "data_values", "dates", "stats"] {
        first.push(fixture.count(set, "orders").await?);
    }

    let report = fixture.run(ProfileOptions::default()).await?;
    assert!(!report.has_failures());
    let mut second = Vec::new();
    for set in ["columns", "tables", "uniques", "data_values", "dates", "stats"] {
        second.push(fixture.count(set, "orders").await?);
    }
    assert_eq!(first, second);
    assert_eq!(fixture.data_values("orders", "status").await?.len(), 3);
    Ok(())
}

/// Without overwrite existing keys are kept; only row counts refresh
#[tokio::test]
async fn test_overwrite_false_keeps_stale_columns() -> Result<()> {
    let fixture = Fixture::new().await?;
    fixture.run(ProfileOptions::default()).await?;

    fixture
        .exec_source(&[
            "ALTER TABLE orders ADD COLUMN region VARCHAR(10)",
            "INSERT INTO orders (id) VALUES (7)",
        ])
        .await?;

    let report = fixture
        .run(ProfileOptions::default().with_overwrite(false))
        .await?;
    assert!(!report.has_failures());
    assert_eq!(report.stage(StageName::Columns).unwrap().units_skipped, 2);
    assert_eq!(fixture.count("columns", "orders").await?, 5);
    assert_eq!(fixture.n_rows("orders").await?, Some(7));
    assert_eq!(fixture.data_values("orders", "status").await?.len(), 3);

    fixture.run(ProfileOptions::default()).await?;
    assert_eq!(fixture.count("columns", "orders").await?, 6);
    assert_eq!(
        fixture.data_values("orders", "status").await?,
        vec![
            (Some("shipped".to_string()), 3),
            (None, 2),
            (Some("pending".to_string()), 2),
        ]
    );
    Ok(())
}

/// Columns above the threshold lose their stale data values
#[tokio::test]
async fn test_cardinality_threshold() -> Result<()> {
    let fixture = Fixture::new().await?;
    fixture.run(ProfileOptions::default()).await?;
    assert_eq!(fixture.data_values("orders", "id").await?.len(), 6);

    let report = fixture
        .run(ProfileOptions::default().with_cardinality_threshold(2))
        .await?;
    assert!(!report.has_failures());
    assert_eq!(fixture.data_values("orders", "status").await?.len(), 3);
    assert!(fixture.data_values("orders", "id").await?.is_empty());
    assert!(fixture.data_values("orders", "created").await?.is_empty());
    assert_eq!(fixture.count("data_values", "orders").await?, 3);
    Ok(())
}

/// The per-column path and narrow bulk batches match the default bulk run
#[tokio::test]
async fn test_execution_paths_agree() -> Result<()> {
    let fixture = Fixture::new().await?;
    fixture.run(ProfileOptions::default()).await?;
    let bulk_uniques = fixture.uniques("orders").await?;
    let bulk_values = fixture.data_values("orders", "created").await?;

    // A row count equal to the limit is not eligible for the bulk path.
    fixture
        .run(ProfileOptions::default().with_max_rows_for_bulk(6))
        .await?;
    assert_eq!(fixture.uniques("orders").await?, bulk_uniques);
    assert_eq!(fixture.data_values("orders", "created").await?, bulk_values);

    fixture
        .run(ProfileOptions::default().with_max_columns_per_query(1))
        .await?;
    assert_eq!(fixture.uniques("orders").await?, bulk_uniques);
    assert_eq!(fixture.data_values("orders", "created").await?, bulk_values);
    Ok(())
}

/// Values of mixed storage classes compare by their text on both paths
#[tokio::test]
async fn test_mixed_storage_classes_count_as_text() -> Result<()> {
    let fixture = Fixture::new().await?;
    fixture
        .exec_source(&[
            "CREATE TABLE loose (v)",
            "INSERT INTO loose VALUES (1), ('1'), (2)",
        ])
        .await?;

    for options in [
        ProfileOptions::default(),
        ProfileOptions::default().with_max_rows_for_bulk(1),
    ] {
        let report = fixture.run(options.with_table("loose")).await?;
        assert!(!report.has_failures(), "{}", report.to_json()?);
        assert_eq!(fixture.uniques("loose").await?, vec![("v".to_string(), 2, 0)]);
        assert_eq!(
            fixture.data_values("loose", "v").await?,
            vec![(Some("1".to_string()), 2), (Some("2".to_string()), 1)]
        );
    }
    Ok(())
}

/// Unix-epoch integers are bucketed; text that is not a date is reported
#[tokio::test]
async fn test_unplaceable_dates_are_reported() -> Result<()> {
    let fixture = Fixture::new().await?;
    fixture
        .exec_source(&[
            "CREATE TABLE events (at DATETIME)",
            "INSERT INTO events VALUES (1704067200), (1706745600), (1707000000), ('not a date')",
        ])
        .await?;

    let report = fixture.run(ProfileOptions::default()).await?;
    let dates = report.stage(StageName::Dates).unwrap();
    assert_eq!(dates.status, StageStatus::Partial);
    assert_eq!(dates.units_failed, 1);
    assert_eq!(dates.failures[0].kind, ErrorKind::DataIntegrity);
    assert!(dates.failures[0].key.contains("events"));

    let pool = fixture.repository().await?;
    let buckets: Vec<(String, i64)> = sqlx::query_as(
        "SELECT CAST(\"DATA_VALUE\" AS TEXT), \"FREQUENCY_NUMBER\" FROM dates \
         WHERE \"TABLE_NAME\" = 'events' ORDER BY 1",
    )
    .fetch_all(&pool)
    .await
    .map_err(db)?;
    pool.close().await;
    assert_eq!(
        buckets,
        vec![("2024-01-01".to_string(), 1), ("2024-02-01".to_string(), 2)]
    );
    Ok(())
}

// =============================================================================
// Failures
// =============================================================================

/// A table that fails leaves the other tables profiled and the stage partial
#[tokio::test]
async fn test_failed_table_leaves_stage_partial() -> Result<()> {
    let fixture = Fixture::new().await?;
    fixture
        .exec_source(&[
            "CREATE TABLE items (sku VARCHAR(8), qty INTEGER)",
            "INSERT INTO items VALUES ('a1', 2), ('b2', 5), ('c3', 5)",
        ])
        .await?;
    fixture
        .run(ProfileOptions::default().with_stages(vec![StageName::Columns, StageName::Tables]))
        .await?;

    fixture.exec_source(&["DROP TABLE orders"]).await?;
    let report = fixture
        .run(ProfileOptions::default().with_stages(vec![
            StageName::Uniques,
            StageName::DataValues,
            StageName::Dates,
            StageName::Stats,
        ]))
        .await?;

    assert!(report.has_failures());
    for stage in [StageName::Uniques, StageName::Dates, StageName::Stats] {
        let stage_report = report.stage(stage).unwrap();
        assert_eq!(stage_report.status, StageStatus::Partial, "{}", stage);
        assert!(stage_report.units_failed > 0, "{}", stage);
        assert!(stage_report.units_processed > 0, "{}", stage);
        assert!(
            stage_report.failures.iter().all(|f| f.key.contains("orders")),
            "{}",
            stage
        );
    }
    assert_eq!(
        fixture.uniques("items").await?,
        vec![("sku".to_string(), 3, 0), ("qty".to_string(), 2, 0)]
    );
    assert_eq!(fixture.count("stats", "items").await?, 1);
    assert_eq!(fixture.data_values("items", "qty").await?.len(), 2);
    Ok(())
}

/// Columns that cannot be counted keep the recorded uniques and data values
#[tokio::test]
async fn test_failed_columns_keep_recorded_uniques() -> Result<()> {
    let fixture = Fixture::new().await?;
    fixture.run(ProfileOptions::default()).await?;
    let recorded = fixture.uniques("orders").await?;
    assert_eq!(recorded.len(), 5);

    fixture.exec_source(&["DROP TABLE orders"]).await?;
    let report = fixture
        .run(
            ProfileOptions::default()
                .with_stages(vec![StageName::Uniques, StageName::DataValues])
                .with_max_rows_for_bulk(1),
        )
        .await?;

    let uniques = report.stage(StageName::Uniques).unwrap();
    assert_eq!(uniques.units_failed, 5);
    assert_eq!(uniques.status, StageStatus::Partial);
    assert_eq!(fixture.uniques("orders").await?, recorded);

    assert!(report.stage(StageName::DataValues).unwrap().units_failed > 0);
    assert_eq!(fixture.data_values("orders", "status").await?.len(), 3);
    Ok(())
}

/// A row count that fails keeps the recorded one
#[tokio::test]
async fn test_failed_row_count_keeps_recorded_rows() -> Result<()> {
    let fixture = Fixture::new().await?;
    fixture.run(ProfileOptions::default()).await?;
    assert_eq!(fixture.n_rows("orders").await?, Some(6));

    fixture.exec_source(&["DROP TABLE orders"]).await?;
    let report = fixture
        .run(
            ProfileOptions::default()
                .with_overwrite(false)
                .with_stages(vec![StageName::Tables]),
        )
        .await?;

    assert!(report.stage(StageName::Tables).unwrap().units_skipped > 0);
    assert_eq!(fixture.n_rows("orders").await?, Some(6));
    Ok(())
}

/// Percentiles are filled in place on an existing stats row
#[tokio::test]
async fn test_percentile_refresh() -> Result<()> {
    let fixture = Fixture::new().await?;
    fixture.run(ProfileOptions::default()).await?;
    let (avg, _, q2, _) = fixture.amount_stats().await?;
    assert!(approx(avg, 35.0));
    assert_eq!(q2, None);

    let report = fixture
        .run(
            ProfileOptions::default()
                .with_overwrite(false)
                .with_percentiles(true)
                .with_stages(vec![StageName::Stats]),
        )
        .await?;
    assert_eq!(report.stages.len(), 1);
    let (avg, _, q2, iqr) = fixture.amount_stats().await?;
    assert!(approx(avg, 35.0));
    assert!(approx(q2, 30.0));
    assert!(approx(iqr, 30.0));
    assert_eq!(fixture.count("stats", "orders").await?, 2);
    Ok(())
}

/// Table and minimum-row filters narrow the run
#[tokio::test]
async fn test_table_filters() -> Result<()> {
    let fixture = Fixture::new().await?;
    let report = fixture
        .run(ProfileOptions::default().with_table("audit"))
        .await?;
    assert_eq!(report.tables_profiled, 1);
    assert_eq!(fixture.count("columns", "orders").await?, 0);
    assert_eq!(fixture.count("columns", "audit").await?, 2);

    let report = fixture.run(ProfileOptions::default().with_min_rows(1)).await?;
    assert_eq!(report.tables_profiled, 1);
    assert_eq!(fixture.count("uniques", "orders").await?, 5);
    Ok(())
}

/// Concurrent workers cover every table once
#[tokio::test]
async fn test_concurrent_tables() -> Result<()> {
    let fixture = Fixture::new().await?;
    let mut statements = Vec::new();
    for i in 0..6 {
        statements.push(format!("CREATE TABLE t{} (k INTEGER, label VARCHAR(8))", i));
        statements.push(format!("INSERT INTO t{} VALUES (1, 'x'), (2, 'y'), (3, NULL)", i));
    }
    let statements: Vec<&str> = statements.iter().map(String::as_str).collect();
    fixture.exec_source(&statements).await?;

    let report = fixture
        .run(ProfileOptions::default().with_max_concurrent_tables(4)?)
        .await?;
    assert!(!report.has_failures());
    assert_eq!(report.tables_profiled, 8);
    assert_eq!(report.stage(StageName::Uniques).unwrap().units_processed, 8);
    for i in 0..6 {
        let table = format!("t{}", i);
        assert_eq!(fixture.count("uniques", &table).await?, 2);
        assert_eq!(fixture.data_values(&table, "label").await?.len(), 3);
    }
    Ok(())
}

/// Report file is written as JSON
#[tokio::test]
async fn test_report_file() -> Result<()> {
    let fixture = Fixture::new().await?;
    let report = fixture.run(ProfileOptions::default()).await?;
    let path = fixture.target.with_file_name("report.json");
    report.write_json(&path).await?;

    let json = std::fs::read_to_string(&path).map_err(|e| ProfilerError::io("read report", e))?;
    let value: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| ProfilerError::serialization("report", e))?;
    assert_eq!(value["stages"].as_array().map(Vec::len), Some(6));
    assert!(value["source"].as_str().unwrap().contains("shop.db"));
    Ok(())
}
