//! MySQL profiling runs with testcontainers.
//!
//! The repository gets its own database so that its tables are not part of
//! the profiled schema.

#![cfg(feature = "mysql")]
#![allow(clippy::unwrap_used)]

use dbprofiler_core::{
    ConnectionParams, ProfileOptions, ProfilerError, Result, Role, StageName, create_repository,
    profile,
};
use sqlx::MySqlPool;
use std::time::Duration;
use testcontainers_modules::{mysql::Mysql, testcontainers::runners::AsyncRunner};

/// Helper function to wait for MySQL to be ready
async fn wait_for_mysql_ready(database_url: &str, max_attempts: u32) -> Result<()> {
    let mut attempts = 0;
    while attempts < max_attempts {
        if let Ok(pool) = MySqlPool::connect(database_url).await {
            if sqlx::query("SELECT 1").fetch_one(&pool).await.is_ok() {
                pool.close().await;
                return Ok(());
            }
            pool.close().await;
        }
        attempts += 1;
        if attempts < max_attempts {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
    Err(ProfilerError::connection_failed(
        "MySQL container",
        std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!(
                "MySQL failed to become ready after {} attempts",
                max_attempts
            ),
        ),
    ))
}

fn db(e: sqlx::Error) -> ProfilerError {
    ProfilerError::query_failed("test setup", e)
}

/// Full run, then a rerun without overwrite that only refreshes row counts
#[tokio::test]
async fn test_mysql_profile() -> Result<()> {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let source_url = format!("mysql://root@localhost:{}/test", port);
    let target_url = format!("mysql://root@localhost:{}/meta", port);
    wait_for_mysql_ready(&source_url, 30).await?;

    let pool = MySqlPool::connect(&source_url).await.map_err(db)?;
    for statement in [
        "CREATE DATABASE meta",
        "CREATE TABLE orders (id INT UNSIGNED, status VARCHAR(20), amount DECIMAL(10,2), created DATETIME, notes TEXT)",
        "INSERT INTO orders VALUES \
         (1, 'shipped', 10, '2024-01-05 10:00:00', 'a'), \
         (2, 'shipped', 20, '2024-01-20 11:00:00', NULL), \
         (3, 'shipped', 30, '2024-02-03 12:00:00', 'b'), \
         (4, 'pending', 40, NULL, NULL), \
         (5, 'pending', 50, '2024-02-28 13:00:00', 'c'), \
         (6, NULL, 60, '2024-03-15 14:00:00', NULL)",
    ] {
        sqlx::query(statement).execute(&pool).await.map_err(db)?;
    }

    let source = ConnectionParams::from_url(&source_url, Role::Source)?;
    let target = ConnectionParams::from_url(&target_url, Role::Repository)?;
    create_repository(target.clone(), false).await?;

    let report = profile(
        source.clone(),
        target.clone(),
        ProfileOptions::default().with_percentiles(true),
    )
    .await?;
    assert!(!report.has_failures(), "{}", report.to_json()?);

    let (distinct, nulls): (i64, i64) = sqlx::query_as(
        "SELECT DISTINCT_VALUES, NULL_VALUES FROM meta.uniques \
         WHERE TABLE_NAME = 'orders' AND COLUMN_NAME = 'status'",
    )
    .fetch_one(&pool)
    .await
    .map_err(db)?;
    assert_eq!((distinct, nulls), (2, 1));

    let (q2, iqr): (Option<f64>, Option<f64>) = sqlx::query_as(
        "SELECT Q2, IQR FROM meta.stats WHERE TABLE_NAME = 'orders' AND COLUMN_NAME = 'amount'",
    )
    .fetch_one(&pool)
    .await
    .map_err(db)?;
    assert_eq!((q2, iqr), (Some(30.0), Some(30.0)));

    sqlx::query("INSERT INTO orders (id) VALUES (7)")
        .execute(&pool)
        .await
        .map_err(db)?;
    let report = profile(
        source,
        target,
        ProfileOptions::default()
            .with_overwrite(false)
            .with_stages(vec![StageName::Columns, StageName::Tables]),
    )
    .await?;
    assert_eq!(report.stages.len(), 2);

    let n_rows: Option<i64> =
        sqlx::query_scalar("SELECT N_ROWS FROM meta.tables WHERE TABLE_NAME = 'orders'")
            .fetch_one(&pool)
            .await
            .map_err(db)?;
    assert_eq!(n_rows, Some(7));

    pool.close().await;
    Ok(())
}

/// A server URL without a database writes to the repository schema given
#[tokio::test]
async fn test_mysql_repository_schema() -> Result<()> {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let source_url = format!("mysql://root@localhost:{}/test", port);
    wait_for_mysql_ready(&source_url, 30).await?;

    let pool = MySqlPool::connect(&source_url).await.map_err(db)?;
    for statement in [
        "CREATE DATABASE profiling",
        "CREATE TABLE codes (code VARCHAR(4))",
        "INSERT INTO codes VALUES ('a'), ('A'), ('a '), (NULL)",
    ] {
        sqlx::query(statement).execute(&pool).await.map_err(db)?;
    }

    let source = ConnectionParams::from_url(&source_url, Role::Source)?;
    let target = ConnectionParams::from_url(&format!("mysql://root@localhost:{}", port), Role::Repository)?
        .with_schema("profiling");
    create_repository(target.clone(), false).await?;

    let report = profile(source, target, ProfileOptions::default()).await?;
    assert!(!report.has_failures(), "{}", report.to_json()?);

    let (distinct, nulls): (i64, i64) = sqlx::query_as(
        "SELECT DISTINCT_VALUES, NULL_VALUES FROM profiling.uniques \
         WHERE TABLE_NAME = 'codes' AND COLUMN_NAME = 'code'",
    )
    .fetch_one(&pool)
    .await
    .map_err(db)?;
    assert_eq!((distinct, nulls), (3, 1));

    let values: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM profiling.data_values WHERE TABLE_NAME = 'codes'",
    )
    .fetch_one(&pool)
    .await
    .map_err(db)?;
    assert_eq!(values, 4);

    let misplaced: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM information_schema.tables \
         WHERE TABLE_SCHEMA = 'test' AND TABLE_NAME = 'uniques'",
    )
    .fetch_one(&pool)
    .await
    .map_err(db)?;
    assert_eq!(misplaced, 0);

    pool.close().await;
    Ok(())
}
