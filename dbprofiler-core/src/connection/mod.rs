//! Connection provider.
//!
//! Opens one connection per operation from [`ConnectionParams`]; there is
//! no pooling. Rows are materialized into [`Value`]s so callers are
//! independent of the driver, and bind values are typed [`SqlValue`]s.
//!
//! Drivers are feature gated: `sqlite`, `postgresql` and `mysql` go through
//! sqlx (MariaDB uses the MySQL driver), `mssql` through tiberius. Opening
//! an engine whose driver is not compiled in fails with
//! `UnsupportedOperation`.

mod params;
mod value;

#[cfg(feature = "mssql")]
mod mssql;

pub use params::{ConnectionParams, DEFAULT_CONNECT_TIMEOUT, detect_engine};
pub use value::{SqlValue, Value};

use crate::dialect::Role;
#[cfg(feature = "postgresql")]
use crate::dialect::QuoteStyle;
use crate::error::ProfilerError;
use crate::models::Engine;
use crate::Result;
use std::future::Future;
use tracing::debug;

#[cfg(any(feature = "sqlite", feature = "postgresql", feature = "mysql"))]
use sqlx::{Column, Connection, Row, TypeInfo};

/// Binds typed values onto a sqlx query, in order.
#[cfg(any(feature = "sqlite", feature = "postgresql", feature = "mysql"))]
macro_rules! bind_values {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                SqlValue::Int(v) => query.bind(*v),
                SqlValue::Float(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.clone()),
                SqlValue::Date(v) => query.bind(*v),
            };
        }
        query
    }};
}

/// Decodes every cell of a sqlx row, trying driver types in order.
#[cfg(any(feature = "sqlite", feature = "postgresql", feature = "mysql"))]
macro_rules! decode_row {
    ($row:expr, [$($ty:ty => $map:expr),+ $(,)?]) => {{
        let row = $row;
        let mut cells = Vec::with_capacity(row.len());
        for index in 0..row.len() {
            let cell = 'cell: {
                $(
                    if let Ok(v) = row.try_get::<Option<$ty>, _>(index) {
                        break 'cell Ok(v.map_or(Value::Null, $map));
                    }
                )+
                Err(ProfilerError::unexpected_result(format!(
                    "unsupported result type {} in column {}",
                    row.column(index).type_info().name(),
                    row.column(index).name()
                )))
            };
            cells.push(cell?);
        }
        Ok::<Vec<Value>, ProfilerError>(cells)
    }};
}

/// One open connection to a source or repository.
#[derive(Debug)]
pub struct DbConnection {
    engine: Engine,
    driver: Driver,
}

#[derive(Debug)]
enum Driver {
    #[cfg(feature = "sqlite")]
    Sqlite(sqlx::SqliteConnection),
    #[cfg(feature = "postgresql")]
    Postgres(sqlx::PgConnection),
    #[cfg(feature = "mysql")]
    MySql(sqlx::MySqlConnection),
    #[cfg(feature = "mssql")]
    SqlServer(Box<mssql::MssqlClient>),
}

/// Opens a connection for the given parameters.
///
/// SQLite sources are opened read-only; a SQLite repository is created if
/// the file does not exist. Repository connections work in the repository
/// schema: PostgreSQL sets it as the `search_path`, MySQL and MariaDB
/// select it as the current database.
///
/// # Errors
/// Returns `UnsupportedOperation` if the engine's driver is not compiled
/// in, and a connection error if the database is unreachable or the
/// connect timeout elapses.
pub async fn open(params: &ConnectionParams) -> Result<DbConnection> {
    let engine = params.engine();
    if !engine.is_compiled() {
        return Err(ProfilerError::unsupported_operation(
            format!("connect (compile with --features {})", engine.feature()),
            engine.to_string(),
        ));
    }

    debug!("Opening {} connection to {}", params.role(), params);
    let driver = with_timeout(params, connect_driver(params)).await?;
    Ok(DbConnection { engine, driver })
}

/// Closes a connection explicitly.
pub async fn close(connection: DbConnection) {
    connection.close().await;
}

async fn with_timeout<T>(
    params: &ConnectionParams,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(params.connect_timeout(), future)
        .await
        .map_err(|elapsed| {
            ProfilerError::connection_failed(
                format!(
                    "Timed out after {:?} connecting to {}",
                    params.connect_timeout(),
                    params.redacted_url()
                ),
                elapsed,
            )
        })?
}

#[allow(clippy::unused_async)]
async fn connect_driver(params: &ConnectionParams) -> Result<Driver> {
    #[cfg(any(feature = "sqlite", feature = "postgresql", feature = "mysql"))]
    let connect_error =
        |e: sqlx::Error| ProfilerError::connection_failed(format!("Failed to connect to {}", params), e);

    match params.engine() {
        #[cfg(feature = "sqlite")]
        Engine::Sqlite => {
            use sqlx::ConnectOptions;
            use sqlx::sqlite::SqliteConnectOptions;
            use std::str::FromStr;

            let normalized = params::normalize_sqlite_url(params.url());
            let mut options = SqliteConnectOptions::from_str(&normalized).map_err(|e| {
                ProfilerError::configuration(format!("Invalid SQLite connection string: {}", e))
            })?;
            options = match params.role() {
                Role::Source => options.read_only(true),
                Role::Repository => options.create_if_missing(true),
            };
            let connection = options.connect().await.map_err(connect_error)?;
            Ok(Driver::Sqlite(connection))
        }
        #[cfg(feature = "postgresql")]
        Engine::Postgres => {
            use sqlx::ConnectOptions;
            use sqlx::postgres::PgConnectOptions;
            use std::str::FromStr;

            let mut options = PgConnectOptions::from_str(params.url()).map_err(connect_error)?;
            // Record sets are unqualified; the repository schema is the
            // session's only search path entry.
            if params.role() == Role::Repository {
                options = options.options([(
                    "search_path",
                    QuoteStyle::DoubleQuote.quote(params.schema()),
                )]);
            }
            let connection = options.connect().await.map_err(connect_error)?;
            Ok(Driver::Postgres(connection))
        }
        #[cfg(feature = "mysql")]
        Engine::MySql | Engine::MariaDb => {
            use sqlx::ConnectOptions;
            use sqlx::mysql::MySqlConnectOptions;
            use std::str::FromStr;

            let url = params
                .url()
                .strip_prefix("mariadb://")
                .map_or_else(|| params.url().to_string(), |rest| format!("mysql://{}", rest));
            let mut options = MySqlConnectOptions::from_str(&url).map_err(connect_error)?;
            // A MySQL schema is a database.
            if params.role() == Role::Repository {
                options = options.database(params.schema());
            }
            let connection = options.connect().await.map_err(connect_error)?;
            Ok(Driver::MySql(connection))
        }
        #[cfg(feature = "mssql")]
        Engine::SqlServer => Ok(Driver::SqlServer(Box::new(
            mssql::connect(params.url()).await?,
        ))),
        #[allow(unreachable_patterns)]
        other => Err(ProfilerError::unsupported_operation(
            format!("connect (compile with --features {})", other.feature()),
            other.to_string(),
        )),
    }
}

impl DbConnection {
    /// Engine this connection talks to.
    pub const fn engine(&self) -> Engine {
        self.engine
    }

    /// Runs a query and materializes every row.
    ///
    /// # Errors
    /// Returns a query execution error if the statement fails or a cell
    /// cannot be decoded.
    pub async fn fetch_all(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Vec<Value>>> {
        let context = || format!("{} query failed: {}", self.engine, statement_summary(sql));
        match &mut self.driver {
            #[cfg(feature = "sqlite")]
            Driver::Sqlite(conn) => bind_values!(sqlx::query(sql), params)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| ProfilerError::query_failed(context(), e))?
                .iter()
                .map(|row| {
                    decode_row!(row, [
                        String => Value::Text,
                        i64 => Value::Int,
                        f64 => Value::Float,
                        bool => Value::Bool,
                        Vec<u8> => |bytes: Vec<u8>| Value::Text(String::from_utf8_lossy(&bytes).into_owned()),
                    ])
                })
                .collect(),
            #[cfg(feature = "postgresql")]
            Driver::Postgres(conn) => bind_values!(sqlx::query(sql), params)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| ProfilerError::query_failed(context(), e))?
                .iter()
                .map(|row| {
                    decode_row!(row, [
                        i64 => Value::Int,
                        i32 => |v: i32| Value::Int(i64::from(v)),
                        i16 => |v: i16| Value::Int(i64::from(v)),
                        f64 => Value::Float,
                        f32 => |v: f32| Value::Float(f64::from(v)),
                        String => Value::Text,
                        bool => Value::Bool,
                        chrono::NaiveDate => |d: chrono::NaiveDate| Value::Text(d.to_string()),
                    ])
                })
                .collect(),
            #[cfg(feature = "mysql")]
            Driver::MySql(conn) => bind_values!(sqlx::query(sql), params)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| ProfilerError::query_failed(context(), e))?
                .iter()
                .map(|row| {
                    decode_row!(row, [
                        i64 => Value::Int,
                        u64 => |v: u64| i64::try_from(v).map_or_else(|_| Value::Text(v.to_string()), Value::Int),
                        f64 => Value::Float,
                        f32 => |v: f32| Value::Float(f64::from(v)),
                        String => Value::Text,
                        bool => Value::Bool,
                        chrono::NaiveDate => |d: chrono::NaiveDate| Value::Text(d.to_string()),
                        Vec<u8> => |bytes: Vec<u8>| Value::Text(String::from_utf8_lossy(&bytes).into_owned()),
                    ])
                })
                .collect(),
            #[cfg(feature = "mssql")]
            Driver::SqlServer(client) => mssql::fetch_all(client, sql, params).await,
        }
    }

    /// Runs a statement and returns the number of affected rows.
    ///
    /// # Errors
    /// Returns a query execution error if the statement fails.
    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let context = || format!("{} statement failed: {}", self.engine, statement_summary(sql));
        match &mut self.driver {
            #[cfg(feature = "sqlite")]
            Driver::Sqlite(conn) => bind_values!(sqlx::query(sql), params)
                .execute(&mut *conn)
                .await
                .map(|done| done.rows_affected())
                .map_err(|e| ProfilerError::query_failed(context(), e)),
            #[cfg(feature = "postgresql")]
            Driver::Postgres(conn) => bind_values!(sqlx::query(sql), params)
                .execute(&mut *conn)
                .await
                .map(|done| done.rows_affected())
                .map_err(|e| ProfilerError::query_failed(context(), e)),
            #[cfg(feature = "mysql")]
            Driver::MySql(conn) => bind_values!(sqlx::query(sql), params)
                .execute(&mut *conn)
                .await
                .map(|done| done.rows_affected())
                .map_err(|e| ProfilerError::query_failed(context(), e)),
            #[cfg(feature = "mssql")]
            Driver::SqlServer(client) => mssql::execute(client, sql, params).await,
        }
    }

    /// Runs one statement per row inside a single transaction and commits.
    ///
    /// Either every row of the batch is written or none is.
    ///
    /// # Errors
    /// Returns a query execution error if any statement or the commit fails;
    /// the transaction is rolled back.
    pub async fn execute_batch(&mut self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<u64> {
        let context = || format!("{} batch failed: {}", self.engine, statement_summary(sql));

        #[cfg(any(feature = "sqlite", feature = "postgresql", feature = "mysql"))]
        macro_rules! run_in_transaction {
            ($conn:expr) => {{
                let mut tx = $conn
                    .begin()
                    .await
                    .map_err(|e| ProfilerError::query_failed(context(), e))?;
                let mut affected: u64 = 0;
                for row in rows {
                    let done = bind_values!(sqlx::query(sql), row)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| ProfilerError::query_failed(context(), e))?;
                    affected = affected.saturating_add(done.rows_affected());
                }
                tx.commit()
                    .await
                    .map_err(|e| ProfilerError::query_failed(context(), e))?;
                Ok(affected)
            }};
        }

        match &mut self.driver {
            #[cfg(feature = "sqlite")]
            Driver::Sqlite(conn) => run_in_transaction!(conn),
            #[cfg(feature = "postgresql")]
            Driver::Postgres(conn) => run_in_transaction!(conn),
            #[cfg(feature = "mysql")]
            Driver::MySql(conn) => run_in_transaction!(conn),
            #[cfg(feature = "mssql")]
            Driver::SqlServer(client) => {
                mssql::simple(client, "BEGIN TRANSACTION").await?;
                let mut affected: u64 = 0;
                for row in rows {
                    match mssql::execute(client, sql, row).await {
                        Ok(n) => affected = affected.saturating_add(n),
                        Err(e) => {
                            if let Err(rollback) = mssql::simple(client, "ROLLBACK TRANSACTION").await {
                                debug!("Rollback failed: {}", rollback);
                            }
                            return Err(e);
                        }
                    }
                }
                mssql::simple(client, "COMMIT TRANSACTION").await?;
                Ok(affected)
            }
        }
    }

    /// Closes the connection; failures are only logged.
    pub async fn close(self) {
        let result: Result<()> = match self.driver {
            #[cfg(feature = "sqlite")]
            Driver::Sqlite(conn) => conn
                .close()
                .await
                .map_err(|e| ProfilerError::query_failed("close", e)),
            #[cfg(feature = "postgresql")]
            Driver::Postgres(conn) => conn
                .close()
                .await
                .map_err(|e| ProfilerError::query_failed("close", e)),
            #[cfg(feature = "mysql")]
            Driver::MySql(conn) => conn
                .close()
                .await
                .map_err(|e| ProfilerError::query_failed("close", e)),
            #[cfg(feature = "mssql")]
            Driver::SqlServer(client) => (*client)
                .close()
                .await
                .map_err(|e| ProfilerError::query_failed("close", e)),
        };
        if let Err(e) = result {
            debug!("Closing {} connection failed: {}", self.engine, e);
        }
    }
}

/// First line of a statement, shortened for error messages.
pub(crate) fn statement_summary(sql: &str) -> String {
    const MAX_CHARS: usize = 160;
    let first_line = sql.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() > MAX_CHARS {
        let truncated: String = first_line.chars().take(MAX_CHARS).collect();
        format!("{}...", truncated)
    } else {
        first_line.to_string()
    }
}

/// Opens a connection, runs `SELECT 1` and closes it.
///
/// # Errors
/// Returns the connection or query error.
pub async fn test_connection(params: &ConnectionParams) -> Result<()> {
    let mut connection = open(params).await?;
    let result = connection.fetch_all("SELECT 1", &[]).await;
    connection.close().await;
    match result?.first().and_then(|row| row.first()).and_then(Value::as_i64) {
        Some(1) => Ok(()),
        _ => Err(ProfilerError::unexpected_result("SELECT 1 did not return 1")),
    }
}
