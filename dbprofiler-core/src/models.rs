//! Core data models for profiling results.
//!
//! Every entity is identified by the natural key
//! `(server, catalog, schema, table[, column])`; no surrogate identifiers
//! are used anywhere in the repository.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Sqlite,
    Postgres,
    MySql,
    MariaDb,
    SqlServer,
}

impl Engine {
    /// Every engine the dialect catalog knows about.
    pub const ALL: [Self; 5] = [
        Self::Sqlite,
        Self::Postgres,
        Self::MySql,
        Self::MariaDb,
        Self::SqlServer,
    ];

    /// Stable lowercase identifier used in configuration and reports.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::MariaDb => "mariadb",
            Self::SqlServer => "sqlserver",
        }
    }

    /// Cargo feature that compiles the engine's driver in.
    pub const fn feature(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgresql",
            Self::MySql | Self::MariaDb => "mysql",
            Self::SqlServer => "mssql",
        }
    }

    /// Whether the engine's driver is part of this build.
    pub const fn is_compiled(self) -> bool {
        match self {
            Self::Sqlite => cfg!(feature = "sqlite"),
            Self::Postgres => cfg!(feature = "postgresql"),
            Self::MySql | Self::MariaDb => cfg!(feature = "mysql"),
            Self::SqlServer => cfg!(feature = "mssql"),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "SQLite"),
            Self::Postgres => write!(f, "PostgreSQL"),
            Self::MySql => write!(f, "MySQL"),
            Self::MariaDb => write!(f, "MariaDB"),
            Self::SqlServer => write!(f, "SQL Server"),
        }
    }
}

impl FromStr for Engine {
    type Err = crate::error::ProfilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "mariadb" => Ok(Self::MariaDb),
            "sqlserver" | "mssql" | "mssqlserver" => Ok(Self::SqlServer),
            other => Err(crate::error::ProfilerError::configuration(format!(
                "unknown database engine '{}'",
                other
            ))),
        }
    }
}

/// The `(server, catalog, schema)` prefix shared by every key of one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaScope {
    pub server: String,
    pub catalog: String,
    pub schema: String,
}

impl SchemaScope {
    /// Creates a scope from its three parts.
    pub fn new(
        server: impl Into<String>,
        catalog: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            catalog: catalog.into(),
            schema: schema.into(),
        }
    }

    /// Key of a table inside this scope.
    pub fn table(&self, table: impl Into<String>) -> TableKey {
        TableKey {
            server: self.server.clone(),
            catalog: self.catalog.clone(),
            schema: self.schema.clone(),
            table: table.into(),
        }
    }
}

impl fmt::Display for SchemaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.server, self.catalog, self.schema)
    }
}

/// Key of a profiled table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableKey {
    pub server: String,
    pub catalog: String,
    pub schema: String,
    pub table: String,
}

impl TableKey {
    /// Key of a column of this table.
    pub fn column(&self, column: impl Into<String>) -> ColumnKey {
        ColumnKey {
            table: self.clone(),
            column: column.into(),
        }
    }

    /// Scope this table belongs to.
    pub fn scope(&self) -> SchemaScope {
        SchemaScope::new(&self.server, &self.catalog, &self.schema)
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.server, self.catalog, self.schema, self.table
        )
    }
}

/// Key of a profiled column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnKey {
    pub table: TableKey,
    pub column: String,
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// The six record sets of the metadata repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSet {
    Columns,
    Tables,
    Uniques,
    DataValues,
    Dates,
    Stats,
}

/// Storage class of a repository field, mapped to a concrete type per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Server, catalog, schema, table, column and type names
    Identifier,
    Integer,
    Double,
    /// Unbounded text
    Text,
    Date,
}

/// One column of a repository record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub nullable: bool,
}

const fn field(name: &'static str, kind: FieldKind, nullable: bool) -> Field {
    Field {
        name,
        kind,
        nullable,
    }
}

const TABLE_KEY_FIELDS: [Field; 4] = [
    field("SERVER_NAME", FieldKind::Identifier, false),
    field("TABLE_CATALOG", FieldKind::Identifier, false),
    field("TABLE_SCHEMA", FieldKind::Identifier, false),
    field("TABLE_NAME", FieldKind::Identifier, false),
];

const COLUMN_NAME_FIELD: Field = field("COLUMN_NAME", FieldKind::Identifier, false);

const COLUMNS_FIELDS: &[Field] = &[
    TABLE_KEY_FIELDS[0],
    TABLE_KEY_FIELDS[1],
    TABLE_KEY_FIELDS[2],
    TABLE_KEY_FIELDS[3],
    COLUMN_NAME_FIELD,
    field("ORDINAL_POSITION", FieldKind::Integer, false),
    field("DATA_TYPE", FieldKind::Identifier, false),
];

const TABLES_FIELDS: &[Field] = &[
    TABLE_KEY_FIELDS[0],
    TABLE_KEY_FIELDS[1],
    TABLE_KEY_FIELDS[2],
    TABLE_KEY_FIELDS[3],
    field("N_COLUMNS", FieldKind::Integer, true),
    field("N_ROWS", FieldKind::Integer, true),
];

const UNIQUES_FIELDS: &[Field] = &[
    TABLE_KEY_FIELDS[0],
    TABLE_KEY_FIELDS[1],
    TABLE_KEY_FIELDS[2],
    TABLE_KEY_FIELDS[3],
    COLUMN_NAME_FIELD,
    field("ORDINAL_POSITION", FieldKind::Integer, false),
    field("DATA_TYPE", FieldKind::Identifier, false),
    field("DISTINCT_VALUES", FieldKind::Integer, false),
    field("NULL_VALUES", FieldKind::Integer, false),
];

const DATA_VALUES_FIELDS: &[Field] = &[
    TABLE_KEY_FIELDS[0],
    TABLE_KEY_FIELDS[1],
    TABLE_KEY_FIELDS[2],
    TABLE_KEY_FIELDS[3],
    COLUMN_NAME_FIELD,
    field("DATA_VALUE", FieldKind::Text, true),
    field("FREQUENCY_NUMBER", FieldKind::Integer, false),
];

const DATES_FIELDS: &[Field] = &[
    TABLE_KEY_FIELDS[0],
    TABLE_KEY_FIELDS[1],
    TABLE_KEY_FIELDS[2],
    TABLE_KEY_FIELDS[3],
    COLUMN_NAME_FIELD,
    field("DATA_VALUE", FieldKind::Date, false),
    field("FREQUENCY_NUMBER", FieldKind::Integer, false),
];

/// Percentile columns of the stats record set, in ladder order.
pub const PERCENTILE_FIELDS: [&str; 12] = [
    "P01", "P025", "P05", "P10", "Q1", "Q2", "Q3", "P90", "P95", "P975", "P99", "IQR",
];

const STATS_FIELDS: &[Field] = &[
    TABLE_KEY_FIELDS[0],
    TABLE_KEY_FIELDS[1],
    TABLE_KEY_FIELDS[2],
    TABLE_KEY_FIELDS[3],
    COLUMN_NAME_FIELD,
    field("AVG", FieldKind::Double, true),
    field("STDEV", FieldKind::Double, true),
    field("VAR", FieldKind::Double, true),
    field("SUM", FieldKind::Double, true),
    field("MAX", FieldKind::Double, true),
    field("MIN", FieldKind::Double, true),
    field("RANGE", FieldKind::Double, true),
    field("P01", FieldKind::Double, true),
    field("P025", FieldKind::Double, true),
    field("P05", FieldKind::Double, true),
    field("P10", FieldKind::Double, true),
    field("Q1", FieldKind::Double, true),
    field("Q2", FieldKind::Double, true),
    field("Q3", FieldKind::Double, true),
    field("P90", FieldKind::Double, true),
    field("P95", FieldKind::Double, true),
    field("P975", FieldKind::Double, true),
    field("P99", FieldKind::Double, true),
    field("IQR", FieldKind::Double, true),
];

/// Whether a record set is keyed by table or by column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyDepth {
    Table,
    Column,
}

impl KeyDepth {
    /// Field names making up a key of this depth.
    pub const fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Table => &["SERVER_NAME", "TABLE_CATALOG", "TABLE_SCHEMA", "TABLE_NAME"],
            Self::Column => &[
                "SERVER_NAME",
                "TABLE_CATALOG",
                "TABLE_SCHEMA",
                "TABLE_NAME",
                "COLUMN_NAME",
            ],
        }
    }
}

impl RecordSet {
    /// All record sets in creation order.
    pub const ALL: [Self; 6] = [
        Self::Columns,
        Self::Tables,
        Self::Uniques,
        Self::DataValues,
        Self::Dates,
        Self::Stats,
    ];

    /// Name of the repository table backing this set.
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Columns => "columns",
            Self::Tables => "tables",
            Self::Uniques => "uniques",
            Self::DataValues => "data_values",
            Self::Dates => "dates",
            Self::Stats => "stats",
        }
    }

    /// Stored fields, in insert order.
    pub const fn fields(self) -> &'static [Field] {
        match self {
            Self::Columns => COLUMNS_FIELDS,
            Self::Tables => TABLES_FIELDS,
            Self::Uniques => UNIQUES_FIELDS,
            Self::DataValues => DATA_VALUES_FIELDS,
            Self::Dates => DATES_FIELDS,
            Self::Stats => STATS_FIELDS,
        }
    }

    /// Deepest key this set is indexed on.
    pub const fn index_depth(self) -> KeyDepth {
        match self {
            Self::Columns | Self::Tables => KeyDepth::Table,
            Self::Uniques | Self::DataValues | Self::Dates | Self::Stats => KeyDepth::Column,
        }
    }
}

impl fmt::Display for RecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// One source column as recorded by the Columns stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub table: TableKey,
    pub column: String,
    pub ordinal_position: i64,
    pub data_type: String,
}

impl ColumnRecord {
    /// Key of this column.
    pub fn key(&self) -> ColumnKey {
        self.table.column(&self.column)
    }
}

/// One source base table as recorded by the Tables stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    pub table: TableKey,
    pub n_columns: Option<i64>,
    pub n_rows: Option<i64>,
}

/// Cardinality summary of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueRecord {
    pub table: TableKey,
    pub column: String,
    pub ordinal_position: i64,
    pub data_type: String,
    pub distinct_values: i64,
    pub null_values: i64,
}

/// One `(value, frequency)` pair of a column's histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataValueRecord {
    pub column: ColumnKey,
    pub value: Option<String>,
    pub frequency: i64,
}

/// One month bucket of a date column's histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBucketRecord {
    pub column: ColumnKey,
    pub bucket: NaiveDate,
    pub frequency: i64,
}

/// Aggregate statistics of a numeric column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicStats {
    pub avg: Option<f64>,
    pub stdev: Option<f64>,
    pub variance: Option<f64>,
    pub sum: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub range: Option<f64>,
}

impl BasicStats {
    /// True when the column had no non-null values.
    pub const fn is_empty(&self) -> bool {
        self.avg.is_none() && self.sum.is_none() && self.max.is_none() && self.min.is_none()
    }
}

/// The fixed percentile ladder of a numeric column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p01: Option<f64>,
    pub p025: Option<f64>,
    pub p05: Option<f64>,
    pub p10: Option<f64>,
    pub q1: Option<f64>,
    pub q2: Option<f64>,
    pub q3: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p975: Option<f64>,
    pub p99: Option<f64>,
    pub iqr: Option<f64>,
}

impl Percentiles {
    /// Values in the order of [`PERCENTILE_FIELDS`].
    pub const fn ladder(&self) -> [Option<f64>; 12] {
        [
            self.p01, self.p025, self.p05, self.p10, self.q1, self.q2, self.q3, self.p90,
            self.p95, self.p975, self.p99, self.iqr,
        ]
    }

    /// Builds the ladder from values in [`PERCENTILE_FIELDS`] order.
    ///
    /// The interquartile range is always `Q3 - Q1`; a value supplied in the
    /// last position is only used when a quartile is missing.
    pub fn from_ladder(values: [Option<f64>; 12]) -> Self {
        let [p01, p025, p05, p10, q1, q2, q3, p90, p95, p975, p99, iqr] = values;
        let iqr = match (q1, q3) {
            (Some(q1), Some(q3)) => Some(q3 - q1),
            _ => iqr,
        };
        Self {
            p01,
            p025,
            p05,
            p10,
            q1,
            q2,
            q3,
            p90,
            p95,
            p975,
            p99,
            iqr,
        }
    }
}

/// Summary of a numeric column with an optional percentile ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    pub column: ColumnKey,
    pub stats: BasicStats,
    pub percentiles: Option<Percentiles>,
}
