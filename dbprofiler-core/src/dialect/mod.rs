//! Dialect abstraction over the supported SQL engines.
//!
//! Each engine has one [`SourceDialect`] implementation that knows how the
//! engine quotes identifiers, which placeholder syntax its driver expects,
//! and the SQL text of every source-side profiling query. The
//! [`DialectCatalog`] turns those into validated [`QueryTemplate`]s keyed by
//! `(Operation, Engine)` and generates the metadata repository statements.
//!
//! # Module Structure
//! - `catalog`: typed registry and startup capability check
//! - `template`: two-phase templates (identifiers, then bind values)
//! - `repository`: generated repository DDL and DML
//! - `types`: declared column type classification
//! - one module per engine

mod catalog;
mod mariadb;
mod mysql;
mod postgres;
mod repository;
mod sqlite;
mod sqlserver;
mod template;
pub mod types;

pub use catalog::DialectCatalog;
pub use template::{Identifiers, QueryTemplate};
pub(crate) use repository::split_statements;

use crate::models::{Engine, FieldKind, KeyDepth, RecordSet};
use std::fmt;

/// Identifier quoting convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteStyle {
    /// `` `name` `` (MySQL, MariaDB)
    Backtick,
    /// `"name"` (PostgreSQL, SQLite)
    DoubleQuote,
    /// `[name]` (SQL Server)
    Bracket,
}

impl QuoteStyle {
    /// Quotes an identifier, doubling any embedded closing quote character.
    pub fn quote(self, identifier: &str) -> String {
        match self {
            Self::Backtick => format!("`{}`", identifier.replace('`', "``")),
            Self::DoubleQuote => format!("\"{}\"", identifier.replace('"', "\"\"")),
            Self::Bracket => format!("[{}]", identifier.replace(']', "]]")),
        }
    }
}

/// Bind parameter syntax expected by an engine's driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceholderStyle {
    /// `?` (SQLite, MySQL, MariaDB)
    QuestionMark,
    /// `$1`, `$2`, ... (PostgreSQL)
    DollarNumbered,
    /// `@P1`, `@P2`, ... (SQL Server)
    AtNumbered,
}

impl PlaceholderStyle {
    /// Rewrites `?` markers outside string literals into this style.
    pub fn rewrite(self, sql: &str) -> String {
        if self == Self::QuestionMark {
            return sql.to_string();
        }

        let mut rewritten = String::with_capacity(sql.len());
        let mut in_literal = false;
        let mut position: usize = 0;
        for ch in sql.chars() {
            match ch {
                '\'' => {
                    in_literal = !in_literal;
                    rewritten.push(ch);
                }
                '?' if !in_literal => {
                    position = position.saturating_add(1);
                    match self {
                        Self::DollarNumbered => rewritten.push('$'),
                        Self::AtNumbered => rewritten.push_str("@P"),
                        Self::QuestionMark => {}
                    }
                    rewritten.push_str(&position.to_string());
                }
                _ => rewritten.push(ch),
            }
        }
        rewritten
    }
}

/// Values a source template may ask to have bound, in template order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindParam {
    Catalog,
    Schema,
    Table,
}

/// Raw SQL text of a source operation plus the values it binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTemplate {
    pub body: &'static str,
    pub params: &'static [BindParam],
}

impl SourceTemplate {
    /// Template without bind parameters.
    pub const fn new(body: &'static str) -> Self {
        Self { body, params: &[] }
    }

    /// Template binding the given parameters.
    pub const fn with_params(body: &'static str, params: &'static [BindParam]) -> Self {
        Self { body, params }
    }
}

/// Queries issued against the profiled source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceOperation {
    /// `(table, column, ordinal, data_type)` for every base-table column
    ColumnCatalog,
    /// `(n_columns)` for one table
    ColumnCount,
    /// `(n_rows)` for one table
    RowCount,
    /// `(distinct_values, null_values)` for one column
    UniqueCount,
    /// Expression casting `{column}` to text, used inside `BulkSelect`
    TextProjection,
    /// One text projection per column in `{columns}`
    BulkSelect,
    /// `(value_text, frequency)` per distinct value of a column
    Frequency,
    /// `(bucket_text, frequency)` per month of a date column
    MonthHistogram,
    /// `(avg, stdev, variance, sum, max, min, range)`
    BasicStats,
    /// Percentile ladder `(P01 .. P99, IQR)`
    Percentiles,
}

impl SourceOperation {
    /// Every source operation.
    pub const ALL: [Self; 10] = [
        Self::ColumnCatalog,
        Self::ColumnCount,
        Self::RowCount,
        Self::UniqueCount,
        Self::TextProjection,
        Self::BulkSelect,
        Self::Frequency,
        Self::MonthHistogram,
        Self::BasicStats,
        Self::Percentiles,
    ];

    /// Number of result columns, `None` for fragments and variable shapes.
    pub const fn result_arity(self) -> Option<usize> {
        match self {
            Self::ColumnCatalog => Some(4),
            Self::ColumnCount | Self::RowCount => Some(1),
            Self::UniqueCount | Self::Frequency | Self::MonthHistogram => Some(2),
            Self::BasicStats => Some(7),
            Self::Percentiles => Some(12),
            Self::TextProjection | Self::BulkSelect => None,
        }
    }
}

/// Statements issued against the metadata repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RepositoryOperation {
    CreateRecordSet(RecordSet),
    DropRecordSet(RecordSet),
    Exists(RecordSet, KeyDepth),
    Delete(RecordSet, KeyDepth),
    Insert(RecordSet),
    /// Distinct table names recorded in `columns` for a scope
    ColumnTables,
    /// `tables` rows for a scope
    TableInventory,
    /// `columns` rows for one table
    TableColumns,
    /// `(column, distinct_values)` from `uniques` for one table
    DistinctValueCounts,
    RefreshRowCount,
    RefreshPercentiles,
}

impl RepositoryOperation {
    /// Every repository operation, including each record set and key depth.
    pub fn all() -> Vec<Self> {
        let mut operations = Vec::new();
        for set in RecordSet::ALL {
            operations.push(Self::CreateRecordSet(set));
            operations.push(Self::DropRecordSet(set));
            operations.push(Self::Insert(set));
            for depth in [KeyDepth::Table, KeyDepth::Column] {
                if depth == KeyDepth::Column && set.index_depth() == KeyDepth::Table {
                    continue;
                }
                operations.push(Self::Exists(set, depth));
                operations.push(Self::Delete(set, depth));
            }
        }
        operations.extend([
            Self::ColumnTables,
            Self::TableInventory,
            Self::TableColumns,
            Self::DistinctValueCounts,
            Self::RefreshRowCount,
            Self::RefreshPercentiles,
        ]);
        operations
    }
}

/// Any operation known to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Source(SourceOperation),
    Repository(RepositoryOperation),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(op) => write!(f, "source {:?}", op),
            Self::Repository(RepositoryOperation::CreateRecordSet(set)) => {
                write!(f, "create {}", set)
            }
            Self::Repository(RepositoryOperation::DropRecordSet(set)) => write!(f, "drop {}", set),
            Self::Repository(RepositoryOperation::Exists(set, depth)) => {
                write!(f, "exists {} by {:?}", set, depth)
            }
            Self::Repository(RepositoryOperation::Delete(set, depth)) => {
                write!(f, "delete {} by {:?}", set, depth)
            }
            Self::Repository(RepositoryOperation::Insert(set)) => write!(f, "insert {}", set),
            Self::Repository(op) => write!(f, "repository {:?}", op),
        }
    }
}

/// The part an engine plays in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Database being profiled; only read
    Source,
    /// Metadata repository receiving results
    Repository,
}

impl Role {
    /// Operations an engine must support to play this role.
    pub fn required_operations(self) -> Vec<Operation> {
        match self {
            Self::Source => SourceOperation::ALL
                .into_iter()
                .map(Operation::Source)
                .collect(),
            Self::Repository => RepositoryOperation::all()
                .into_iter()
                .map(Operation::Repository)
                .collect(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Repository => f.write_str("repository"),
        }
    }
}

/// Engine-specific SQL capabilities.
///
/// Implementations are stateless; [`dialect_for`] hands out one static
/// instance per engine so callers select the dialect once and carry it.
pub trait SourceDialect: Send + Sync + fmt::Debug {
    /// Engine this dialect speaks for.
    fn engine(&self) -> Engine;

    /// Identifier quoting convention.
    fn quote_style(&self) -> QuoteStyle;

    /// Bind parameter syntax.
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// SQL for a source operation, or `None` if the engine cannot run it.
    fn source_template(&self, operation: SourceOperation) -> Option<SourceTemplate>;

    /// Column type for a repository field, or `None` when the engine cannot
    /// host the metadata repository.
    fn repository_type(&self, kind: FieldKind) -> Option<&'static str>;

    /// Whether `CREATE TABLE` takes index definitions inline.
    fn inline_indexes(&self) -> bool {
        false
    }
}

/// Returns the dialect implementation for an engine.
pub fn dialect_for(engine: Engine) -> &'static dyn SourceDialect {
    match engine {
        Engine::Sqlite => &sqlite::SqliteDialect,
        Engine::Postgres => &postgres::PostgresDialect,
        Engine::MySql => &mysql::MySqlDialect,
        Engine::MariaDb => &mariadb::MariaDbDialect,
        Engine::SqlServer => &sqlserver::SqlServerDialect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quote_styles() {
        assert_eq!(QuoteStyle::Backtick.quote("order"), "`order`");
        assert_eq!(QuoteStyle::DoubleQuote.quote("Order Date"), "\"Order Date\"");
        assert_eq!(QuoteStyle::Bracket.quote("weird]name"), "[weird]]name]");
        assert_eq!(QuoteStyle::DoubleQuote.quote("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_placeholder_rewrite() {
        let sql = "SELECT x FROM t WHERE a = ? AND b = '?' AND c = ?";
        assert_eq!(PlaceholderStyle::QuestionMark.rewrite(sql), sql);
        assert_eq!(
            PlaceholderStyle::DollarNumbered.rewrite(sql),
            "SELECT x FROM t WHERE a = $1 AND b = '?' AND c = $2"
        );
        assert_eq!(
            PlaceholderStyle::AtNumbered.rewrite(sql),
            "SELECT x FROM t WHERE a = @P1 AND b = '?' AND c = @P2"
        );
    }

    #[test]
    fn test_repository_operations_cover_every_set() {
        let operations = RepositoryOperation::all();
        for set in RecordSet::ALL {
            assert!(operations.contains(&RepositoryOperation::Insert(set)));
            assert!(operations.contains(&RepositoryOperation::Exists(set, KeyDepth::Table)));
        }
        assert!(operations.contains(&RepositoryOperation::Delete(
            RecordSet::DataValues,
            KeyDepth::Column
        )));
        assert!(!operations.contains(&RepositoryOperation::Delete(
            RecordSet::Tables,
            KeyDepth::Column
        )));
    }

    #[test]
    fn test_dialect_for_matches_engine() {
        for engine in Engine::ALL {
            assert_eq!(dialect_for(engine).engine(), engine);
        }
    }

    proptest! {
        #[test]
        fn quoted_identifiers_round_trip(name in "[a-zA-Z0-9 _`\"\\]\\[-]{1,40}") {
            for style in [QuoteStyle::Backtick, QuoteStyle::DoubleQuote, QuoteStyle::Bracket] {
                let quoted = style.quote(&name);
                let (open, close) = match style {
                    QuoteStyle::Backtick => ('`', '`'),
                    QuoteStyle::DoubleQuote => ('"', '"'),
                    QuoteStyle::Bracket => ('[', ']'),
                };
                prop_assert!(quoted.starts_with(open));
                prop_assert!(quoted.ends_with(close));

                let inner = &quoted[open.len_utf8()..quoted.len() - close.len_utf8()];
                let doubled = format!("{}{}", close, close);
                let unescaped = inner.replace(&doubled, &close.to_string());
                prop_assert_eq!(unescaped, name.clone());
            }
        }
    }
}
