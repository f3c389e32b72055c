//! SQLite dialect.
//!
//! SQLite has no `information_schema`; the column catalog is read through
//! the `pragma_table_list` and `pragma_table_info` table-valued functions.
//! It also lacks `STDDEV`/`PERCENTILE` aggregates: variance is computed
//! from sums of squares (the standard deviation is derived from it when
//! rows are decoded) and discrete percentiles are read off `CUME_DIST()`.
//!
//! Untyped columns can hold `1` and `'1'` side by side; distinct counts and
//! frequencies compare the text form so they agree with bulk loading.
//! Integer date values are unix epochs.

use super::{BindParam, PlaceholderStyle, QuoteStyle, SourceDialect, SourceOperation, SourceTemplate};
use crate::models::{Engine, FieldKind};

/// SQLite 3.37+.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SqliteDialect;

const COLUMN_CATALOG: &str = "SELECT l.name, p.name, p.cid + 1, p.type \
     FROM pragma_table_list AS l \
     JOIN pragma_table_info(l.name, l.schema) AS p \
     WHERE l.schema = ? AND l.type = 'table' AND substr(l.name, 1, 7) <> 'sqlite_' \
     ORDER BY l.name, p.cid";

const COLUMN_COUNT: &str = "SELECT COUNT(*) FROM pragma_table_info(?, ?)";

const ROW_COUNT: &str = "SELECT COUNT(*) FROM {schema}.{table}";

const UNIQUE_COUNT: &str = "SELECT COUNT(DISTINCT CAST({column} AS TEXT)), \
     COALESCE(SUM(CASE WHEN {column} IS NULL THEN 1 ELSE 0 END), 0) \
     FROM {schema}.{table}";

const TEXT_PROJECTION: &str = "CAST({column} AS TEXT)";

const BULK_SELECT: &str = "SELECT {columns} FROM {schema}.{table}";

const FREQUENCY: &str = "SELECT CAST({column} AS TEXT), COUNT(*) \
     FROM {schema}.{table} GROUP BY 1";

const MONTH_HISTOGRAM: &str = "SELECT CASE typeof({column}) \
     WHEN 'integer' THEN date({column}, 'unixepoch', 'start of month') \
     ELSE date({column}, 'start of month') END, COUNT(*) \
     FROM {schema}.{table} WHERE {column} IS NOT NULL GROUP BY 1 ORDER BY 1";

const BASIC_STATS: &str = "SELECT AVG({column}), NULL, \
     CASE WHEN COUNT({column}) > 1 THEN \
     (SUM(CAST({column} AS REAL) * {column}) - SUM(CAST({column} AS REAL)) * SUM(CAST({column} AS REAL)) / COUNT({column})) \
     / (COUNT({column}) - 1) END, \
     SUM(CAST({column} AS REAL)), MAX({column}), MIN({column}), MAX({column}) - MIN({column}) \
     FROM {schema}.{table}";

const PERCENTILES: &str = "WITH ranked AS (\
     SELECT CAST({column} AS REAL) AS v, CUME_DIST() OVER (ORDER BY {column}) AS cd \
     FROM {schema}.{table} WHERE {column} IS NOT NULL) \
     SELECT MIN(CASE WHEN cd >= 0.01 THEN v END), \
     MIN(CASE WHEN cd >= 0.025 THEN v END), \
     MIN(CASE WHEN cd >= 0.05 THEN v END), \
     MIN(CASE WHEN cd >= 0.1 THEN v END), \
     MIN(CASE WHEN cd >= 0.25 THEN v END), \
     MIN(CASE WHEN cd >= 0.5 THEN v END), \
     MIN(CASE WHEN cd >= 0.75 THEN v END), \
     MIN(CASE WHEN cd >= 0.9 THEN v END), \
     MIN(CASE WHEN cd >= 0.95 THEN v END), \
     MIN(CASE WHEN cd >= 0.975 THEN v END), \
     MIN(CASE WHEN cd >= 0.99 THEN v END), \
     MIN(CASE WHEN cd >= 0.75 THEN v END) - MIN(CASE WHEN cd >= 0.25 THEN v END) \
     FROM ranked";

impl SourceDialect for SqliteDialect {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::DoubleQuote
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }

    fn source_template(&self, operation: SourceOperation) -> Option<SourceTemplate> {
        let template = match operation {
            SourceOperation::ColumnCatalog => {
                SourceTemplate::with_params(COLUMN_CATALOG, &[BindParam::Schema])
            }
            SourceOperation::ColumnCount => {
                SourceTemplate::with_params(COLUMN_COUNT, &[BindParam::Table, BindParam::Schema])
            }
            SourceOperation::RowCount => SourceTemplate::new(ROW_COUNT),
            SourceOperation::UniqueCount => SourceTemplate::new(UNIQUE_COUNT),
            SourceOperation::TextProjection => SourceTemplate::new(TEXT_PROJECTION),
            SourceOperation::BulkSelect => SourceTemplate::new(BULK_SELECT),
            SourceOperation::Frequency => SourceTemplate::new(FREQUENCY),
            SourceOperation::MonthHistogram => SourceTemplate::new(MONTH_HISTOGRAM),
            SourceOperation::BasicStats => SourceTemplate::new(BASIC_STATS),
            SourceOperation::Percentiles => SourceTemplate::new(PERCENTILES),
        };
        Some(template)
    }

    fn repository_type(&self, kind: FieldKind) -> Option<&'static str> {
        Some(match kind {
            FieldKind::Identifier | FieldKind::Text => "TEXT",
            FieldKind::Integer => "INTEGER",
            FieldKind::Double => "REAL",
            FieldKind::Date => "DATE",
        })
    }
}
