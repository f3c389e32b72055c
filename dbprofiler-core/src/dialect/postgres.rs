//! PostgreSQL dialect.
//!
//! Catalog columns are domains over `name`/`int4`; they are cast to `TEXT`
//! and `BIGINT` so the decoded row shape matches the other engines.
//! Percentiles are exact (`percentile_disc`). Numeric values go through
//! `NUMERIC` on their way to `DOUBLE PRECISION` because `money` has no
//! direct cast. Distinct counts and frequencies compare the text form
//! under the `"C"` collation, so `1.0` and `1.00` stay apart as they do
//! when loaded in bulk.

use super::{BindParam, PlaceholderStyle, QuoteStyle, SourceDialect, SourceOperation, SourceTemplate};
use crate::models::{Engine, FieldKind};

/// PostgreSQL 12+.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PostgresDialect;

const COLUMN_CATALOG: &str = "SELECT CAST(c.table_name AS TEXT), CAST(c.column_name AS TEXT), \
     CAST(c.ordinal_position AS BIGINT), CAST(c.data_type AS TEXT) \
     FROM information_schema.columns AS c \
     JOIN information_schema.tables AS t \
     ON t.table_catalog = c.table_catalog AND t.table_schema = c.table_schema \
     AND t.table_name = c.table_name \
     WHERE t.table_type = 'BASE TABLE' \
     AND CAST(c.table_catalog AS TEXT) = ? AND CAST(c.table_schema AS TEXT) = ? \
     ORDER BY c.table_name, c.ordinal_position";

const COLUMN_COUNT: &str = "SELECT CAST(COUNT(*) AS BIGINT) FROM information_schema.columns \
     WHERE CAST(table_catalog AS TEXT) = ? AND CAST(table_schema AS TEXT) = ? \
     AND CAST(table_name AS TEXT) = ?";

const ROW_COUNT: &str = "SELECT CAST(COUNT(*) AS BIGINT) FROM {schema}.{table}";

const UNIQUE_COUNT: &str = "SELECT CAST(COUNT(DISTINCT CAST({column} AS TEXT) COLLATE \"C\") AS BIGINT), \
     CAST(COALESCE(SUM(CASE WHEN {column} IS NULL THEN 1 ELSE 0 END), 0) AS BIGINT) \
     FROM {schema}.{table}";

const TEXT_PROJECTION: &str = "CAST({column} AS TEXT)";

const BULK_SELECT: &str = "SELECT {columns} FROM {schema}.{table}";

const FREQUENCY: &str = "SELECT CAST({column} AS TEXT) COLLATE \"C\", CAST(COUNT(*) AS BIGINT) \
     FROM {schema}.{table} GROUP BY 1";

const MONTH_HISTOGRAM: &str = "SELECT CAST(CAST(date_trunc('month', {column}) AS DATE) AS TEXT), \
     CAST(COUNT(*) AS BIGINT) \
     FROM {schema}.{table} WHERE {column} IS NOT NULL GROUP BY 1 ORDER BY 1";

const BASIC_STATS: &str = "SELECT AVG(CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     STDDEV_SAMP(CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     VAR_SAMP(CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     SUM(CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     MAX(CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     MIN(CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     MAX(CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)) - MIN(CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)) \
     FROM {schema}.{table}";

const PERCENTILES: &str = "SELECT \
     percentile_disc(0.01) WITHIN GROUP (ORDER BY CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     percentile_disc(0.025) WITHIN GROUP (ORDER BY CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     percentile_disc(0.05) WITHIN GROUP (ORDER BY CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     percentile_disc(0.1) WITHIN GROUP (ORDER BY CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     percentile_disc(0.25) WITHIN GROUP (ORDER BY CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     percentile_disc(0.5) WITHIN GROUP (ORDER BY CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     percentile_disc(0.75) WITHIN GROUP (ORDER BY CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     percentile_disc(0.9) WITHIN GROUP (ORDER BY CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     percentile_disc(0.95) WITHIN GROUP (ORDER BY CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     percentile_disc(0.975) WITHIN GROUP (ORDER BY CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     percentile_disc(0.99) WITHIN GROUP (ORDER BY CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)), \
     percentile_disc(0.75) WITHIN GROUP (ORDER BY CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)) \
     - percentile_disc(0.25) WITHIN GROUP (ORDER BY CAST(CAST({column} AS NUMERIC) AS DOUBLE PRECISION)) \
     FROM {schema}.{table}";

impl SourceDialect for PostgresDialect {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::DoubleQuote
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::DollarNumbered
    }

    fn source_template(&self, operation: SourceOperation) -> Option<SourceTemplate> {
        let template = match operation {
            SourceOperation::ColumnCatalog => SourceTemplate::with_params(
                COLUMN_CATALOG,
                &[BindParam::Catalog, BindParam::Schema],
            ),
            SourceOperation::ColumnCount => SourceTemplate::with_params(
                COLUMN_COUNT,
                &[BindParam::Catalog, BindParam::Schema, BindParam::Table],
            ),
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
            FieldKind::Identifier => "VARCHAR(128)",
            FieldKind::Integer => "BIGINT",
            FieldKind::Double => "DOUBLE PRECISION",
            FieldKind::Text => "TEXT",
            FieldKind::Date => "DATE",
        })
    }
}
