//! MySQL dialect.
//!
//! `information_schema` reports unsigned ordinals and `DECIMAL` sums, which
//! are cast to `SIGNED`/`DOUBLE` so every engine decodes the same shapes.
//! MySQL has no percentile aggregate; a discrete percentile is the
//! smallest value whose `CUME_DIST()` reaches the fraction, which matches
//! `PERCENTILE_DISC` on the other engines.
//!
//! Distinct counts and frequencies compare the `utf8mb4` text form as
//! bytes: the default `_ci` collations fold `'A'` and `'a'` together and
//! pad trailing spaces, which bulk loading does not.

use super::{BindParam, PlaceholderStyle, QuoteStyle, SourceDialect, SourceOperation, SourceTemplate};
use crate::models::{Engine, FieldKind};

/// MySQL 8.0.17+.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MySqlDialect;

const COLUMN_CATALOG: &str = "SELECT CAST(c.TABLE_NAME AS CHAR), CAST(c.COLUMN_NAME AS CHAR), \
     CAST(c.ORDINAL_POSITION AS SIGNED), CAST(c.DATA_TYPE AS CHAR) \
     FROM INFORMATION_SCHEMA.COLUMNS AS c \
     JOIN INFORMATION_SCHEMA.TABLES AS t \
     ON t.TABLE_CATALOG = c.TABLE_CATALOG AND t.TABLE_SCHEMA = c.TABLE_SCHEMA \
     AND t.TABLE_NAME = c.TABLE_NAME \
     WHERE t.TABLE_TYPE = 'BASE TABLE' AND c.TABLE_CATALOG = ? AND c.TABLE_SCHEMA = ? \
     ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION";

const COLUMN_COUNT: &str = "SELECT COUNT(*) FROM INFORMATION_SCHEMA.COLUMNS \
     WHERE TABLE_CATALOG = ? AND TABLE_SCHEMA = ? AND TABLE_NAME = ?";

const ROW_COUNT: &str = "SELECT COUNT(*) FROM {schema}.{table}";

const UNIQUE_COUNT: &str = "SELECT COUNT(DISTINCT CAST(CAST({column} AS CHAR CHARACTER SET utf8mb4) AS BINARY)), \
     CAST(COALESCE(SUM(CASE WHEN {column} IS NULL THEN 1 ELSE 0 END), 0) AS SIGNED) \
     FROM {schema}.{table}";

const TEXT_PROJECTION: &str = "CAST({column} AS CHAR CHARACTER SET utf8mb4)";

const BULK_SELECT: &str = "SELECT {columns} FROM {schema}.{table}";

const FREQUENCY: &str = "SELECT CAST(CAST({column} AS CHAR CHARACTER SET utf8mb4) AS BINARY), COUNT(*) \
     FROM {schema}.{table} GROUP BY 1";

const MONTH_HISTOGRAM: &str = "SELECT CAST(DATE_FORMAT({column}, '%Y-%m-01') AS CHAR), COUNT(*) \
     FROM {schema}.{table} WHERE {column} IS NOT NULL \
     GROUP BY DATE_FORMAT({column}, '%Y-%m-01') ORDER BY 1";

const BASIC_STATS: &str = "SELECT CAST(AVG({column}) AS DOUBLE), \
     CAST(STDDEV_SAMP({column}) AS DOUBLE), \
     CAST(VAR_SAMP({column}) AS DOUBLE), \
     CAST(SUM({column}) AS DOUBLE), \
     CAST(MAX({column}) AS DOUBLE), \
     CAST(MIN({column}) AS DOUBLE), \
     CAST(MAX({column}) AS DOUBLE) - CAST(MIN({column}) AS DOUBLE) \
     FROM {schema}.{table}";

const PERCENTILES: &str = "WITH ranked AS (\
     SELECT CAST({column} AS DOUBLE) AS v, CUME_DIST() OVER (ORDER BY {column}) AS cd \
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

/// Templates shared with MariaDB, which differs only in percentile support.
pub(super) fn shared_template(operation: SourceOperation) -> Option<SourceTemplate> {
    let template = match operation {
        SourceOperation::ColumnCatalog => {
            SourceTemplate::with_params(COLUMN_CATALOG, &[BindParam::Catalog, BindParam::Schema])
        }
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
        SourceOperation::Percentiles => return None,
    };
    Some(template)
}

/// Repository column types shared with MariaDB.
///
/// Identifiers are `VARCHAR(128)` so a five-part key index stays within
/// InnoDB's 3072-byte limit under `utf8mb4`.
pub(super) const fn shared_repository_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Identifier => "VARCHAR(128)",
        FieldKind::Integer => "BIGINT",
        FieldKind::Double => "DOUBLE",
        FieldKind::Text => "TEXT",
        FieldKind::Date => "DATE",
    }
}

impl SourceDialect for MySqlDialect {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::Backtick
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }

    fn source_template(&self, operation: SourceOperation) -> Option<SourceTemplate> {
        match operation {
            SourceOperation::Percentiles => Some(SourceTemplate::new(PERCENTILES)),
            other => shared_template(other),
        }
    }

    fn repository_type(&self, kind: FieldKind) -> Option<&'static str> {
        Some(shared_repository_type(kind))
    }

    fn inline_indexes(&self) -> bool {
        true
    }
}
