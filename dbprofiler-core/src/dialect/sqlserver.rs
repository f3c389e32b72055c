//! SQL Server dialect.
//!
//! SQL Server is supported as a source only: the metadata repository needs
//! multi-row transactional inserts through the same driver path as the
//! other engines, which the tiberius client is not wired for. Percentiles
//! are exact (`PERCENTILE_DISC ... OVER ()`, first row).

use super::{BindParam, PlaceholderStyle, QuoteStyle, SourceDialect, SourceOperation, SourceTemplate};
use crate::models::{Engine, FieldKind};

/// SQL Server 2012+.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SqlServerDialect;

const COLUMN_CATALOG: &str = "SELECT c.TABLE_NAME, c.COLUMN_NAME, \
     CAST(c.ORDINAL_POSITION AS BIGINT), c.DATA_TYPE \
     FROM INFORMATION_SCHEMA.COLUMNS AS c \
     JOIN INFORMATION_SCHEMA.TABLES AS t \
     ON t.TABLE_CATALOG = c.TABLE_CATALOG AND t.TABLE_SCHEMA = c.TABLE_SCHEMA \
     AND t.TABLE_NAME = c.TABLE_NAME \
     WHERE t.TABLE_TYPE = 'BASE TABLE' AND c.TABLE_CATALOG = ? AND c.TABLE_SCHEMA = ? \
     ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION";

const COLUMN_COUNT: &str = "SELECT COUNT_BIG(*) FROM INFORMATION_SCHEMA.COLUMNS \
     WHERE TABLE_CATALOG = ? AND TABLE_SCHEMA = ? AND TABLE_NAME = ?";

const ROW_COUNT: &str = "SELECT COUNT_BIG(*) FROM {schema}.{table}";

const UNIQUE_COUNT: &str = "SELECT COUNT_BIG(DISTINCT CAST({column} AS NVARCHAR(4000)) COLLATE Latin1_General_BIN2), \
     CAST(COALESCE(SUM(CASE WHEN {column} IS NULL THEN 1 ELSE 0 END), 0) AS BIGINT) \
     FROM {schema}.{table}";

const TEXT_PROJECTION: &str = "CAST({column} AS NVARCHAR(4000))";

const BULK_SELECT: &str = "SELECT {columns} FROM {schema}.{table}";

const FREQUENCY: &str = "SELECT CAST({column} AS NVARCHAR(4000)) COLLATE Latin1_General_BIN2, COUNT_BIG(*) \
     FROM {schema}.{table} GROUP BY CAST({column} AS NVARCHAR(4000)) COLLATE Latin1_General_BIN2";

const MONTH_HISTOGRAM: &str = "SELECT CONVERT(VARCHAR(10), DATEFROMPARTS(YEAR({column}), MONTH({column}), 1), 23), \
     COUNT_BIG(*) \
     FROM {schema}.{table} WHERE {column} IS NOT NULL \
     GROUP BY DATEFROMPARTS(YEAR({column}), MONTH({column}), 1) ORDER BY 1";

const BASIC_STATS: &str = "SELECT AVG(CAST({column} AS FLOAT)), \
     STDEV(CAST({column} AS FLOAT)), \
     VAR(CAST({column} AS FLOAT)), \
     SUM(CAST({column} AS FLOAT)), \
     MAX(CAST({column} AS FLOAT)), \
     MIN(CAST({column} AS FLOAT)), \
     MAX(CAST({column} AS FLOAT)) - MIN(CAST({column} AS FLOAT)) \
     FROM {schema}.{table}";

const PERCENTILES: &str = "SELECT TOP 1 \
     PERCENTILE_DISC(0.01) WITHIN GROUP (ORDER BY CAST({column} AS FLOAT)) OVER (), \
     PERCENTILE_DISC(0.025) WITHIN GROUP (ORDER BY CAST({column} AS FLOAT)) OVER (), \
     PERCENTILE_DISC(0.05) WITHIN GROUP (ORDER BY CAST({column} AS FLOAT)) OVER (), \
     PERCENTILE_DISC(0.1) WITHIN GROUP (ORDER BY CAST({column} AS FLOAT)) OVER (), \
     PERCENTILE_DISC(0.25) WITHIN GROUP (ORDER BY CAST({column} AS FLOAT)) OVER (), \
     PERCENTILE_DISC(0.5) WITHIN GROUP (ORDER BY CAST({column} AS FLOAT)) OVER (), \
     PERCENTILE_DISC(0.75) WITHIN GROUP (ORDER BY CAST({column} AS FLOAT)) OVER (), \
     PERCENTILE_DISC(0.9) WITHIN GROUP (ORDER BY CAST({column} AS FLOAT)) OVER (), \
     PERCENTILE_DISC(0.95) WITHIN GROUP (ORDER BY CAST({column} AS FLOAT)) OVER (), \
     PERCENTILE_DISC(0.975) WITHIN GROUP (ORDER BY CAST({column} AS FLOAT)) OVER (), \
     PERCENTILE_DISC(0.99) WITHIN GROUP (ORDER BY CAST({column} AS FLOAT)) OVER (), \
     PERCENTILE_DISC(0.75) WITHIN GROUP (ORDER BY CAST({column} AS FLOAT)) OVER () \
     - PERCENTILE_DISC(0.25) WITHIN GROUP (ORDER BY CAST({column} AS FLOAT)) OVER () \
     FROM {schema}.{table} WHERE {column} IS NOT NULL";

impl SourceDialect for SqlServerDialect {
    fn engine(&self) -> Engine {
        Engine::SqlServer
    }

    fn quote_style(&self) -> QuoteStyle {
        QuoteStyle::Bracket
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::AtNumbered
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

    fn repository_type(&self, _kind: FieldKind) -> Option<&'static str> {
        None
    }
}
