//! MariaDB dialect.
//!
//! Shares MySQL's templates except for percentiles: MariaDB 10.3+ has an
//! exact `PERCENTILE_DISC` window function, evaluated over the whole table
//! and read from the first row.

use super::mysql::{shared_repository_type, shared_template};
use super::{PlaceholderStyle, QuoteStyle, SourceDialect, SourceOperation, SourceTemplate};
use crate::models::{Engine, FieldKind};

/// MariaDB 10.5+.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MariaDbDialect;

const PERCENTILES: &str = "SELECT \
     CAST(PERCENTILE_DISC(0.01) WITHIN GROUP (ORDER BY {column}) OVER () AS DOUBLE), \
     CAST(PERCENTILE_DISC(0.025) WITHIN GROUP (ORDER BY {column}) OVER () AS DOUBLE), \
     CAST(PERCENTILE_DISC(0.05) WITHIN GROUP (ORDER BY {column}) OVER () AS DOUBLE), \
     CAST(PERCENTILE_DISC(0.1) WITHIN GROUP (ORDER BY {column}) OVER () AS DOUBLE), \
     CAST(PERCENTILE_DISC(0.25) WITHIN GROUP (ORDER BY {column}) OVER () AS DOUBLE), \
     CAST(PERCENTILE_DISC(0.5) WITHIN GROUP (ORDER BY {column}) OVER () AS DOUBLE), \
     CAST(PERCENTILE_DISC(0.75) WITHIN GROUP (ORDER BY {column}) OVER () AS DOUBLE), \
     CAST(PERCENTILE_DISC(0.9) WITHIN GROUP (ORDER BY {column}) OVER () AS DOUBLE), \
     CAST(PERCENTILE_DISC(0.95) WITHIN GROUP (ORDER BY {column}) OVER () AS DOUBLE), \
     CAST(PERCENTILE_DISC(0.975) WITHIN GROUP (ORDER BY {column}) OVER () AS DOUBLE), \
     CAST(PERCENTILE_DISC(0.99) WITHIN GROUP (ORDER BY {column}) OVER () AS DOUBLE), \
     CAST(PERCENTILE_DISC(0.75) WITHIN GROUP (ORDER BY {column}) OVER () AS DOUBLE) \
     - CAST(PERCENTILE_DISC(0.25) WITHIN GROUP (ORDER BY {column}) OVER () AS DOUBLE) \
     FROM {schema}.{table} WHERE {column} IS NOT NULL LIMIT 1";

impl SourceDialect for MariaDbDialect {
    fn engine(&self) -> Engine {
        Engine::MariaDb
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
