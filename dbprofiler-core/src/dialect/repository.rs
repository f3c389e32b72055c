//! Generated metadata repository statements.
//!
//! Repository DDL and DML are derived from [`RecordSet::fields`] so every
//! engine stores the same shape; only the column types, the quoting and the
//! index syntax vary. Every identifier is quoted (`RANGE`, `MAX` and friends
//! are reserved on some engines). Bind values are written as `?` and
//! rewritten to the engine's placeholder style by [`super::QueryTemplate`].

use super::{QuoteStyle, RepositoryOperation, SourceDialect};
use crate::models::{FieldKind, KeyDepth, PERCENTILE_FIELDS, RecordSet};

/// Separator between the statements of a multi-statement body.
pub const STATEMENT_SEPARATOR: char = ';';

const FIELD_KINDS: [FieldKind; 5] = [
    FieldKind::Identifier,
    FieldKind::Integer,
    FieldKind::Double,
    FieldKind::Text,
    FieldKind::Date,
];

/// Every repository statement for a dialect, or `None` when the engine
/// cannot store one of the field kinds.
pub(super) fn statements(
    dialect: &dyn SourceDialect,
) -> Option<Vec<(RepositoryOperation, String)>> {
    if FIELD_KINDS
        .iter()
        .any(|kind| dialect.repository_type(*kind).is_none())
    {
        return None;
    }

    let q = Quoter(dialect.quote_style());
    let mut statements = Vec::new();
    for operation in RepositoryOperation::all() {
        let sql = match operation {
            RepositoryOperation::CreateRecordSet(set) => create_record_set(dialect, &q, set)?,
            RepositoryOperation::DropRecordSet(set) => {
                format!("DROP TABLE IF EXISTS {}", q.table(set))
            }
            RepositoryOperation::Exists(set, depth) => format!(
                "SELECT COUNT(*) FROM {} WHERE {}",
                q.table(set),
                q.predicate(depth.fields())
            ),
            RepositoryOperation::Delete(set, depth) => format!(
                "DELETE FROM {} WHERE {}",
                q.table(set),
                q.predicate(depth.fields())
            ),
            RepositoryOperation::Insert(set) => insert(&q, set),
            RepositoryOperation::ColumnTables => format!(
                "SELECT DISTINCT {name} FROM {} WHERE {} ORDER BY {name}",
                q.table(RecordSet::Columns),
                q.predicate(scope_fields()),
                name = q.name("TABLE_NAME"),
            ),
            RepositoryOperation::TableInventory => format!(
                "SELECT {}, {}, {} FROM {} WHERE {} ORDER BY {}",
                q.name("TABLE_NAME"),
                q.name("N_COLUMNS"),
                q.name("N_ROWS"),
                q.table(RecordSet::Tables),
                q.predicate(scope_fields()),
                q.name("TABLE_NAME"),
            ),
            RepositoryOperation::TableColumns => format!(
                "SELECT {}, {}, {} FROM {} WHERE {} ORDER BY {}",
                q.name("COLUMN_NAME"),
                q.name("ORDINAL_POSITION"),
                q.name("DATA_TYPE"),
                q.table(RecordSet::Columns),
                q.predicate(KeyDepth::Table.fields()),
                q.name("ORDINAL_POSITION"),
            ),
            RepositoryOperation::DistinctValueCounts => format!(
                "SELECT {}, {} FROM {} WHERE {}",
                q.name("COLUMN_NAME"),
                q.name("DISTINCT_VALUES"),
                q.table(RecordSet::Uniques),
                q.predicate(KeyDepth::Table.fields()),
            ),
            RepositoryOperation::RefreshRowCount => format!(
                "UPDATE {} SET {} = ? WHERE {}",
                q.table(RecordSet::Tables),
                q.name("N_ROWS"),
                q.predicate(KeyDepth::Table.fields()),
            ),
            RepositoryOperation::RefreshPercentiles => format!(
                "UPDATE {} SET {} WHERE {}",
                q.table(RecordSet::Stats),
                PERCENTILE_FIELDS
                    .iter()
                    .map(|field| format!("{} = ?", q.name(field)))
                    .collect::<Vec<_>>()
                    .join(", "),
                q.predicate(KeyDepth::Column.fields()),
            ),
        };
        statements.push((operation, sql));
    }
    Some(statements)
}

/// `SERVER_NAME`, `TABLE_CATALOG`, `TABLE_SCHEMA`.
fn scope_fields() -> &'static [&'static str] {
    let table = KeyDepth::Table.fields();
    &table[..3]
}

struct Quoter(QuoteStyle);

impl Quoter {
    fn name(&self, identifier: &str) -> String {
        self.0.quote(identifier)
    }

    fn table(&self, set: RecordSet) -> String {
        self.0.quote(set.table_name())
    }

    fn list(&self, fields: &[&str]) -> String {
        fields
            .iter()
            .map(|field| self.name(field))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn predicate(&self, fields: &[&str]) -> String {
        fields
            .iter()
            .map(|field| format!("{} = ?", self.name(field)))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

fn create_record_set(dialect: &dyn SourceDialect, q: &Quoter, set: RecordSet) -> Option<String> {
    let mut definitions = Vec::with_capacity(set.fields().len().saturating_add(1));
    for field in set.fields() {
        let ty = dialect.repository_type(field.kind)?;
        let null = if field.nullable { "NULL" } else { "NOT NULL" };
        definitions.push(format!("{} {} {}", q.name(field.name), ty, null));
    }

    let index_name = q.name(&format!("ix_{}_key", set.table_name()));
    let index_columns = q.list(set.index_depth().fields());

    if dialect.inline_indexes() {
        definitions.push(format!("INDEX {} ({})", index_name, index_columns));
        return Some(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            q.table(set),
            definitions.join(", ")
        ));
    }

    Some(format!(
        "CREATE TABLE IF NOT EXISTS {table} ({}){sep} CREATE INDEX IF NOT EXISTS {} ON {table} ({})",
        definitions.join(", "),
        index_name,
        index_columns,
        table = q.table(set),
        sep = STATEMENT_SEPARATOR,
    ))
}

fn insert(q: &Quoter, set: RecordSet) -> String {
    let names: Vec<&str> = set.fields().iter().map(|field| field.name).collect();
    let placeholders = vec!["?"; names.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        q.table(set),
        q.list(&names),
        placeholders
    )
}

/// Splits a multi-statement body into its statements.
pub fn split_statements(body: &str) -> impl Iterator<Item = &str> {
    body.split(STATEMENT_SEPARATOR)
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
}
