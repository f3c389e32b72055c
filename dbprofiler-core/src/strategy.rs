//! Adaptive execution strategy.
//!
//! Small tables are loaded in bulk (a batch of columns per query, counted
//! client side); large or uncounted tables are profiled with one aggregate
//! query per column, executed by the source.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Default row count from which per-column execution is used.
pub const DEFAULT_MAX_ROWS_FOR_BULK: i64 = 100_000;

/// Default number of columns loaded per bulk query.
pub const DEFAULT_MAX_COLUMNS_PER_QUERY: usize = 50;

/// How a table's columns are profiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    /// Fetch column batches and aggregate client side
    Bulk,
    /// One source-side aggregate per column
    PerColumn,
}

impl ExecutionPath {
    /// `Bulk` iff the row count is known and strictly below
    /// `max_rows_for_bulk`.
    pub fn select(row_count: Option<i64>, max_rows_for_bulk: i64) -> Self {
        match row_count {
            Some(n) if n < max_rows_for_bulk => Self::Bulk,
            _ => Self::PerColumn,
        }
    }
}

/// Splits columns into bulk query batches of at most `max_columns` each.
pub fn batches<T>(columns: &[T], max_columns: usize) -> std::slice::Chunks<'_, T> {
    columns.chunks(max_columns.max(1))
}

/// Distinct and NULL counts of one fetched column.
///
/// NULL is not counted as a distinct value, matching `COUNT(DISTINCT)`.
pub fn distinct_and_nulls<'a, I>(cells: I) -> (i64, i64)
where
    I: IntoIterator<Item = &'a Option<String>>,
{
    let mut seen: HashSet<&str> = HashSet::new();
    let mut nulls: i64 = 0;
    for cell in cells {
        match cell {
            Some(value) => {
                seen.insert(value.as_str());
            }
            None => nulls = nulls.saturating_add(1),
        }
    }
    (i64::try_from(seen.len()).unwrap_or(i64::MAX), nulls)
}

/// Frequency of every value of one fetched column, NULL included, ordered
/// by descending frequency and then by value.
pub fn frequency_map<'a, I>(cells: I) -> Vec<(Option<String>, i64)>
where
    I: IntoIterator<Item = &'a Option<String>>,
{
    let mut counts: HashMap<Option<&str>, i64> = HashMap::new();
    for cell in cells {
        let entry = counts.entry(cell.as_deref()).or_insert(0);
        *entry = entry.saturating_add(1);
    }
    let mut frequencies: Vec<(Option<String>, i64)> = counts
        .into_iter()
        .map(|(value, count)| (value.map(str::to_string), count))
        .collect();
    frequencies.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    frequencies
}

/// Cells of column `index` across fetched rows.
pub fn column_cells(rows: &[Vec<Option<String>>], index: usize) -> impl Iterator<Item = &Option<String>> {
    rows.iter().filter_map(move |row| row.get(index))
}
