//! Mapping of profiling records onto repository rows.

use crate::connection::SqlValue;
use crate::models::{
    ColumnKey, ColumnRecord, DataValueRecord, DateBucketRecord, KeyDepth, RecordSet, StatRecord,
    TableKey, TableRecord, UniqueRecord,
};
use std::fmt;

/// A reconciliation key.
pub trait RecordKey: fmt::Display + Send + Sync {
    /// Whether this is a table or a column key.
    const DEPTH: KeyDepth;

    /// Values bound to the key predicate, in [`KeyDepth::fields`] order.
    fn key_values(&self) -> Vec<SqlValue>;
}

impl RecordKey for TableKey {
    const DEPTH: KeyDepth = KeyDepth::Table;

    fn key_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.server.as_str()),
            SqlValue::from(self.catalog.as_str()),
            SqlValue::from(self.schema.as_str()),
            SqlValue::from(self.table.as_str()),
        ]
    }
}

impl RecordKey for ColumnKey {
    const DEPTH: KeyDepth = KeyDepth::Column;

    fn key_values(&self) -> Vec<SqlValue> {
        let mut values = self.table.key_values();
        values.push(SqlValue::from(self.column.as_str()));
        values
    }
}

/// A row of one of the six record sets.
pub trait Record: Send + Sync {
    /// Record set the row belongs to.
    const SET: RecordSet;

    /// Key the row is reconciled under.
    type Key: RecordKey;

    /// Insert values, in [`RecordSet::fields`] order.
    fn values(&self) -> Vec<SqlValue>;
}

impl Record for ColumnRecord {
    const SET: RecordSet = RecordSet::Columns;
    type Key = TableKey;

    fn values(&self) -> Vec<SqlValue> {
        let mut values = self.table.key_values();
        values.extend([
            SqlValue::from(self.column.as_str()),
            SqlValue::from(self.ordinal_position),
            SqlValue::from(self.data_type.as_str()),
        ]);
        values
    }
}

impl Record for TableRecord {
    const SET: RecordSet = RecordSet::Tables;
    type Key = TableKey;

    fn values(&self) -> Vec<SqlValue> {
        let mut values = self.table.key_values();
        values.extend([SqlValue::from(self.n_columns), SqlValue::from(self.n_rows)]);
        values
    }
}

impl Record for UniqueRecord {
    const SET: RecordSet = RecordSet::Uniques;
    type Key = TableKey;

    fn values(&self) -> Vec<SqlValue> {
        let mut values = self.table.key_values();
        values.extend([
            SqlValue::from(self.column.as_str()),
            SqlValue::from(self.ordinal_position),
            SqlValue::from(self.data_type.as_str()),
            SqlValue::from(self.distinct_values),
            SqlValue::from(self.null_values),
        ]);
        values
    }
}

impl Record for DataValueRecord {
    const SET: RecordSet = RecordSet::DataValues;
    type Key = ColumnKey;

    fn values(&self) -> Vec<SqlValue> {
        let mut values = self.column.key_values();
        values.extend([
            SqlValue::from(self.value.clone()),
            SqlValue::from(self.frequency),
        ]);
        values
    }
}

impl Record for DateBucketRecord {
    const SET: RecordSet = RecordSet::Dates;
    type Key = ColumnKey;

    fn values(&self) -> Vec<SqlValue> {
        let mut values = self.column.key_values();
        values.extend([SqlValue::from(self.bucket), SqlValue::from(self.frequency)]);
        values
    }
}

impl Record for StatRecord {
    const SET: RecordSet = RecordSet::Stats;
    type Key = ColumnKey;

    fn values(&self) -> Vec<SqlValue> {
        let mut values = self.column.key_values();
        let stats = &self.stats;
        values.extend(
            [
                stats.avg,
                stats.stdev,
                stats.variance,
                stats.sum,
                stats.max,
                stats.min,
                stats.range,
            ]
            .map(SqlValue::from),
        );
        let ladder = self.percentiles.unwrap_or_default().ladder();
        values.extend(ladder.map(SqlValue::from));
        values
    }
}
