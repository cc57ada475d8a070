//! Row representation.

use crate::value::Value;
use bytes::Bytes;

/// One row: an ordered list of `(column, value)` pairs.
///
/// Records are reordered to match the owning table definition before
/// encoding, so callers may add columns in any order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// Column names.
    pub cols: Vec<String>,
    /// Column values, parallel to `cols`.
    pub vals: Vec<Value>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column value.
    pub fn add(mut self, col: impl Into<String>, val: Value) -> Self {
        self.cols.push(col.into());
        self.vals.push(val);
        self
    }

    /// Adds an int64 column.
    pub fn add_int64(self, col: impl Into<String>, v: i64) -> Self {
        self.add(col, Value::Int64(v))
    }

    /// Adds a bytes column.
    pub fn add_bytes(self, col: impl Into<String>, b: impl Into<Bytes>) -> Self {
        self.add(col, Value::Bytes(b.into()))
    }

    /// Looks up a column value by name.
    pub fn get(&self, col: &str) -> Option<&Value> {
        self.cols
            .iter()
            .position(|c| c == col)
            .map(|idx| &self.vals[idx])
    }
}
