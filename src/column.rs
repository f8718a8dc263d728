use std::sync::Arc;

use bitvec::prelude::*;
use chrono::NaiveDateTime;

use crate::data_type::DataType;
use crate::error::{Error, Result};
use crate::value::Value;

/// Candidate types tried, in order, when inferring a column from raw cells.
/// Anything that fits none of them is [DataType::Text].
const INFERENCE_ORDER: [DataType; 4] = [
    DataType::Int,
    DataType::Float,
    DataType::Bool,
    DataType::DateTime,
];

/// Physical storage for column data.
/// Each variant wraps a collection of a specific type to ensure contiguous memory
/// allocation (columnar storage).
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Vector of 64-bit integers.
    Int(Vec<i64>),
    /// Vector of 64-bit floats.
    Float(Vec<f64>),
    /// Vector of thread-safe atomic reference-counted strings.
    Text(Vec<Arc<str>>),
    /// Compact bit-vector for boolean values.
    Bool(BitVec),
    /// Vector of timezone-less timestamps.
    DateTime(Vec<NaiveDateTime>),
}

/// Represents a column within a table.
/// It combines metadata (name, type) with actual data and a nullability tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// The name of the column.
    pub name: String,
    /// The logical data type of the column.
    pub data_type: DataType,
    /// The actual values stored in the column.
    pub data: ColumnData,
    /// A bitmap where a `true` bit indicates that the value at that index is `NULL`.
    pub null_bitmap: BitVec,
}

impl Column {
    /// Creates a new, empty column with the specified name and data type.
    /// The underlying data storage is initialized according to the data type.
    pub fn new(name: String, data_type: DataType) -> Self {
        let data = match data_type {
            DataType::Int => ColumnData::Int(vec![]),
            DataType::Float => ColumnData::Float(vec![]),
            DataType::Bool => ColumnData::Bool(bitvec!()),
            DataType::Text => ColumnData::Text(vec![]),
            DataType::DateTime => ColumnData::DateTime(vec![]),
        };
        Self {
            name,
            data_type,
            data,
            null_bitmap: bitvec!(),
        }
    }

    /// Builds a column from raw spreadsheet cells, inferring its type.
    ///
    /// Blank cells (empty or whitespace only) are `NULL` and do not take part in
    /// inference. The first type in integer, float, boolean, datetime order that
    /// parses every remaining cell wins; otherwise, and for a column with no
    /// non-blank cell at all, the column is a string column.
    ///
    /// # Example
    /// ```
    /// # use tablepipe::column::Column;
    /// # use tablepipe::data_type::DataType;
    /// # use tablepipe::value::Value;
    /// let col = Column::infer("amt".into(), &["10", "", "2.5"]);
    ///
    /// assert_eq!(col.data_type, DataType::Float);
    /// assert_eq!(col.get(0), Some(Value::Float(10.0)));
    /// assert!(col.get(1).unwrap().is_null());
    /// ```
    pub fn infer(name: String, cells: &[&str]) -> Self {
        let present: Vec<&str> = cells
            .iter()
            .copied()
            .filter(|cell| !is_blank(cell))
            .collect();

        let data_type = if present.is_empty() {
            DataType::Text
        } else {
            INFERENCE_ORDER
                .into_iter()
                .find(|&candidate| {
                    present
                        .iter()
                        .all(|cell| Value::parse_as(cell, candidate).is_some())
                })
                .unwrap_or(DataType::Text)
        };

        let mut column = Self::new(name, data_type);
        for cell in cells {
            let value = if is_blank(cell) {
                Value::Null
            } else {
                Value::parse_as(cell, data_type).unwrap_or(Value::Null)
            };
            column.push_unchecked(value);
        }
        column
    }

    /// Builds a column of a known type from already typed values.
    ///
    /// # Errors
    /// Returns an error if one of the values does not match `data_type`.
    pub fn from_values(
        name: String,
        data_type: DataType,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<Self> {
        let mut column = Self::new(name, data_type);
        for value in values {
            column.push(value)?;
        }
        Ok(column)
    }

    /// Appends a new value to the end of the column.
    ///
    /// # Errors
    /// Returns an error if the value's type does not match the column's data type.
    ///
    /// # Behavior
    /// - If the value is `Null`, a default "dummy" value is pushed to the data vector
    ///   to maintain index alignment with the `null_bitmap`.
    /// - If the value is not `Null`, it is added to the data vector and the bitmap is updated.
    ///
    /// # Example
    /// ```
    /// # use tablepipe::column::Column;
    /// # use tablepipe::data_type::DataType;
    /// # use tablepipe::value::Value;
    /// let mut col = Column::new("age".into(), DataType::Int);
    /// col.push(Value::Int(30)).unwrap();
    /// col.push(Value::Null).unwrap();
    ///
    /// assert_eq!(col.len(), 2);
    /// assert!(col.get(1).unwrap().is_null());
    /// ```
    pub fn push(&mut self, value: Value) -> Result<()> {
        if !value.is_null() && value.data_type() != Some(self.data_type) {
            return Err(Error::TypeMismatch {
                column: self.name.clone(),
                expected: self.data_type,
                found: format!("{value:?}"),
            });
        }
        self.push_unchecked(value);
        Ok(())
    }

    /// Pushes a value already known to match the column type. A mismatching
    /// value is stored as `NULL`.
    fn push_unchecked(&mut self, value: Value) {
        match (&mut self.data, value) {
            (ColumnData::Int(col), Value::Int(v)) => col.push(v),
            (ColumnData::Float(col), Value::Float(v)) => col.push(v),
            (ColumnData::Text(col), Value::Text(v)) => col.push(v),
            (ColumnData::Bool(col), Value::Bool(v)) => col.push(v),
            (ColumnData::DateTime(col), Value::DateTime(v)) => col.push(v),
            (data, _) => {
                // Add default value to keep alignment between the data vector and the bitmap
                match data {
                    ColumnData::Int(v) => v.push(0),
                    ColumnData::Float(v) => v.push(0.0),
                    ColumnData::Text(v) => v.push(Arc::from("")),
                    ColumnData::Bool(v) => v.push(false),
                    ColumnData::DateTime(v) => v.push(NaiveDateTime::default()),
                }
                self.null_bitmap.push(true);
                return;
            }
        }
        self.null_bitmap.push(false);
    }

    /// Returns the number of rows currently stored in the column.
    pub fn len(&self) -> usize {
        self.null_bitmap.len()
    }

    /// Returns true if there is no row in the column, else false.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-null rows.
    pub fn count_non_null(&self) -> usize {
        self.null_bitmap.count_zeros()
    }

    /// Retrieves the value at the specified row index.
    ///
    /// Returns `Some(Value)` if the index is valid, or `None` if it is out of bounds.
    /// If the `null_bitmap` indicates a null at the index, `Some(Value::Null)` is returned.
    pub fn get(&self, row_idx: usize) -> Option<Value> {
        if row_idx >= self.len() {
            return None;
        }
        if self.null_bitmap[row_idx] {
            return Some(Value::Null);
        }
        match &self.data {
            ColumnData::Int(col) => Some(Value::Int(col[row_idx])),
            ColumnData::Text(col) => Some(Value::Text(col[row_idx].clone())),
            ColumnData::Float(col) => Some(Value::Float(col[row_idx])),
            ColumnData::Bool(col) => Some(Value::Bool(col[row_idx])),
            ColumnData::DateTime(col) => Some(Value::DateTime(col[row_idx])),
        }
    }

    /// Iterates over every value of the column in row order.
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).map(|row_idx| self.get(row_idx).unwrap_or(Value::Null))
    }

    /// Gathers the given rows into a new column with the same name and type.
    ///
    /// A `None` slot, or an index past the end, produces a `NULL`. This is how
    /// unmatched join rows get their null side.
    pub fn take(&self, rows: impl IntoIterator<Item = Option<usize>>) -> Self {
        let mut out = Self::new(self.name.clone(), self.data_type);
        for row in rows {
            let value = row
                .and_then(|row_idx| self.get(row_idx))
                .unwrap_or(Value::Null);
            out.push_unchecked(value);
        }
        out
    }

    /// Returns the same column under another name.
    pub fn renamed(mut self, name: String) -> Self {
        self.name = name;
        self
    }
}

fn is_blank(cell: &str) -> bool {
    cell.trim().is_empty()
}
