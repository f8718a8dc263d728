use std::collections::HashSet;

use crate::column::Column;
use crate::data_type::DataType;
use crate::error::{Error, Result};
use crate::value::Value;

/// Column definition in the schema
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// A named, column-oriented table. All columns have the same length and
/// column names are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub schema: Schema,
    pub columns: Vec<Column>,
    pub row_count: usize,
}

impl Table {
    pub fn new(name: String, schema: Schema) -> Self {
        let columns = schema
            .columns
            .iter()
            .map(|column| Column::new(column.name.clone(), column.data_type))
            .collect();
        Self {
            name,
            schema,
            columns,
            row_count: 0,
        }
    }

    /// Loads a table from a spreadsheet-like grid of raw cells.
    ///
    /// Each column's type is inferred from its cells (see [Column::infer]).
    ///
    /// # Errors
    /// Returns [Error::Schema] if a header name is repeated or if a row does not
    /// have exactly one cell per header entry.
    ///
    /// # Example
    /// ```
    /// use tablepipe::{DataType, Table, Value};
    ///
    /// let table = Table::load(
    ///     "orders",
    ///     &["id", "amt"],
    ///     &[vec!["1", "12.5"], vec!["2", ""]],
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(table.row_count, 2);
    /// assert_eq!(table.column("id").unwrap().data_type, DataType::Int);
    /// assert_eq!(table.get_row(1), Some(vec![Value::Int(2), Value::Null]));
    /// ```
    pub fn load<H, C>(name: &str, header: &[H], rows: &[Vec<C>]) -> Result<Self>
    where
        H: AsRef<str>,
        C: AsRef<str>,
    {
        ensure_unique(name, header.iter().map(AsRef::as_ref))?;

        if let Some((row_idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != header.len())
        {
            return Err(Error::Schema {
                table: name.to_string(),
                reason: format!(
                    "row {row_idx} has {} cells, header has {}",
                    row.len(),
                    header.len()
                ),
            });
        }

        let columns = header
            .iter()
            .enumerate()
            .map(|(col_idx, col_name)| {
                let cells: Vec<&str> = rows.iter().map(|row| row[col_idx].as_ref()).collect();
                Column::infer(col_name.as_ref().to_string(), &cells)
            })
            .collect();

        Self::from_columns(name.to_string(), columns)
    }

    /// Assembles a table from finished columns.
    ///
    /// # Errors
    /// Returns [Error::Schema] if the columns differ in length or share a name.
    pub fn from_columns(name: String, columns: Vec<Column>) -> Result<Self> {
        ensure_unique(&name, columns.iter().map(|c| c.name.as_str()))?;

        let row_count = columns.first().map_or(0, Column::len);
        if let Some(column) = columns.iter().find(|c| c.len() != row_count) {
            return Err(Error::Schema {
                table: name,
                reason: format!(
                    "column {:?} has {} rows, expected {row_count}",
                    column.name,
                    column.len()
                ),
            });
        }

        let schema = Schema {
            columns: columns
                .iter()
                .map(|c| ColumnDef {
                    name: c.name.clone(),
                    data_type: c.data_type,
                })
                .collect(),
        };
        Ok(Self {
            name,
            schema,
            columns,
            row_count,
        })
    }

    /// insert a new row
    pub fn insert(&mut self, values: Vec<Value>) -> Result<()> {
        // different sizes
        if values.len() != self.schema.columns.len() {
            return Err(Error::Schema {
                table: self.name.clone(),
                reason: format!(
                    "row has {} values, table has {} columns",
                    values.len(),
                    self.schema.columns.len()
                ),
            });
        }
        // check every value first so a bad row never leaves columns misaligned
        for (value, def) in values.iter().zip(&self.schema.columns) {
            if value.data_type().is_some_and(|t| t != def.data_type) {
                return Err(Error::TypeMismatch {
                    column: def.name.clone(),
                    expected: def.data_type,
                    found: format!("{value:?}"),
                });
            }
        }
        for (i, value) in values.into_iter().enumerate() {
            self.columns[i].push(value)?;
        }
        self.row_count += 1;
        Ok(())
    }

    pub fn get_row(&self, row_idx: usize) -> Option<Vec<Value>> {
        if self.row_count <= row_idx {
            return None;
        }
        self.columns
            .iter()
            .map(|col| col.get(row_idx)) // -> Option<Value>
            .collect()
    }

    /// Iterates over the rows, pivoting the columnar storage on the fly.
    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.row_count).filter_map(|row_idx| self.get_row(row_idx))
    }

    pub fn get_col(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// Like [Table::get_col], but reports a missing column as an error.
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.get_col(name).ok_or_else(|| Error::ColumnNotFound {
            table: self.name.clone(),
            column: name.to_string(),
        })
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Builds a new table holding the given rows, in the given order.
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|column| column.take(rows.iter().copied().map(Some)))
            .collect();
        Self {
            name: self.name.clone(),
            schema: self.schema.clone(),
            columns,
            row_count: rows.len(),
        }
    }

    /// Builds a new table with only the named columns, in the given order.
    ///
    /// # Errors
    /// [Error::ColumnNotFound] for the first name that does not exist, and
    /// [Error::Schema] if a name is repeated.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let columns = names
            .iter()
            .map(|name| self.column(name.as_ref()).cloned())
            .collect::<Result<Vec<_>>>()?;
        Self::from_columns(self.name.clone(), columns)
    }

    /// Returns the same table under another name.
    pub fn renamed(mut self, name: String) -> Self {
        self.name = name;
        self
    }
}

fn ensure_unique<'a>(table: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::Schema {
                table: table.to_string(),
                reason: format!("duplicate column name {name:?}"),
            });
        }
    }
    Ok(())
}
