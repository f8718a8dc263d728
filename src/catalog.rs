use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::table::Table;

/// The set of loaded tables a pipeline run reads from.
///
/// The catalog is owned by the caller and only borrowed by pipeline runs, which
/// never modify it. Storing a result for later runs is an explicit
/// [Catalog::insert] by the caller.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    /// A map of table names to their respective [Table] structures.
    tables: HashMap<String, Table>,
}

impl Catalog {
    /// Creates a new, empty catalog.
    pub fn new() -> Self {
        Self {
            tables: HashMap::default(),
        }
    }

    /// Registers a table under its own name.
    ///
    /// # Errors
    /// Returns an error if a table with the same name already exists.
    pub fn insert(&mut self, table: Table) -> Result<()> {
        if self.tables.contains_key(&table.name) {
            return Err(Error::DuplicateTable(table.name));
        }
        log::debug!(
            "catalog: registered {} ({} rows, {} columns)",
            table.name,
            table.row_count,
            table.columns.len()
        );
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Infers and registers a table from raw cells, see [Table::load].
    pub fn load<H, C>(&mut self, name: &str, header: &[H], rows: &[Vec<C>]) -> Result<()>
    where
        H: AsRef<str>,
        C: AsRef<str>,
    {
        if self.contains(name) {
            return Err(Error::DuplicateTable(name.to_string()));
        }
        self.insert(Table::load(name, header, rows)?)
    }

    /// Removes a table from the catalog by its name and hands it back.
    ///
    /// # Errors
    /// Returns an error if the table does not exist.
    pub fn remove(&mut self, name: &str) -> Result<Table> {
        self.tables
            .remove(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Retrieves a reference to a table by name.
    pub fn get(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Returns the names of all tables, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
