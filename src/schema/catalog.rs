//! # Catalog Module
//!
//! The catalog owns every table definition in a database. Definitions are
//! handed out as `Arc<TableDef>` so plans and scans can hold them without
//! keeping the catalog borrowed; DDL replaces the `Arc` rather than mutating
//! a shared definition.
//!
//! Every change bumps `version`, which prepared statements compare against
//! to decide whether a cached plan is stale.

use eyre::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::table::{IndexDef, TableDef};

#[derive(Debug, Clone)]
pub struct Catalog {
    tables: BTreeMap<String, Arc<TableDef>>,
    next_table_id: u64,
    version: u64,
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
            next_table_id: 1,
            version: 0,
        }
    }

    /// Id the next created table receives.
    pub fn next_table_id(&self) -> u64 {
        self.next_table_id
    }

    /// Keeps ids below `next` from being handed out again.
    pub fn reserve_table_ids(&mut self, next: u64) {
        self.next_table_id = self.next_table_id.max(next);
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(&key(name))
    }

    pub fn get_table(&self, name: &str) -> Option<Arc<TableDef>> {
        self.tables.get(&key(name)).cloned()
    }

    pub fn resolve_table(&self, name: &str) -> Result<Arc<TableDef>> {
        match self.get_table(name) {
            Some(table) => Ok(table),
            None => schema_bail!("table '{}' not found", name),
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableDef>> {
        self.tables.values()
    }

    /// Table names in display spelling, sorted case-insensitively.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.values().map(|t| t.name().to_string()).collect()
    }

    /// Registers a new table and assigns its id.
    pub fn create_table(&mut self, mut table: TableDef) -> Result<Arc<TableDef>> {
        if self.table_exists(table.name()) {
            schema_bail!("table '{}' already exists", table.name());
        }
        for index in table.indexes() {
            if self.find_index(index.name()).is_some() {
                schema_bail!("index '{}' already exists", index.name());
            }
        }

        table.set_id(self.next_table_id);
        self.next_table_id += 1;

        let table = Arc::new(table);
        self.tables.insert(key(table.name()), Arc::clone(&table));
        self.version += 1;
        Ok(table)
    }

    /// Registers a table that already carries its id, as read back from
    /// durable storage.
    pub fn restore_table(&mut self, table: TableDef) -> Result<Arc<TableDef>> {
        if self.table_exists(table.name()) {
            schema_bail!("table '{}' already exists", table.name());
        }
        self.next_table_id = self.next_table_id.max(table.id() + 1);
        let table = Arc::new(table);
        self.tables.insert(key(table.name()), Arc::clone(&table));
        self.version += 1;
        Ok(table)
    }

    pub fn table_by_id(&self, id: u64) -> Option<Arc<TableDef>> {
        self.tables.values().find(|t| t.id() == id).cloned()
    }

    pub fn drop_table(&mut self, name: &str) -> Result<Arc<TableDef>> {
        match self.tables.remove(&key(name)) {
            Some(table) => {
                self.version += 1;
                Ok(table)
            }
            None => schema_bail!("table '{}' not found", name),
        }
    }

    /// Finds an index by name across all tables.
    pub fn find_index(&self, name: &str) -> Option<(Arc<TableDef>, IndexDef)> {
        self.tables.values().find_map(|table| {
            table
                .get_index(name)
                .map(|index| (Arc::clone(table), index.clone()))
        })
    }

    pub fn create_index(&mut self, table_name: &str, index: IndexDef) -> Result<Arc<TableDef>> {
        if self.find_index(index.name()).is_some() {
            schema_bail!("index '{}' already exists", index.name());
        }
        let current = self.resolve_table(table_name)?;
        let mut updated = (*current).clone();
        updated.add_index(index)?;

        let updated = Arc::new(updated);
        self.tables.insert(key(table_name), Arc::clone(&updated));
        self.version += 1;
        Ok(updated)
    }

    /// Removes an index, returning the owning table's new definition and
    /// the removed index.
    pub fn drop_index(&mut self, name: &str) -> Result<(Arc<TableDef>, IndexDef)> {
        let Some((table, _)) = self.find_index(name) else {
            schema_bail!("index '{}' not found", name);
        };
        if table
            .indexes()
            .first()
            .is_some_and(|pk| !table.primary_key().is_empty() && pk.name().eq_ignore_ascii_case(name))
        {
            schema_bail!("cannot drop primary key index '{}'", name);
        }

        let mut updated = (*table).clone();
        let removed = match updated.remove_index(name) {
            Some(index) => index,
            None => schema_bail!("index '{}' not found", name),
        };

        let updated = Arc::new(updated);
        self.tables.insert(key(updated.name()), Arc::clone(&updated));
        self.version += 1;
        Ok((updated, removed))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DbError, ErrorKind};
    use crate::schema::{ColumnDef, Constraint};
    use crate::types::DataType;

    fn table(name: &str) -> TableDef {
        TableDef::new(
            0,
            name,
            vec![
                ColumnDef::new("id", DataType::Integer).with_constraint(Constraint::PrimaryKey),
                ColumnDef::new("name", DataType::Text),
            ],
        )
        .unwrap()
    }

    #[test]
    fn create_assigns_ids_and_bumps_version() {
        let mut catalog = Catalog::new();
        let a = catalog.create_table(table("a")).unwrap();
        let b = catalog.create_table(table("b")).unwrap();
        assert_eq!((a.id(), b.id()), (1, 2));
        assert_eq!(catalog.version(), 2);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut catalog = Catalog::new();
        catalog.create_table(table("Users")).unwrap();
        assert!(catalog.get_table("USERS").is_some());
        assert_eq!(catalog.table_names(), vec!["Users".to_string()]);
    }

    #[test]
    fn duplicate_table_is_schema_error() {
        let mut catalog = Catalog::new();
        catalog.create_table(table("t")).unwrap();
        let err = catalog.create_table(table("T")).unwrap_err();
        assert_eq!(DbError::kind_of(&err), Some(ErrorKind::Schema));
    }

    #[test]
    fn index_names_are_global() {
        let mut catalog = Catalog::new();
        catalog.create_table(table("a")).unwrap();
        catalog.create_table(table("b")).unwrap();

        catalog
            .create_index("a", IndexDef::btree("idx_name", vec!["name".into()], false))
            .unwrap();
        assert!(catalog
            .create_index("b", IndexDef::btree("idx_name", vec!["name".into()], false))
            .is_err());

        let (owner, _) = catalog.drop_index("IDX_NAME").unwrap();
        assert_eq!(owner.name(), "a");
        assert!(catalog.drop_index("a_pkey").is_err());
    }

    #[test]
    fn restored_catalog_continues_id_sequence() {
        let mut catalog = Catalog::new();
        catalog.create_table(table("a")).unwrap();
        catalog.create_table(table("b")).unwrap();
        catalog.drop_table("b").unwrap();

        let mut restored = Catalog::new();
        for def in catalog.tables() {
            restored.restore_table((**def).clone()).unwrap();
        }
        restored.reserve_table_ids(catalog.next_table_id());

        assert_eq!(restored.create_table(table("c")).unwrap().id(), 3);
        assert_eq!(restored.table_by_id(1).unwrap().name(), "a");
    }
}
