//! In-memory table catalog served by test nodes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use cinder_proto::{TableDescriptor, TableId, TableName};
use parking_lot::RwLock;

/// A catalog of canonical table names, shared by the nodes of a cluster.
#[derive(Debug, Default)]
pub struct TestCatalog {
    tables: RwLock<BTreeMap<TableName, TableId>>,
    next_id: AtomicU64,
}

impl TestCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table under an already-canonical name and returns its id.
    ///
    /// Re-creating an existing table returns the existing id.
    pub fn create_table(&self, schema: &str, name: &str) -> TableId {
        let key = TableName::new(schema, name);
        let mut tables = self.tables.write();
        *tables
            .entry(key)
            .or_insert_with(|| TableId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1))
    }

    /// Removes a table. Returns false if it did not exist.
    pub fn drop_table(&self, schema: &str, name: &str) -> bool {
        self.tables
            .write()
            .remove(&TableName::new(schema, name))
            .is_some()
    }

    /// Looks up a table by exact name.
    pub fn get(&self, name: &TableName) -> Option<TableDescriptor> {
        self.tables
            .read()
            .get(name)
            .map(|id| TableDescriptor::new(*id, name.clone()))
    }

    /// Returns every table.
    pub fn list(&self) -> Vec<TableDescriptor> {
        self.tables
            .read()
            .iter()
            .map(|(name, id)| TableDescriptor::new(*id, name.clone()))
            .collect()
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    /// Returns true if the catalog has no tables.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
