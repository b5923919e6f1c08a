//! Table handles.

use std::fmt;

use cinder_proto::{TableDescriptor, TableId};

use crate::error::{ClientError, ClientResult};
use crate::name::QualifiedName;

/// An immutable handle to a table found in the catalog.
///
/// Its name is the canonical name the catalog returned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    id: TableId,
    name: QualifiedName,
    canonical: String,
}

impl Table {
    /// Creates a handle from an already-canonical name.
    pub fn new(id: TableId, name: QualifiedName) -> Self {
        let canonical = name.canonical();
        Self {
            id,
            name,
            canonical,
        }
    }

    /// Builds a handle from a catalog entry, rejecting empty components.
    pub(crate) fn from_descriptor(descriptor: TableDescriptor) -> ClientResult<Self> {
        if descriptor.name.schema.is_empty() || descriptor.name.name.is_empty() {
            return Err(ClientError::MalformedReply(format!(
                "catalog entry {} has an empty name component ({:?})",
                descriptor.id, descriptor.name
            )));
        }
        Ok(Self::new(descriptor.id, QualifiedName::from(descriptor.name)))
    }

    /// Canonical name, `SCHEMA.NAME`.
    pub fn name(&self) -> &str {
        &self.canonical
    }

    /// Catalog id.
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Canonical name as a `(schema, name)` pair.
    pub fn qualified_name(&self) -> &QualifiedName {
        &self.name
    }

    /// Schema component of the name.
    pub fn schema(&self) -> &str {
        self.name.schema()
    }

    /// Table component of the name, without the schema.
    pub fn table_name(&self) -> &str {
        self.name.name()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_proto::TableName;

    #[test]
    fn test_accessors() {
        let table = Table::new(TableId::new(4), QualifiedName::from_parts("PUB", "TBL1"));
        assert_eq!(table.name(), "PUB.TBL1");
        assert_eq!(table.schema(), "PUB");
        assert_eq!(table.table_name(), "TBL1");
        assert_eq!(table.id(), TableId::new(4));
        assert_eq!(table.to_string(), "PUB.TBL1");
    }

    #[test]
    fn test_from_descriptor_keeps_catalog_name() {
        let descriptor = TableDescriptor::new(TableId::new(1), TableName::new("Sales", "q1"));
        let table = Table::from_descriptor(descriptor).unwrap();
        assert_eq!(table.name(), "Sales.q1");
    }

    #[test]
    fn test_from_descriptor_rejects_empty_names() {
        let descriptor = TableDescriptor::new(TableId::new(1), TableName::new("PUB", ""));
        assert!(matches!(
            Table::from_descriptor(descriptor),
            Err(ClientError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_handles_are_values() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Table>();

        let a = Table::new(TableId::new(1), QualifiedName::from_parts("PUB", "A"));
        assert_eq!(a.clone(), a);
    }
}
