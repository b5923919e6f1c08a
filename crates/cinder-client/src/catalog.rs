//! Catalog requests over a session connection.

use std::sync::Arc;
use std::time::Duration;

use cinder_proto::{Request, Response};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{ClientError, ClientResult};
use crate::name::QualifiedName;
use crate::table::Table;

/// Issues catalog requests and validates the replies.
#[derive(Debug, Clone)]
pub(crate) struct CatalogClient {
    connection: Arc<Connection>,
    timeout: Duration,
}

impl CatalogClient {
    pub(crate) fn new(connection: Arc<Connection>, timeout: Duration) -> Self {
        Self {
            connection,
            timeout,
        }
    }

    /// Looks up one table. `None` means the catalog has no such table.
    pub(crate) async fn get_table(&self, name: &QualifiedName) -> ClientResult<Option<Table>> {
        let request = Request::GetTable {
            name: name.to_wire(),
        };
        let response = self.connection.request(request, self.timeout).await?;
        let table = table_reply(name, response)?;
        if table.is_none() {
            debug!("table {} not found", name);
        }
        Ok(table)
    }

    /// Lists every table in the catalog.
    pub(crate) async fn list_tables(&self) -> ClientResult<Vec<Table>> {
        let response = self
            .connection
            .request(Request::ListTables, self.timeout)
            .await?;
        tables_reply(response)
    }
}

fn table_reply(requested: &QualifiedName, response: Response) -> ClientResult<Option<Table>> {
    match response {
        Response::Table(None) => Ok(None),
        Response::Table(Some(descriptor)) => {
            let table = Table::from_descriptor(descriptor)?;
            if table.qualified_name() != requested {
                return Err(ClientError::MalformedReply(format!(
                    "requested table {requested}, catalog returned {}",
                    table.name()
                )));
            }
            Ok(Some(table))
        }
        other => Err(unexpected_reply("get-table", other)),
    }
}

fn tables_reply(response: Response) -> ClientResult<Vec<Table>> {
    match response {
        Response::Tables(descriptors) => descriptors
            .into_iter()
            .map(Table::from_descriptor)
            .collect(),
        other => Err(unexpected_reply("list-tables", other)),
    }
}

fn unexpected_reply(operation: &str, response: Response) -> ClientError {
    match response {
        Response::Error { code, message } => ClientError::Server { code, message },
        other => ClientError::MalformedReply(format!(
            "unexpected {} reply to {}",
            other.kind(),
            operation
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use cinder_proto::{ErrorCode, TableDescriptor, TableId, TableName};

    fn descriptor(id: u64, schema: &str, name: &str) -> TableDescriptor {
        TableDescriptor::new(TableId::new(id), TableName::new(schema, name))
    }

    fn requested(s: &str) -> QualifiedName {
        QualifiedName::parse(s).unwrap()
    }

    #[test]
    fn test_found_table() {
        let reply = Response::Table(Some(descriptor(1, "PUB", "TBL1")));
        let table = table_reply(&requested("pub.tbl1"), reply).unwrap().unwrap();
        assert_eq!(table.name(), "PUB.TBL1");
        assert_eq!(table.id(), TableId::new(1));
    }

    #[test]
    fn test_absent_table_is_not_an_error() {
        let table = table_reply(&requested("PUB.NOPE"), Response::Table(None)).unwrap();
        assert!(table.is_none());
    }

    #[test]
    fn test_name_mismatch_is_malformed() {
        let reply = Response::Table(Some(descriptor(1, "PUB", "OTHER")));
        let err = table_reply(&requested("PUB.TBL1"), reply).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedReply);
    }

    #[test]
    fn test_empty_component_is_malformed() {
        let reply = Response::Tables(vec![descriptor(1, "PUB", "A"), descriptor(2, "", "B")]);
        assert_eq!(tables_reply(reply).unwrap_err().kind(), ErrorKind::MalformedReply);
    }

    #[test]
    fn test_wrong_variant_is_malformed() {
        let err = table_reply(&requested("PUB.T"), Response::Tables(Vec::new())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedReply);

        let err = tables_reply(Response::Table(None)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedReply);
    }

    #[test]
    fn test_server_error() {
        let reply = Response::Error {
            code: ErrorCode::Internal,
            message: "catalog unavailable".to_string(),
        };
        let err = tables_reply(reply).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(err.to_string().contains("catalog unavailable"));
    }

    #[test]
    fn test_list_preserves_entries() {
        let reply = Response::Tables(vec![descriptor(1, "PUB", "A"), descriptor(2, "SALES", "B")]);
        let names: Vec<String> = tables_reply(reply)
            .unwrap()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["PUB.A", "SALES.B"]);
    }
}
