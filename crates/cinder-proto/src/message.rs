//! Handshake and catalog message types.
//!
//! # Message Flow
//!
//! ```text
//! Session bring-up:
//!   Client ──ClientHello──▶ Node
//!   Client ◀──ServerHello / Rejected── Node
//!
//! Catalog:
//!   Client ──GetTable { name }──▶ Node
//!   Client ◀──Table(Some | None)── Node
//!
//!   Client ──ListTables──▶ Node
//!   Client ◀──Tables([...])── Node
//! ```
//!
//! Handshake frames always carry [`HANDSHAKE_REQUEST_ID`]. Catalog requests
//! carry a per-session request id and may be answered in any order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::ProtocolVersion;

/// Identifier correlating a reply with its request.
pub type RequestId = u64;

/// Request id reserved for the handshake exchange.
pub const HANDSHAKE_REQUEST_ID: RequestId = 0;

/// Catalog identifier of a table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TableId(u64);

impl TableId {
    /// Creates a table id from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical (schema, name) pair as it travels on the wire.
///
/// Both components are already normalized; nodes compare them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableName {
    /// Schema component.
    pub schema: String,
    /// Table component.
    pub name: String,
}

impl TableName {
    /// Creates a wire table name.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A catalog entry: table id plus canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Catalog id.
    pub id: TableId,
    /// Canonical name.
    pub name: TableName,
}

impl TableDescriptor {
    /// Creates a descriptor.
    pub fn new(id: TableId, name: TableName) -> Self {
        Self { id, name }
    }
}

/// Server capability flags announced during the handshake.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Capabilities(u64);

impl Capabilities {
    /// No optional capabilities.
    pub const NONE: Self = Self(0);
    /// The node serves catalog lookups.
    pub const CATALOG: Self = Self(1);
    /// The node may answer requests out of order.
    pub const OUT_OF_ORDER_REPLIES: Self = Self(1 << 1);

    /// Creates capabilities from raw bits.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns true if every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both flag sets.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capabilities({:#x})", self.0)
    }
}

/// Greeting sent by the client when a connection opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHello {
    /// Protocol version spoken by the client.
    pub version: ProtocolVersion,
    /// Free-form client name, used in node logs.
    pub client_name: String,
}

/// Successful handshake reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHello {
    /// Protocol version spoken by the node.
    pub version: ProtocolVersion,
    /// Session identifier assigned by the node.
    pub session_id: u64,
    /// Capability flags.
    pub capabilities: Capabilities,
    /// Name of the node that accepted the session.
    pub node_name: String,
}

/// Node's answer to a [`ClientHello`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeReply {
    /// Session accepted.
    Accepted(ServerHello),
    /// Session refused.
    Rejected {
        /// Protocol version spoken by the node.
        version: ProtocolVersion,
        /// Why the node refused.
        reason: String,
    },
}

/// Catalog request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Look up one table by canonical name.
    GetTable {
        /// Canonical name to look up.
        name: TableName,
    },
    /// List every table in the catalog.
    ListTables,
}

impl Request {
    /// Short name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::GetTable { .. } => "get-table",
            Request::ListTables => "list-tables",
        }
    }
}

/// Error codes a node can return instead of a catalog reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The request could not be understood.
    InvalidRequest,
    /// The node does not serve this request.
    Unsupported,
    /// The node failed while serving the request.
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::InvalidRequest => write!(f, "invalid_request"),
            ErrorCode::Unsupported => write!(f, "unsupported"),
            ErrorCode::Internal => write!(f, "internal"),
        }
    }
}

/// Catalog reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Reply to [`Request::GetTable`]. `None` means the table does not exist.
    Table(Option<TableDescriptor>),
    /// Reply to [`Request::ListTables`], in catalog order.
    Tables(Vec<TableDescriptor>),
    /// The request failed on the node.
    Error {
        /// Error class.
        code: ErrorCode,
        /// Human-readable detail.
        message: String,
    },
}

impl Response {
    /// Short name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Table(_) => "table",
            Response::Tables(_) => "tables",
            Response::Error { .. } => "error",
        }
    }
}

/// Everything a client writes to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Handshake greeting.
    Hello(ClientHello),
    /// Catalog request.
    Request(Request),
}

/// Everything a node writes to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Handshake reply.
    Handshake(HandshakeReply),
    /// Catalog reply.
    Response(Response),
}
