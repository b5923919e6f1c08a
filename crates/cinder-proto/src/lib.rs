//! # cinder-proto
//!
//! Wire protocol shared by the Cinder client and cluster nodes.
//!
//! The client only speaks a small subset of the cluster protocol:
//!
//! - **Handshake**: protocol-version greeting answered with a session id and
//!   server capability flags
//! - **Catalog**: `GetTable` (lookup by canonical name) and `ListTables`
//!
//! Every message travels inside a length-prefixed [`frame`] that carries the
//! request id used to correlate replies with requests.
//!
//! ## Example
//!
//! ```rust
//! use cinder_proto::{frame, ClientMessage, Request};
//!
//! let bytes = frame::encode(7, &ClientMessage::Request(Request::ListTables)).unwrap();
//! let (request_id, message): (u64, ClientMessage) = frame::decode(bytes).unwrap();
//! assert_eq!(request_id, 7);
//! assert_eq!(message, ClientMessage::Request(Request::ListTables));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;

/// Message framing.
pub mod frame;

/// Handshake and catalog messages.
pub mod message;

/// Protocol versioning.
pub mod version;

pub use error::{ProtoError, ProtoResult};
pub use message::{
    Capabilities, ClientHello, ClientMessage, ErrorCode, HandshakeReply, Request, RequestId,
    Response, ServerHello, ServerMessage, TableDescriptor, TableId, TableName,
    HANDSHAKE_REQUEST_ID,
};
pub use version::ProtocolVersion;
