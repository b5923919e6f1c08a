//! Error types for the client library.

use std::fmt;
use std::time::Duration;

use cinder_proto::{ErrorCode, ProtoError, ProtocolVersion};
use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A table identifier could not be parsed.
    #[error("invalid identifier {input:?}: {reason}")]
    InvalidIdentifier {
        /// The identifier as supplied by the caller.
        input: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A request could not be encoded, e.g. a name too long for one frame.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A startup or per-request deadline expired.
    #[error(
        "{operation} timed out after {}ms{}",
        .elapsed.as_millis(),
        describe_attempts(.attempts)
    )]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// How long the operation ran.
        elapsed: Duration,
        /// Last error observed per endpoint, when connecting.
        attempts: Vec<EndpointError>,
    },

    /// The node speaks a protocol version this client cannot use.
    #[error("protocol incompatible (client {client}, server {server}): {reason}")]
    ProtocolIncompatible {
        /// Version spoken by this client.
        client: ProtocolVersion,
        /// Version spoken by the node.
        server: ProtocolVersion,
        /// Detail reported by the node or the client.
        reason: String,
    },

    /// The session is closing or closed.
    #[error("session closed")]
    SessionClosed,

    /// The connection to the node failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A reply could not be decoded or violates the protocol.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// The node answered with an error.
    #[error("server error ({code}): {message}")]
    Server {
        /// Error class reported by the node.
        code: ErrorCode,
        /// Detail reported by the node.
        message: String,
    },

    /// API misuse, such as reading the value of a failed result.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Coarse classification of [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed identifier or configuration.
    InvalidArgument,
    /// A deadline expired.
    Timeout,
    /// Handshake version mismatch.
    ProtocolIncompatible,
    /// Operation on a closing or closed session.
    SessionClosed,
    /// Underlying IO failure.
    Transport,
    /// Undecodable or inconsistent reply.
    MalformedReply,
    /// The node reported a failure.
    Server,
    /// Programming error.
    InvalidState,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidArgument => write!(f, "invalid-argument"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::ProtocolIncompatible => write!(f, "protocol-incompatible"),
            ErrorKind::SessionClosed => write!(f, "session-closed"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::MalformedReply => write!(f, "malformed-reply"),
            ErrorKind::Server => write!(f, "server"),
            ErrorKind::InvalidState => write!(f, "invalid-state"),
        }
    }
}

impl ClientError {
    /// Returns the error's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::InvalidIdentifier { .. }
            | ClientError::InvalidConfig(_)
            | ClientError::InvalidRequest(_) => ErrorKind::InvalidArgument,
            ClientError::Timeout { .. } => ErrorKind::Timeout,
            ClientError::ProtocolIncompatible { .. } => ErrorKind::ProtocolIncompatible,
            ClientError::SessionClosed => ErrorKind::SessionClosed,
            ClientError::Transport(_) | ClientError::Io(_) => ErrorKind::Transport,
            ClientError::MalformedReply(_) => ErrorKind::MalformedReply,
            ClientError::Server { .. } => ErrorKind::Server,
            ClientError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }

    /// Creates an identifier error.
    pub(crate) fn invalid_identifier(input: &str, reason: impl Into<String>) -> Self {
        ClientError::InvalidIdentifier {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout error without per-endpoint context.
    pub(crate) fn timeout(operation: &'static str, elapsed: Duration) -> Self {
        ClientError::Timeout {
            operation,
            elapsed,
            attempts: Vec::new(),
        }
    }

    /// Returns true for errors worth trying the next endpoint on.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transport | ErrorKind::Timeout | ErrorKind::MalformedReply
        )
    }
}

impl From<ProtoError> for ClientError {
    fn from(err: ProtoError) -> Self {
        match err {
            ProtoError::Io(e) => ClientError::Io(e),
            ProtoError::SerializationFailed(msg) => ClientError::Transport(msg),
            ProtoError::TruncatedFrame(_) => ClientError::Transport(err.to_string()),
            ProtoError::DeserializationFailed(_)
            | ProtoError::InvalidMagic(_)
            | ProtoError::FrameTooLarge(_) => ClientError::MalformedReply(err.to_string()),
        }
    }
}

/// The last failure observed while connecting to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointError {
    /// The endpoint, as configured.
    pub endpoint: String,
    /// What went wrong.
    pub error: String,
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.endpoint, self.error)
    }
}

fn describe_attempts(attempts: &[EndpointError]) -> String {
    if attempts.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = attempts.iter().map(ToString::to_string).collect();
    format!(" (last errors: {})", parts.join("; "))
}
