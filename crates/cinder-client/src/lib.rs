//! # cinder-client
//!
//! Client library for Cinder clusters.
//!
//! The client brings up a session against one of a list of cluster
//! endpoints and resolves tables through the cluster catalog:
//!
//! - **Sessions**: [`Client::start`] tries the configured endpoints until a
//!   handshake succeeds or the deadline expires
//! - **Table discovery**: [`Tables::get_table`] and [`Tables::list_tables`]
//!   return [`Table`] handles carrying the catalog's canonical names
//! - **Two surfaces**: every operation takes either a sink (a closure invoked
//!   once with an [`OpResult`]) or returns a [`Deferred`] that can be awaited
//!   or waited on
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use cinder_client::{Client, ClientConfig};
//!
//! fn main() -> Result<(), cinder_client::ClientError> {
//!     let config = ClientConfig::new(["10.0.0.1:10800", "10.0.0.2:10800"]);
//!     let client = Client::start(config, Duration::from_secs(5))?;
//!
//!     match client.tables().get_table("pub.tbl1").wait()? {
//!         Some(table) => println!("found {} ({})", table.name(), table.id()),
//!         None => println!("no such table"),
//!     }
//!
//!     client.tables().list_tables_async(|result| match result.into_result() {
//!         Ok(tables) => println!("{} tables", tables.len()),
//!         Err(e) => eprintln!("listing failed: {e}"),
//!     });
//!     Ok(())
//! }
//! ```
//!
//! ## Async code
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use cinder_client::{Client, ClientConfig};
//!
//! async fn run() -> Result<(), cinder_client::ClientError> {
//!     let config = ClientConfig::new(["127.0.0.1:10800"]);
//!     let client = Client::start_deferred(config, Duration::from_secs(5)).await?;
//!     let tables = client.tables().list_tables().await?;
//!     for table in tables {
//!         println!("{table}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod catalog;
mod connection;
mod runtime;

/// Error types.
pub mod error;

/// Client configuration.
pub mod config;

/// Log sinks.
pub mod logging;

/// Identifier normalization.
pub mod name;

/// Result envelopes and deferred results.
pub mod result;

/// Sessions.
pub mod session;

/// Table handles.
pub mod table;

/// Table discovery.
pub mod tables;

pub use cinder_proto::{Capabilities, ProtocolVersion, TableId};
pub use config::{ClientConfig, DEFAULT_PORT};
pub use error::{ClientError, ClientResult, EndpointError, ErrorKind};
pub use logging::{LogLevel, LogSink};
pub use name::{QualifiedName, DEFAULT_SCHEMA};
pub use result::{Deferred, OpResult, Promise, Sink};
pub use session::{Client, ClientStats, SessionState};
pub use table::Table;
pub use tables::Tables;
