//! # cinder-test
//!
//! In-process cluster nodes for testing the Cinder client.
//!
//! This crate contains:
//! - [`TestNode`]: a node speaking the client protocol, with fault injection
//! - [`TestCluster`]: several nodes sharing one [`TestCatalog`]
//! - Integration tests under `tests/`

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Shared in-memory catalog.
pub mod catalog;

/// Test clusters.
pub mod cluster;

/// Test nodes.
pub mod node;

pub use catalog::TestCatalog;
pub use cluster::{refused_endpoint, TestCluster};
pub use node::{NodeOptions, TestNode};
