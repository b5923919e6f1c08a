//! Multi-node test clusters sharing one catalog.

use std::sync::Arc;
use std::time::Duration;

use cinder_client::ClientConfig;

use crate::catalog::TestCatalog;
use crate::node::{NodeOptions, TestNode};

/// A set of test nodes serving the same catalog.
#[derive(Debug)]
pub struct TestCluster {
    catalog: Arc<TestCatalog>,
    nodes: Vec<TestNode>,
}

impl TestCluster {
    /// Starts `size` nodes with default options. The catalog holds
    /// `PUB.TBL1`.
    pub fn start(size: usize) -> anyhow::Result<Self> {
        Self::start_with(size, |_| NodeOptions::default())
    }

    /// Starts `size` nodes, building each node's options from its index.
    pub fn start_with(
        size: usize,
        options: impl Fn(usize) -> NodeOptions,
    ) -> anyhow::Result<Self> {
        let catalog = Arc::new(TestCatalog::new());
        catalog.create_table("PUB", "TBL1");

        let nodes = (0..size)
            .map(|index| {
                let options = options(index).node_name(format!("node-{index}"));
                TestNode::start_with(options, Arc::clone(&catalog))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self { catalog, nodes })
    }

    /// The shared catalog.
    pub fn catalog(&self) -> &Arc<TestCatalog> {
        &self.catalog
    }

    /// Node at `index`.
    pub fn node(&self, index: usize) -> &TestNode {
        &self.nodes[index]
    }

    /// Mutable node at `index`.
    pub fn node_mut(&mut self, index: usize) -> &mut TestNode {
        &mut self.nodes[index]
    }

    /// Endpoints of every node, in start order.
    pub fn endpoints(&self) -> Vec<String> {
        self.nodes.iter().map(TestNode::endpoint).collect()
    }

    /// Catalog requests answered across all nodes.
    pub fn requests_served(&self) -> u64 {
        self.nodes.iter().map(TestNode::requests_served).sum()
    }

    /// A client configuration pointing at every node, with short timeouts.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.endpoints())
            .connect_timeout(Duration::from_secs(2))
            .operation_timeout(Duration::from_secs(5))
            .reconnect_delay(Duration::from_millis(20))
    }
}

/// Returns an endpoint that refuses connections.
///
/// The port was bound and released, so nothing is listening on it.
pub fn refused_endpoint() -> anyhow::Result<String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let endpoint = listener.local_addr()?.to_string();
    drop(listener);
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nodes_share_catalog() {
        let cluster = TestCluster::start(2).unwrap();
        assert_eq!(cluster.endpoints().len(), 2);
        cluster.catalog().create_table("PUB", "EXTRA");
        assert_eq!(cluster.node(0).catalog().len(), 2);
        assert_eq!(cluster.node(1).catalog().len(), 2);
    }
}
