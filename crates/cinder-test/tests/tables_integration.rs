//! Table discovery against an in-process cluster.
//!
//! These tests drive both surfaces of the tables facade (sink and deferred)
//! through a real TCP session to a test node.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use cinder_client::{Client, ClientError, ErrorKind, OpResult, SessionState, Table};
use cinder_test::{NodeOptions, TestCatalog, TestCluster, TestNode};

const START_DEADLINE: Duration = Duration::from_secs(5);
const RECV_TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Helper to start a one-node cluster and a connected client.
fn start_cluster_and_connect() -> (TestCluster, Client) {
    init_tracing();
    let cluster = TestCluster::start(1).expect("failed to start cluster");
    let client = Client::start(cluster.client_config(), START_DEADLINE).expect("failed to connect");
    (cluster, client)
}

/// Runs a sink-form operation and returns what the sink received.
fn via_sink<T, F>(op: F) -> OpResult<T>
where
    T: Send + 'static,
    F: FnOnce(Box<dyn FnOnce(OpResult<T>) + Send>),
{
    let (tx, rx) = mpsc::channel();
    op(Box::new(move |result| {
        tx.send(result).expect("receiver gone");
    }));
    rx.recv_timeout(RECV_TIMEOUT).expect("sink was not invoked")
}

fn names(tables: &[Table]) -> Vec<String> {
    let mut names: Vec<String> = tables.iter().map(|t| t.name().to_string()).collect();
    names.sort();
    names
}

#[test]
fn test_lookup_existing_table() {
    let (_cluster, client) = start_cluster_and_connect();

    let table = client
        .tables()
        .get_table("PUB.tbl1")
        .wait()
        .unwrap()
        .expect("table should exist");
    assert_eq!(table.name(), "PUB.TBL1");
    assert_eq!(table.schema(), "PUB");
    assert_eq!(table.table_name(), "TBL1");
}

#[test]
fn test_lookup_missing_table_is_absent() {
    let (_cluster, client) = start_cluster_and_connect();

    let table = client.tables().get_table("PUB.NOPE").wait().unwrap();
    assert!(table.is_none());

    let result = via_sink(|sink| client.tables().get_table_async("PUB.NOPE", sink));
    assert!(result.has_value());
    assert!(result.value().unwrap().is_none());
}

#[test]
fn test_list_contains_created_tables() {
    let (cluster, client) = start_cluster_and_connect();
    cluster.catalog().create_table("SALES", "Q1");
    cluster.catalog().create_table("Mixed", "lower case");

    let tables = client.tables().list_tables().wait().unwrap();
    let names = names(&tables);
    assert!(names.contains(&"PUB.TBL1".to_string()));
    assert!(names.contains(&"SALES.Q1".to_string()));
    assert!(names.contains(&"Mixed.lower case".to_string()));
    assert_eq!(tables.len(), 3);
}

#[test]
fn test_invalid_identifier_sends_nothing() {
    let (cluster, client) = start_cluster_and_connect();

    let err = client.tables().get_table("PUB..bad").wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let result = via_sink(|sink| client.tables().get_table_async("PUB..bad", sink));
    assert_eq!(result.error().unwrap().kind(), ErrorKind::InvalidArgument);

    let result = via_sink(|sink| client.tables().get_table_async("", sink));
    assert_eq!(result.error().unwrap().kind(), ErrorKind::InvalidArgument);

    assert_eq!(cluster.requests_served(), 0);
}

#[test]
fn test_name_too_long_for_a_frame_is_invalid_argument() {
    let (cluster, client) = start_cluster_and_connect();

    let name = format!("PUB.{}", "A".repeat(17 * 1024 * 1024));
    let err = client.tables().get_table(&name).wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(cluster.requests_served(), 0);
    assert_eq!(client.state(), SessionState::Ready);
    assert!(client.tables().get_table("PUB.TBL1").wait().unwrap().is_some());
}

#[test]
fn test_surfaces_agree() {
    let (cluster, client) = start_cluster_and_connect();
    cluster.catalog().create_table("PUB", "ORDERS");
    let tables = client.tables();

    for name in ["PUB.TBL1", "pub.orders", "PUB.NOPE", "orders", "a.b.c", "PUB.\"tbl1\""] {
        let deferred = tables.get_table(name).wait();
        let sink = via_sink(|sink| tables.get_table_async(name, sink)).into_result();
        match (deferred, sink) {
            (Ok(a), Ok(b)) => assert_eq!(a, b, "{name}"),
            (Err(a), Err(b)) => assert_eq!(a.kind(), b.kind(), "{name}"),
            (a, b) => panic!("surfaces disagree for {name}: {a:?} vs {b:?}"),
        }
    }

    let deferred = tables.list_tables().wait().unwrap();
    let sink = via_sink(|sink| tables.list_tables_async(sink)).value().unwrap();
    assert_eq!(names(&deferred), names(&sink));
}

#[test]
fn test_lookup_agrees_with_list() {
    let (cluster, client) = start_cluster_and_connect();
    cluster.catalog().create_table("Sales", "q1");
    cluster.catalog().create_table("PUB", "a.b");
    cluster.catalog().create_table("PUB", "say \"hi\"");

    let tables = client.tables().list_tables().wait().unwrap();
    assert_eq!(tables.len(), 4);

    for table in &tables {
        let found = client
            .tables()
            .get_table(&table.qualified_name().quoted())
            .wait()
            .unwrap();
        assert_eq!(found.as_ref(), Some(table), "lookup of {}", table.name());
    }
}

#[test]
fn test_canonical_names_round_trip() {
    let (_cluster, client) = start_cluster_and_connect();

    for input in ["pub.tbl1", "PUB.TBL1", "Pub.Tbl1", "\"PUB\".\"TBL1\"", "  pub.tbl1  "] {
        let table = client.tables().get_table(input).wait().unwrap().unwrap();
        assert_eq!(table.name(), "PUB.TBL1", "{input}");

        let again = client.tables().get_table(table.name()).wait().unwrap();
        assert_eq!(again, Some(table));
    }
}

#[test]
fn test_quoted_names_keep_case() {
    let (cluster, client) = start_cluster_and_connect();
    cluster.catalog().create_table("PUB", "tbl1");

    let lower = client.tables().get_table("PUB.\"tbl1\"").wait().unwrap().unwrap();
    let upper = client.tables().get_table("PUB.tbl1").wait().unwrap().unwrap();
    assert_eq!(lower.name(), "PUB.tbl1");
    assert_eq!(upper.name(), "PUB.TBL1");
    assert_ne!(lower.id(), upper.id());
}

#[test]
fn test_default_schema_from_config() {
    init_tracing();
    let cluster = TestCluster::start(1).unwrap();
    let config = cluster.client_config().default_schema("pub");
    let client = Client::start(config, START_DEADLINE).unwrap();

    let table = client.tables().get_table("tbl1").wait().unwrap().unwrap();
    assert_eq!(table.name(), "PUB.TBL1");
}

#[test]
fn test_nested_operations_from_sink() {
    let (_cluster, client) = start_cluster_and_connect();
    let tables = client.tables();
    let (tx, rx) = mpsc::channel();

    let inner_tables = tables.clone();
    tables.list_tables_async(move |result| {
        let listed = result.value().unwrap();
        for table in listed {
            let tx = tx.clone();
            let name = table.name().to_string();
            inner_tables.get_table_async(&name, move |found| {
                tx.send((table, found.into_result())).unwrap();
            });
        }
    });

    let (listed, found) = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(found.unwrap(), Some(listed));
}

#[test]
fn test_blocking_wait_inside_sink_is_refused() {
    let (_cluster, client) = start_cluster_and_connect();
    let tables = client.tables();
    let (tx, rx) = mpsc::channel();

    let inner_tables = tables.clone();
    tables.list_tables_async(move |_| {
        let nested = inner_tables.get_table("PUB.TBL1").wait();
        tx.send(nested.map(|_| ())).unwrap();
    });

    let err = rx.recv_timeout(RECV_TIMEOUT).unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_malformed_reply() {
    let (cluster, client) = start_cluster_and_connect();

    cluster.node(0).set_corrupt_replies(true);
    let err = client.tables().get_table("PUB.TBL1").wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedReply);

    // Only the affected request fails; the session stays usable.
    cluster.node(0).set_corrupt_replies(false);
    assert!(client.tables().get_table("PUB.TBL1").wait().unwrap().is_some());
    assert_eq!(client.state(), SessionState::Ready);
}

#[test]
fn test_server_error_reply() {
    let (cluster, client) = start_cluster_and_connect();

    cluster.node(0).set_fail_requests(true);
    let err = client.tables().list_tables().wait().unwrap_err();
    assert!(matches!(err, ClientError::Server { .. }));
    assert_eq!(err.kind(), ErrorKind::Server);

    let stats = client.stats();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.failed_requests, 1);
}

#[test]
fn test_operations_after_close() {
    let (cluster, client) = start_cluster_and_connect();

    client.close();
    client.close();
    assert_eq!(client.state(), SessionState::Closed);

    let err = client.tables().get_table("PUB.TBL1").wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionClosed);

    let result = via_sink(|sink| client.tables().list_tables_async(sink));
    assert_eq!(result.error().unwrap().kind(), ErrorKind::SessionClosed);
    assert_eq!(cluster.requests_served(), 0);
}

#[test]
fn test_close_completes_in_flight_operations() {
    let (cluster, client) = start_cluster_and_connect();
    cluster.node(0).set_reply_delay(Duration::from_secs(3));

    let pending: Vec<_> = (0..16).map(|_| client.tables().list_tables()).collect();
    std::thread::sleep(Duration::from_millis(100));
    assert!(client.stats().in_flight > 0);
    client.close();

    for deferred in pending {
        let err = deferred.wait_timeout(RECV_TIMEOUT).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionClosed);
    }
}

#[test]
fn test_client_dropped_inside_sink() {
    let (_cluster, client) = start_cluster_and_connect();
    let tables = client.tables();
    let (tx, rx) = mpsc::channel();

    tables.get_table_async("PUB.TBL1", move |result| {
        // The last handles go away on a client IO thread.
        drop(client);
        tx.send(result.into_result().map(|t| t.is_some())).unwrap();
    });
    drop(tables);

    assert!(rx.recv_timeout(RECV_TIMEOUT).unwrap().unwrap());
}

#[test]
fn test_stats_count_resolved_tables() {
    let (_cluster, client) = start_cluster_and_connect();

    client.tables().get_table("PUB.TBL1").wait().unwrap();
    client.tables().get_table("PUB.NOPE").wait().unwrap();
    client.tables().list_tables().wait().unwrap();

    let stats = client.stats();
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.failed_requests, 0);
    assert_eq!(stats.tables_resolved, 2);
    assert_eq!(stats.in_flight, 0);
}

#[test]
fn test_dropped_table_disappears() {
    let catalog = Arc::new(TestCatalog::new());
    catalog.create_table("PUB", "TEMP");
    let node = TestNode::start_with(NodeOptions::default(), Arc::clone(&catalog)).unwrap();
    let config = cinder_client::ClientConfig::new([node.endpoint()]);
    let client = Client::start(config, START_DEADLINE).unwrap();

    assert!(client.tables().get_table("pub.temp").wait().unwrap().is_some());
    assert!(catalog.drop_table("PUB", "TEMP"));
    assert!(client.tables().get_table("pub.temp").wait().unwrap().is_none());
    assert!(client.tables().list_tables().wait().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_await_deferred_operations() {
    init_tracing();
    let cluster = TestCluster::start(1).unwrap();
    let client = Client::start_deferred(cluster.client_config(), START_DEADLINE)
        .await
        .unwrap();

    let table = client.tables().get_table("pub.tbl1").await.unwrap();
    assert_eq!(table.map(|t| t.name().to_string()), Some("PUB.TBL1".to_string()));

    let tables = client.tables().list_tables().await.unwrap();
    assert_eq!(tables.len(), 1);
}
