//! Replication channel tests over real TCP
//!
//! - A statement forwarded by one secondary reaches every other secondary
//!   but is not echoed back to its origin
//! - Undelimited frames get `Invalid request` and the connection stays usable
//! - CREATE/DROP through the channel are rejected and not applied
//! - The handshake accepts only `OK`/`Error..` as acknowledgments and a peer
//!   lost mid-handshake leaves the registry

mod common;

use std::time::Duration;

use common::{executor, RawSecondary, TestPrimary};
use shardrelay::protocol::{reply, Frame};
use shardrelay::sharding::AllocationPolicy;

const QUIET: Duration = Duration::from_millis(200);

async fn primary_with_orders(shards: usize, setup: Vec<String>) -> TestPrimary {
    let executor = executor(shards, AllocationPolicy::RoundRobin);
    executor.execute("CREATE DATABASE ecommerce", "").unwrap();
    executor
        .execute(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, item TEXT)",
            "ecommerce",
        )
        .unwrap();
    TestPrimary::start(executor, setup).await
}

#[tokio::test]
async fn test_forwarded_statement_reaches_other_secondaries_only() {
    let primary = primary_with_orders(0, Vec::new()).await;
    let mut a = RawSecondary::connect(primary.addr, 0).await;
    let mut b = RawSecondary::connect(primary.addr, 0).await;
    primary.wait_active(2).await;

    a.send(Frame::statement("ecommerce", "SELECT * FROM orders")).await;

    assert_eq!(
        b.recv().await,
        Frame::statement("ecommerce", "SELECT * FROM orders")
    );
    assert_eq!(a.recv().await, Frame::reply(reply::rows_affected(0)));
    assert_eq!(a.try_recv(QUIET).await, None);

    primary.shutdown().await;
}

#[tokio::test]
async fn test_write_is_applied_on_primary_before_fan_out() {
    let primary = primary_with_orders(0, Vec::new()).await;
    let mut a = RawSecondary::connect(primary.addr, 0).await;
    let mut b = RawSecondary::connect(primary.addr, 0).await;
    primary.wait_active(2).await;

    let insert = "INSERT INTO orders (item) VALUES ('lamp')";
    a.send(Frame::statement("ecommerce", insert)).await;

    assert_eq!(b.recv().await, Frame::statement("ecommerce", insert));
    assert_eq!(a.recv().await, Frame::reply(reply::rows_affected(1)));

    let rows = primary
        .coordinator
        .executor()
        .query("SELECT item FROM orders", "ecommerce", &[])
        .unwrap();
    assert_eq!(rows.rows.len(), 1);

    primary.shutdown().await;
}

#[tokio::test]
async fn test_undelimited_frame_is_invalid_request() {
    let primary = primary_with_orders(0, Vec::new()).await;
    let mut a = RawSecondary::connect(primary.addr, 0).await;
    primary.wait_active(1).await;

    a.send(Frame::reply("ecommerce")).await;
    assert_eq!(a.recv().await, Frame::reply(reply::INVALID_REQUEST));

    // still usable
    a.send(Frame::statement("ecommerce", "SELECT * FROM orders")).await;
    assert_eq!(a.recv().await, Frame::reply(reply::rows_affected(0)));

    primary.shutdown().await;
}

#[tokio::test]
async fn test_create_and_drop_are_rejected_on_the_channel() {
    let primary = primary_with_orders(0, Vec::new()).await;
    let mut a = RawSecondary::connect(primary.addr, 0).await;
    let mut b = RawSecondary::connect(primary.addr, 0).await;
    primary.wait_active(2).await;

    a.send(Frame::statement("ecommerce", "CREATE TABLE t (id INTEGER)")).await;
    assert_eq!(a.recv().await, Frame::reply(reply::MASTER_ONLY));

    a.send(Frame::statement("ecommerce", "DROP TABLE orders")).await;
    assert_eq!(a.recv().await, Frame::reply(reply::MASTER_ONLY));

    // a leading or inline comment does not disguise the verb
    a.send(Frame::statement("ecommerce", "/* x */ DROP TABLE orders")).await;
    assert_eq!(a.recv().await, Frame::reply(reply::MASTER_ONLY));
    a.send(Frame::statement("ecommerce", "drop/**/table orders")).await;
    assert_eq!(a.recv().await, Frame::reply(reply::MASTER_ONLY));

    assert_eq!(b.try_recv(QUIET).await, None);

    let tables = primary
        .coordinator
        .executor()
        .base()
        .list_tables("ecommerce")
        .unwrap();
    assert_eq!(tables, vec!["orders"]);
    assert_eq!(
        primary
            .coordinator
            .executor()
            .metrics()
            .snapshot()
            .statements_rejected,
        4
    );

    primary.shutdown().await;
}

#[tokio::test]
async fn test_backend_error_is_reported_to_origin() {
    let primary = primary_with_orders(0, Vec::new()).await;
    let mut a = RawSecondary::connect(primary.addr, 0).await;
    let mut b = RawSecondary::connect(primary.addr, 0).await;
    primary.wait_active(2).await;

    a.send(Frame::statement("nowhere", "DELETE FROM orders")).await;
    match a.recv().await {
        Frame::Reply(text) => assert!(reply::is_error(&text), "unexpected reply {}", text),
        other => panic!("unexpected frame {:?}", other),
    }

    // failed statements are not replicated
    assert_eq!(b.try_recv(QUIET).await, None);

    primary.shutdown().await;
}

#[tokio::test]
async fn test_handshake_sends_setup_commands() {
    let setup = vec![
        "CREATE DATABASE IF NOT EXISTS shard1".to_string(),
        "CREATE DATABASE IF NOT EXISTS shard2".to_string(),
    ];
    let primary = primary_with_orders(0, setup).await;

    let mut a = RawSecondary::connect(primary.addr, 0).await;
    assert_eq!(
        a.recv().await,
        Frame::Setup("CREATE DATABASE IF NOT EXISTS shard1".to_string())
    );
    a.send(Frame::reply(reply::OK)).await;
    assert_eq!(
        a.recv().await,
        Frame::Setup("CREATE DATABASE IF NOT EXISTS shard2".to_string())
    );
    a.send(Frame::reply(reply::OK)).await;

    primary.wait_active(1).await;
    primary.shutdown().await;
}

#[tokio::test]
async fn test_new_shard_assignment_is_announced() {
    let primary = primary_with_orders(2, Vec::new()).await;
    let mut a = RawSecondary::connect(primary.addr, 0).await;
    let mut b = RawSecondary::connect(primary.addr, 0).await;
    primary.wait_active(2).await;

    let insert = "INSERT INTO orders (item) VALUES ('desk')";
    a.send(Frame::statement("ecommerce", insert)).await;

    // the originator learns the assignment too, but not the statement
    assert_eq!(
        b.recv().await,
        Frame::ShardMap {
            table: "orders".to_string(),
            index: 0
        }
    );
    assert_eq!(b.recv().await, Frame::statement("ecommerce", insert));
    assert_eq!(
        a.recv().await,
        Frame::ShardMap {
            table: "orders".to_string(),
            index: 0
        }
    );
    assert_eq!(a.recv().await, Frame::reply(reply::rows_affected(1)));

    primary.shutdown().await;
}

#[tokio::test]
async fn test_disconnected_secondary_leaves_registry() {
    let primary = primary_with_orders(0, Vec::new()).await;
    let a = RawSecondary::connect(primary.addr, 0).await;
    primary.wait_active(1).await;

    drop(a);
    tokio::time::timeout(common::WAIT, async {
        while !primary.coordinator.registry().is_empty().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session was not removed");

    primary.shutdown().await;
}

#[tokio::test]
async fn test_handshake_only_accepts_setup_acknowledgments() {
    let setup = vec![
        "CREATE DATABASE IF NOT EXISTS shard1".to_string(),
        "CREATE DATABASE IF NOT EXISTS shard2".to_string(),
    ];
    let primary = primary_with_orders(0, setup).await;

    let mut a = RawSecondary::connect(primary.addr, 0).await;
    assert_eq!(
        a.recv().await,
        Frame::Setup("CREATE DATABASE IF NOT EXISTS shard1".to_string())
    );

    // undelimited junk is not an acknowledgment
    a.send(Frame::reply("ecommerce")).await;
    assert_eq!(a.recv().await, Frame::reply(reply::INVALID_REQUEST));

    a.send(Frame::reply(reply::OK)).await;
    assert_eq!(
        a.recv().await,
        Frame::Setup("CREATE DATABASE IF NOT EXISTS shard2".to_string())
    );

    primary.shutdown().await;
}

#[tokio::test]
async fn test_peer_lost_during_handshake_leaves_registry() {
    let setup = vec![
        "CREATE DATABASE IF NOT EXISTS shard1".to_string(),
        "CREATE DATABASE IF NOT EXISTS shard2".to_string(),
    ];
    let primary = primary_with_orders(0, setup).await;

    let mut a = RawSecondary::connect(primary.addr, 0).await;
    assert!(matches!(a.recv().await, Frame::Setup(_)));
    assert_eq!(primary.coordinator.registry().len().await, 1);

    drop(a);
    tokio::time::timeout(common::WAIT, async {
        while !primary.coordinator.registry().is_empty().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("half-handshaken session was not removed");
    assert!(primary.coordinator.sessions().await.is_empty());

    primary.shutdown().await;
}
