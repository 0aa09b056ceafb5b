//! Integration tests for the connection pool.
//!
//! All tests run against [`MockTransport`] — no network involved. They
//! exercise the pool's concurrency contracts: at-most-one construction per
//! address, round-robin fairness, partial-dial cleanup, idempotent
//! shutdown, and post-shutdown rejection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agora_rpc::testing::{DropTransport, MockTransport};
use agora_rpc::{ConnectionPool, PoolConfig, PoolError};
use tokio::sync::Barrier;

fn test_pool(
    conns_per_peer: usize,
) -> (Arc<MockTransport>, Arc<ConnectionPool<Arc<MockTransport>>>) {
    let transport = Arc::new(MockTransport::new());
    let config = PoolConfig {
        conns_per_peer,
        dial_timeout: Duration::from_secs(2),
    };
    let pool = Arc::new(ConnectionPool::new(Arc::clone(&transport), config));
    (transport, pool)
}

// ══════════════════════════════════════════════════════════════════════════════
// At-most-one construction
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_first_accessors_dial_exactly_once() {
    const TASKS: usize = 32;
    let (transport, pool) = test_pool(4);

    let barrier = Arc::new(Barrier::new(TASKS));
    let mut handles = Vec::with_capacity(TASKS);
    for _ in 0..TASKS {
        let pool = Arc::clone(&pool);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            pool.conn_set("node-0:6660").await.unwrap()
        }));
    }

    let mut sets = Vec::with_capacity(TASKS);
    for handle in handles {
        sets.push(handle.await.unwrap());
    }

    // One dial sequence for the address, and every caller got the same set.
    assert_eq!(transport.dial_count(), 4);
    assert!(sets.iter().all(|s| Arc::ptr_eq(s, &sets[0])));
    assert_eq!(pool.len().await, 1);
}

// ══════════════════════════════════════════════════════════════════════════════
// Round-robin selection
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn selection_cycles_the_constructed_connections() {
    let (_transport, pool) = test_pool(3);

    // Connections are dialed in order, so ids 1..=3 occupy slots 0..=2.
    // Pre-increment cursor: slots 1, 2, 0, 1 → ids 2, 3, 1, 2.
    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(pool.get_connection("node-0:6660").await.unwrap().id);
    }
    assert_eq!(ids, vec![2, 3, 1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_selection_is_uniform() {
    const K: usize = 4; // set size
    const M: u64 = 25; // expected picks per connection
    let (_transport, pool) = test_pool(K);

    let set = pool.conn_set("node-0:6660").await.unwrap();

    let barrier = Arc::new(Barrier::new(K * M as usize));
    let mut handles = Vec::new();
    for _ in 0..K * M as usize {
        let set = Arc::clone(&set);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            set.next().id
        }));
    }

    let mut picks: HashMap<u64, u64> = HashMap::new();
    for handle in handles {
        *picks.entry(handle.await.unwrap()).or_insert(0) += 1;
    }

    // A true atomic cursor loses no updates: each slot is picked exactly M
    // times over M*K calls.
    assert_eq!(picks.len(), K);
    for (id, count) in picks {
        assert_eq!(count, M, "connection {id} picked {count} times");
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Dial failure
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn failed_dial_registers_nothing_and_a_later_call_retries() {
    let (transport, pool) = test_pool(10);
    transport.fail_on_dial(3);

    let err = pool.conn_set("node-0:6660").await.unwrap_err();
    assert!(matches!(err, PoolError::Dial { .. }));

    // Dialing aborted at the 3rd connection, the two already opened were
    // closed, and nothing was registered.
    assert_eq!(transport.dial_count(), 3);
    assert_eq!(transport.close_count(1), 1);
    assert_eq!(transport.close_count(2), 1);
    assert_eq!(pool.len().await, 0);

    // The next request for the same address starts over and succeeds.
    transport.clear_dial_failure();
    let set = pool.conn_set("node-0:6660").await.unwrap();
    assert_eq!(set.len(), 10);
    assert_eq!(transport.dial_count(), 13);
}

// ══════════════════════════════════════════════════════════════════════════════
// Shutdown
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn shutdown_closes_every_connection_exactly_once() {
    let (transport, pool) = test_pool(3);
    pool.conn_set("node-0:6660").await.unwrap();
    pool.conn_set("node-1:6660").await.unwrap();

    pool.shutdown().await;
    pool.shutdown().await; // idempotent — must not double-close

    assert!(pool.is_closed().await);
    assert_eq!(transport.total_closes(), 6);
    for id in 1..=6 {
        assert_eq!(transport.close_count(id), 1);
    }
}

#[tokio::test]
async fn lookups_fail_after_shutdown_for_seen_and_unseen_addresses() {
    let (transport, pool) = test_pool(2);
    pool.conn_set("node-0:6660").await.unwrap();

    pool.shutdown().await;

    assert!(matches!(
        pool.conn_set("node-0:6660").await.unwrap_err(),
        PoolError::Closed
    ));
    assert!(matches!(
        pool.get_connection("node-9:6660").await.unwrap_err(),
        PoolError::Closed
    ));
    // The never-seen address was not dialed.
    assert_eq!(transport.dial_count(), 2);
}

#[tokio::test]
async fn shutdown_releases_the_underlying_connections() {
    let transport = Arc::new(DropTransport::new());
    let config = PoolConfig {
        conns_per_peer: 3,
        dial_timeout: Duration::from_secs(2),
    };
    let pool = ConnectionPool::new(Arc::clone(&transport), config);

    let set = pool.conn_set("node-0:6660").await.unwrap();
    assert_eq!(transport.released(), 0);

    // The transport closes by dropping, like the gRPC one. Shutdown must
    // drain both the registry and the set's slots, so the connections are
    // actually released — even while a caller still holds the set.
    pool.shutdown().await;
    assert_eq!(transport.released(), 3);
    assert!(set.is_closed());
    assert_eq!(set.len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn creation_racing_shutdown_leaks_no_connection() {
    const TASKS: usize = 16;
    let (transport, pool) = test_pool(2);
    transport.set_dial_delay(Duration::from_millis(2));

    let mut handles = Vec::with_capacity(TASKS);
    for i in 0..TASKS {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            pool.conn_set(&format!("node-{i}:6660")).await
        }));
    }

    // Let some creations get past the fast path before pulling the plug.
    tokio::time::sleep(Duration::from_millis(5)).await;
    pool.shutdown().await;

    let mut created = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(PoolError::Closed) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(created + rejected, TASKS);

    // A creation that lost the race to shutdown must be rejected by the
    // re-check under the exclusive lock, not registered afterwards: every
    // connection that was dialed got closed, and the registry gained
    // nothing after the pool closed.
    let dialed = transport.dial_count();
    assert_eq!(transport.total_closes(), dialed);
    for id in 1..=dialed {
        assert_eq!(transport.close_count(id), 1, "connection {id} leaked");
    }
    assert!(pool.is_closed().await);
    assert_eq!(pool.len().await, 0);
}

#[tokio::test]
async fn one_failing_close_does_not_stop_shutdown() {
    let (transport, pool) = test_pool(3);
    pool.conn_set("node-0:6660").await.unwrap();

    transport.fail_close_of(1);
    pool.shutdown().await;

    assert_eq!(transport.close_count(2), 1);
    assert_eq!(transport.close_count(3), 1);
}

// ══════════════════════════════════════════════════════════════════════════════
// Multiple addresses
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn each_address_gets_its_own_set() {
    let (transport, pool) = test_pool(2);

    let a = pool.conn_set("node-0:6660").await.unwrap();
    let b = pool.conn_set("node-1:6660").await.unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(a.addr(), "node-0:6660");
    assert_eq!(b.addr(), "node-1:6660");
    assert_eq!(pool.len().await, 2);
    assert_eq!(transport.dial_count(), 4);

    // Connections come back from the right set.
    let conn = pool.get_connection("node-1:6660").await.unwrap();
    assert_eq!(conn.addr, "node-1:6660");
}

// ══════════════════════════════════════════════════════════════════════════════
// Configuration hardening
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn zero_conns_per_peer_is_clamped_at_construction() {
    // A directly-built config can bypass `PoolConfig::from_env`'s clamp;
    // the pool itself must still refuse a zero-length set.
    let (transport, pool) = test_pool(0);

    let conn = pool.get_connection("node-0:6660").await.unwrap();
    assert_eq!(conn.id, 1);
    assert_eq!(transport.dial_count(), 1);
    assert_eq!(pool.conn_set("node-0:6660").await.unwrap().len(), 1);
}
