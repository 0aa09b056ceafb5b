//! In-memory transport double for tests.
//!
//! [`MockTransport`] hands out [`MockConn`]s with sequential ids, counts
//! every dial and close, and can inject failures at a chosen dial or for a
//! chosen connection's close. [`DropTransport`] mirrors the production
//! transport's drop-based close and reports when connections are actually
//! released. Used by this crate's own tests; exported so downstream crates
//! can test against the pool without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::transport::Transport;

/// A fake connection. Ids are assigned in dial order, starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MockConn {
    pub id:   u64,
    pub addr: String,
}

#[derive(Default)]
struct MockState {
    /// Global 1-based dial number at which `dial` fails, if set.
    fail_on_dial: Option<u64>,
    /// Connection ids whose `close` returns an error.
    fail_close_of: Vec<u64>,
    /// Close attempts per connection id.
    closes: HashMap<u64, u64>,
    /// Artificial latency applied to every dial.
    dial_delay: Option<Duration>,
}

/// Transport double with dial counting and failure injection.
#[derive(Default)]
pub struct MockTransport {
    dials: AtomicU64,
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Failure injection ─────────────────────────────────────

    /// Make the `n`-th dial (1-based, counted across all addresses) fail.
    pub fn fail_on_dial(&self, n: u64) {
        self.state.lock().unwrap().fail_on_dial = Some(n);
    }

    /// Stop injecting dial failures.
    pub fn clear_dial_failure(&self) {
        self.state.lock().unwrap().fail_on_dial = None;
    }

    /// Make every `close` of connection `id` return an error.
    pub fn fail_close_of(&self, id: u64) {
        self.state.lock().unwrap().fail_close_of.push(id);
    }

    /// Delay every dial by `delay` — widens race windows in
    /// concurrency tests.
    pub fn set_dial_delay(&self, delay: Duration) {
        self.state.lock().unwrap().dial_delay = Some(delay);
    }

    // ── Observation ───────────────────────────────────────────

    /// Total dial attempts so far (including failed ones).
    pub fn dial_count(&self) -> u64 {
        self.dials.load(Ordering::SeqCst)
    }

    /// Close attempts recorded for connection `id`.
    pub fn close_count(&self, id: u64) -> u64 {
        self.state.lock().unwrap().closes.get(&id).copied().unwrap_or(0)
    }

    /// Total close attempts across all connections.
    pub fn total_closes(&self) -> u64 {
        self.state.lock().unwrap().closes.values().sum()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Conn = MockConn;

    async fn dial(&self, addr: &str, _timeout: Duration) -> Result<MockConn> {
        let delay = self.state.lock().unwrap().dial_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let n = self.dials.fetch_add(1, Ordering::SeqCst) + 1;
        if self.state.lock().unwrap().fail_on_dial == Some(n) {
            bail!("injected failure on dial #{n}");
        }
        Ok(MockConn {
            id:   n,
            addr: addr.to_string(),
        })
    }

    async fn close(&self, conn: MockConn) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        *state.closes.entry(conn.id).or_insert(0) += 1;
        if state.fail_close_of.contains(&conn.id) {
            bail!("injected failure closing connection #{}", conn.id);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────
// DropTransport
// ─────────────────────────────────────────────

/// Connection whose clones share one guard; the shared resource counts as
/// released only when the last clone is dropped — the same ownership model
/// as a tonic `Channel`.
#[derive(Clone)]
pub struct TrackedConn {
    _guard: Arc<ConnGuard>,
}

struct ConnGuard {
    released: Arc<AtomicU64>,
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Transport whose `close` is just a drop, like the production gRPC
/// transport — for asserting that the pool actually relinquishes its
/// connections rather than closing clones while pinning the originals.
#[derive(Default)]
pub struct DropTransport {
    released: Arc<AtomicU64>,
}

impl DropTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections whose every clone has been dropped.
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for DropTransport {
    type Conn = TrackedConn;

    async fn dial(&self, _addr: &str, _timeout: Duration) -> Result<TrackedConn> {
        Ok(TrackedConn {
            _guard: Arc::new(ConnGuard {
                released: Arc::clone(&self.released),
            }),
        })
    }

    async fn close(&self, conn: TrackedConn) -> Result<()> {
        drop(conn);
        Ok(())
    }
}
