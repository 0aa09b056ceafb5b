//! ConnectionPool — address-keyed registry of connection sets.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::config::PoolConfig;
use crate::conn_set::ConnectionSet;
use crate::error::PoolError;
use crate::transport::Transport;

// ── Internal registry state ─────────────────────────────────────────────────

/// Registry map plus lifecycle flag, mutated together under one lock so no
/// caller can observe `closed == true` next to a registry that still gains
/// entries.
struct PoolInner<C> {
    closed: bool,
    sets:   HashMap<String, Arc<ConnectionSet<C>>>,
}

// ── ConnectionPool ──────────────────────────────────────────────────────────

/// Pool of outbound RPC connections, keyed by remote address.
///
/// The first request for an address dials a full [`ConnectionSet`]; every
/// later request reuses it. The double-checked create path guarantees that
/// the set for a given address is constructed **at most once**, no matter
/// how many tasks race to request it first.
///
/// ## Thread safety
/// The registry and the `closed` flag share one `tokio::sync::RwLock`:
/// lookups take the shared lock briefly, creation holds the exclusive lock
/// for the whole check-and-dial (racing creators for the same address wait
/// for the first one and then receive its set). Selection inside an already
/// registered set is lock-free.
///
/// ## Lifecycle
/// Construct one pool per cluster client and pass it by handle; tests build
/// isolated instances. [`ConnectionPool::shutdown`] closes every set and is
/// irreversible — afterwards all lookups fail with [`PoolError::Closed`].
pub struct ConnectionPool<T: Transport> {
    transport: T,
    config:    PoolConfig,
    inner:     RwLock<PoolInner<T::Conn>>,
}

impl<T: Transport> ConnectionPool<T> {
    // ── Construction ──────────────────────────────────────────

    /// Create an open pool over `transport`.
    ///
    /// `config.conns_per_peer` is clamped to ≥ 1 — a zero-length set would
    /// make the modulo selection meaningless.
    pub fn new(transport: T, mut config: PoolConfig) -> Self {
        config.conns_per_peer = config.conns_per_peer.max(1);
        Self {
            transport,
            config,
            inner: RwLock::new(PoolInner {
                closed: false,
                sets:   HashMap::new(),
            }),
        }
    }

    // ── Lookup ────────────────────────────────────────────────

    /// Get the connection set for `addr`, dialing it on first access.
    ///
    /// Fast path: shared lock, closed check, registry hit. Slow path
    /// (address not yet pooled): release the shared lock and go through the
    /// exclusive create path.
    pub async fn conn_set(&self, addr: &str) -> Result<Arc<ConnectionSet<T::Conn>>, PoolError> {
        {
            let inner = self.inner.read().await;
            if inner.closed {
                return Err(PoolError::Closed);
            }
            if let Some(set) = inner.sets.get(addr) {
                return Ok(Arc::clone(set));
            }
        }
        self.create_conn_set(addr).await
    }

    /// Get one connection to `addr`, round-robin across the pooled set.
    pub async fn get_connection(&self, addr: &str) -> Result<T::Conn, PoolError> {
        Ok(self.conn_set(addr).await?.next())
    }

    /// Dial and register the connection set for `addr`.
    ///
    /// Re-checks the registry under the exclusive lock: a concurrent caller
    /// may have created the entry between the fast-path miss and this call,
    /// in which case its set is returned without dialing again. The closed
    /// flag is re-checked too, so a creation racing with [`shutdown`] can
    /// never register (and leak) a set after the pool closed everything —
    /// see DESIGN.md.
    ///
    /// On dial failure nothing is registered; a later call for the same
    /// address retries construction from scratch.
    ///
    /// [`shutdown`]: ConnectionPool::shutdown
    async fn create_conn_set(&self, addr: &str) -> Result<Arc<ConnectionSet<T::Conn>>, PoolError> {
        let mut inner = self.inner.write().await;
        if inner.closed {
            return Err(PoolError::Closed);
        }
        if let Some(set) = inner.sets.get(addr) {
            return Ok(Arc::clone(set));
        }

        let set = Arc::new(
            ConnectionSet::connect(
                &self.transport,
                addr,
                self.config.conns_per_peer,
                self.config.dial_timeout,
            )
            .await?,
        );
        inner.sets.insert(addr.to_string(), Arc::clone(&set));
        info!(addr = %addr, size = set.len(), "connection set established");
        Ok(set)
    }

    // ── Shutdown ──────────────────────────────────────────────

    /// Close every pooled connection and mark the pool closed, permanently.
    ///
    /// Idempotent — the second call is a no-op. Close errors are logged by
    /// the sets, never returned. The registry entries are dropped after
    /// closing (the `closed` flag guarantees they can never be read again),
    /// so the pool stops pinning connections the moment shutdown returns.
    /// Connections already handed out are not recalled; callers still
    /// holding one must treat it as closed.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.write().await;
        if inner.closed {
            return;
        }
        inner.closed = true;
        let addrs = inner.sets.len();
        for (_, set) in inner.sets.drain() {
            set.close(&self.transport).await;
        }
        info!(addrs, "connection pool shut down");
    }

    // ── Introspection ─────────────────────────────────────────

    /// `true` once [`ConnectionPool::shutdown`] has run.
    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.closed
    }

    /// Number of addresses currently pooled.
    pub async fn len(&self) -> usize {
        self.inner.read().await.sets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sets.is_empty()
    }
}
