//! ConnectionSet — fixed-size set of connections to one address.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::PoolError;
use crate::transport::Transport;

/// A fixed number of open connections to a single remote address, selected
/// round-robin by an atomic cursor.
///
/// After successful construction every slot holds a live connection, and the
/// slots only change once: closing the set drains them, handing each
/// connection to the transport by value so drop-based transports release the
/// underlying resource. Selection order comes from the atomic cursor alone;
/// the slot lock it reads through is uncontended for the set's whole open
/// life. The set is owned by its pool — it is created on first access to an
/// address and closed only by pool shutdown.
pub struct ConnectionSet<C> {
    addr:   String,
    /// Monotonically increasing selection cursor. The current slot is
    /// `cursor mod slots.len()`, so wraparound at `u32::MAX` is harmless —
    /// only the value modulo the set size matters.
    cursor: AtomicU32,
    /// Drained (emptied) by the first `close`.
    slots:  Mutex<Vec<C>>,
    closed: AtomicBool,
}

impl<C: Clone + Send + Sync + 'static> ConnectionSet<C> {
    // ── Construction ──────────────────────────────────────────

    /// Dial `size` connections to `addr` sequentially, each bounded by
    /// `dial_timeout`, with no retry.
    ///
    /// On the first dial failure the remaining dials are aborted, every
    /// connection already opened in this attempt is closed (best-effort),
    /// and the error is returned as [`PoolError::Dial`]. Nothing is leaked:
    /// either all `size` slots are live or the caller gets no set at all.
    pub(crate) async fn connect<T: Transport<Conn = C>>(
        transport: &T,
        addr: &str,
        size: usize,
        dial_timeout: Duration,
    ) -> Result<Self, PoolError> {
        let mut slots = Vec::with_capacity(size);
        for _ in 0..size {
            match transport.dial(addr, dial_timeout).await {
                Ok(conn) => slots.push(conn),
                Err(source) => {
                    debug!(addr = %addr, opened = slots.len(), "dial failed, discarding partial set");
                    for conn in slots.drain(..) {
                        if let Err(e) = transport.close(conn).await {
                            warn!(addr = %addr, error = %e, "failed to close connection");
                        }
                    }
                    return Err(PoolError::Dial {
                        addr: addr.to_string(),
                        source,
                    });
                }
            }
        }
        Ok(Self {
            addr:   addr.to_string(),
            cursor: AtomicU32::new(0),
            slots:  Mutex::new(slots),
            closed: AtomicBool::new(false),
        })
    }

    // ── Selection ─────────────────────────────────────────────

    /// Return the next connection, round-robin across the set.
    ///
    /// Safe for unbounded concurrent callers: ordering comes from a single
    /// atomic pre-increment, globally consistent across tasks, and the slot
    /// lock is only ever contended by the one `close` at shutdown.
    ///
    /// Panics if the set has already been closed — the pool stops handing
    /// out sets once it is shut down, so reaching that state means a caller
    /// kept the set past [`ConnectionPool::shutdown`].
    ///
    /// [`ConnectionPool::shutdown`]: crate::ConnectionPool::shutdown
    pub fn next(&self) -> C {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        assert!(!slots.is_empty(), "connection set for '{}' is closed", self.addr);
        let next = self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
            % slots.len() as u32;
        slots[next as usize].clone()
    }

    // ── Teardown ──────────────────────────────────────────────

    /// Close every connection in the set, best-effort.
    ///
    /// Idempotent: only the first call closes anything. The slots are
    /// drained up front and each connection is passed to the transport by
    /// value, so once the caller-held clones are gone the resource itself
    /// is released. A failed close of one connection is logged and must not
    /// prevent closing the rest.
    pub(crate) async fn close<T: Transport<Conn = C>>(&self, transport: &T) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<C> = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *slots)
        };
        let size = drained.len();
        for conn in drained {
            if let Err(e) = transport.close(conn).await {
                warn!(addr = %self.addr, error = %e, "failed to close connection");
            }
        }
        debug!(addr = %self.addr, size, "connection set closed");
    }

    // ── Accessors ─────────────────────────────────────────────

    /// The remote address this set dials.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Number of connections in the set (`0` once closed).
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` once the set has been closed by pool shutdown.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<C> std::fmt::Debug for ConnectionSet<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSet")
            .field("addr", &self.addr)
            .field("size", &self.slots.lock().unwrap_or_else(|e| e.into_inner()).len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
