//! Transport seam between the pool and the wire.
//!
//! The pool never dials or closes anything itself — it delegates to a
//! [`Transport`], which keeps the pool testable without a network and keeps
//! the gRPC stack swappable. [`GrpcTransport`] is the production
//! implementation, backed by a tonic [`Channel`].

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};

// ─────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────

/// Dial/close operations required of the underlying RPC transport.
///
/// Connections are handed out by value, so `Conn` must be cheaply cloneable
/// (tonic's `Channel` is an `Arc` around the real connection; clones share it).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Conn: Clone + Send + Sync + 'static;

    /// Establish one connection to `addr`, bounded by `timeout`. No retry.
    async fn dial(&self, addr: &str, timeout: Duration) -> Result<Self::Conn>;

    /// Close a connection. Errors are reported by the pool via `tracing`,
    /// never propagated to callers.
    async fn close(&self, conn: Self::Conn) -> Result<()>;
}

// A pool owns its transport by value; sharing one transport between a pool
// and other code (tests, metrics) goes through `Arc`.
#[async_trait]
impl<T: Transport> Transport for std::sync::Arc<T> {
    type Conn = T::Conn;

    async fn dial(&self, addr: &str, timeout: Duration) -> Result<Self::Conn> {
        (**self).dial(addr, timeout).await
    }

    async fn close(&self, conn: Self::Conn) -> Result<()> {
        (**self).close(conn).await
    }
}

// ─────────────────────────────────────────────
// GrpcTransport
// ─────────────────────────────────────────────

/// gRPC transport backed by tonic.
///
/// Addresses are `host:port` (the form stored in cluster membership); a
/// missing scheme is normalized to `http://` before dialing.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcTransport;

#[async_trait]
impl Transport for GrpcTransport {
    type Conn = Channel;

    async fn dial(&self, addr: &str, timeout: Duration) -> Result<Channel> {
        let endpoint = Endpoint::from_shared(endpoint_uri(addr))?.connect_timeout(timeout);
        // connect_timeout only bounds the TCP handshake — bound the whole
        // dial the way the original context deadline did.
        let channel = tokio::time::timeout(timeout, endpoint.connect())
            .await
            .map_err(|_| anyhow::anyhow!("dial timed out after {timeout:?}"))??;
        Ok(channel)
    }

    async fn close(&self, conn: Channel) -> Result<()> {
        // tonic channels close on drop; there is no explicit shutdown call.
        drop(conn);
        Ok(())
    }
}

/// Normalize a cluster address to a dialable URI.
fn endpoint_uri(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    }
}
