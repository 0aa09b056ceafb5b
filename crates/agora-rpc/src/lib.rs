//! # agora-rpc
//!
//! Pooled outbound RPC connections for AgoraDB inter-node communication:
//!
//! - [`ConnectionSet`] — fixed-size set of connections to one address,
//!   selected round-robin by an atomic cursor
//! - [`ConnectionPool`] — address-keyed registry of sets with lazy,
//!   race-free per-address creation and an irreversible shutdown
//! - [`Transport`] — seam to the wire ([`GrpcTransport`] dials tonic
//!   channels; [`testing::MockTransport`] dials nothing)
//!
//! ## Design principles
//!
//! - **At most one dial sequence per address**: creation is double-checked
//!   under the registry's exclusive lock, so racing first-accessors never
//!   dial twice.
//! - **Cheap selection**: once a set exists, selection order comes from a
//!   single atomic cursor; the slot lock it reads through is contended only
//!   by the one close at shutdown.
//! - **Fail once, caller decides**: a failed dial abandons the whole set
//!   (closing anything partially opened) and propagates; nothing is retried
//!   or health-checked here.
//!
//! ## Usage
//! ```rust,ignore
//! use agora_rpc::{ConnectionPool, GrpcTransport, PoolConfig};
//!
//! let pool = ConnectionPool::new(GrpcTransport, PoolConfig::from_env());
//! let channel = pool.get_connection("10.0.1.42:6660").await?;
//! // ... issue RPCs over `channel` ...
//! pool.shutdown().await;
//! ```

pub mod config;
pub mod conn_set;
pub mod error;
pub mod pool;
pub mod testing;
pub mod transport;

pub use config::PoolConfig;
pub use conn_set::ConnectionSet;
pub use error::PoolError;
pub use pool::ConnectionPool;
pub use transport::{GrpcTransport, Transport};
