//! Error types for the RPC connection pool.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool has been shut down. Terminal — there is no reopen.
    #[error("connection pool is closed")]
    Closed,

    /// Dialing one of the per-address connections failed. The whole
    /// connection set for that address is abandoned; a later call for the
    /// same address retries construction from scratch.
    #[error("failed to dial '{addr}': {source}")]
    Dial {
        addr: String,
        #[source]
        source: anyhow::Error,
    },
}
