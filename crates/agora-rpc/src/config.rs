//! Pool configuration loaded from environment variables.
//!
//! All settings have production-safe defaults. Override any variable at
//! container / process startup — no config file required.
//!
//! | Variable                   | Default | Description                            |
//! |----------------------------|---------|----------------------------------------|
//! | `AGORA_RPC_CONNS_PER_PEER` | `10`    | Connections dialed per remote address  |
//! | `AGORA_RPC_DIAL_TIMEOUT_MS`| `2000`  | Per-connection dial timeout (ms)       |

use std::time::Duration;

/// Runtime configuration for a [`ConnectionPool`](crate::ConnectionPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of connections dialed per remote address. Always ≥ 1.
    pub conns_per_peer: usize,

    /// Timeout applied to each individual dial.
    pub dial_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            conns_per_peer: 10,
            dial_timeout:   Duration::from_secs(2),
        }
    }
}

impl PoolConfig {
    /// Load configuration from environment variables, applying defaults where
    /// a variable is absent or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            conns_per_peer: env_parse("AGORA_RPC_CONNS_PER_PEER", defaults.conns_per_peer).max(1),
            dial_timeout:   Duration::from_millis(env_parse(
                "AGORA_RPC_DIAL_TIMEOUT_MS",
                defaults.dial_timeout.as_millis() as u64,
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
