//! Endpoint configuration.
//!
//! All types derive Serde traits so a load-balancing client can embed
//! endpoint settings in its own config file. Every field has a default,
//! so partial configs deserialize cleanly.

use serde::{Deserialize, Serialize};

/// Configuration for a single upstream endpoint. Immutable after
/// construction.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Liveness probe path (e.g. "/ping"). `None` disables probing; the
    /// endpoint is then unconditionally healthy.
    pub probe_path: Option<String>,

    /// Liveness probe timeout in milliseconds.
    pub probe_timeout_ms: u64,

    /// Pending requests allowed before admission control rejects new
    /// non-probe work.
    pub max_pending: u32,

    /// Maximum concurrent sockets to the backend.
    pub max_sockets: usize,

    /// Default per-request timeout in milliseconds.
    pub timeout_ms: u64,

    /// How often the timeout sweep runs, in milliseconds.
    pub resolution_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            probe_path: None,
            probe_timeout_ms: 2_000,
            max_pending: 500,
            max_sockets: 20,
            timeout_ms: 60_000,
            resolution_ms: 1_000,
        }
    }
}
