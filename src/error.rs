//! Error taxonomy for per-request failures.
//!
//! Every error is terminal for its request and reported exactly once.
//! Nothing here is retried internally; resubmission to another endpoint is
//! the selection policy's job, informed by the error kind.

use thiserror::Error;

/// Terminal error for a single request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// Admission control rejected the request; no network activity occurred.
    #[error("too many pending requests {pending}/{max}")]
    Full { pending: u32, max: u32 },

    /// Socket, connect, or DNS level failure reported by the transport.
    #[error("{message}")]
    Transport { message: String },

    /// Connection torn down before the response completed, by the peer or
    /// by the timeout sweep.
    #[error("connection aborted")]
    Aborted,

    /// The retry filter rejected an otherwise successful response,
    /// optionally carrying a suggested delay (in milliseconds) before the
    /// caller resubmits elsewhere.
    #[error("rejected by retry filter")]
    Filter { delay: Option<u64> },
}

impl EndpointError {
    /// Short tag used for logging and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            EndpointError::Full { .. } => "full",
            EndpointError::Transport { .. } => "transport",
            EndpointError::Aborted => "aborted",
            EndpointError::Filter { .. } => "filter",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_error_carries_diagnostics() {
        let err = EndpointError::Full { pending: 500, max: 500 };
        assert_eq!(err.to_string(), "too many pending requests 500/500");
        assert_eq!(err.kind(), "full");
    }

    #[test]
    fn transport_error_forwards_the_message() {
        let err = EndpointError::Transport {
            message: "10.0.0.1:8080 error: connection refused".into(),
        };
        assert_eq!(err.to_string(), "10.0.0.1:8080 error: connection refused");
    }
}
