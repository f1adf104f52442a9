//! Per-backend endpoint core for an HTTP load-balancing client.
//!
//! An [`Endpoint`] wraps one upstream host:port: it issues requests through
//! a bounded socket pool, tracks in-flight work with overflow-safe counters,
//! force-aborts stalled transfers via a periodic sweep, and maintains a
//! healthy/unhealthy signal driven by liveness probes. A selection policy
//! layered on top ranks endpoints by [`Endpoint::healthy`] and
//! [`Endpoint::pending`] and handles resubmission after failures; nothing
//! here retries internally.

pub mod clock;
pub mod config;
mod counters;
pub mod endpoint;
pub mod error;
mod observability;
pub mod request;
pub mod transport;

pub use clock::Clock;
pub use config::EndpointConfig;
pub use endpoint::{Endpoint, EndpointEvent, EndpointStats};
pub use error::EndpointError;
pub use request::{
    Encoding, EndpointResponse, FilterVerdict, RequestBody, RequestOptions, ResponseBody,
    ResponseHead, RetryFilter,
};
pub use transport::{
    ChunkStream, HttpTransport, Transport, TransportError, TransportRequest, TransportResponse,
};
