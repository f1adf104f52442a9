//! Transport seam between the endpoint core and the wire.
//!
//! The core never touches sockets. Per dispatched request the transport
//! reports exactly one of:
//! - a response head followed by data chunks and a clean stream end
//! - an error (connect, DNS, socket failure)
//! - an abort (connection torn down before completion)
//!
//! The chunk stream encodes the last two as `Err` items; a clean end of
//! stream is the end-of-response signal. At most one terminal signal occurs
//! per request.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

mod http_client;

pub use http_client::HttpTransport;

/// Wire-level failure for a single dispatch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Socket, connect, or DNS level failure; the message passes through to
    /// the caller.
    #[error("{0}")]
    Failed(String),

    /// Connection torn down before the response completed.
    #[error("connection aborted")]
    Aborted,
}

/// Response body chunks in arrival order, terminated by a clean end or an
/// `Err` item.
pub type ChunkStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// A request handed to the transport. Host and port are filled in by the
/// owning endpoint from its identity.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub host: String,
    pub port: u16,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Response head plus the chunk stream.
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ChunkStream,
}

/// The wire. Implementations open connections and stream responses back;
/// dropping the returned stream releases the underlying connection.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn dispatch(&self, request: TransportRequest)
        -> Result<TransportResponse, TransportError>;
}
