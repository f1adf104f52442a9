//! Request options, response types, and the retry-filter seam.

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tokio::sync::oneshot;

use crate::error::EndpointError;

/// Request body payload. Text is measured by encoded byte length when the
/// content-length header is derived, never by character count.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Text(String),
    Bytes(Bytes),
}

impl RequestBody {
    /// Byte length on the wire.
    pub fn content_length(&self) -> usize {
        match self {
            RequestBody::Text(s) => s.len(),
            RequestBody::Bytes(b) => b.len(),
        }
    }

    pub(crate) fn into_bytes(self) -> Bytes {
        match self {
            RequestBody::Text(s) => Bytes::from(s),
            RequestBody::Bytes(b) => b,
        }
    }
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Text(s)
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::Text(s.to_string())
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

/// Response body decode mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Decode the assembled body as UTF-8 text (lossy).
    #[default]
    Utf8,
    /// Hand back the raw assembled bytes.
    Raw,
}

/// Assembled response body, decoded per the requested [`Encoding`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Text(String),
    Raw(Bytes),
}

impl ResponseBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(s) => Some(s),
            ResponseBody::Raw(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ResponseBody::Text(s) => s.as_bytes(),
            ResponseBody::Raw(b) => b,
        }
    }
}

/// Response metadata handed to the retry filter alongside the decoded body.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// A completed response.
#[derive(Debug, Clone)]
pub struct EndpointResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

/// Verdict of a retry filter inspecting a completed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// The response is good; report success.
    Accept,
    /// Treat the response as a failure, optionally suggesting how long the
    /// caller should wait before resubmitting elsewhere. A zero delay is
    /// still a rejection.
    Reject { delay: Option<u64> },
}

/// Caller-supplied predicate deciding whether an otherwise-successful
/// response should instead be treated as a failure.
pub type RetryFilter =
    Arc<dyn Fn(&RequestOptions, &ResponseHead, &ResponseBody) -> FilterVerdict + Send + Sync>;

/// Options for a single request. Host and port come from the endpoint;
/// unset fields default from its configuration at dispatch time.
#[derive(Clone)]
pub struct RequestOptions {
    pub path: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    /// Overrides the endpoint's default timeout when set (milliseconds).
    pub timeout_ms: Option<u64>,
    /// Absent means accept every response.
    pub retry_filter: Option<RetryFilter>,
    pub encoding: Encoding,
    /// Skip the endpoint's socket pool bound for this request.
    pub bypass_pool: bool,
}

impl RequestOptions {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            headers: HeaderMap::new(),
            body: None,
            timeout_ms: None,
            retry_filter: None,
            encoding: Encoding::default(),
            bypass_pool: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retry_filter(mut self, filter: RetryFilter) -> Self {
        self.retry_filter = Some(filter);
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn bypassing_pool(mut self) -> Self {
        self.bypass_pool = true;
        self
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("path", &self.path)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("timeout_ms", &self.timeout_ms)
            .field("has_retry_filter", &self.retry_filter.is_some())
            .field("encoding", &self.encoding)
            .field("bypass_pool", &self.bypass_pool)
            .finish()
    }
}

/// Per-request state tracked while a request is open. Owned exclusively by
/// the endpoint that created it; removal from the open map is the
/// idempotence guard, so a record is never revived.
pub(crate) struct RequestRecord {
    pub id: u32,
    pub path: String,
    /// Effective timeout for this request, milliseconds.
    pub timeout_ms: u64,
    /// Refreshed on every inbound chunk; shared with the driver task so the
    /// sweep sees activity without taking extra locks.
    pub last_touched: Arc<AtomicU64>,
    /// Signals the driver task to force-abort. Single use; taken by the
    /// sweep.
    pub abort: Option<oneshot::Sender<()>>,
    /// Resolves the caller's future. Consumed exactly once, on completion.
    pub result: oneshot::Sender<Result<EndpointResponse, EndpointError>>,
}
