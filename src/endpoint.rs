//! The per-backend endpoint.
//!
//! # Responsibilities
//! - Issue requests against one upstream host:port through a bounded socket pool
//! - Track in-flight work and enforce admission control
//! - Sweep open requests for staleness and force-abort stalled ones
//! - Maintain the healthy/unhealthy signal via liveness probes
//!
//! # Concurrency
//! Counters, the open-request map, and the health flag live behind a single
//! mutex taken only for short, non-awaiting critical sections. Each request
//! is driven by its own task, so per request exactly one terminal signal is
//! processed; removal from the open map makes any late signal a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use http::{header, HeaderValue};
use tokio::sync::{broadcast, oneshot, Semaphore};
use tokio::time::MissedTickBehavior;

use crate::clock::Clock;
use crate::config::EndpointConfig;
use crate::counters::Counters;
use crate::error::EndpointError;
use crate::observability::metrics;
use crate::request::{
    EndpointResponse, Encoding, FilterVerdict, RequestBody, RequestOptions, RequestRecord,
    ResponseBody, ResponseHead,
};
use crate::transport::{Transport, TransportError, TransportRequest};

/// Notifications observable by the selection policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// Fired once per confirmed health transition.
    HealthChanged { healthy: bool },
    /// Fired once per sweep-forced timeout, before the abort lands.
    RequestTimedOut { id: u32, path: String },
}

/// Point-in-time counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointStats {
    pub pending: u32,
    pub successes: u32,
    pub failures: u32,
    /// Requests observed during the last sweep interval.
    pub request_rate: u32,
}

struct Inner {
    healthy: bool,
    counters: Counters,
    open: HashMap<u32, RequestRecord>,
}

/// One upstream backend. The selection policy reads [`healthy`] and
/// [`pending`] to rank endpoints, subscribes to [`EndpointEvent`]s, and
/// calls [`request`] per outbound call.
///
/// [`healthy`]: Endpoint::healthy
/// [`pending`]: Endpoint::pending
/// [`request`]: Endpoint::request
pub struct Endpoint {
    transport: Arc<dyn Transport>,
    host: String,
    port: u16,
    name: String,
    config: EndpointConfig,
    clock: Clock,
    /// Bounds concurrent sockets to the backend.
    pool: Arc<Semaphore>,
    state: Mutex<Inner>,
    events: broadcast::Sender<EndpointEvent>,
}

impl Endpoint {
    /// Create an endpoint using the process-wide shared clock, spawn its
    /// sweep task, and fire the initial liveness probe. Must be called from
    /// within a tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        host: impl Into<String>,
        port: u16,
        config: EndpointConfig,
    ) -> Arc<Endpoint> {
        Self::with_clock(transport, host, port, config, Clock::shared())
    }

    /// Like [`Endpoint::new`] but with an explicit clock, so tests can drive
    /// timeout decisions deterministically.
    pub fn with_clock(
        transport: Arc<dyn Transport>,
        host: impl Into<String>,
        port: u16,
        config: EndpointConfig,
        clock: Clock,
    ) -> Arc<Endpoint> {
        let host = host.into();
        let name = format!("{}:{}", host, port);
        let (events, _) = broadcast::channel(64);
        let endpoint = Arc::new(Endpoint {
            transport,
            pool: Arc::new(Semaphore::new(config.max_sockets)),
            host,
            port,
            name,
            config,
            clock,
            state: Mutex::new(Inner {
                healthy: false,
                counters: Counters::default(),
                open: HashMap::new(),
            }),
            events,
        });
        endpoint.spawn_sweep();
        endpoint.probe();
        endpoint
    }

    /// "host:port".
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn healthy(&self) -> bool {
        self.state.lock().unwrap().healthy
    }

    /// Requests dispatched but not yet completed.
    pub fn pending(&self) -> u32 {
        self.state.lock().unwrap().counters.pending
    }

    /// Load signal for the selection policy; currently the pending count.
    pub fn busyness(&self) -> u32 {
        self.pending()
    }

    /// Requests observed during the last sweep interval. Normalize by the
    /// configured resolution for a per-second rate.
    pub fn request_rate(&self) -> u32 {
        self.state.lock().unwrap().counters.request_rate
    }

    pub fn open_requests(&self) -> usize {
        self.state.lock().unwrap().open.len()
    }

    pub fn stats(&self) -> EndpointStats {
        let inner = self.state.lock().unwrap();
        EndpointStats {
            pending: inner.counters.pending,
            successes: inner.counters.successes,
            failures: inner.counters.failures,
            request_rate: inner.counters.request_rate,
        }
    }

    /// Subscribe to health transitions and forced timeouts.
    pub fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
        self.events.subscribe()
    }

    /// Issue a request. Resolves with the assembled response or a terminal
    /// [`EndpointError`], exactly once per request.
    ///
    /// Admission control rejects non-probe work once `max_pending` requests
    /// are open; rejected calls return [`EndpointError::Full`] without any
    /// network activity.
    pub async fn request(
        self: &Arc<Self>,
        mut options: RequestOptions,
    ) -> Result<EndpointResponse, EndpointError> {
        let is_probe = self.config.probe_path.as_deref() == Some(options.path.as_str());
        let timeout_ms = options.timeout_ms.unwrap_or(self.config.timeout_ms);

        // Byte length, not character count; multi-byte text bodies would
        // otherwise truncate at the server.
        if let Some(body) = &options.body {
            options
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(body.content_length()));
        }

        let (result_tx, result_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = oneshot::channel();
        let last_touched = Arc::new(AtomicU64::new(self.clock.now_millis()));

        let id = {
            let mut inner = self.state.lock().unwrap();
            inner
                .counters
                .check_admission(is_probe, self.config.max_pending)?;
            let id = inner.counters.next_id();
            inner.open.insert(
                id,
                RequestRecord {
                    id,
                    path: options.path.clone(),
                    timeout_ms,
                    last_touched: last_touched.clone(),
                    abort: Some(abort_tx),
                    result: result_tx,
                },
            );
            metrics::record_pending(&self.name, inner.counters.pending);
            id
        };

        tracing::debug!(
            endpoint = %self.name,
            id,
            method = %options.method,
            path = %options.path,
            "dispatching request"
        );

        let this = self.clone();
        tokio::spawn(async move {
            this.drive(id, options, last_touched, abort_rx).await;
        });

        match result_rx.await {
            Ok(result) => result,
            // Completion always resolves the channel; losing the sender
            // without a value means the driver task was torn down.
            Err(_) => Err(EndpointError::Aborted),
        }
    }

    /// Run one request to its terminal signal: dispatch, stream the body,
    /// and race everything against a sweep-forced abort.
    async fn drive(
        self: Arc<Self>,
        id: u32,
        options: RequestOptions,
        last_touched: Arc<AtomicU64>,
        abort_rx: oneshot::Receiver<()>,
    ) {
        let transport_request = TransportRequest {
            host: self.host.clone(),
            port: self.port,
            method: options.method.clone(),
            path: options.path.clone(),
            headers: options.headers.clone(),
            body: options.body.clone().map(RequestBody::into_bytes),
        };
        let transport = self.transport.clone();
        let pool = self.pool.clone();
        let bypass_pool = options.bypass_pool;

        let work = async {
            // Permit held until the body finishes, bounding concurrent
            // sockets per backend.
            let _permit = if bypass_pool {
                None
            } else {
                Some(pool.acquire().await.map_err(|_| {
                    TransportError::Failed("connection pool closed".to_string())
                })?)
            };

            let response = transport.dispatch(transport_request).await?;
            let head = ResponseHead {
                status: response.status,
                headers: response.headers,
            };
            let mut body = response.body;
            let mut chunks: Vec<Bytes> = Vec::new();
            while let Some(item) = body.next().await {
                let chunk = item?;
                // A slow-but-active transfer is not stalled; refresh so the
                // sweep leaves it alone.
                last_touched.store(self.clock.now_millis(), Ordering::Relaxed);
                chunks.push(chunk);
            }
            Ok::<(ResponseHead, Vec<Bytes>), TransportError>((head, chunks))
        };

        let outcome = tokio::select! {
            _ = abort_rx => Err(TransportError::Aborted),
            result = work => result,
        };

        match outcome {
            Ok((head, chunks)) => self.finish_response(id, &options, head, chunks),
            Err(TransportError::Aborted) => {
                if self.complete(id, Err(EndpointError::Aborted)) {
                    metrics::record_completion(&self.name, "aborted");
                    self.set_healthy(false);
                }
            }
            Err(TransportError::Failed(message)) => {
                let message = format!("{} error: {}", self.name, message);
                tracing::warn!(endpoint = %self.name, id, error = %message, "transport error");
                if self.complete(id, Err(EndpointError::Transport { message })) {
                    metrics::record_completion(&self.name, "transport_error");
                    self.set_healthy(false);
                }
            }
        }
    }

    /// End-of-response handling: assemble, decode, run the retry filter,
    /// and settle as success or filter failure.
    fn finish_response(
        self: &Arc<Self>,
        id: u32,
        options: &RequestOptions,
        head: ResponseHead,
        chunks: Vec<Bytes>,
    ) {
        // A raced abort may have completed this request already.
        if !self.state.lock().unwrap().open.contains_key(&id) {
            return;
        }
        self.set_healthy(true);

        let total = chunks.iter().map(Bytes::len).sum();
        let mut assembled = BytesMut::with_capacity(total);
        for chunk in &chunks {
            assembled.extend_from_slice(chunk);
        }
        let raw = assembled.freeze();

        let body = match options.encoding {
            Encoding::Utf8 => ResponseBody::Text(String::from_utf8_lossy(&raw).into_owned()),
            Encoding::Raw => ResponseBody::Raw(raw),
        };

        let verdict = match &options.retry_filter {
            Some(filter) => filter(options, &head, &body),
            None => FilterVerdict::Accept,
        };

        match verdict {
            FilterVerdict::Accept => {
                let response = EndpointResponse {
                    status: head.status,
                    headers: head.headers,
                    body,
                };
                if self.complete(id, Ok(response)) {
                    metrics::record_completion(&self.name, "success");
                }
            }
            FilterVerdict::Reject { delay } => {
                tracing::debug!(endpoint = %self.name, id, "response rejected by retry filter");
                if self.complete(id, Err(EndpointError::Filter { delay })) {
                    metrics::record_completion(&self.name, "filter_rejected");
                }
            }
        }
    }

    /// Remove the record, settle the counters, and resolve the caller.
    /// Returns false when the request already completed through another
    /// path; callers must then treat their signal as a no-op.
    fn complete(&self, id: u32, result: Result<EndpointResponse, EndpointError>) -> bool {
        let (record, pending) = {
            let mut inner = self.state.lock().unwrap();
            let Some(record) = inner.open.remove(&id) else {
                return false;
            };
            match &result {
                Ok(_) => inner.counters.record_success(),
                Err(_) => inner.counters.record_failure(),
            }
            (record, inner.counters.pending)
        };
        metrics::record_pending(&self.name, pending);
        // The caller may have stopped listening; bookkeeping stands either way.
        let _ = record.result.send(result);
        true
    }

    /// Flip the health flag. Transitioning to unhealthy initiates a probe
    /// first; the probe outcome, not this call, is what may flip the flag
    /// back later.
    fn set_healthy(self: &Arc<Self>, new_state: bool) {
        {
            let mut inner = self.state.lock().unwrap();
            if inner.healthy == new_state {
                return;
            }
            inner.healthy = new_state;
        }
        metrics::record_health(&self.name, new_state);
        if new_state {
            tracing::info!(endpoint = %self.name, "endpoint healthy");
            let _ = self.events.send(EndpointEvent::HealthChanged { healthy: true });
        } else {
            tracing::warn!(endpoint = %self.name, "endpoint unhealthy");
            self.probe();
            // Without a probe path the probe re-enters synchronously and
            // the endpoint is already healthy again here.
            if !self.state.lock().unwrap().healthy {
                let _ = self.events.send(EndpointEvent::HealthChanged { healthy: false });
            }
        }
    }

    /// Issue a liveness probe through the ordinary request path. With no
    /// probe path configured the endpoint is unconditionally healthy.
    fn probe(self: &Arc<Self>) {
        let Some(path) = self.config.probe_path.clone() else {
            self.set_healthy(true);
            return;
        };
        let this = self.clone();
        let timeout_ms = self.config.probe_timeout_ms;
        tokio::spawn(async move {
            let options = RequestOptions::get(path).with_timeout(timeout_ms);
            let ok = match this.request(options).await {
                Ok(response) => response.status.is_success(),
                Err(_) => false,
            };
            this.set_healthy(ok);
        });
    }

    fn spawn_sweep(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let resolution = Duration::from_millis(self.config.resolution_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(resolution);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the immediate first tick would sweep an empty map
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(endpoint) = weak.upgrade() else { break };
                endpoint.sweep();
            }
        });
    }

    /// One sweep pass: force-abort stale requests, re-probe while
    /// unhealthy, then sample the request rate.
    fn sweep(self: &Arc<Self>) {
        let now = self.clock.now_millis();
        let mut expired: Vec<(u32, String, oneshot::Sender<()>)> = Vec::new();
        let unhealthy;
        {
            let mut inner = self.state.lock().unwrap();
            for record in inner.open.values_mut() {
                let last = record.last_touched.load(Ordering::Relaxed);
                if now.saturating_sub(record.timeout_ms) >= last {
                    if let Some(abort) = record.abort.take() {
                        expired.push((record.id, record.path.clone(), abort));
                    }
                }
            }
            unhealthy = !inner.healthy;
            inner.counters.sample_rate();
        }

        for (id, path, abort) in expired {
            tracing::warn!(endpoint = %self.name, id, path = %path, "request timed out, aborting");
            metrics::record_timeout(&self.name);
            let _ = self.events.send(EndpointEvent::RequestTimedOut { id, path });
            // Routed through the ordinary aborted path, so the caller sees
            // the same error whether the sweep or the peer killed it.
            let _ = abort.send(());
        }

        if unhealthy {
            self.probe();
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.state.lock().unwrap();
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("healthy", &inner.healthy)
            .field("pending", &inner.counters.pending)
            .field("open_requests", &inner.open.len())
            .finish()
    }
}
