//! Shared utilities for integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use http::{HeaderMap, StatusCode};
use upstream::{Transport, TransportError, TransportRequest, TransportResponse};

/// Scripted behavior for one dispatched request.
#[derive(Clone)]
#[allow(dead_code)]
pub enum Behavior {
    /// Respond with a status and body chunks, then end cleanly.
    Respond { status: u16, chunks: Vec<&'static str> },
    /// Fail dispatch with a transport error.
    Error(&'static str),
    /// Deliver the chunks, then abort mid-body.
    AbortAfter { chunks: Vec<&'static str> },
    /// Respond with a head and the chunks, then stall without ever ending.
    StallBody { chunks: Vec<&'static str> },
    /// Deliver one chunk per `gap_ms`, then end cleanly.
    DripBody { chunks: Vec<&'static str>, gap_ms: u64 },
    /// Never produce a response head.
    Hang,
}

/// In-memory transport driven by per-path behavior queues. Unscripted paths
/// get a 200 "ok" response.
pub struct FakeTransport {
    scripts: Mutex<HashMap<String, VecDeque<Behavior>>>,
    seen: Mutex<Vec<TransportRequest>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn script(&self, path: &str, behavior: Behavior) {
        self.scripts
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(behavior);
    }

    /// Every request dispatched so far, in order.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn dispatch(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        self.seen.lock().unwrap().push(request.clone());
        let behavior = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.path)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Behavior::Respond {
                status: 200,
                chunks: vec!["ok"],
            });

        match behavior {
            Behavior::Respond { status, chunks } => Ok(response(status, chunks, End::Clean)),
            Behavior::Error(message) => Err(TransportError::Failed(message.to_string())),
            Behavior::AbortAfter { chunks } => Ok(response(200, chunks, End::Abort)),
            Behavior::StallBody { chunks } => Ok(response(200, chunks, End::Stall)),
            Behavior::DripBody { chunks, gap_ms } => {
                let gap = Duration::from_millis(gap_ms);
                let body = stream::iter(chunks)
                    .then(move |chunk| async move {
                        tokio::time::sleep(gap).await;
                        Ok(Bytes::from_static(chunk.as_bytes()))
                    })
                    .boxed();
                Ok(TransportResponse {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body,
                })
            }
            Behavior::Hang => {
                futures_util::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

enum End {
    Clean,
    Abort,
    Stall,
}

fn response(status: u16, chunks: Vec<&'static str>, end: End) -> TransportResponse {
    let data = stream::iter(
        chunks
            .into_iter()
            .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes()))),
    );
    let body = match end {
        End::Clean => data.boxed(),
        End::Abort => data
            .chain(stream::iter([Err(TransportError::Aborted)]))
            .boxed(),
        End::Stall => data.chain(stream::pending()).boxed(),
    };
    TransportResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers: HeaderMap::new(),
        body,
    }
}
