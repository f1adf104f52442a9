//! HTTP transport over hyper's pooled legacy client.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use http::{Request, Uri};
use http_body_util::{BodyStream, Full};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use super::{Transport, TransportError, TransportRequest, TransportResponse};

/// HTTP/1.1 transport. One client instance carries its own keep-alive pool;
/// endpoints bound concurrency separately, so sharing a transport between
/// endpoints is fine.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn dispatch(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let uri: Uri = format!("http://{}:{}{}", request.host, request.port, request.path)
            .parse()
            .map_err(|e: http::uri::InvalidUri| TransportError::Failed(e.to_string()))?;

        let mut builder = Request::builder().method(request.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in request.headers.iter() {
                headers.insert(name.clone(), value.clone());
            }
        }
        let req = builder
            .body(Full::new(request.body.unwrap_or_else(Bytes::new)))
            .map_err(|e| TransportError::Failed(e.to_string()))?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let chunks = BodyStream::new(body).filter_map(|frame| async move {
            match frame {
                Ok(frame) => frame.into_data().ok().map(Ok),
                Err(e) if e.is_incomplete_message() => Some(Err(TransportError::Aborted)),
                Err(e) => Some(Err(TransportError::Failed(e.to_string()))),
            }
        });

        Ok(TransportResponse {
            status: parts.status,
            headers: parts.headers,
            body: chunks.boxed(),
        })
    }
}
