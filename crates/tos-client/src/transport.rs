//! HTTP transport abstraction.
//!
//! The pipeline treats the transport as a supplied primitive: anything that
//! can turn one [`HttpRequest`] into one [`HttpResponse`] or a
//! [`TransportError`]. Per-attempt timeouts (connect and overall) belong to
//! the transport and arrive back as transport errors, never as a separate
//! code path. [`ReqwestTransport`] is the stock implementation.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};

use tos_core::TosConfig;

/// Failure below the HTTP layer: no response was produced.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established (refused, reset, DNS).
    #[error("connection failed: {0}")]
    Connect(String),

    /// The attempt exceeded a transport timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Any other transport failure.
    #[error("transport failure: {0}")]
    Other(String),
}

/// One fully built, signed request attempt.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL, query included.
    pub url: String,
    /// Headers to send, `Authorization` included.
    pub headers: Vec<(String, String)>,
    /// Buffered request body.
    pub body: Bytes,
}

/// The response to one attempt.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Buffered response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// A header value as a string, if present and valid.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// The supplied HTTP primitive: socket, TLS, and timeouts live behind it.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request and await its response.
    async fn roundtrip(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the config's connect and request timeouts.
    pub fn new(config: &TosConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (for callers that share a pool).
    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn roundtrip(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::Other(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| TransportError::Other(e.to_string()))?;
        let mut headers = HeaderMap::new();
        for (name, value) in response.headers() {
            if let (Ok(n), Ok(v)) = (
                http::HeaderName::from_bytes(name.as_str().as_bytes()),
                http::HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(n, v);
            }
        }

        let body = response.bytes().await.map_err(classify_reqwest_error)?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
