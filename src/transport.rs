//! HTTP transport to the Docker engine API
//!
//! The client only needs one operation from its transport: POST a path
//! with query parameters and headers, hand back the status and a body
//! stream. [`HttpTransport`] does that over reqwest; tests substitute
//! in-memory transports.

use crate::error::Result;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Query parameters in send order.
pub type Query = Vec<(String, String)>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `path` with an empty body.
    ///
    /// Any status code the server answers with is `Ok`; only failures to
    /// get an answer at all are errors.
    async fn post(&self, path: &str, query: &Query, headers: HeaderMap) -> Result<ServerResponse>;
}

#[derive(Debug)]
pub struct ServerResponse {
    pub status: StatusCode,
    pub body: ResponseBody,
}

impl ServerResponse {
    pub fn new(status: StatusCode, body: ResponseBody) -> Self {
        Self { status, body }
    }
}

/// Streaming response body. Dropping it closes the underlying connection
/// stream.
pub struct ResponseBody {
    inner: BoxStream<'static, io::Result<Bytes>>,
}

impl ResponseBody {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    pub fn empty() -> Self {
        Self::new(stream::empty())
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::new(stream::once(async move { Ok(data) }))
    }

    /// Read the whole body into memory.
    pub async fn into_bytes(mut self) -> io::Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.inner.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Read at most `limit` bytes and close the body. Errors are ignored;
    /// this only runs on bodies nobody will look at.
    pub async fn discard(mut self, limit: usize) {
        let mut read = 0;
        while read < limit {
            match self.inner.next().await {
                Some(Ok(chunk)) => read += chunk.len(),
                _ => break,
            }
        }
    }
}

impl Stream for ResponseBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody").finish_non_exhaustive()
    }
}

/// reqwest-backed transport talking to an engine over TCP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    api_version: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: Url) -> Result<Self> {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: Url) -> HttpTransportBuilder {
        HttpTransportBuilder::new(base_url)
    }

    /// Full request URL for an API path, version prefix included.
    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let base_path = self.base_url.path().trim_end_matches('/');
        let full_path = match &self.api_version {
            Some(version) => format!("{}/v{}{}", base_path, version, path),
            None => format!("{}{}", base_path, path),
        };
        url.set_path(&full_path);
        url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, path: &str, query: &Query, headers: HeaderMap) -> Result<ServerResponse> {
        let url = self.endpoint(path);
        debug!(%url, "POST");

        let response = self
            .client
            .post(url)
            .query(query)
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "engine responded");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other));
        Ok(ServerResponse::new(status, ResponseBody::new(body)))
    }
}

pub struct HttpTransportBuilder {
    base_url: Url,
    api_version: Option<String>,
    timeout: Option<Duration>,
}

impl HttpTransportBuilder {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_version: None,
            timeout: None,
        }
    }

    pub fn with_api_version(mut self, version: Option<String>) -> Self {
        self.api_version = version;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HttpTransport> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(HttpTransport {
            client,
            base_url: self.base_url,
            api_version: self.api_version,
        })
    }
}
