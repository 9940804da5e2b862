use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::event::DestinationKey;

pub const USER_AGENT: &str = concat!("libhoney-rust/", env!("CARGO_PKG_VERSION"));
pub const TEAM_HEADER: &str = "X-Honeycomb-Team";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("connection failed: {0}")]
    Connection(String),
}

/// Sends one encoded batch and reports the HTTP status.
///
/// A non-2xx status is not an error at this level; retry decisions are
/// made by the caller.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: &BatchRequest,
    ) -> impl Future<Output = Result<StatusCode, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    async fn send(&self, request: &BatchRequest) -> Result<StatusCode, TransportError> {
        (**self).send(request).await
    }
}

/// A fully built batch POST, reusable across retries.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub url: Url,
    pub write_key: String,
    pub dataset: String,
    pub event_count: usize,
    pub body: Bytes,
}

impl BatchRequest {
    pub fn new(destination: &DestinationKey, body: Bytes, event_count: usize) -> Self {
        let mut url = destination.api_host.clone();
        url.set_path(&format!("/1/batch/{}", destination.dataset));
        Self {
            url,
            write_key: destination.write_key.clone(),
            dataset: destination.dataset.clone(),
            event_count,
            body,
        }
    }

    pub fn headers(&self) -> [(&'static str, &str); 3] {
        [
            (TEAM_HEADER, self.write_key.as_str()),
            ("Content-Type", "application/json"),
            ("User-Agent", USER_AGENT),
        ]
    }
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        // Already installed is fine; any provider works for the client.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &BatchRequest) -> Result<StatusCode, TransportError> {
        let mut req = self.client.post(request.url.clone());
        for (k, v) in request.headers() {
            req = req.header(k, v);
        }
        let resp = req
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    TransportError::Connection(e.to_string())
                } else {
                    TransportError::Http(e)
                }
            })?;
        Ok(resp.status())
    }
}
