//! Network boundary of the interception layer.

use async_trait::async_trait;
use reqwest::{Client, Url};
use thiserror::Error;
use tracing::{debug, instrument};

use super::request::{InterceptedRequest, RequestMode};
use super::response::{InterceptedResponse, ResponseKind};

/// HTTP-cache behaviour requested for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheDirective {
    #[default]
    Default,
    /// Revalidate with the origin before using any intermediary copy.
    NoCache,
    /// Bypass intermediary caches entirely.
    NoStore,
}

impl CacheDirective {
    fn cache_control(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::NoCache => Some("no-cache"),
            Self::NoStore => Some("no-store"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request never produced a response (DNS, connect, reset, timeout).
    #[error("network unreachable for {url}: {message}")]
    Transport { url: String, message: String },
    #[error("http client setup failed: {0}")]
    Client(String),
}

impl FetchError {
    pub fn transport(url: &Url, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: message.into(),
        }
    }
}

/// Something that can fetch a request. Non-2xx statuses are responses, not
/// errors; only transport failures are `Err`.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(
        &self,
        request: &InterceptedRequest,
        directive: CacheDirective,
    ) -> Result<InterceptedResponse, FetchError>;
}

/// [`Network`] backed by reqwest. Redirects are followed.
#[derive(Clone, Debug)]
pub struct HttpNetwork {
    client: Client,
    origin: Url,
}

impl HttpNetwork {
    pub fn new(origin: Url) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .map_err(|err| FetchError::Client(err.to_string()))?;
        Ok(Self { client, origin })
    }

    pub fn user_agent() -> &'static str {
        concat!("inboxdesk-client/", env!("CARGO_PKG_VERSION"))
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn kind_for(&self, request: &InterceptedRequest, final_url: &Url) -> ResponseKind {
        if final_url.origin() == self.origin.origin() {
            ResponseKind::Basic
        } else if request.mode == RequestMode::NoCors {
            ResponseKind::Opaque
        } else {
            ResponseKind::Cors
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    #[instrument(skip_all, fields(url = %request.url, method = %request.method))]
    async fn fetch(
        &self,
        request: &InterceptedRequest,
        directive: CacheDirective,
    ) -> Result<InterceptedResponse, FetchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        if let Some(value) = directive.cache_control() {
            builder = builder
                .header(reqwest::header::CACHE_CONTROL, value)
                .header(reqwest::header::PRAGMA, "no-cache");
        }

        let response = builder
            .send()
            .await
            .map_err(|err| FetchError::transport(&request.url, err.to_string()))?;

        let status = response.status();
        let kind = self.kind_for(request, response.url());
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::transport(&request.url, err.to_string()))?;

        debug!(status = status.as_u16(), ?kind, "fetched");
        Ok(InterceptedResponse {
            status,
            headers,
            body,
            kind,
        })
    }
}
