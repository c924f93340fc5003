//! Responses produced by the network or served from client storage.

use bytes::Bytes;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Visibility of a response to the requesting page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Same-origin, fully readable.
    Basic,
    /// Cross-origin with CORS, readable.
    Cors,
    /// Cross-origin without CORS; status and body are not inspectable.
    Opaque,
    /// Built locally rather than fetched.
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub kind: ResponseKind,
}

impl InterceptedResponse {
    pub fn new(status: StatusCode, kind: ResponseKind, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            kind,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Empty-bodied 404, returned when an icon cannot be fetched.
    pub fn empty_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, ResponseKind::Synthesized, Bytes::new())
    }

    /// 503 with a plain text reason, returned when nothing else is available.
    pub fn offline(reason: &str) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ResponseKind::Synthesized,
            Bytes::copy_from_slice(reason.as_bytes()),
        )
        .with_header("content-type", "text/plain; charset=utf-8")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn is_opaque(&self) -> bool {
        self.kind == ResponseKind::Opaque
    }

    pub fn is_synthesized(&self) -> bool {
        self.kind == ResponseKind::Synthesized
    }
}
