//! HTTP validators for responses built from cached values.
//!
//! Browser and intermediary caches see the same lifetime the compute cache
//! uses internally: `max-age` is the remaining TTL of the entry, `ETag` and
//! `Last-Modified` describe the stored value, and a conditional request can
//! short-circuit to `304 Not Modified`.

use std::time::Duration;

use axum::{
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED},
    },
    response::{IntoResponse, Response},
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use time::{
    OffsetDateTime, PrimitiveDateTime, format_description::BorrowedFormatItem, macros::format_description,
};
use tracing::warn;

use super::read_through::CacheRead;

const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Format a timestamp as an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn format_http_date(at: OffsetDateTime) -> Option<String> {
    at.to_offset(time::UtcOffset::UTC).format(HTTP_DATE).ok()
}

/// Parse an IMF-fixdate header value.
pub fn parse_http_date(raw: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(raw.trim(), HTTP_DATE)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// Strong validator over the serialized representation.
pub fn entity_tag(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    format!("\"{}\"", hex::encode(&digest[..16]))
}

/// Validators and freshness for one cached representation.
#[derive(Debug, Clone)]
pub struct Validators {
    pub etag: String,
    pub last_modified: OffsetDateTime,
    pub max_age: Duration,
}

impl Validators {
    /// Build validators for `body`, produced at `stored_at` and cached for `ttl`.
    pub fn new(body: &[u8], stored_at: OffsetDateTime, ttl: Duration, now: OffsetDateTime) -> Self {
        let age = (now - stored_at).max(time::Duration::ZERO);
        let age = Duration::try_from(age).unwrap_or(Duration::ZERO);
        Self {
            etag: entity_tag(body),
            last_modified: stored_at.replace_nanosecond(0).unwrap_or(stored_at),
            max_age: ttl.saturating_sub(age),
        }
    }

    /// Decide whether the request's conditionals allow a 304.
    ///
    /// `If-None-Match` takes precedence. Otherwise `If-Modified-Since` must be
    /// no older than `freshness_window` and not earlier than the stored value.
    pub fn not_modified(
        &self,
        request: &HeaderMap,
        now: OffsetDateTime,
        freshness_window: Duration,
    ) -> bool {
        if let Some(candidates) = request.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
            return candidates
                .split(',')
                .map(str::trim)
                .any(|candidate| candidate == "*" || weak_eq(candidate, &self.etag));
        }

        let Some(since) = request
            .get(IF_MODIFIED_SINCE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date)
        else {
            return false;
        };

        let elapsed = now - since;
        if elapsed.is_negative() || elapsed > freshness_window {
            return false;
        }
        self.last_modified <= since
    }

    fn apply(&self, headers: &mut HeaderMap) {
        let cache_control = format!("private, max-age={}", self.max_age.as_secs());
        if let Ok(value) = HeaderValue::from_str(&cache_control) {
            headers.insert(CACHE_CONTROL, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.etag) {
            headers.insert(ETAG, value);
        }
        if let Some(value) = format_http_date(self.last_modified)
            .and_then(|date| HeaderValue::from_str(&date).ok())
        {
            headers.insert(LAST_MODIFIED, value);
        }
    }
}

fn weak_eq(candidate: &str, etag: &str) -> bool {
    candidate.strip_prefix("W/").unwrap_or(candidate) == etag
}

/// Render a cached value as JSON with validators, or a bare 304.
pub fn cached_json_response<T: Serialize>(
    read: &CacheRead<T>,
    request: &HeaderMap,
    ttl: Duration,
    freshness_window: Duration,
) -> Response {
    let body = match serde_json::to_vec(read.value()) {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, "cached value could not be serialized");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let now = OffsetDateTime::now_utc();
    let validators = Validators::new(&body, read.stored_at(), ttl, now);

    let mut response = if validators.not_modified(request, now, freshness_window) {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        (
            [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            body,
        )
            .into_response()
    };
    validators.apply(response.headers_mut());
    response
}
