//! Buffered HTTP responses and error-body mapping.

use crate::cache::CachedResponse;
use crate::errors::{CanvasError, CanvasResult};
use crate::pagination::PaginationLinks;
use bytes::Bytes;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

/// Canvas error response format.
#[derive(Debug, Deserialize)]
struct CanvasErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Option<ErrorList>,
}

/// Canvas reports errors either as a list of objects or keyed by field.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorList {
    List(Vec<ErrorEntry>),
    Keyed(serde_json::Map<String, serde_json::Value>),
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    message: Option<String>,
}

impl CanvasErrorResponse {
    fn into_message(self) -> Option<String> {
        if let Some(message) = self.message.filter(|m| !m.is_empty()) {
            return Some(message);
        }

        let messages: Vec<String> = match self.errors? {
            ErrorList::List(entries) => entries.into_iter().filter_map(|e| e.message).collect(),
            ErrorList::Keyed(map) => map
                .into_iter()
                .map(|(field, value)| format!("{}: {}", field, value))
                .collect(),
        };

        if messages.is_empty() {
            None
        } else {
            Some(messages.join("; "))
        }
    }
}

/// Fully-read response of one successful exchange, or a cache hit.
#[derive(Debug, Clone)]
pub struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    links: PaginationLinks,
    path: String,
    cached: bool,
}

impl RawResponse {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: Bytes, url: &Url) -> Self {
        let links = PaginationLinks::from_headers(&headers).resolve_against(url);
        Self {
            status,
            headers,
            body,
            links,
            path: url.path().to_string(),
            cached: false,
        }
    }

    pub(crate) fn from_cache(hit: CachedResponse, path: &str) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: hit.body,
            links: PaginationLinks {
                next: hit.next_link,
                ..Default::default()
            },
            path: path.to_string(),
            cached: true,
        }
    }

    /// Gets the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Gets the response headers. Empty for cache hits.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Gets the raw body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Gets the pagination links.
    pub fn links(&self) -> &PaginationLinks {
        &self.links
    }

    /// Returns true if the response was served from the cache.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Returns true if the body is well-formed JSON.
    pub fn is_json(&self) -> bool {
        serde_json::from_slice::<serde::de::IgnoredAny>(self.body_or_null()).is_ok()
    }

    /// Decodes the body. An empty body decodes as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> CanvasResult<T> {
        serde_json::from_slice(self.body_or_null()).map_err(|e| {
            CanvasError::deserialization(format!("Failed to parse response: {}", e))
                .with_path(self.path.clone())
        })
    }

    fn body_or_null(&self) -> &[u8] {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &self.body
        }
    }
}

/// Maps a non-2xx exchange to a typed error.
pub(crate) fn error_from_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
    path: &str,
) -> CanvasError {
    let message = serde_json::from_slice::<CanvasErrorResponse>(body)
        .ok()
        .and_then(CanvasErrorResponse::into_message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(|r| format!("HTTP {} {}", status.as_u16(), r))
                .unwrap_or_else(|| format!("HTTP {} error", status.as_u16()))
        });

    let mut error = CanvasError::from_response(status.as_u16(), message).with_path(path);

    let retry_after = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    if let Some(seconds) = retry_after {
        error = error.with_retry_after(seconds);
    }

    error
}
