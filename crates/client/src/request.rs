//! Intercepted requests and the responses handed back to the page.

use bytes::Bytes;
use folio_core::{CacheEntry, Error};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::fetch::canonicalize;

/// Body of the placeholder returned when nothing better is available.
pub const OFFLINE_BODY: &str = "Offline - Content not available";

/// A request issued by a page and seen by the worker.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub method: Method,
    /// Canonical URL (fragment removed, host lowercased).
    pub url: Url,
    pub headers: HeaderMap,
}

impl WorkerRequest {
    /// Build a request, canonicalizing the URL.
    pub fn new(method: Method, url: &str) -> Result<Self, Error> {
        let url = canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self { method, url, headers: HeaderMap::new() })
    }

    /// Shorthand for a `GET` request.
    pub fn get(url: &str) -> Result<Self, Error> {
        Self::new(Method::GET, url)
    }

    /// Parse a method name such as `"post"`.
    pub fn with_method_name(method: &str, url: &str) -> Result<Self, Error> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {method:?}: {e}")))?;
        Self::new(method, url)
    }

    /// Add a header, rejecting names or values that are not valid HTTP.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid header name {name:?}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::InvalidInput(format!("invalid value for header {name}")))?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Only retrieval requests are ever answered from or written to a partition.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    Synthetic,
}

/// A response returned across the interception boundary.
#[derive(Debug, Clone)]
pub struct WorkerResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl WorkerResponse {
    /// The service-unavailable placeholder.
    pub fn offline() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers,
            body: Bytes::from_static(OFFLINE_BODY.as_bytes()),
            source: ResponseSource::Synthetic,
        }
    }

    /// True for 2xx statuses, the only ones worth caching.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Rebuild a response from a stored entry.
    pub fn from_entry(entry: CacheEntry) -> Result<Self, Error> {
        let status = StatusCode::from_u16(entry.status)
            .map_err(|_| Error::CorruptEntry(format!("status {} for {}", entry.status, entry.url)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &entry.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::debug!(url = %entry.url, header = %name, "skipping unrepresentable stored header"),
            }
        }

        Ok(Self { status, headers, body: Bytes::from(entry.body), source: ResponseSource::Cache })
    }

    /// Convert into a storable entry for `url`.
    pub fn to_entry(&self, url: &Url) -> CacheEntry {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        CacheEntry::new(url.as_str(), self.status.as_u16(), headers, self.body.to_vec())
    }
}
