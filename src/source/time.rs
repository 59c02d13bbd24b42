//! Timestamp lookups against a WorldTimeAPI-style timezone endpoint.

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use super::{fetch_json, ExternalSource, SourceError};

// == Time Source ==
/// Resolves a timezone name (e.g. `Etc/UTC`) to the current Unix time
/// as a decimal string.
#[derive(Debug, Clone)]
pub struct TimeSource {
    client: reqwest::Client,
    base_url: String,
}

impl TimeSource {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `<base>/<key>`, with each `/`-separated part of the key kept as its
    /// own path segment.
    fn url_for(&self, key: &str) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SourceError::Malformed(format!("bad base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Malformed("base url cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(key.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }
}

/// Pulls `unixtime` out of the payload. Accepts an integer or an
/// all-digit string.
pub(crate) fn unixtime_from_json(payload: &Value) -> Result<String, SourceError> {
    match payload.get("unixtime") {
        Some(Value::Number(n)) => n
            .as_i64()
            .map(|ts| ts.to_string())
            .ok_or_else(|| SourceError::Malformed(format!("unixtime is not an integer: {n}"))),
        Some(Value::String(s)) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            Ok(s.clone())
        }
        Some(other) => Err(SourceError::Malformed(format!(
            "unixtime has unexpected form: {other}"
        ))),
        None => Err(SourceError::MissingField("unixtime")),
    }
}

#[async_trait]
impl ExternalSource for TimeSource {
    async fn resolve(&self, key: &str) -> Result<String, SourceError> {
        let url = self.url_for(key)?;
        debug!(%url, "Fetching timestamp");

        let payload = fetch_json(self.client.get(url)).await?;
        unixtime_from_json(&payload)
    }
}
