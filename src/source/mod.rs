//! External Source Module
//!
//! Fallback lookups against HTTP/JSON services, used when the cache has
//! no live value for a key.
//!
//! # Sources
//! - [`WeatherSource`]: current conditions for a city, as a summary line
//! - [`TimeSource`]: current Unix timestamp for a timezone

mod time;
mod weather;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;
use crate::protocol::ProtocolMode;

pub use time::TimeSource;
pub use weather::{WeatherReport, WeatherSource};

/// `User-Agent` sent with every outbound request.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

// == Source Error ==
/// Why a lookup could not be resolved. Callers log it and degrade to a
/// sentinel response; it never reaches the client.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("missing field {0}")]
    MissingField(&'static str),
}

// == External Source Trait ==
/// Resolves a lookup key to a value through a blocking-per-caller network call.
#[async_trait]
pub trait ExternalSource: Send + Sync {
    async fn resolve(&self, key: &str) -> Result<String, SourceError>;
}

/// Builds the HTTP client shared by the concrete sources.
pub fn http_client() -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}

/// Picks the source that matches the configured protocol mode.
pub fn from_config(config: &Config) -> Result<Arc<dyn ExternalSource>, SourceError> {
    let client = http_client()?;
    Ok(match config.mode {
        ProtocolMode::SingleValue => Arc::new(WeatherSource::new(
            client,
            &config.weather_url,
            &config.weather_api_key,
        )),
        ProtocolMode::Command => Arc::new(TimeSource::new(client, &config.time_url)),
    })
}

/// Sends a GET and decodes the JSON body, mapping non-2xx to `Status`.
pub(crate) async fn fetch_json(request: reqwest::RequestBuilder) -> Result<Value, SourceError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| SourceError::Malformed(e.to_string()))
}

/// Renders a JSON scalar as text without unit conversion:
/// strings as-is, numbers in their JSON spelling.
pub(crate) fn scalar_to_string(
    value: Option<&Value>,
    field: &'static str,
) -> Result<String, SourceError> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        _ => Err(SourceError::MissingField(field)),
    }
}
