//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;

use crate::error::{Result, ServerError};
use crate::protocol::ProtocolMode;

/// TTL applied in command mode when `CACHE_TTL` is not set.
pub const DEFAULT_COMMAND_TTL: u64 = 10;

pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_TIME_URL: &str = "https://worldtimeapi.org/api/timezone";
pub const DEFAULT_LOOKUP_KEY: &str = "Etc/UTC";

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port the server listens on
    pub server_port: u16,
    /// Request grammar spoken by this server instance
    pub mode: ProtocolMode,
    /// Cache TTL in seconds, None = entries never expire
    pub cache_ttl: Option<u64>,
    /// Fixed key handed to the external source in command mode
    pub lookup_key: String,
    /// Endpoint for weather lookups (single-value mode)
    pub weather_url: String,
    /// API key appended to weather lookups
    pub weather_api_key: String,
    /// Endpoint for timestamp lookups (command mode)
    pub time_url: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - TCP port (default: 3000)
    /// - `PROTOCOL_MODE` - `command` or `single` (default: command)
    /// - `CACHE_TTL` - TTL in seconds, `0` disables expiry
    ///   (default: 10 in command mode, disabled in single mode)
    /// - `LOOKUP_KEY` - fixed source key for command mode (default: Etc/UTC)
    /// - `WEATHER_URL`, `WEATHER_API_KEY`, `TIME_URL` - source endpoints
    pub fn from_env() -> Result<Self> {
        let server_port = match env::var("SERVER_PORT") {
            Ok(raw) => parse_port(&raw)?,
            Err(_) => 3000,
        };

        let mode = match env::var("PROTOCOL_MODE") {
            Ok(raw) => raw.parse()?,
            Err(_) => ProtocolMode::Command,
        };

        let cache_ttl = match env::var("CACHE_TTL") {
            Ok(raw) => parse_ttl(&raw)?,
            Err(_) => default_ttl_for(mode),
        };

        Ok(Self {
            server_port,
            mode,
            cache_ttl,
            lookup_key: env::var("LOOKUP_KEY").unwrap_or_else(|_| DEFAULT_LOOKUP_KEY.to_string()),
            weather_url: env::var("WEATHER_URL")
                .unwrap_or_else(|_| DEFAULT_WEATHER_URL.to_string()),
            weather_api_key: env::var("WEATHER_API_KEY").unwrap_or_default(),
            time_url: env::var("TIME_URL").unwrap_or_else(|_| DEFAULT_TIME_URL.to_string()),
        })
    }

    /// Returns a copy of this config speaking `mode`, with that mode's default TTL.
    pub fn with_mode(mut self, mode: ProtocolMode) -> Self {
        self.mode = mode;
        self.cache_ttl = default_ttl_for(mode);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            mode: ProtocolMode::Command,
            cache_ttl: Some(DEFAULT_COMMAND_TTL),
            lookup_key: DEFAULT_LOOKUP_KEY.to_string(),
            weather_url: DEFAULT_WEATHER_URL.to_string(),
            weather_api_key: String::new(),
            time_url: DEFAULT_TIME_URL.to_string(),
        }
    }
}

/// Parses a user supplied port number.
///
/// Port 0 is rejected here even though the OS would accept it: callers
/// asking for a port expect to know which one they got.
pub fn parse_port(raw: &str) -> Result<u16> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(ServerError::InvalidPort(raw.to_string())),
        Ok(port) => Ok(port),
    }
}

fn parse_ttl(raw: &str) -> Result<Option<u64>> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|_| ServerError::Config(format!("CACHE_TTL must be whole seconds, got {raw:?}")))?;
    Ok(if secs == 0 { None } else { Some(secs) })
}

fn default_ttl_for(mode: ProtocolMode) -> Option<u64> {
    match mode {
        ProtocolMode::Command => Some(DEFAULT_COMMAND_TTL),
        ProtocolMode::SingleValue => None,
    }
}
