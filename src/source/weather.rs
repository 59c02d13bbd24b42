//! Weather lookups: current conditions for a city.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{fetch_json, scalar_to_string, ExternalSource, SourceError};

/// The fields pulled out of a current-weather payload, kept as the
/// service spelled them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherReport {
    pub temperature: String,
    pub wind_speed: String,
    pub condition: String,
    pub pressure: String,
    pub humidity: String,
}

impl WeatherReport {
    /// Extracts the report from an OpenWeatherMap-shaped payload:
    /// `weather[0].main`, `main.{temp,pressure,humidity}`, `wind.speed`.
    pub fn from_json(payload: &Value) -> Result<Self, SourceError> {
        let condition = payload
            .get("weather")
            .and_then(Value::as_array)
            .and_then(|conditions| conditions.first())
            .and_then(|first| first.get("main"));
        let main = payload.get("main");
        let wind = payload.get("wind");

        Ok(Self {
            temperature: scalar_to_string(main.and_then(|m| m.get("temp")), "main.temp")?,
            wind_speed: scalar_to_string(wind.and_then(|w| w.get("speed")), "wind.speed")?,
            condition: scalar_to_string(condition, "weather[0].main")?,
            pressure: scalar_to_string(main.and_then(|m| m.get("pressure")), "main.pressure")?,
            humidity: scalar_to_string(main.and_then(|m| m.get("humidity")), "main.humidity")?,
        })
    }
}

impl fmt::Display for WeatherReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Wind speed: {}, Condition: {}, Temperature: {}, Pressure: {}, Humidity: {}",
            self.wind_speed, self.condition, self.temperature, self.pressure, self.humidity
        )
    }
}

// == Weather Source ==
/// Resolves a city name to a one-line weather summary.
#[derive(Debug, Clone)]
pub struct WeatherSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl WeatherSource {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl ExternalSource for WeatherSource {
    async fn resolve(&self, key: &str) -> Result<String, SourceError> {
        debug!(city = key, "Fetching weather");
        let request = self.client.get(&self.base_url).query(&[
            ("q", key),
            ("units", "metric"),
            ("appid", self.api_key.as_str()),
        ]);

        let payload = fetch_json(request).await?;
        Ok(WeatherReport::from_json(&payload)?.to_string())
    }
}
