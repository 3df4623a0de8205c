//! Current-weather lookup against weatherapi.com
//!
//! This is the operation sold by the gateway. Without an API key the
//! client answers every lookup with a fixed placeholder reading so the
//! billing flow can be exercised end to end.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::gate::{MeteredOperation, OperationError};
use crate::{Error, Result};

/// Default weatherapi.com base URL
pub const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com/v1";

/// Location used when the caller does not name one
pub const DEFAULT_LOCATION: &str = "San Francisco";

/// Current conditions for a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    /// Celsius
    pub temperature: f64,
    pub condition: String,
    /// "Name, Country"
    pub location: String,
    /// Percent
    pub humidity: u32,
    pub wind_kph: f64,
    /// Celsius
    pub feels_like: f64,
    pub last_updated: String,
    pub is_placeholder: bool,
}

impl WeatherReport {
    fn placeholder(location: &str) -> Self {
        Self {
            temperature: 21.0,
            condition: "Placeholder weather data".to_string(),
            location: format!("{location}, Placeholder Country"),
            humidity: 65,
            wind_kph: 10.5,
            feels_like: 20.0,
            last_updated: "2023-01-01 12:00".to_string(),
            is_placeholder: true,
        }
    }
}

// --- weatherapi.com wire types ---

#[derive(Deserialize)]
struct CurrentResponse {
    location: ApiLocation,
    current: ApiCurrent,
}

#[derive(Deserialize)]
struct ApiLocation {
    name: String,
    country: String,
}

#[derive(Deserialize)]
struct ApiCurrent {
    temp_c: f64,
    condition: ApiCondition,
    humidity: u32,
    wind_kph: f64,
    feelslike_c: f64,
    last_updated: String,
}

#[derive(Deserialize)]
struct ApiCondition {
    text: String,
}

impl From<CurrentResponse> for WeatherReport {
    fn from(data: CurrentResponse) -> Self {
        Self {
            temperature: data.current.temp_c,
            condition: data.current.condition.text,
            location: format!("{}, {}", data.location.name, data.location.country),
            humidity: data.current.humidity,
            wind_kph: data.current.wind_kph,
            feels_like: data.current.feelslike_c,
            last_updated: data.current.last_updated,
            is_placeholder: false,
        }
    }
}

/// weatherapi.com client
#[derive(Debug)]
pub struct WeatherClient {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl WeatherClient {
    /// Create a client; `api_key: None` selects placeholder mode
    ///
    /// # Errors
    ///
    /// Returns `Config` if the base URL does not parse or the HTTP client
    /// cannot be built
    pub fn new(base_url: &str, api_key: Option<SecretString>, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid weather API URL {base_url}: {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build weather client: {e}")))?;

        if api_key.is_none() {
            tracing::warn!("WEATHER_API_KEY not set, serving placeholder weather data");
        }

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        self.api_key.is_none()
    }

    /// Fetch current conditions for `location`
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the provider rejects the location,
    /// `TransientFailure` for everything else
    pub async fn current(&self, location: &str) -> std::result::Result<WeatherReport, OperationError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(OperationError::InvalidInput(
                "location must not be empty".to_string(),
            ));
        }

        let Some(api_key) = &self.api_key else {
            return Ok(WeatherReport::placeholder(location));
        };

        let url = format!("{}/current.json", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", api_key.expose_secret()),
                ("q", location),
                ("aqi", "no"),
            ])
            .send()
            .await
            .map_err(|e| {
                OperationError::TransientFailure(format!("Failed to get weather data: {e}"))
            })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::BAD_REQUEST => {
                return Err(OperationError::InvalidInput(format!(
                    "Invalid location: {location}"
                )));
            }
            StatusCode::UNAUTHORIZED => {
                return Err(OperationError::TransientFailure(
                    "Weather API rejected the API key".to_string(),
                ));
            }
            StatusCode::FORBIDDEN => {
                return Err(OperationError::TransientFailure(
                    "Weather API key has exceeded its rate limit".to_string(),
                ));
            }
            status => {
                return Err(OperationError::TransientFailure(format!(
                    "Weather API error: {status}"
                )));
            }
        }

        let data: CurrentResponse = response.json().await.map_err(|e| {
            OperationError::TransientFailure(format!("invalid weather API response: {e}"))
        })?;

        Ok(data.into())
    }
}

#[async_trait]
impl MeteredOperation for WeatherClient {
    type Output = WeatherReport;

    async fn invoke(&self, input: &str) -> std::result::Result<WeatherReport, OperationError> {
        self.current(input).await
    }
}
