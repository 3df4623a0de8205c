//! Configuration management for the credit gateway

pub mod file;

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;

use crate::catalog::{Offer, default_offers};
use crate::{Error, Result, payments, weather};

/// Gateway configuration
#[derive(Debug)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,

    /// Payment processor (offer creation)
    pub processor: ProcessorConfig,

    /// Weather provider (the metered operation)
    pub weather: WeatherConfig,

    /// Shared secret for webhook signatures; `None` trusts every payload
    pub webhook_secret: Option<SecretString>,

    /// Credit packages offered when a balance runs out
    pub offers: Vec<Offer>,
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Payment processor configuration
#[derive(Debug)]
pub struct ProcessorConfig {
    pub base_url: String,

    /// `FEWSATS_API_KEY`; required to serve traffic
    pub api_key: Option<SecretString>,

    pub timeout: Duration,
}

/// Weather provider configuration
#[derive(Debug)]
pub struct WeatherConfig {
    pub base_url: String,

    /// `WEATHER_API_KEY`; `None` serves placeholder data
    pub api_key: Option<SecretString>,

    /// Bound on a single metered call
    pub timeout: Duration,

    pub default_location: String,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file cannot be read or parsed,
    /// or if a numeric setting does not parse
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path)?;
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Merge sources with precedence env > toml > default
    ///
    /// # Errors
    ///
    /// Returns error if a numeric setting does not parse
    pub fn from_sources<F>(fc: file::GatewayConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = |key: &str| {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::new(v.into()))
        };

        let server = ServerConfig {
            host: env("CREDIT_GATEWAY_HOST")
                .or(fc.server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: match ["CREDIT_GATEWAY_PORT", "PORT"]
                .into_iter()
                .find_map(|key| env(key).map(|raw| (key, raw)))
            {
                Some((key, raw)) => parse_var(key, &raw)?,
                None => fc.server.port.unwrap_or(8000),
            },
        };

        let processor = ProcessorConfig {
            base_url: env("FEWSATS_BASE_URL")
                .or(fc.processor.base_url)
                .unwrap_or_else(|| payments::processor::DEFAULT_BASE_URL.to_string()),
            api_key: secret("FEWSATS_API_KEY"),
            timeout: Duration::from_secs(match env("PROCESSOR_TIMEOUT_SECS") {
                Some(raw) => parse_var("PROCESSOR_TIMEOUT_SECS", &raw)?,
                None => fc.processor.timeout_secs.unwrap_or(10),
            }),
        };

        let weather = WeatherConfig {
            base_url: env("WEATHER_API_BASE_URL")
                .or(fc.weather.base_url)
                .unwrap_or_else(|| weather::DEFAULT_BASE_URL.to_string()),
            api_key: secret("WEATHER_API_KEY"),
            timeout: Duration::from_secs(match env("UPSTREAM_TIMEOUT_SECS") {
                Some(raw) => parse_var("UPSTREAM_TIMEOUT_SECS", &raw)?,
                None => fc.weather.timeout_secs.unwrap_or(10),
            }),
            default_location: fc
                .weather
                .default_location
                .unwrap_or_else(|| weather::DEFAULT_LOCATION.to_string()),
        };

        let webhook_secret = secret("WEBHOOK_SECRET").or_else(|| {
            fc.webhook
                .secret
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::new(v.into()))
        });

        Ok(Self {
            server,
            processor,
            weather,
            webhook_secret,
            offers: fc.offers.unwrap_or_else(default_offers),
        })
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid {key} value {raw:?}: {e}")))
}
