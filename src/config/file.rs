//! TOML configuration file loading
//!
//! Supports `~/.config/credit-gateway/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top
//! of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;
use crate::catalog::Offer;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct GatewayConfigFile {
    /// HTTP listener configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Payment processor configuration
    #[serde(default)]
    pub processor: ProcessorFileConfig,

    /// Weather provider configuration
    #[serde(default)]
    pub weather: WeatherFileConfig,

    /// Webhook configuration
    #[serde(default)]
    pub webhook: WebhookFileConfig,

    /// Credit packages; replaces the built-in catalog when present
    #[serde(default)]
    pub offers: Option<Vec<Offer>>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessorFileConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WeatherFileConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub default_location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookFileConfig {
    /// Shared HMAC secret; prefer the `WEBHOOK_SECRET` env var
    pub secret: Option<String>,
}

/// Load the TOML config file
///
/// An explicit `path` was named by the operator, so it must exist and
/// parse. Without one, the standard path is optional: a missing file is
/// silently skipped and a malformed one is logged and ignored.
///
/// # Errors
///
/// Returns `Io` or `Toml` if an explicit `path` cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<GatewayConfigFile> {
    match path {
        Some(path) => load_explicit(path),
        None => Ok(config_file_path()
            .map(|path| load_optional(&path))
            .unwrap_or_default()),
    }
}

fn load_explicit(path: &Path) -> Result<GatewayConfigFile> {
    let content = std::fs::read_to_string(path).inspect_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to read config file");
    })?;
    let config: GatewayConfigFile = toml::from_str(&content).inspect_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to parse config file");
    })?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

fn load_optional(path: &Path) -> GatewayConfigFile {
    if !path.exists() {
        return GatewayConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                GatewayConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            GatewayConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/credit-gateway/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("credit-gateway").join("config.toml"))
}
