//! Gateway settings.
//!
//! Sources, lowest precedence first: built-in defaults, an optional settings
//! file (format picked from its extension), then `APIKEY_GATEWAY__*`
//! environment variables using `__` as the nesting separator, e.g.
//! `APIKEY_GATEWAY__PLUGIN__API_KEY__HEADER_KEY=x-api-key`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::HeaderName;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_PREFIX: &str = "APIKEY_GATEWAY";
pub const DEFAULT_HEADER_KEY: &str = "apikey";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid header name '{0}'")]
    InvalidHeader(String),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default)]
    pub plugin: PluginSettings,
    #[serde(default)]
    pub traffic: TrafficSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub registry: RegistrySettings,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    #[serde(default)]
    pub api_key: ApiKeySettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiKeySettings {
    /// Name of the HTTP header holding the api key.
    pub header_key: String,
}

impl Default for ApiKeySettings {
    fn default() -> Self {
        Self {
            header_key: DEFAULT_HEADER_KEY.to_string(),
        }
    }
}

impl ApiKeySettings {
    pub fn header_name(&self) -> Result<HeaderName, SettingsError> {
        HeaderName::from_bytes(self.header_key.trim().as_bytes())
            .map_err(|_| SettingsError::InvalidHeader(self.header_key.clone()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrafficSettings {
    pub store_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub report_queue_capacity: usize,
}

impl Default for TrafficSettings {
    fn default() -> Self {
        Self {
            store_timeout_ms: 250,
            write_timeout_ms: 1_000,
            report_queue_capacity: 1_024,
        }
    }
}

impl TrafficSettings {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub listen: String,
    pub request_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            request_timeout_ms: 1_000,
        }
    }
}

impl ServerSettings {
    pub fn listen_addr(&self) -> Result<SocketAddr, SettingsError> {
        self.listen.parse().map_err(|err| SettingsError::Invalid {
            key: "server.listen",
            reason: format!("{err}"),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySettings {
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

impl GatewaySettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.plugin.api_key.header_name()?;
        if self.traffic.store_timeout_ms == 0 {
            return Err(SettingsError::Invalid {
                key: "traffic.store_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.traffic.report_queue_capacity == 0 {
            return Err(SettingsError::Invalid {
                key: "traffic.report_queue_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        self.server.listen_addr()?;
        Ok(())
    }
}

/// Loads settings from defaults, `path` (when given) and the environment.
pub fn load_settings(path: Option<&Path>) -> Result<GatewaySettings, SettingsError> {
    let mut builder = Config::builder().add_source(Config::try_from(&GatewaySettings::default())?);
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let settings: GatewaySettings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}
