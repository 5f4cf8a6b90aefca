//! Configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! `echorelay.toml` (or the file named by `ECHORELAY_CONFIG`), then
//! `ECHORELAY__SECTION__KEY` environment variables.

use std::time::Duration;

use serde::Deserialize;

use echorelay_media::{CaptureConfig, IceServer};

use crate::error::ConfigError;
use crate::network::generation::GenerationConfig;
use crate::network::speech::SpeechConfig;

pub const DEFAULT_BROKER_URL: &str = "https://rtc.live.cloudflare.com/v1";
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.cloudflare.com:3478";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub base_url: String,
    pub app_id: String,
    /// Bearer token for every broker request
    pub app_token: String,
    /// Upper bound for one broker call, including the response body
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BROKER_URL.to_string(),
            app_id: String::new(),
            app_token: String::new(),
            request_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
        }
    }
}

impl BrokerConfig {
    /// Base URL of this application's broker endpoints
    pub fn app_url(&self) -> String {
        format!("{}/apps/{}", self.base_url.trim_end_matches('/'), self.app_id)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_ice_servers() -> Vec<IceServer> {
    vec![IceServer::stun(DEFAULT_STUN_SERVER)]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub ice_servers: Vec<IceServer>,
    pub capture: CaptureConfig,
    pub generation: GenerationConfig,
    pub speech: SpeechConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            ice_servers: default_ice_servers(),
            capture: CaptureConfig::default(),
            generation: GenerationConfig::default(),
            speech: SpeechConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `.env`, the config file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`AppConfig::load`], with an explicit config file taking precedence
    /// over `ECHORELAY_CONFIG`
    pub fn load_from(path: Option<&str>) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {:?}", path),
            Err(e) => tracing::debug!("No .env file loaded: {}", e),
        }

        let required = path.is_some();
        let file = match path {
            Some(path) => path.to_string(),
            None => std::env::var("ECHORELAY_CONFIG").unwrap_or_else(|_| "echorelay".to_string()),
        };

        let config = config::Config::builder()
            .add_source(config::File::with_name(&file).required(required))
            .add_source(
                config::Environment::with_prefix("ECHORELAY")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: AppConfig = config.try_deserialize()?;
        tracing::info!("Configuration loaded (broker app {})", config.broker.app_id);
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Check the settings an echo call needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.app_id.trim().is_empty() {
            return Err(ConfigError::Invalid("broker.app_id is not set".to_string()));
        }
        if self.broker.app_token.trim().is_empty() {
            return Err(ConfigError::Invalid("broker.app_token is not set".to_string()));
        }
        if self.broker.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "broker.request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.ice_servers.iter().all(|s| s.urls.is_empty()) {
            return Err(ConfigError::Invalid(
                "at least one ICE server is required".to_string(),
            ));
        }
        Ok(())
    }
}
