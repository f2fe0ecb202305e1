//! Configuration loading for hostwatch.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/hostwatch/config.toml` (system)
//! 2. `~/.config/hostwatch/config.toml` (user)
//! 3. `./hostwatch.toml`, or the path given on the command line
//! 4. Environment variables (`HOSTWATCH_*`, plus `RUST_LOG`,
//!    `OTEL_EXPORTER_OTLP_ENDPOINT`, `GROQ_API_KEY` and `OPENAI_API_KEY`)
//!
//! # Example Config
//!
//! ```toml
//! [provider]
//! program = "hostwatch-provider"
//! args = []
//! request_timeout_ms = 10000
//!
//! [model]
//! base_url = "https://api.groq.com/openai/v1"
//! model = "llama-3.3-70b-versatile"
//! temperature = 0.1
//! max_tokens = 1024
//!
//! [poller]
//! interval_ms = 5000
//! error_backoff_ms = 10000
//!
//! [telemetry]
//! log_level = "info"
//! otlp_endpoint = "127.0.0.1:4317"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{ModelConfig, PollerConfig, ProviderConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Complete hostwatch configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostwatchConfig {
    pub provider: ProviderConfig,
    pub model: ModelConfig,
    pub poller: PollerConfig,
    pub telemetry: TelemetryConfig,
}

impl HostwatchConfig {
    /// Load from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load with `config_path` replacing the local `./hostwatch.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load and report which files and environment variables contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = HostwatchConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);
        config.validate()?;

        Ok((config, sources))
    }

    /// Timeouts and poll intervals must be non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("provider.request_timeout_ms", self.provider.request_timeout_ms),
            ("poller.interval_ms", self.poller.interval_ms),
            ("poller.error_backoff_ms", self.poller.error_backoff_ms),
        ];

        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Serialize to TOML with the API key masked.
    pub fn to_redacted_toml(&self) -> String {
        let mut shown = self.clone();
        if shown.model.api_key.is_some() {
            shown.model.api_key = Some("********".to_string());
        }
        toml::to_string_pretty(&shown).unwrap_or_default()
    }
}
