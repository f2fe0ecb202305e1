//! Configuration sections.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How to launch the telemetry provider subprocess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Executable to spawn. Resolved through `PATH` when not absolute.
    /// Default: hostwatch-provider
    pub program: String,

    /// Extra arguments passed to the provider.
    pub args: Vec<String>,

    /// Bound on each request/response exchange.
    /// Default: 10000
    pub request_timeout_ms: u64,
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            program: "hostwatch-provider".to_string(),
            args: Vec::new(),
            request_timeout_ms: 10_000,
        }
    }
}

/// OpenAI-compatible chat completion backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the API, including the version segment.
    /// Default: https://api.groq.com/openai/v1
    pub base_url: String,

    /// API key. Usually supplied through the environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default: llama-3.3-70b-versatile
    pub model: String,

    /// Default: 0.1
    pub temperature: f32,

    /// Default: 1024
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.1,
            max_tokens: 1024,
        }
    }
}

/// Periodic telemetry push cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Default: 5000
    pub interval_ms: u64,

    /// Wait after a failed cycle.
    /// Default: 10000
    pub error_backoff_ms: u64,
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            error_backoff_ms: 10_000,
        }
    }
}

/// Logging and OpenTelemetry export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    /// Default: info
    pub log_level: String,

    /// OTLP gRPC endpoint. Export is disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            otlp_endpoint: None,
        }
    }
}
