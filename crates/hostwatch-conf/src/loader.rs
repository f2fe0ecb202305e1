//! Config file discovery, loading, and environment variable overlay.

use crate::{
    ConfigError, HostwatchConfig, ModelConfig, PollerConfig, ProviderConfig, TelemetryConfig,
};
use std::env;
use std::path::{Path, PathBuf};

/// Where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli), existing files only.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/hostwatch/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("hostwatch/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("hostwatch.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

pub fn load_from_file(path: &Path) -> Result<HostwatchConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

fn parse_toml(contents: &str, path: &Path) -> Result<HostwatchConfig, ConfigError> {
    toml::from_str(contents).map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Overlay value wins unless it is still the compiled default.
fn prefer<T: PartialEq>(overlay: T, base: T, default: T) -> T {
    if overlay != default {
        overlay
    } else {
        base
    }
}

/// Merge two configs, with `overlay` taking precedence field by field.
pub fn merge_configs(base: HostwatchConfig, overlay: HostwatchConfig) -> HostwatchConfig {
    let provider = ProviderConfig::default();
    let model = ModelConfig::default();
    let poller = PollerConfig::default();
    let telemetry = TelemetryConfig::default();

    HostwatchConfig {
        provider: ProviderConfig {
            program: prefer(overlay.provider.program, base.provider.program, provider.program),
            args: prefer(overlay.provider.args, base.provider.args, provider.args),
            request_timeout_ms: prefer(
                overlay.provider.request_timeout_ms,
                base.provider.request_timeout_ms,
                provider.request_timeout_ms,
            ),
        },
        model: ModelConfig {
            base_url: prefer(overlay.model.base_url, base.model.base_url, model.base_url),
            api_key: overlay.model.api_key.or(base.model.api_key),
            model: prefer(overlay.model.model, base.model.model, model.model),
            temperature: prefer(
                overlay.model.temperature,
                base.model.temperature,
                model.temperature,
            ),
            max_tokens: prefer(overlay.model.max_tokens, base.model.max_tokens, model.max_tokens),
        },
        poller: PollerConfig {
            interval_ms: prefer(
                overlay.poller.interval_ms,
                base.poller.interval_ms,
                poller.interval_ms,
            ),
            error_backoff_ms: prefer(
                overlay.poller.error_backoff_ms,
                base.poller.error_backoff_ms,
                poller.error_backoff_ms,
            ),
        },
        telemetry: TelemetryConfig {
            log_level: prefer(
                overlay.telemetry.log_level,
                base.telemetry.log_level,
                telemetry.log_level,
            ),
            otlp_endpoint: overlay.telemetry.otlp_endpoint.or(base.telemetry.otlp_endpoint),
        },
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut HostwatchConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Same as [`apply_env_overrides`], reading variables through `lookup`.
pub fn apply_overrides_from<F>(config: &mut HostwatchConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut take = |key: &str| {
        let value = lookup(key).filter(|v| !v.is_empty());
        if value.is_some() {
            sources.env_overrides.push(key.to_string());
        }
        value
    };

    // Provider
    if let Some(v) = take("HOSTWATCH_PROVIDER_PROGRAM") {
        config.provider.program = v;
    }
    if let Some(v) = take("HOSTWATCH_PROVIDER_ARGS") {
        config.provider.args = v.split_whitespace().map(str::to_string).collect();
    }
    if let Some(v) = take("HOSTWATCH_REQUEST_TIMEOUT_MS") {
        if let Ok(ms) = v.parse() {
            config.provider.request_timeout_ms = ms;
        }
    }

    // Model backend; later keys win, so the hostwatch-specific key is last
    if let Some(v) = take("HOSTWATCH_MODEL_BASE_URL") {
        config.model.base_url = v;
    }
    if let Some(v) = take("HOSTWATCH_MODEL") {
        config.model.model = v;
    }
    for key in ["OPENAI_API_KEY", "GROQ_API_KEY", "HOSTWATCH_API_KEY"] {
        if let Some(v) = take(key) {
            config.model.api_key = Some(v);
        }
    }

    // Poller
    if let Some(v) = take("HOSTWATCH_POLL_INTERVAL_MS") {
        if let Ok(ms) = v.parse() {
            config.poller.interval_ms = ms;
        }
    }

    // Telemetry
    if let Some(v) = take("HOSTWATCH_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = Some(v);
    }
    // Also support standard OTEL env var
    if let Some(v) = take("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = Some(v);
    }
    if let Some(v) = take("HOSTWATCH_LOG_LEVEL") {
        config.telemetry.log_level = v;
    }
    if let Some(v) = take("RUST_LOG") {
        config.telemetry.log_level = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[provider]\nprogram = \"/opt/hostwatch/provider\"\n\n[poller]\ninterval_ms = 2000"
        )
        .unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.provider.program, "/opt/hostwatch/provider");
        assert_eq!(config.provider.request_timeout_ms, 10_000);
        assert_eq!(config.poller.interval_ms, 2000);
        assert_eq!(config.poller.error_backoff_ms, 10_000);
    }

    #[test]
    fn test_parse_error_names_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[provider\nprogram = ").unwrap();

        let err = load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_from_file(Path::new("/nonexistent/hostwatch.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_merge_keeps_base_when_overlay_is_default() {
        let mut base = HostwatchConfig::default();
        base.provider.program = "from-system".to_string();
        base.model.api_key = Some("base-key".to_string());

        let mut overlay = HostwatchConfig::default();
        overlay.poller.interval_ms = 1000;

        let merged = merge_configs(base, overlay);
        assert_eq!(merged.provider.program, "from-system");
        assert_eq!(merged.model.api_key.as_deref(), Some("base-key"));
        assert_eq!(merged.poller.interval_ms, 1000);
    }

    #[test]
    fn test_env_overrides_are_recorded() {
        let mut config = HostwatchConfig::default();
        let mut sources = ConfigSources::default();

        apply_overrides_from(
            &mut config,
            &mut sources,
            lookup(&[
                ("HOSTWATCH_PROVIDER_ARGS", "--quiet  --fast"),
                ("HOSTWATCH_REQUEST_TIMEOUT_MS", "2500"),
                ("GROQ_API_KEY", "gsk_test"),
                ("RUST_LOG", "debug"),
            ]),
        );

        assert_eq!(config.provider.args, vec!["--quiet", "--fast"]);
        assert_eq!(config.provider.request_timeout_ms, 2500);
        assert_eq!(config.model.api_key.as_deref(), Some("gsk_test"));
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(sources.env_overrides.len(), 4);
    }

    #[test]
    fn test_hostwatch_api_key_wins() {
        let mut config = HostwatchConfig::default();
        let mut sources = ConfigSources::default();

        apply_overrides_from(
            &mut config,
            &mut sources,
            lookup(&[("OPENAI_API_KEY", "sk-openai"), ("HOSTWATCH_API_KEY", "hw-key")]),
        );

        assert_eq!(config.model.api_key.as_deref(), Some("hw-key"));
    }

    #[test]
    fn test_empty_and_unparsable_values_ignored() {
        let mut config = HostwatchConfig::default();
        let mut sources = ConfigSources::default();

        apply_overrides_from(
            &mut config,
            &mut sources,
            lookup(&[("HOSTWATCH_MODEL", ""), ("HOSTWATCH_POLL_INTERVAL_MS", "soon")]),
        );

        assert_eq!(config.model.model, ModelConfig::default().model);
        assert_eq!(config.poller.interval_ms, 5_000);
        assert_eq!(sources.env_overrides, vec!["HOSTWATCH_POLL_INTERVAL_MS"]);
    }
}
