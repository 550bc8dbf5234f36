//! Configuration loading from files and environment.

use crate::config::{GatewayConfig, LogFormat};
use gateway_core::{GatewayError, GatewayResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "GATEWAY_CONFIG";

/// File used when neither `--config` nor `GATEWAY_CONFIG` is given
pub const DEFAULT_CONFIG_FILE: &str = "gateway.yaml";

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML
    Yaml,
    /// TOML
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension; unknown extensions are read as YAML
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("toml") => Self::Toml,
            Some("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

impl GatewayConfig {
    /// Parse configuration text
    ///
    /// # Errors
    /// Returns a configuration error if the text does not parse
    pub fn parse(content: &str, format: ConfigFormat) -> GatewayResult<Self> {
        let parsed = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|e| GatewayError::configuration(format!("failed to parse config: {e}")))
    }

    /// Apply `GATEWAY_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("GATEWAY_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("GATEWAY_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(value = %port, "Ignoring invalid GATEWAY_PORT"),
            }
        }
        if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("GATEWAY_LOG_FORMAT") {
            match format.to_ascii_lowercase().as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "pretty" => self.logging.format = LogFormat::Pretty,
                other => warn!(value = %other, "Ignoring invalid GATEWAY_LOG_FORMAT"),
            }
        }
    }
}

/// Resolve which config file to read: explicit path, then `GATEWAY_CONFIG`,
/// then `./gateway.yaml` when it exists
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
    fallback.exists().then_some(fallback)
}

/// Read, parse and validate one config file (no env overrides)
///
/// # Errors
/// Returns a configuration error if the file cannot be read, parsed or validated
pub async fn load_from_path(path: &Path) -> GatewayResult<GatewayConfig> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        GatewayError::configuration(format!("failed to read {}: {e}", path.display()))
    })?;
    let mut config = GatewayConfig::parse(&content, ConfigFormat::from_path(path))?;
    config.apply_env_overrides();
    config.validate()?;
    debug!(path = %path.display(), providers = config.providers.len(), "Config file parsed");
    Ok(config)
}

/// Load the effective configuration
///
/// # Errors
/// Returns a configuration error if the selected file is invalid
pub async fn load_config(explicit: Option<&Path>) -> GatewayResult<GatewayConfig> {
    match resolve_config_path(explicit) {
        Some(path) => {
            let config = load_from_path(&path).await?;
            info!(
                path = %path.display(),
                providers = config.providers.len(),
                pools = config.pools.len(),
                "Configuration loaded"
            );
            Ok(config)
        }
        None => {
            warn!("No configuration file found, starting with defaults");
            let mut config = GatewayConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }
}
