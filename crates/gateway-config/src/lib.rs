//! # Gateway Config
//!
//! Configuration for the LLM pipeline gateway: the typed model, loading from
//! YAML/TOML/JSON files with environment overrides, validation, and an
//! atomically swappable handle with file based hot reload.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod loader;
pub mod validation;
pub mod watcher;

pub use config::{
    AuthMode, CompatibilityProfile, Conversion, DetectionConfig, DetectionRule, FieldPath,
    GatewayConfig, KeySource, LogFormat, LoggingSection, MappingRule, OtelConfig, PoolEntry,
    ProviderConfig, RetryConfig, RoutingConfig, ServerConfig, StreamingSupport, TimeoutConfig,
};
pub use loader::{load_config, load_from_path, resolve_config_path, ConfigFormat};
pub use validation::is_valid_path;
pub use watcher::{ConfigHandle, ConfigWatcher};
