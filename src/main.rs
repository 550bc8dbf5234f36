//! # LLM Pipeline Gateway
//!
//! Accepts OpenAI Chat, OpenAI Responses, Anthropic Messages and Gemini
//! requests, translates them to each upstream's protocol and fails over
//! across an ordered pool of provider/model/key pipelines.
//!
//! ## Usage
//!
//! ```bash
//! # Start with ./gateway.yaml or built-in defaults
//! llm-pipeline-gateway
//!
//! # Start with custom config file
//! llm-pipeline-gateway --config /path/to/gateway.yaml
//!
//! # Start with environment overrides
//! GATEWAY_CONFIG=gateway.toml GATEWAY_PORT=9000 llm-pipeline-gateway
//! ```

use anyhow::{bail, Context};
use gateway_config::{load_config, resolve_config_path, ConfigHandle, ConfigWatcher};
use gateway_pipeline::PipelineManager;
use gateway_server::{AppState, Server};
use gateway_telemetry::init_logging;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %format!("{e:#}"), "Gateway failed");
        eprintln!("llm-pipeline-gateway: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let explicit = config_arg(std::env::args().skip(1))?;
    let config = load_config(explicit.as_deref())
        .await
        .context("failed to load configuration")?;

    let _telemetry = init_logging(&config.logging).context("failed to initialize logging")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        pools = config.pools.len(),
        "Starting LLM pipeline gateway"
    );
    if !config.is_configured() {
        warn!("No providers or pools configured; chat requests will fail until the config is reloaded");
    }

    let manager = PipelineManager::from_config(&config).context("failed to build pipeline pools")?;
    let handle = ConfigHandle::new(config);
    let _rebuild = Arc::clone(manager.registry()).follow(handle.clone());

    let _watcher = match resolve_config_path(explicit.as_deref()) {
        Some(path) => match ConfigWatcher::spawn(&path, handle.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Config hot reload disabled");
                None
            }
        },
        None => None,
    };

    Server::new(AppState::new(manager, handle))
        .run()
        .await
        .context("server error")?;
    Ok(())
}

/// `--config <path>`, `--config=<path>` or `-c <path>`
fn config_arg(args: impl IntoIterator<Item = String>) -> anyhow::Result<Option<PathBuf>> {
    let mut args = args.into_iter();
    let mut path = None;
    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--config=") {
            path = Some(PathBuf::from(value));
        } else if arg == "--config" || arg == "-c" {
            let Some(value) = args.next() else {
                bail!("{arg} requires a path");
            };
            path = Some(PathBuf::from(value));
        } else {
            bail!("unknown argument '{arg}'");
        }
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_config_arg_forms() {
        assert_eq!(config_arg(args(&[])).unwrap(), None);
        assert_eq!(
            config_arg(args(&["--config", "gw.yaml"])).unwrap(),
            Some(PathBuf::from("gw.yaml"))
        );
        assert_eq!(
            config_arg(args(&["--config=gw.toml"])).unwrap(),
            Some(PathBuf::from("gw.toml"))
        );
        assert!(config_arg(args(&["-c"])).is_err());
        assert!(config_arg(args(&["--port", "1"])).is_err());
    }
}
