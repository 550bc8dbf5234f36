//! Load-time validation.

use crate::config::{GatewayConfig, MappingRule};
use gateway_core::{GatewayError, GatewayResult};
use once_cell::sync::Lazy;
use regex::Regex;

/// Dotted JSON path: `a.b.0.c`
#[allow(clippy::expect_used)]
static FIELD_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-]+(\.[A-Za-z0-9_\-]+)*$").expect("field path regex is valid")
});

/// Check whether a dotted field path is well formed
#[must_use]
pub fn is_valid_path(path: &str) -> bool {
    FIELD_PATH.is_match(path)
}

impl GatewayConfig {
    /// Validate the configuration.
    ///
    /// A config with neither providers nor pools is accepted so the server can
    /// start unconfigured (readiness reports not ready).
    ///
    /// # Errors
    /// Returns a configuration error listing every problem found
    pub fn validate(&self) -> GatewayResult<()> {
        let mut problems = Vec::new();

        if self.server.port == 0 {
            problems.push("server.port must be non-zero".to_string());
        }
        if self.timeouts.attempt.is_zero() {
            problems.push("timeouts.attempt must be non-zero".to_string());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            problems.push("retry.jitter must be between 0.0 and 1.0".to_string());
        }
        if self.retry.multiplier < 1.0 {
            problems.push("retry.multiplier must be at least 1.0".to_string());
        }
        if self.detection.correlation_capacity == 0 {
            problems.push("detection.correlation_capacity must be non-zero".to_string());
        }

        for (id, provider) in &self.providers {
            match url::Url::parse(&provider.endpoint) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => problems.push(format!(
                    "provider '{id}': unsupported endpoint scheme '{}'",
                    url.scheme()
                )),
                Err(e) => problems.push(format!("provider '{id}': invalid endpoint: {e}")),
            }
            if let Some(profile) = &provider.compatibility {
                if !self.compatibility.contains_key(profile) {
                    problems.push(format!(
                        "provider '{id}': unknown compatibility profile '{profile}'"
                    ));
                }
            }
        }

        for (name, profile) in &self.compatibility {
            let paths = profile
                .request
                .iter()
                .chain(&profile.response)
                .flat_map(|rule| match rule {
                    MappingRule::Copy { from, to } | MappingRule::Convert { from, to, .. } => {
                        vec![from, to]
                    }
                    MappingRule::Default { to, .. } => vec![to],
                })
                .chain(&profile.strip_request_fields)
                .chain(&profile.strip_response_fields);
            for path in paths {
                if !is_valid_path(path) {
                    problems.push(format!(
                        "compatibility '{name}': malformed field path '{path}'"
                    ));
                }
            }
        }

        if self.is_configured() && !self.pools.contains_key(&self.routing.default_category) {
            problems.push(format!(
                "missing pool for default category '{}'",
                self.routing.default_category
            ));
        }

        for (category, entries) in &self.pools {
            if entries.is_empty() {
                problems.push(format!("pool '{category}' is empty"));
            }
            for entry in entries {
                let Some(provider) = self.providers.get(&entry.provider) else {
                    problems.push(format!(
                        "pool '{category}': unknown provider '{}'",
                        entry.provider
                    ));
                    continue;
                };
                if entry.model.trim().is_empty() {
                    problems.push(format!(
                        "pool '{category}': empty model for provider '{}'",
                        entry.provider
                    ));
                }
                if !provider.keys.contains_key(&entry.key) {
                    problems.push(format!(
                        "pool '{category}': provider '{}' has no key '{}'",
                        entry.provider, entry.key
                    ));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::configuration(problems.join("; ")))
        }
    }
}
