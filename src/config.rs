//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - `config.toml` (default configuration)
//! - `config.local.toml` (git-ignored local overrides)
//! - Environment variables (`BAYESKERNEL_` prefix)
//!
//! ## Example
//!
//! ```toml
//! [inference]
//! marginal_samples = 1000000
//! sensitivity_samples_per_side = 75000
//!
//! [server]
//! bind_address = "127.0.0.1:8080"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! BAYESKERNEL_INFERENCE__MARGINAL_SAMPLES=100000
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Main configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub inference: InferenceConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Inference-plane tuning (§4.5, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Sample count for `compute_marginals` (spec default: 1,000,000).
    #[serde(default = "default_marginal_samples")]
    pub marginal_samples: u64,

    /// Per-side sample count for intervention/sensitivity queries (spec
    /// range: 50,000–100,000).
    #[serde(default = "default_sensitivity_samples")]
    pub sensitivity_samples_per_side: u64,

    /// Maximum entries in each LRU cache (marginals, sensitivity); spec
    /// caps both at 100.
    #[serde(default = "default_cache_entries")]
    pub marginal_cache_entries: usize,

    #[serde(default = "default_cache_entries")]
    pub sensitivity_cache_entries: usize,

    /// Run the inference plane on a dedicated background thread rather
    /// than inline on the caller's thread (§5).
    #[serde(default = "default_true")]
    pub offload: bool,
}

/// Worker-protocol HTTP surface configuration (§6), only relevant to the
/// optional `bayeskernel-server` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_marginal_samples() -> u64 {
    1_000_000
}
fn default_sensitivity_samples() -> u64 {
    75_000
}
fn default_cache_entries() -> usize {
    100
}
fn default_true() -> bool {
    true
}
fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_max_connections() -> usize {
    256
}
fn default_body_limit_bytes() -> usize {
    1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl LoggingConfig {
    /// Install a global `tracing` subscriber honoring `level`/`format`
    /// (§ ambient stack: structured logging the way the rest of the kernel
    /// emits it via `tracing::{info,warn,debug}!`). Call once at binary
    /// startup; a no-op if a subscriber is already installed.
    pub fn init(&self) {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);

        let result = if self.format == "json" {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        if result.is_err() {
            // A subscriber is already installed (e.g. in tests); nothing to do.
        }
    }
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. `config.toml` (base configuration)
    /// 2. `config.local.toml` (local overrides, git-ignored)
    /// 3. Environment variables (`BAYESKERNEL_` prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("BAYESKERNEL_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("BAYESKERNEL_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            inference: InferenceConfig {
                marginal_samples: default_marginal_samples(),
                sensitivity_samples_per_side: default_sensitivity_samples(),
                marginal_cache_entries: default_cache_entries(),
                sensitivity_cache_entries: default_cache_entries(),
                offload: true,
            },
            server: ServerConfig {
                bind_address: default_bind_address(),
                max_connections: default_max_connections(),
                body_limit_bytes: default_body_limit_bytes(),
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.inference.marginal_samples, 1_000_000);
        assert_eq!(config.inference.marginal_cache_entries, 100);
        assert_eq!(config.inference.sensitivity_cache_entries, 100);
    }

    #[test]
    fn config_serialization_round_trips() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[inference]"));
        assert!(toml_str.contains("[server]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.inference.marginal_samples, config.inference.marginal_samples);
    }
}
