//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (FOLIO_*)
//! 2. TOML config file (if FOLIO_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::analytics::AnalyticsLimits;

mod validation;

pub use validation::ConfigError;

/// Version-tagged names of the three partitions the worker owns.
///
/// Changing any name is how a release invalidates that partition: the
/// next activation deletes every partition not listed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PartitionNames {
    /// General partition for network-first and revalidated responses.
    pub dynamic: String,
    /// Pre-populated static resources.
    pub static_resources: String,
    pub analytics: String,
}

impl Default for PartitionNames {
    fn default() -> Self {
        Self {
            dynamic: "bouba-portfolio-v2.0.0".into(),
            static_resources: "static-resources-v1.0.0".into(),
            analytics: "analytics-data-v1.0.0".into(),
        }
    }
}

impl PartitionNames {
    pub fn contains(&self, name: &str) -> bool {
        name == self.dynamic || name == self.static_resources || name == self.analytics
    }

    /// Stable identifier of this set of names, used to detect updates.
    pub fn fingerprint(&self) -> String {
        format!("{}|{}|{}", self.dynamic, self.static_resources, self.analytics)
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FOLIO_*, `__` for nesting)
/// 2. TOML config file (if FOLIO_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding every partition.
    ///
    /// Set via FOLIO_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the worker serves; messages from any other origin are dropped.
    ///
    /// Set via FOLIO_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// User-Agent string for network requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Network request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum response body bytes accepted from the network.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    #[serde(default)]
    pub partitions: PartitionNames,

    /// Resources fetched into the static partition at install time.
    ///
    /// Relative paths resolve against `origin`.
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,

    /// Third-party hosts whose responses are treated as static assets.
    #[serde(default = "default_cdn_hosts")]
    pub cdn_hosts: Vec<String>,

    #[serde(default)]
    pub limits: AnalyticsLimits,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./folio-worker.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_user_agent() -> String {
    "folio-worker/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

fn default_manifest() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/styles.css",
        "/chatbot-styles.css",
        "/skills-matching.css",
        "/script.js",
        "/manifest.json",
        "https://fonts.googleapis.com/css2?family=Orbitron:wght@400;700;900&family=Rajdhani:wght@300;400;500;600;700&display=swap",
        "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css",
        "https://unpkg.com/aos@2.3.1/dist/aos.css",
        "https://unpkg.com/aos@2.3.1/dist/aos.js",
        "https://cdn.jsdelivr.net/npm/chart.js",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_cdn_hosts() -> Vec<String> {
    vec!["fonts.googleapis.com".into(), "cdnjs.cloudflare.com".into(), "unpkg.com".into()]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            partitions: PartitionNames::default(),
            manifest: default_manifest(),
            cdn_hosts: default_cdn_hosts(),
            limits: AnalyticsLimits::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FOLIO_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        Self::extract(figment.merge(
            Env::prefixed("FOLIO_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        ))
    }

    /// Load configuration from an explicit TOML file layered over defaults,
    /// with environment variables still taking precedence.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        Self::extract(
            Figment::from(Serialized::defaults(Self::default()))
                .merge(Toml::file(path.as_ref()))
                .merge(
                    Env::prefixed("FOLIO_")
                        .ignore(&["CONFIG_FILE"])
                        .map(|key| key.as_str().to_lowercase().into())
                        .split("__"),
                ),
        )
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
