//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not an absolute http(s) URL
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `user_agent` is empty
    /// - a partition name is empty or two partitions share a name
    /// - any analytics bound is 0
    ///
    /// Returns `ConfigError::Missing` if the manifest is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") && origin.host_str().is_some() => {}
            _ => {
                return Err(ConfigError::Invalid {
                    field: "origin".into(),
                    reason: format!("{:?} is not an absolute http(s) URL", self.origin),
                });
            }
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        let names = [
            ("partitions.dynamic", &self.partitions.dynamic),
            ("partitions.static_resources", &self.partitions.static_resources),
            ("partitions.analytics", &self.partitions.analytics),
        ];
        for (field, name) in names {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must not be empty".into() });
            }
        }
        if self.partitions.dynamic == self.partitions.static_resources
            || self.partitions.dynamic == self.partitions.analytics
            || self.partitions.static_resources == self.partitions.analytics
        {
            return Err(ConfigError::Invalid { field: "partitions".into(), reason: "names must be distinct".into() });
        }

        if self.limits.visits == 0 || self.limits.interactions == 0 || self.limits.skills_matching == 0 {
            return Err(ConfigError::Invalid { field: "limits".into(), reason: "bounds must be greater than 0".into() });
        }

        if self.manifest.is_empty() {
            return Err(ConfigError::Missing {
                field: "manifest".into(),
                hint: "list at least the root document, e.g. [\"/\"]".into(),
            });
        }

        if self.cdn_hosts.is_empty() {
            tracing::warn!("cdn_hosts is empty; third-party assets will only be cached when listed in the manifest");
        }

        Ok(())
    }
}
