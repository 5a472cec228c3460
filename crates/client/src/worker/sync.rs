//! Background sync of the analytics log.
//!
//! Forwarding to a remote collector is left to the embedder: the worker
//! hands a snapshot to an [`AnalyticsSink`] and the default sink only logs.

use folio_core::{AnalyticsLog, Error};

use super::Worker;

/// Sync tag that triggers analytics delivery.
pub const ANALYTICS_SYNC_TAG: &str = "analytics-sync";

/// Destination for synced analytics.
#[async_trait::async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn deliver(&self, log: &AnalyticsLog) -> Result<(), Error>;
}

/// Logs a summary of the snapshot and nothing else.
pub struct LogSink;

#[async_trait::async_trait]
impl AnalyticsSink for LogSink {
    async fn deliver(&self, log: &AnalyticsLog) -> Result<(), Error> {
        let last_update = chrono::DateTime::from_timestamp_millis(log.last_update)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        tracing::info!(
            visits = log.visits.len(),
            interactions = log.interactions.len(),
            skills_matching = log.skills_matching.len(),
            last_update = %last_update,
            "analytics sync"
        );
        Ok(())
    }
}

impl Worker {
    /// Run a background sync for `tag`.
    ///
    /// Returns false for tags the worker does not handle.
    pub async fn sync(&self, tag: &str) -> Result<bool, Error> {
        if tag != ANALYTICS_SYNC_TAG {
            tracing::debug!(tag, "ignoring unknown sync tag");
            return Ok(false);
        }
        let log = self.analytics.snapshot().await?;
        self.sink.deliver(&log).await?;
        Ok(true)
    }
}
