//! Single-owner access to the persisted analytics document.
//!
//! Every handler goes through [`AnalyticsStore`]; nothing else reads or
//! writes the analytics partition. Each call re-reads the document from
//! storage, so no state is assumed to survive between handlers.

use super::model::{AnalyticsLimits, AnalyticsLog, AnalyticsRecord};
use crate::Error;
use crate::cache::{CacheDb, CacheEntry};
use tokio::sync::Mutex;

/// Path under the worker origin where the document is stored.
pub const ANALYTICS_PATH: &str = "/analytics-data";

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Owner of the `AnalyticsLog` document.
///
/// Read-modify-write sequences are serialized by an async mutex, so two
/// appends issued concurrently from this process never overwrite each
/// other. Writers in other processes sharing the database file are not
/// coordinated and keep last-writer-wins semantics.
#[derive(Debug)]
pub struct AnalyticsStore {
    db: CacheDb,
    partition: String,
    key_url: String,
    limits: AnalyticsLimits,
    write_lock: Mutex<()>,
}

impl AnalyticsStore {
    /// Create a store for the given partition, keyed under `origin`.
    pub fn new(db: CacheDb, partition: impl Into<String>, origin: &str, limits: AnalyticsLimits) -> Self {
        let key_url = format!("{}{}", origin.trim_end_matches('/'), ANALYTICS_PATH);
        Self { db, partition: partition.into(), key_url, limits, write_lock: Mutex::new(()) }
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn limits(&self) -> &AnalyticsLimits {
        &self.limits
    }

    /// Write an empty document if none is stored yet.
    ///
    /// Returns true if a new document was written.
    pub async fn ensure_initialized(&self) -> Result<bool, Error> {
        let _guard = self.write_lock.lock().await;
        self.db.open_partition(&self.partition).await?;
        if self.db.match_entry(&self.partition, &self.key_url).await?.is_some() {
            return Ok(false);
        }
        self.write(&AnalyticsLog::empty(now_ms())).await?;
        tracing::debug!(partition = %self.partition, "analytics document initialized");
        Ok(true)
    }

    /// Append one record, stamped with the worker clock.
    pub async fn append(&self, mut record: AnalyticsRecord) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let now = now_ms();
        record.stamp(now);
        let kind = record.kind();

        let mut log = self.read().await?.unwrap_or_default();
        log.append(record, &self.limits, now);
        self.write(&log).await?;

        tracing::debug!(
            kind,
            visits = log.visits.len(),
            interactions = log.interactions.len(),
            skills_matching = log.skills_matching.len(),
            "analytics record appended"
        );
        Ok(())
    }

    /// A copy of the current document; empty if none is stored.
    pub async fn snapshot(&self) -> Result<AnalyticsLog, Error> {
        Ok(self.read().await?.unwrap_or_default())
    }

    /// Load the document, treating an unparseable one as absent.
    async fn read(&self) -> Result<Option<AnalyticsLog>, Error> {
        let Some(entry) = self.db.match_entry(&self.partition, &self.key_url).await? else {
            return Ok(None);
        };

        match serde_json::from_slice::<AnalyticsLog>(&entry.body) {
            Ok(log) => Ok(Some(log)),
            Err(e) => {
                let err = Error::AnalyticsCorrupt(e.to_string());
                tracing::warn!(error = %err, "discarding stored analytics document");
                Ok(None)
            }
        }
    }

    async fn write(&self, log: &AnalyticsLog) -> Result<(), Error> {
        let body = serde_json::to_vec(log).map_err(|e| Error::InvalidInput(format!("analytics document: {e}")))?;
        let entry = CacheEntry::new(
            self.key_url.clone(),
            200,
            vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
        );
        self.db.put_entry(&self.partition, &entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::model::{Interaction, SkillsMatch, Visit};
    use std::sync::Arc;

    const ORIGIN: &str = "https://bouba.test";

    async fn store(limits: AnalyticsLimits) -> AnalyticsStore {
        let db = CacheDb::open_in_memory().await.unwrap();
        AnalyticsStore::new(db, "analytics-data-v1.0.0", ORIGIN, limits)
    }

    fn visit(page: &str) -> AnalyticsRecord {
        AnalyticsRecord::Visit(Visit { page: Some(page.into()), ..Default::default() })
    }

    #[tokio::test]
    async fn test_snapshot_of_missing_document_is_empty() {
        let store = store(AnalyticsLimits::default()).await;
        let log = store.snapshot().await.unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_initialized_only_once() {
        let store = store(AnalyticsLimits::default()).await;
        assert!(store.ensure_initialized().await.unwrap());
        store.append(visit("/")).await.unwrap();
        assert!(!store.ensure_initialized().await.unwrap());
        assert_eq!(store.snapshot().await.unwrap().visits.len(), 1);
    }

    #[tokio::test]
    async fn test_visit_bound_keeps_latest_thousand() {
        let store = store(AnalyticsLimits::default()).await;
        for i in 0..1003 {
            store.append(visit(&format!("/p{i}"))).await.unwrap();
        }

        let log = store.snapshot().await.unwrap();
        assert_eq!(log.visits.len(), 1000);
        assert_eq!(log.visits.first().unwrap().page.as_deref(), Some("/p3"));
        assert_eq!(log.visits.last().unwrap().page.as_deref(), Some("/p1002"));
    }

    #[tokio::test]
    async fn test_append_stamps_last_update() {
        let store = store(AnalyticsLimits::default()).await;
        let before = now_ms();
        store
            .append(AnalyticsRecord::Visit(Visit { timestamp: 5, page: Some("/".into()), ..Default::default() }))
            .await
            .unwrap();

        let log = store.snapshot().await.unwrap();
        assert_eq!(log.visits.len(), 1);
        assert!(log.visits[0].timestamp >= before);
        assert!(log.last_update >= before);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_reinitialized() {
        let store = store(AnalyticsLimits::default()).await;
        let key = format!("{ORIGIN}{ANALYTICS_PATH}");
        store
            .db
            .put_entry(store.partition(), &CacheEntry::new(key, 200, vec![], b"{not json".to_vec()))
            .await
            .unwrap();

        assert!(store.snapshot().await.unwrap().is_empty());

        store.append(visit("/after")).await.unwrap();
        let log = store.snapshot().await.unwrap();
        assert_eq!(log.visits.len(), 1);
        assert_eq!(log.visits[0].page.as_deref(), Some("/after"));
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let store = Arc::new(store(AnalyticsLimits::default()).await);
        let mut handles = Vec::new();
        for i in 0..40 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store.append(visit("/")).await
                } else {
                    store.append(AnalyticsRecord::Interaction(Interaction::default())).await
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let log = store.snapshot().await.unwrap();
        assert_eq!(log.visits.len(), 20);
        assert_eq!(log.interactions.len(), 20);
    }

    #[tokio::test]
    async fn test_mixed_kinds_respect_their_own_bounds() {
        let limits = AnalyticsLimits { visits: 5, interactions: 3, skills_matching: 2 };
        let store = store(limits).await;
        for _ in 0..6 {
            store.append(visit("/")).await.unwrap();
            store.append(AnalyticsRecord::Interaction(Interaction::default())).await.unwrap();
            store.append(AnalyticsRecord::SkillsMatch(SkillsMatch::default())).await.unwrap();
        }

        let log = store.snapshot().await.unwrap();
        assert_eq!((log.visits.len(), log.interactions.len(), log.skills_matching.len()), (5, 3, 2));
    }
}
