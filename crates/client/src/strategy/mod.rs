//! Cache strategies for intercepted requests.
//!
//! ### Selection
//! - `classify` maps each request to a `RequestClass`.
//! - `StrategyTable` maps each class to a `Strategy`; the defaults are
//!   cache-first for static assets, network-first for dynamic content and
//!   stale-while-revalidate for everything else.
//!
//! ### Failure contract
//! - `Strategy::handle` is infallible. Network and storage failures are
//!   logged and turned into a cached copy or the synthetic offline response.

pub mod cache_first;
pub mod classify;
pub mod network_first;
pub mod stale_while_revalidate;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use folio_core::{CacheDb, PartitionNames};
use tokio::task::JoinSet;
use url::Url;

pub use cache_first::CacheFirst;
pub use classify::{RequestClass, classify};
pub use network_first::NetworkFirst;
pub use stale_while_revalidate::StaleWhileRevalidate;

use crate::fetch::Network;
use crate::request::{WorkerRequest, WorkerResponse};

/// Work that outlives the response it was started for.
///
/// The equivalent of extending an event's lifetime: tasks run detached,
/// and `settle` waits for every task spawned so far (and any they spawn).
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Number of tasks not yet reaped.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Wait until no background task is running.
    pub async fn settle(&self) {
        loop {
            let mut drained = std::mem::take(&mut *self.lock());
            if drained.is_empty() {
                return;
            }
            while let Some(result) = drained.join_next().await {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "background task failed");
                }
            }
        }
    }
}

/// Everything a strategy needs to serve a request.
#[derive(Clone)]
pub struct StrategyContext {
    pub db: CacheDb,
    pub network: Arc<dyn Network>,
    pub partitions: PartitionNames,
    pub origin: Url,
    pub background: BackgroundTasks,
}

impl StrategyContext {
    /// Look up a cached response for the request in any partition.
    ///
    /// Storage errors and undecodable entries are logged and count as a miss.
    pub async fn lookup(&self, request: &WorkerRequest) -> Option<WorkerResponse> {
        if !request.is_cacheable() {
            return None;
        }
        self.lookup_url(&request.url).await
    }

    pub async fn lookup_url(&self, url: &Url) -> Option<WorkerResponse> {
        match self.db.match_any(url.as_str()).await {
            Ok(Some(entry)) => match WorkerResponse::from_entry(entry) {
                Ok(response) => Some(response),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "ignoring undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Store a copy of a successful response in `partition`.
    ///
    /// Non-2xx responses and non-GET requests are never stored. Write
    /// failures are logged and otherwise ignored.
    pub async fn store(&self, partition: &str, request: &WorkerRequest, response: &WorkerResponse) {
        if !request.is_cacheable() || !response.is_ok() {
            return;
        }
        if let Err(e) = self.db.put_entry(partition, &response.to_entry(&request.url)).await {
            tracing::warn!(partition, url = %request.url, error = %e, "cache write failed");
        }
    }
}

/// One way of answering an intercepted request.
#[async_trait::async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce a response. Never fails.
    async fn handle(&self, ctx: &StrategyContext, request: &WorkerRequest) -> WorkerResponse;
}

/// Lookup table from request class to strategy.
pub struct StrategyTable {
    static_assets: Arc<dyn Strategy>,
    dynamic: Arc<dyn Strategy>,
    fallback: Arc<dyn Strategy>,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self {
            static_assets: Arc::new(CacheFirst),
            dynamic: Arc::new(NetworkFirst),
            fallback: Arc::new(StaleWhileRevalidate),
        }
    }
}

impl StrategyTable {
    /// Replace the strategy used for one class.
    pub fn with(mut self, class: RequestClass, strategy: Arc<dyn Strategy>) -> Self {
        match class {
            RequestClass::Static => self.static_assets = strategy,
            RequestClass::Dynamic => self.dynamic = strategy,
            RequestClass::Default => self.fallback = strategy,
        }
        self
    }

    pub fn get(&self, class: RequestClass) -> &Arc<dyn Strategy> {
        match class {
            RequestClass::Static => &self.static_assets,
            RequestClass::Dynamic => &self.dynamic,
            RequestClass::Default => &self.fallback,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::testing::ScriptedNetwork;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_table() {
        let table = StrategyTable::default();
        assert_eq!(table.get(RequestClass::Static).name(), "cache-first");
        assert_eq!(table.get(RequestClass::Dynamic).name(), "network-first");
        assert_eq!(table.get(RequestClass::Default).name(), "stale-while-revalidate");
    }

    #[test]
    fn test_table_override() {
        let table = StrategyTable::default().with(RequestClass::Default, Arc::new(NetworkFirst));
        assert_eq!(table.get(RequestClass::Default).name(), "network-first");
        assert_eq!(table.get(RequestClass::Static).name(), "cache-first");
    }

    #[tokio::test]
    async fn test_store_skips_errors_and_non_get() {
        let network = Arc::new(ScriptedNetwork::new());
        let ctx = context(network.clone()).await;
        network.respond("http://localhost:8080/missing", 404, "nope");

        let req = WorkerRequest::get("http://localhost:8080/missing").unwrap();
        let resp = ctx.network.fetch(&req).await.unwrap();
        ctx.store("p", &req, &resp).await;
        assert!(ctx.lookup(&req).await.is_none());

        let post = WorkerRequest::with_method_name("POST", "http://localhost:8080/missing").unwrap();
        let ok = WorkerResponse { status: reqwest::StatusCode::OK, ..resp };
        ctx.store("p", &post, &ok).await;
        assert!(ctx.lookup(&req).await.is_none());
    }

    #[tokio::test]
    async fn test_background_settle_waits_for_tasks() {
        let tasks = BackgroundTasks::default();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = done.clone();
            tasks.spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        tasks.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        assert_eq!(tasks.pending(), 0);
    }
}
