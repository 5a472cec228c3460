//! The offline worker.
//!
//! ### Responsibilities
//! - Lifecycle: install pre-populates partitions, activate deletes stale
//!   ones and claims connected pages (see `lifecycle`).
//! - Interception: every request from a page goes through [`Worker::fetch`],
//!   which either passes it to the network or hands it to a strategy.
//! - Messages: analytics tracking and snapshots (see `messages`).
//! - Background sync of analytics (see `sync`).
//!
//! ### Interception scope
//! - Nothing is intercepted until a partition set has been activated,
//!   here or by an earlier process. Once serving, the worker keeps
//!   intercepting through any later install, failed or not.
//! - Same-origin requests, manifest entries and CDN hosts are intercepted;
//!   any other cross-origin request passes through untouched.
//! - [`Worker::fetch`] never fails: a pass-through transport error becomes
//!   the synthetic offline response.

pub mod clients;
pub mod lifecycle;
pub mod messages;
pub mod sync;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use folio_core::{AnalyticsStore, AppConfig, CacheDb, Error, PartitionInfo};
use serde::Serialize;
use tokio::sync::watch;
use url::Url;

pub use clients::{ClientHandle, ClientId, ClientInfo, ClientMessage};
pub use lifecycle::{ACTIVATED_MESSAGE, ActivationReport, InstallReport, WorkerState};
pub use messages::{IgnoreReason, MessageEvent, MessageOutcome, ReplyPort, WorkerMessage};
pub use sync::{ANALYTICS_SYNC_TAG, AnalyticsSink, LogSink};

use crate::fetch::{Network, canonicalize, resolve, same_origin};
use crate::request::{WorkerRequest, WorkerResponse};
use crate::strategy::classify::is_cdn_host;
use crate::strategy::{BackgroundTasks, RequestClass, Strategy, StrategyContext, StrategyTable, classify};
use clients::ClientRegistry;

/// How an intercepted request will be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "route", content = "class", rename_all = "snake_case")]
pub enum Route {
    /// Sent to the network as if no worker were installed.
    Passthrough,
    Strategy(RequestClass),
}

/// Snapshot of the worker for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    /// An activated partition set is answering intercepted requests.
    pub serving: bool,
    pub origin: String,
    pub partitions: Vec<PartitionInfo>,
    pub clients: Vec<ClientInfo>,
    pub pending_background: usize,
}

pub struct Worker {
    origin: Url,
    manifest: Vec<Url>,
    cdn_hosts: Vec<String>,
    ctx: StrategyContext,
    strategies: StrategyTable,
    analytics: AnalyticsStore,
    clients: ClientRegistry,
    state: watch::Sender<WorkerState>,
    serving: AtomicBool,
    sink: Arc<dyn AnalyticsSink>,
}

impl Worker {
    /// Build a worker in the `Parsed` state.
    ///
    /// # Errors
    ///
    /// `INVALID_URL` if the origin or a manifest entry cannot be parsed.
    pub fn new(config: &AppConfig, db: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let origin =
            canonicalize(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin {}: {e}", config.origin)))?;
        let manifest = config
            .manifest
            .iter()
            .map(|entry| resolve(&origin, entry).map_err(|e| Error::InvalidUrl(format!("manifest entry {entry}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;

        let analytics = AnalyticsStore::new(db.clone(), config.partitions.analytics.clone(), origin.as_str(), config.limits);
        let ctx = StrategyContext {
            db,
            network,
            partitions: config.partitions.clone(),
            origin: origin.clone(),
            background: BackgroundTasks::default(),
        };

        Ok(Self {
            origin,
            manifest,
            cdn_hosts: config.cdn_hosts.clone(),
            ctx,
            strategies: StrategyTable::default(),
            analytics,
            clients: ClientRegistry::default(),
            state: watch::Sender::new(WorkerState::Parsed),
            serving: AtomicBool::new(false),
            sink: Arc::new(LogSink),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the strategy used for one request class.
    pub fn with_strategy(mut self, class: RequestClass, strategy: Arc<dyn Strategy>) -> Self {
        self.strategies = self.strategies.with(class, strategy);
        self
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Whether intercepted requests are answered from the partitions.
    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    pub fn analytics(&self) -> &AnalyticsStore {
        &self.analytics
    }

    pub fn db(&self) -> &CacheDb {
        &self.ctx.db
    }

    /// Register a page context. Pages opened while the worker is serving are
    /// controlled immediately.
    pub fn connect(&self, url: &str) -> ClientHandle {
        let controlled = self.is_serving();
        self.clients.connect(url, controlled)
    }

    pub fn disconnect(&self, id: ClientId) -> bool {
        self.clients.disconnect(id)
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.clients.list()
    }

    fn in_scope(&self, url: &Url) -> bool {
        same_origin(url, &self.origin)
            || self.manifest.contains(url)
            || url.host_str().is_some_and(|host| is_cdn_host(host, &self.cdn_hosts))
    }

    /// Decide how a request would be answered right now.
    pub fn route(&self, request: &WorkerRequest) -> Route {
        if !self.is_serving() || !self.in_scope(&request.url) {
            return Route::Passthrough;
        }
        Route::Strategy(classify(request, &self.cdn_hosts))
    }

    /// Answer a request issued by a page. Never fails.
    pub async fn fetch(&self, request: &WorkerRequest) -> WorkerResponse {
        match self.route(request) {
            Route::Passthrough => match self.ctx.network.fetch(request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(url = %request.url, error = %e, "pass-through fetch failed");
                    WorkerResponse::offline()
                }
            },
            Route::Strategy(class) => {
                let strategy = self.strategies.get(class);
                tracing::debug!(url = %request.url, ?class, strategy = strategy.name(), "intercepted");
                strategy.handle(&self.ctx, request).await
            }
        }
    }

    /// Wait for background revalidation started by earlier fetches.
    pub async fn settle(&self) {
        self.ctx.background.settle().await;
    }

    pub async fn status(&self) -> Result<WorkerStatus, Error> {
        Ok(WorkerStatus {
            state: self.state(),
            serving: self.is_serving(),
            origin: self.origin.to_string(),
            partitions: self.ctx.db.partition_stats().await?,
            clients: self.clients(),
            pending_background: self.ctx.background.pending(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::request::ResponseSource;
    use reqwest::StatusCode;

    #[tokio::test]
    async fn test_new_resolves_manifest() {
        let worker = worker(site()).await;
        let manifest: Vec<&str> = worker.manifest().iter().map(Url::as_str).collect();
        assert_eq!(manifest, MANIFEST);
        assert_eq!(worker.state(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_new_rejects_bad_origin() {
        let config = AppConfig { origin: "ftp://localhost".into(), ..config() };
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(matches!(Worker::new(&config, db, site()), Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_nothing_intercepted_before_activation() {
        let worker = worker(site()).await;
        let req = WorkerRequest::get("http://localhost:8080/styles.css").unwrap();
        assert_eq!(worker.route(&req), Route::Passthrough);

        let resp = worker.fetch(&req).await;
        assert_eq!(resp.source, ResponseSource::Network);
    }

    #[tokio::test]
    async fn test_routes_after_activation() {
        let worker = worker(site()).await;
        worker.start().await.unwrap();

        let route = |url: &str| worker.route(&WorkerRequest::get(url).unwrap());
        assert_eq!(route("http://localhost:8080/styles.css"), Route::Strategy(RequestClass::Static));
        assert_eq!(route("http://localhost:8080/api/projects"), Route::Strategy(RequestClass::Dynamic));
        assert_eq!(route("http://localhost:8080/"), Route::Strategy(RequestClass::Default));
        assert_eq!(route("https://fonts.googleapis.com/css2?family=Rajdhani"), Route::Strategy(RequestClass::Static));
        assert_eq!(route("https://www.google-analytics.com/collect"), Route::Passthrough);
    }

    #[tokio::test]
    async fn test_activated_worker_serves_offline() {
        let network = site();
        let worker = worker(network.clone()).await;
        worker.start().await.unwrap();
        network.set_offline(true);

        let resp = worker.fetch(&WorkerRequest::get("http://localhost:8080/styles.css").unwrap()).await;
        assert_eq!(resp.source, ResponseSource::Cache);
        assert_eq!(resp.text(), "body{}");

        let resp = worker.fetch(&WorkerRequest::get("http://localhost:8080/").unwrap()).await;
        assert_eq!(resp.text(), "<html>home</html>");
        worker.settle().await;

        let resp = worker.fetch(&WorkerRequest::get("http://localhost:8080/api/projects").unwrap()).await;
        assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_passthrough_failure_is_offline_response() {
        let network = site();
        let worker = worker(network.clone()).await;
        worker.start().await.unwrap();
        network.fail("https://www.google-analytics.com/collect");

        let resp = worker.fetch(&WorkerRequest::get("https://www.google-analytics.com/collect").unwrap()).await;
        assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.source, ResponseSource::Synthetic);
    }

    #[tokio::test]
    async fn test_page_refresh_is_revalidated_in_background() {
        let network = site();
        let worker = worker(network.clone()).await;
        worker.start().await.unwrap();
        network.respond(MANIFEST[0], 200, "<html>home v2</html>");

        let req = WorkerRequest::get(MANIFEST[0]).unwrap();
        assert_eq!(worker.fetch(&req).await.text(), "<html>home</html>");
        worker.settle().await;
        assert_eq!(worker.fetch(&req).await.text(), "<html>home v2</html>");
        worker.settle().await;
    }

    #[tokio::test]
    async fn test_status_reports_partitions_and_clients() {
        let worker = worker(site()).await;
        let _page = worker.connect("http://localhost:8080/");
        worker.start().await.unwrap();

        let status = worker.status().await.unwrap();
        assert_eq!(status.state, WorkerState::Activated);
        assert_eq!(status.partitions.len(), 3);
        assert_eq!(status.clients.len(), 1);
        assert!(status.clients[0].controlled);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "activated");
    }
}
