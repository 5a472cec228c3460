//! Stale-while-revalidate: answer from the cache immediately and refresh
//! the stored copy in the background.

use super::{Strategy, StrategyContext};
use crate::request::{WorkerRequest, WorkerResponse};

/// Used for pages and everything not otherwise classified.
pub struct StaleWhileRevalidate;

async fn fetch_and_store(ctx: &StrategyContext, request: &WorkerRequest) -> Option<WorkerResponse> {
    match ctx.network.fetch(request).await {
        Ok(response) => {
            ctx.store(&ctx.partitions.dynamic, request, &response).await;
            Some(response)
        }
        Err(e) => {
            tracing::debug!(url = %request.url, error = %e, "revalidation failed");
            None
        }
    }
}

#[async_trait::async_trait]
impl Strategy for StaleWhileRevalidate {
    fn name(&self) -> &'static str {
        "stale-while-revalidate"
    }

    async fn handle(&self, ctx: &StrategyContext, request: &WorkerRequest) -> WorkerResponse {
        match ctx.lookup(request).await {
            Some(cached) => {
                let task_ctx = ctx.clone();
                let task_request = request.clone();
                ctx.background.spawn(async move {
                    fetch_and_store(&task_ctx, &task_request).await;
                });
                cached
            }
            None => fetch_and_store(ctx, request).await.unwrap_or_else(WorkerResponse::offline),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::request::ResponseSource;
    use crate::testing::ScriptedNetwork;
    use folio_core::CacheEntry;
    use reqwest::StatusCode;
    use std::sync::Arc;

    const PAGE: &str = "http://localhost:8080/rapid-prototypes";

    #[tokio::test]
    async fn test_miss_fetches_inline() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond(PAGE, 200, "v1");
        let ctx = context(network.clone()).await;

        let resp = StaleWhileRevalidate.handle(&ctx, &WorkerRequest::get(PAGE).unwrap()).await;
        assert_eq!(resp.source, ResponseSource::Network);
        assert_eq!(resp.text(), "v1");
        assert_eq!(ctx.background.pending(), 0);
    }

    #[tokio::test]
    async fn test_hit_returns_stale_then_refreshes() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond(PAGE, 200, "v1");
        let ctx = context(network.clone()).await;
        let req = WorkerRequest::get(PAGE).unwrap();

        StaleWhileRevalidate.handle(&ctx, &req).await;
        network.respond(PAGE, 200, "v2");

        let resp = StaleWhileRevalidate.handle(&ctx, &req).await;
        assert_eq!(resp.source, ResponseSource::Cache);
        assert_eq!(resp.text(), "v1");

        ctx.background.settle().await;
        assert_eq!(network.calls_for(PAGE), 2);

        let resp = StaleWhileRevalidate.handle(&ctx, &req).await;
        assert_eq!(resp.text(), "v2");
        ctx.background.settle().await;
    }

    #[tokio::test]
    async fn test_failed_revalidation_keeps_stale_copy() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond(PAGE, 200, "v1");
        let ctx = context(network.clone()).await;
        let req = WorkerRequest::get(PAGE).unwrap();

        StaleWhileRevalidate.handle(&ctx, &req).await;
        network.respond(PAGE, 500, "broken");
        StaleWhileRevalidate.handle(&ctx, &req).await;
        ctx.background.settle().await;

        network.set_offline(true);
        let resp = StaleWhileRevalidate.handle(&ctx, &req).await;
        assert_eq!(resp.text(), "v1");
        ctx.background.settle().await;
    }

    #[tokio::test]
    async fn test_offline_miss_is_placeholder() {
        let network = Arc::new(ScriptedNetwork::new());
        network.set_offline(true);
        let ctx = context(network).await;

        let resp = StaleWhileRevalidate.handle(&ctx, &WorkerRequest::get(PAGE).unwrap()).await;
        assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_fetched_inline() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond(PAGE, 200, "<html>fresh</html>");
        let ctx = context(network.clone()).await;
        let junk = CacheEntry::new(PAGE, 42, vec![], b"junk".to_vec());
        ctx.db.put_entry(&ctx.partitions.dynamic, &junk).await.unwrap();

        let resp = StaleWhileRevalidate.handle(&ctx, &WorkerRequest::get(PAGE).unwrap()).await;
        assert_eq!(resp.source, ResponseSource::Network);
        assert_eq!(resp.text(), "<html>fresh</html>");
        assert_eq!(ctx.background.pending(), 0);
        assert_eq!(network.calls_for(PAGE), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_still_returns_network_response() {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond(PAGE, 200, "<html>fresh</html>");
        let ctx = context(network.clone()).await;
        ctx.db.clone().close().await.unwrap();

        let resp = StaleWhileRevalidate.handle(&ctx, &WorkerRequest::get(PAGE).unwrap()).await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.text(), "<html>fresh</html>");
        assert_eq!(ctx.background.pending(), 0);
    }
}
