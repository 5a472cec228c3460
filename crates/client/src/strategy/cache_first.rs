//! Cache-first: serve a stored copy, go to the network only on a miss.

use super::{Strategy, StrategyContext};
use crate::request::{WorkerRequest, WorkerResponse};

/// Fallback documents tried, in order, when a static asset is neither
/// cached nor reachable.
const FALLBACK_DOCUMENTS: [&str; 2] = ["/index.html", "/"];

/// Used for static assets.
pub struct CacheFirst;

#[async_trait::async_trait]
impl Strategy for CacheFirst {
    fn name(&self) -> &'static str {
        "cache-first"
    }

    async fn handle(&self, ctx: &StrategyContext, request: &WorkerRequest) -> WorkerResponse {
        if let Some(cached) = ctx.lookup(request).await {
            tracing::trace!(url = %request.url, "cache-first hit");
            return cached;
        }

        match ctx.network.fetch(request).await {
            Ok(response) => {
                ctx.store(&ctx.partitions.static_resources, request, &response).await;
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "cache-first network failure");
                if let Some(cached) = ctx.lookup(request).await {
                    return cached;
                }
                for path in FALLBACK_DOCUMENTS {
                    if let Ok(url) = ctx.origin.join(path)
                        && let Some(document) = ctx.lookup_url(&url).await
                    {
                        return document;
                    }
                }
                WorkerResponse::offline()
            }
        }
    }
}
