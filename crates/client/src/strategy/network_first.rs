//! Network-first: always try the network, fall back to the last stored copy.

use super::{Strategy, StrategyContext};
use crate::request::{WorkerRequest, WorkerResponse};

/// Used for API and analytics traffic and for non-GET requests.
pub struct NetworkFirst;

#[async_trait::async_trait]
impl Strategy for NetworkFirst {
    fn name(&self) -> &'static str {
        "network-first"
    }

    async fn handle(&self, ctx: &StrategyContext, request: &WorkerRequest) -> WorkerResponse {
        match ctx.network.fetch(request).await {
            Ok(response) => {
                ctx.store(&ctx.partitions.dynamic, request, &response).await;
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "network-first falling back to cache");
                ctx.lookup(request).await.unwrap_or_else(WorkerResponse::offline)
            }
        }
    }
}
