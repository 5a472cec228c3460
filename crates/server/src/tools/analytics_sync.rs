//! analytics_sync tool implementation.
//!
//! Fires a background sync event at the worker.

use folio_client::{ANALYTICS_SYNC_TAG, Worker};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Input parameters for the analytics_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalyticsSyncParams {
    /// Sync tag (default: "analytics-sync").
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_tag() -> String {
    ANALYTICS_SYNC_TAG.into()
}

/// Output structure for the analytics_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalyticsSyncOutput {
    pub tag: String,
    /// False when the worker has no handler for the tag.
    pub handled: bool,
}

/// Implementation of the analytics_sync tool.
pub async fn sync_impl(worker: &Worker, params: AnalyticsSyncParams) -> Result<CallToolResult, McpError> {
    let handled = worker.sync(&params.tag).await?;
    json_result(&AnalyticsSyncOutput { tag: params.tag, handled })
}
