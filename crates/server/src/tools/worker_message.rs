//! worker_message tool implementation.
//!
//! Posts one protocol message to the worker. A reply port is always
//! attached; only `GET_ANALYTICS` uses it.

use folio_client::{IgnoreReason, MessageEvent, MessageOutcome, Worker};
use folio_core::AnalyticsLog;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::json_result;
use crate::error::ToolError;

/// Input parameters for the worker_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerMessageParams {
    /// The message envelope, e.g. `{"type": "TRACK_VISIT", "data": {"page": "/"}}`.
    pub message: serde_json::Value,

    /// Origin of the sending page (default: the worker's own origin).
    #[serde(default)]
    pub origin: Option<String>,
}

/// Output structure for the worker_message tool.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerMessageOutput {
    /// "recorded", "replied" or "ignored".
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<IgnoreReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<AnalyticsLog>,
}

/// Implementation of the worker_message tool.
pub async fn message_impl(worker: &Worker, params: WorkerMessageParams) -> Result<CallToolResult, McpError> {
    let origin = params
        .origin
        .unwrap_or_else(|| worker.origin().origin().ascii_serialization());
    let (reply_tx, reply_rx) = oneshot::channel();

    let event = MessageEvent::new(origin, params.message).with_reply(reply_tx);
    let outcome = worker.handle_message(event).await;

    let output = match outcome {
        MessageOutcome::Recorded => WorkerMessageOutput { outcome: "recorded", reason: None, reply: None },
        MessageOutcome::Replied => {
            let log = reply_rx
                .await
                .map_err(|_| ToolError::ReplyDropped("GET_ANALYTICS reply was not sent".into()))?;
            WorkerMessageOutput { outcome: "replied", reason: None, reply: Some(log) }
        }
        MessageOutcome::Ignored(reason) => WorkerMessageOutput { outcome: "ignored", reason: Some(reason), reply: None },
    };

    json_result(&output)
}
