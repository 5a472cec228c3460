//! MCP tool implementations.
//!
//! Each tool drives the shared `Worker` the way a page or the browser
//! would: issuing requests, posting messages, or triggering lifecycle and
//! sync events.

pub mod analytics_sync;
pub mod worker_fetch;
pub mod worker_install;
pub mod worker_message;
pub mod worker_status;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use folio_core::Error;

/// Serialize a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
