//! Errors raised by the tool layer itself.
//!
//! Worker and storage failures arrive as `folio_core::Error` and convert
//! directly; these cover problems with the tool call.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid input parameters (e.g., a malformed header).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The worker accepted a request but its reply never arrived.
    #[error("REPLY_DROPPED: {0}")]
    ReplyDropped(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let code = match &err {
            ToolError::InvalidInput(_) => -32602,
            ToolError::ReplyDropped(_) => -32603,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
