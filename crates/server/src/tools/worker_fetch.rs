//! worker_fetch tool implementation.
//!
//! Issues a request as a controlled page would and reports how the worker
//! answered it.

use std::collections::BTreeMap;

use folio_client::request::ResponseSource;
use folio_client::{Route, Worker, WorkerRequest};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;

/// Input parameters for the worker_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerFetchParams {
    /// The URL to request. Paths without a scheme resolve against the worker origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Include the response body as text (default: true).
    #[serde(default = "default_true")]
    pub include_body: bool,
}

fn default_method() -> String {
    "GET".into()
}

fn default_true() -> bool {
    true
}

/// Output structure for the worker_fetch tool.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerFetchOutput {
    pub url: String,
    pub route: Route,
    pub status: u16,
    pub source: ResponseSource,
    pub content_type: Option<String>,
    pub bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn build_request(worker: &Worker, params: &WorkerFetchParams) -> Result<WorkerRequest, McpError> {
    let url = if params.url.starts_with('/') {
        worker
            .origin()
            .join(&params.url)
            .map_err(|e| ToolError::InvalidInput(format!("url {}: {e}", params.url)))?
            .to_string()
    } else {
        params.url.clone()
    };

    let mut request = WorkerRequest::with_method_name(&params.method, &url)?;
    for (name, value) in &params.headers {
        request = request.with_header(name, value)?;
    }
    Ok(request)
}

/// Implementation of the worker_fetch tool.
pub async fn fetch_impl(worker: &Worker, params: WorkerFetchParams) -> Result<CallToolResult, McpError> {
    let request = build_request(worker, &params)?;
    let route = worker.route(&request);
    let response = worker.fetch(&request).await;

    let output = WorkerFetchOutput {
        url: request.url.to_string(),
        route,
        status: response.status.as_u16(),
        source: response.source,
        content_type: response.content_type().map(str::to_string),
        bytes: response.body.len(),
        body: params.include_body.then(|| response.text()),
    };
    json_result(&output)
}
