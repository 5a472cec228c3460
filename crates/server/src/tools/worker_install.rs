//! worker_install tool implementation.
//!
//! Runs the install step and, unless told otherwise, activation right
//! after it, the way a worker that skips waiting does.

use folio_client::{ActivationReport, InstallReport, Worker};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Input parameters for the worker_install tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerInstallParams {
    /// Activate immediately after a successful install (default: true).
    #[serde(default = "default_true")]
    pub activate: bool,
}

fn default_true() -> bool {
    true
}

/// Output structure for the worker_install tool.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerInstallOutput {
    pub install: InstallReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationReport>,
    pub state: String,
}

/// Implementation of the worker_install tool.
pub async fn install_impl(worker: &Worker, params: WorkerInstallParams) -> Result<CallToolResult, McpError> {
    let install = worker.install().await?;
    let activation = if params.activate { Some(worker.activate().await?) } else { None };

    json_result(&WorkerInstallOutput { install, activation, state: worker.state().to_string() })
}
