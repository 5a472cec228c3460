//! worker_status tool implementation.

use folio_client::Worker;
use rmcp::{ErrorData as McpError, model::CallToolResult};

use super::json_result;

/// Implementation of the worker_status tool.
pub async fn status_impl(worker: &Worker) -> Result<CallToolResult, McpError> {
    let status = worker.status().await?;
    json_result(&status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{offline_worker, output};

    #[tokio::test]
    async fn test_status_of_fresh_worker() {
        let worker = offline_worker().await;
        let json = output(&status_impl(&worker).await.unwrap());
        assert_eq!(json["state"], "parsed");
        assert_eq!(json["serving"], false);
        assert_eq!(json["origin"], "http://localhost:8080/");
        assert_eq!(json["partitions"].as_array().unwrap().len(), 0);
    }
}
