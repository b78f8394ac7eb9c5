use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ports::errors::ClientError;

/// A named callback handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionCallback {
    pub name: String,
    pub path: String,
}

/// Immediate answer of the executor to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionAck {
    #[serde(alias = "test-uuid", alias = "test_id")]
    pub test_uuid: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Port for the test executor
#[async_trait]
pub trait Executor: Send + Sync {
    /// Submit a resolved test descriptor instance for execution
    async fn submit(
        &self,
        plan_id: &str,
        test: &Value,
        callbacks: &[ExecutionCallback],
    ) -> Result<ExecutionAck, ClientError>;

    /// Ask the executor to stop a test; acknowledgement arrives via `cancel` callback
    async fn cancel(
        &self,
        plan_id: &str,
        test_id: &str,
        callbacks: &[ExecutionCallback],
    ) -> Result<(), ClientError>;
}
