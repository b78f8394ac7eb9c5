use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::{TestPlanStatus, TestResultSummary};
use crate::domain::ports::errors::ClientError;

/// Final report sent to the planner once per test plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerReport {
    pub event_actor: String,
    pub test_plan_uuid: String,
    pub status: TestPlanStatus,
    pub test_results: Vec<TestResultSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

/// Port for the planner that requested the test plan
#[async_trait]
pub trait Planner: Send + Sync {
    /// `path` is either absolute or relative to the planner base URL
    async fn notify(&self, path: &str, report: &PlannerReport) -> Result<(), ClientError>;
}
