//! Planner client: one report per finished test plan.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::http::{check_status, endpoint};
use crate::domain::ports::{ClientError, Planner, PlannerReport};

pub struct PlannerClient {
    http: Client,
    base_url: String,
}

impl PlannerClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Planner for PlannerClient {
    #[instrument(skip(self, report), fields(plan_id = %report.test_plan_uuid, status = %report.status))]
    async fn notify(&self, path: &str, report: &PlannerReport) -> Result<(), ClientError> {
        let url = endpoint(&self.base_url, path)?;
        debug!(%url, "sending planner report");
        check_status(self.http.post(url).json(report).send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{TestPlanStatus, TestResultSummary, TestStatus};
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn report() -> PlannerReport {
        PlannerReport {
            event_actor: "Curator".into(),
            test_plan_uuid: "p-1".into(),
            status: TestPlanStatus::Completed,
            test_results: vec![TestResultSummary {
                test_uuid: "t-1".into(),
                results_uuid: Some("r-1".into()),
                test_status: TestStatus::Completed,
            }],
            exception: None,
        }
    }

    #[tokio::test]
    async fn test_report_wire_format() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/test-plans/on-change/completed")
            .match_body(Matcher::Json(json!({
                "event_actor": "Curator",
                "test_plan_uuid": "p-1",
                "status": "COMPLETED",
                "test_results": [
                    {"test_uuid": "t-1", "results_uuid": "r-1", "test_status": "COMPLETED"}
                ]
            })))
            .with_status(200)
            .create_async()
            .await;

        let client = PlannerClient::new(Client::new(), server.url());
        client
            .notify("/api/v1/test-plans/on-change/completed", &report())
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_absolute_callback_url_used_verbatim() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/elsewhere")
            .with_status(204)
            .create_async()
            .await;

        let client = PlannerClient::new(Client::new(), "http://unused.invalid");
        client
            .notify(&format!("{}/elsewhere", server.url()), &report())
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_planner_error_status() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/cb")
            .with_status(500)
            .create_async()
            .await;

        let client = PlannerClient::new(Client::new(), server.url());
        let err = client.notify("/cb", &report()).await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 500, .. }));
    }
}
