//! Test executor client (`/api/v1/test-executions`).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::http::{check_status, endpoint};
use crate::domain::ports::{ClientError, ExecutionAck, ExecutionCallback, Executor};

pub struct ExecutorClient {
    http: Client,
    base_url: String,
}

impl ExecutorClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Executor for ExecutorClient {
    #[instrument(skip(self, test, callbacks))]
    async fn submit(
        &self,
        plan_id: &str,
        test: &Value,
        callbacks: &[ExecutionCallback],
    ) -> Result<ExecutionAck, ClientError> {
        let url = endpoint(&self.base_url, "api/v1/test-executions")?;
        let body = json!({ "test": test, "callbacks": callbacks });

        let response = check_status(self.http.post(url).json(&body).send().await?).await?;
        if response.status() != StatusCode::ACCEPTED {
            let status = response.status().as_u16();
            return Err(ClientError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }
        let ack: ExecutionAck = response.json().await?;
        info!(test_id = %ack.test_uuid, "test execution accepted");
        Ok(ack)
    }

    #[instrument(skip(self, callbacks))]
    async fn cancel(
        &self,
        plan_id: &str,
        test_id: &str,
        callbacks: &[ExecutionCallback],
    ) -> Result<(), ClientError> {
        let url = endpoint(
            &self.base_url,
            &format!("api/v1/test-executions/{test_id}/cancel"),
        )?;
        let cancel: Vec<&ExecutionCallback> =
            callbacks.iter().filter(|c| c.name == "cancel").collect();
        let body = json!({ "callbacks": cancel });

        check_status(self.http.post(url).json(&body).send().await?).await?;
        info!("test cancellation requested");
        Ok(())
    }
}
