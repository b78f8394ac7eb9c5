//! Platform adapter client (service platform manager).

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use super::http::{check_status, endpoint, RetryPolicy};
use crate::domain::models::{normalize_platform_type, ServicePlatform};
use crate::domain::ports::{ClientError, InstantiationAck, InstantiationRequest, PlatformAdapter};

pub struct PlatformAdapterClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

/// Body of `POST adapters/instantiate_service`
#[derive(Debug, Serialize)]
struct InstantiateBody<'a> {
    service_name: &'a str,
    service_vendor: &'a str,
    service_version: &'a str,
    service_platform: &'a str,
    instance_name: &'a str,
    callback: &'a str,
}

impl PlatformAdapterClient {
    pub fn new(http: Client, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            retry,
        }
    }
}

#[async_trait]
impl PlatformAdapter for PlatformAdapterClient {
    #[instrument(skip(self))]
    async fn available_platforms(
        &self,
        platform_type: &str,
    ) -> Result<Vec<ServicePlatform>, ClientError> {
        let url = endpoint(&self.base_url, "service_platforms")?;
        let http = &self.http;
        let url = &url;
        let platforms: Vec<ServicePlatform> = self
            .retry
            .execute(move || async move {
                let response = check_status(http.get(url.clone()).send().await?).await?;
                Ok(response.json::<Vec<ServicePlatform>>().await?)
            })
            .await?;

        let wanted = normalize_platform_type(platform_type);
        let pool: Vec<ServicePlatform> = platforms
            .into_iter()
            .filter(|p| normalize_platform_type(&p.platform_type) == wanted)
            .collect();
        debug!(platform_type = %wanted, available = pool.len(), "service platforms listed");
        Ok(pool)
    }

    #[instrument(skip(self, request), fields(instance = %request.instance_name, platform = %request.platform_name))]
    async fn instantiate(
        &self,
        request: &InstantiationRequest,
    ) -> Result<InstantiationAck, ClientError> {
        let url = endpoint(&self.base_url, "adapters/instantiate_service")?;
        let body = InstantiateBody {
            service_name: &request.service.name,
            service_vendor: &request.service.vendor,
            service_version: &request.service.version,
            service_platform: &request.platform_name,
            instance_name: &request.instance_name,
            callback: &request.callback_url,
        };

        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        let doc: Option<Value> = serde_json::from_str(&text).ok();

        // the adapter reports refusals as `{error: ...}`, sometimes with a 2xx
        let reported_error = doc
            .as_ref()
            .and_then(|d| d.get("error"))
            .filter(|e| !e.is_null() && e.as_str() != Some("") && e.as_bool() != Some(false));
        match (status.is_success(), reported_error) {
            (_, Some(error)) => Ok(InstantiationAck {
                error: Some(error.as_str().map_or_else(|| error.to_string(), str::to_string)),
                package_id: None,
            }),
            (true, None) => {
                let ack = doc
                    .map(serde_json::from_value::<InstantiationAck>)
                    .transpose()?
                    .unwrap_or_default();
                info!(package_id = ?ack.package_id, "instantiation accepted");
                Ok(ack)
            }
            (false, None) => Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            }),
        }
    }

    #[instrument(skip(self))]
    async fn terminate(&self, platform_name: &str, instance_uuid: &str) -> Result<(), ClientError> {
        let url = endpoint(
            &self.base_url,
            &format!("adapters/{platform_name}/instantiations/terminate"),
        )?;
        let body = json!({
            "instance_uuid": instance_uuid,
            "request_type": "TERMINATE_SERVICE",
        });
        check_status(self.http.post(url).json(&body).send().await?).await?;
        info!("termination requested");
        Ok(())
    }
}
