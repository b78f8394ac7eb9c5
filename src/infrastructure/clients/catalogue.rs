//! V&V catalogue client (`/api/v2`).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

use super::http::{check_status, endpoint, RetryPolicy};
use crate::domain::models::{DescriptorIdentity, NetworkServiceDescriptor, TestDescriptor};
use crate::domain::ports::{Catalogue, CatalogueEntry, ClientError};

pub struct CatalogueClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl CatalogueClient {
    pub fn new(http: Client, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            retry,
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ClientError> {
        let url = endpoint(&self.base_url, path)?;
        let http = &self.http;
        let url = &url;
        debug!(%url, ?query, "catalogue lookup");
        self.retry
            .execute(move || async move {
                let response = check_status(http.get(url.clone()).query(query).send().await?).await?;
                Ok(response.json::<Value>().await?)
            })
            .await
    }

    async fn by_identity(
        &self,
        collection: &str,
        identity: &DescriptorIdentity,
    ) -> Result<Value, ClientError> {
        self.get_json(
            &format!("api/v2/{collection}"),
            &[
                ("vendor", identity.vendor.as_str()),
                ("name", identity.name.as_str()),
                ("version", identity.version.as_str()),
            ],
        )
        .await
    }
}

/// Split a catalogue document into its uuid and the wrapped descriptor.
///
/// Tuple queries answer with a list; the first element is the match.
fn into_entry<T>(
    doc: Value,
    wrapper: &str,
    wrap: fn(Value) -> T,
) -> Result<CatalogueEntry<T>, ClientError> {
    let doc = match doc {
        Value::Array(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound("catalogue query matched nothing".into()))?,
        other => other,
    };
    if !doc.is_object() {
        return Err(ClientError::Decode(format!(
            "catalogue entry is not an object: {doc}"
        )));
    }
    let uuid = doc.get("uuid").and_then(Value::as_str).map(str::to_string);
    let descriptor = doc.get(wrapper).cloned().unwrap_or(doc);
    Ok(CatalogueEntry {
        uuid,
        descriptor: wrap(descriptor),
    })
}

#[async_trait]
impl Catalogue for CatalogueClient {
    #[instrument(skip(self))]
    async fn network_service(
        &self,
        uuid: &str,
    ) -> Result<CatalogueEntry<NetworkServiceDescriptor>, ClientError> {
        let doc = self
            .get_json(&format!("api/v2/network-services/{uuid}"), &[])
            .await?;
        into_entry(doc, "nsd", NetworkServiceDescriptor::new)
    }

    #[instrument(skip(self))]
    async fn test_descriptor(
        &self,
        uuid: &str,
    ) -> Result<CatalogueEntry<TestDescriptor>, ClientError> {
        let doc = self.get_json(&format!("api/v2/tests/{uuid}"), &[]).await?;
        into_entry(doc, "testd", TestDescriptor::new)
    }

    #[instrument(skip(self), fields(identity = %identity))]
    async fn network_service_by_identity(
        &self,
        identity: &DescriptorIdentity,
    ) -> Result<CatalogueEntry<NetworkServiceDescriptor>, ClientError> {
        let doc = self.by_identity("network-services", identity).await?;
        into_entry(doc, "nsd", NetworkServiceDescriptor::new)
    }

    #[instrument(skip(self), fields(identity = %identity))]
    async fn test_descriptor_by_identity(
        &self,
        identity: &DescriptorIdentity,
    ) -> Result<CatalogueEntry<TestDescriptor>, ClientError> {
        let doc = self.by_identity("tests", identity).await?;
        into_entry(doc, "testd", TestDescriptor::new)
    }
}
