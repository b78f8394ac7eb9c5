use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::{DescriptorIdentity, ServicePlatform};
use crate::domain::ports::errors::ClientError;

/// Request to deploy a network service on a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantiationRequest {
    pub platform_name: String,
    pub service: DescriptorIdentity,
    pub instance_name: String,
    /// Where the adapter reports the outcome (`sp-ready`)
    pub callback_url: String,
}

/// Immediate answer of the adapter to an instantiation request.
///
/// The deployment result itself arrives later through the callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantiationAck {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub package_id: Option<String>,
}

/// Port for the platform adapter (SONATA, OSM, ...)
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platforms of the given (lower-case) type
    async fn available_platforms(
        &self,
        platform_type: &str,
    ) -> Result<Vec<ServicePlatform>, ClientError>;

    async fn instantiate(
        &self,
        request: &InstantiationRequest,
    ) -> Result<InstantiationAck, ClientError>;

    async fn terminate(&self, platform_name: &str, instance_uuid: &str) -> Result<(), ClientError>;
}
