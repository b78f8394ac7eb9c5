use async_trait::async_trait;

use crate::domain::models::{DescriptorIdentity, NetworkServiceDescriptor, TestDescriptor};
use crate::domain::ports::errors::ClientError;

/// A descriptor as stored in the catalogue, with its catalogue uuid.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueEntry<T> {
    pub uuid: Option<String>,
    pub descriptor: T,
}

/// Port for descriptor lookups in the V&V catalogue
#[async_trait]
pub trait Catalogue: Send + Sync {
    async fn network_service(
        &self,
        uuid: &str,
    ) -> Result<CatalogueEntry<NetworkServiceDescriptor>, ClientError>;

    async fn test_descriptor(&self, uuid: &str)
        -> Result<CatalogueEntry<TestDescriptor>, ClientError>;

    async fn network_service_by_identity(
        &self,
        identity: &DescriptorIdentity,
    ) -> Result<CatalogueEntry<NetworkServiceDescriptor>, ClientError>;

    async fn test_descriptor_by_identity(
        &self,
        identity: &DescriptorIdentity,
    ) -> Result<CatalogueEntry<TestDescriptor>, ClientError>;
}
