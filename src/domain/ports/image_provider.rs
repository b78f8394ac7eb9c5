use async_trait::async_trait;

use crate::domain::ports::errors::ClientError;

/// Port for pulling and removing probe images
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Pull an image, returning its local id
    async fn pull(&self, image: &str) -> Result<String, ClientError>;

    async fn remove(&self, image: &str) -> Result<(), ClientError>;

    /// Remove dangling resources left behind by the test
    async fn prune(&self) -> Result<(), ClientError>;
}
