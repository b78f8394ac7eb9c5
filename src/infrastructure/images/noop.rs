use async_trait::async_trait;
use tracing::debug;

use crate::domain::ports::{ClientError, ImageProvider};

/// Used when image handling is disabled: every image counts as pulled,
/// with its reference as id, and cleanup does nothing.
#[derive(Debug, Default)]
pub struct NoopImageProvider;

#[async_trait]
impl ImageProvider for NoopImageProvider {
    async fn pull(&self, image: &str) -> Result<String, ClientError> {
        debug!(image, "image handling disabled, skipping pull");
        Ok(image.to_string())
    }

    async fn remove(&self, _image: &str) -> Result<(), ClientError> {
        Ok(())
    }

    async fn prune(&self) -> Result<(), ClientError> {
        Ok(())
    }
}
