//! Probe image providers.

pub mod docker;
pub mod noop;

use std::sync::Arc;

pub use docker::DockerImageProvider;
pub use noop::NoopImageProvider;

use crate::domain::models::ImagesConfig;
use crate::domain::ports::ImageProvider;

pub fn provider_from_config(config: &ImagesConfig) -> Arc<dyn ImageProvider> {
    if config.enabled {
        Arc::new(DockerImageProvider::new(config.docker_binary.clone()))
    } else {
        Arc::new(NoopImageProvider)
    }
}
