//! Probe images through the docker CLI.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::domain::ports::{ClientError, ImageProvider};

pub struct DockerImageProvider {
    binary: String,
}

impl DockerImageProvider {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run the binary and return trimmed stdout; non-zero exit is an error.
    async fn run(&self, args: &[&str]) -> Result<String, ClientError> {
        debug!(binary = %self.binary, ?args, "running docker command");
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| ClientError::Process(format!("{}: {err}", self.binary)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ClientError::Process(format!(
                "{} {} exited with {}: {}",
                self.binary,
                args.join(" "),
                output.status,
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl ImageProvider for DockerImageProvider {
    #[instrument(skip(self))]
    async fn pull(&self, image: &str) -> Result<String, ClientError> {
        self.run(&["pull", image]).await?;
        let id = self
            .run(&["image", "inspect", "--format", "{{.Id}}", image])
            .await?;
        info!(image_id = %id, "probe image pulled");
        Ok(if id.is_empty() { image.to_string() } else { id })
    }

    #[instrument(skip(self))]
    async fn remove(&self, image: &str) -> Result<(), ClientError> {
        self.run(&["rmi", "-f", image]).await.map(|_| ())
    }

    async fn prune(&self) -> Result<(), ClientError> {
        self.run(&["image", "prune", "-f"]).await.map(|_| ())
    }
}
