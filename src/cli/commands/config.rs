//! Implementation of the `curator config` commands.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the merged configuration
    Show {
        /// Configuration file (defaults to .curator/config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Load and validate the configuration
    Validate {
        /// Configuration file (defaults to .curator/config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Load from `path` when given, else from the project files.
pub fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    config: Config,
}

impl CommandOutput for ShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config)
            .unwrap_or_else(|e| format!("failed to render configuration: {e}"))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
struct ValidateOutput {
    valid: bool,
    public_url: String,
    strategy: String,
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        format!(
            "Configuration is valid\n  public url: {}\n  platform strategy: {}",
            self.public_url, self.strategy
        )
    }
}

pub async fn execute(command: ConfigCommands, json_mode: bool) -> Result<()> {
    match command {
        ConfigCommands::Show { config } => {
            let config = load(config.as_deref())?;
            output(&ShowOutput { config }, json_mode);
        }
        ConfigCommands::Validate { config } => {
            let config = load(config.as_deref())?;
            output(
                &ValidateOutput {
                    valid: true,
                    public_url: config.server.public_url.clone(),
                    strategy: serde_json::to_value(config.platforms.strategy)?
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                },
                json_mode,
            );
        }
    }
    Ok(())
}
