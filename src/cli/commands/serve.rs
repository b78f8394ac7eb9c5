//! Implementation of the `curator serve` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use crate::adapters::http::HttpServer;
use crate::domain::models::Config;
use crate::infrastructure::clients::{
    build_client, CatalogueClient, ExecutorClient, PlannerClient, PlatformAdapterClient,
    RetryPolicy,
};
use crate::infrastructure::images::provider_from_config;
use crate::infrastructure::logging::{LogConfig, LoggerImpl};
use crate::services::{
    Collaborators, Orchestrator, OrchestratorSettings, PlatformSelector, TestPlanRegistry,
};

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Configuration file (defaults to .curator/config.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the listening port
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Wire the orchestrator to the HTTP collaborators named in `config`.
pub fn build_orchestrator(config: &Config) -> Result<Arc<Orchestrator>> {
    let http = build_client(&config.http_client).context("Failed to build HTTP client")?;
    let retry = RetryPolicy::from_config(&config.http_client);
    let urls = &config.collaborators;

    let collaborators = Collaborators {
        catalogue: Arc::new(CatalogueClient::new(
            http.clone(),
            urls.catalogue_url.clone(),
            retry.clone(),
        )),
        platform_adapter: Arc::new(PlatformAdapterClient::new(
            http.clone(),
            urls.platform_adapter_url.clone(),
            retry,
        )),
        executor: Arc::new(ExecutorClient::new(http.clone(), urls.executor_url.clone())),
        planner: Arc::new(PlannerClient::new(http, urls.planner_url.clone())),
        images: provider_from_config(&config.images),
    };

    Ok(Arc::new(Orchestrator::new(
        Arc::new(TestPlanRegistry::new()),
        PlatformSelector::from_config(&config.platforms),
        collaborators,
        OrchestratorSettings::from_config(config),
    )))
}

pub async fn execute(args: ServeArgs, _json_mode: bool) -> Result<()> {
    let mut config = super::config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let log_config = LogConfig::try_from(&config.logging)?;
    let _logger = LoggerImpl::init(&log_config)?;

    tracing::info!(
        public_url = %config.server.public_url,
        catalogue = %config.collaborators.catalogue_url,
        platform_adapter = %config.collaborators.platform_adapter_url,
        executor = %config.collaborators.executor_url,
        planner = %config.collaborators.planner_url,
        "starting curator"
    );

    let orchestrator = build_orchestrator(&config)?;
    HttpServer::new(orchestrator, &config.server)
        .serve_with_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown signal received");
        })
        .await
}
