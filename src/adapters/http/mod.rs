//! HTTP server for the curator API.
//!
//! The planner creates and cancels test plans here; the platform adapter
//! and the executor report back through the per-plan callback routes.

mod error;
mod handlers;
pub mod payloads;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::domain::models::ServerConfig;
use crate::services::Orchestrator;

pub use error::{ApiError, ApiResult, ErrorBody};

/// Shared state for the HTTP handlers.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub alive_since: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            alive_since: Utc::now(),
        }
    }
}

/// Build the router with every endpoint.
pub fn router(state: Arc<AppState>) -> Router {
    let plan = "/api/v1/test-preparations/{test_plan_uuid}";
    Router::new()
        .route("/", get(handlers::banner))
        .route("/ping", get(handlers::ping))
        .route("/api/v1", get(handlers::routes))
        .route("/api/v1/context", get(handlers::context))
        .route(
            "/api/v1/test-preparations",
            get(handlers::list_plans).post(handlers::create_plan),
        )
        .route(plan, get(handlers::get_plan).delete(handlers::cancel_plan))
        .route(
            &format!("{plan}/service-instances/{{instance_name}}/sp-ready"),
            post(handlers::sp_ready),
        )
        .route(&format!("{plan}/change"), post(handlers::test_status_change))
        .route(
            &format!("{plan}/tests/{{test_uuid}}/finish"),
            post(handlers::test_finished),
        )
        .route(
            &format!("{plan}/tests/{{test_uuid}}/cancel"),
            post(handlers::test_cancelled),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Curator HTTP server.
pub struct HttpServer {
    state: Arc<AppState>,
    addr: String,
}

impl HttpServer {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &ServerConfig) -> Self {
        Self {
            state: Arc::new(AppState::new(orchestrator)),
            addr: format!("{}:{}", config.host, config.port),
        }
    }

    /// Start the server and run until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self.addr.parse()?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "curator HTTP server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
