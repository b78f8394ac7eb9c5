use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use super::payloads::{
    instantiation_outcome, Banner, CancelResponse, ChangeRequest, ContextDump,
    CreateTestPlanRequest, CreatedResponse, PendingCallback, Ping, RouteInfo,
};
use super::AppState;
use crate::domain::models::{TestPlan, TestPlanStatus};
use crate::services::InstantiationOutcome;

const MODULE_NAME: &str = "tng-vnv-curator";

const ROUTES: &[RouteInfo] = &[
    RouteInfo {
        method: "GET",
        path: "/ping",
        description: "Liveness probe",
    },
    RouteInfo {
        method: "GET",
        path: "/api/v1/test-preparations",
        description: "List live test plans",
    },
    RouteInfo {
        method: "POST",
        path: "/api/v1/test-preparations",
        description: "Create a test plan",
    },
    RouteInfo {
        method: "GET",
        path: "/api/v1/test-preparations/{test_plan_uuid}",
        description: "Show one test plan",
    },
    RouteInfo {
        method: "DELETE",
        path: "/api/v1/test-preparations/{test_plan_uuid}",
        description: "Cancel a test plan",
    },
    RouteInfo {
        method: "POST",
        path: "/api/v1/test-preparations/{test_plan_uuid}/service-instances/{instance_name}/sp-ready",
        description: "Platform adapter instantiation callback",
    },
    RouteInfo {
        method: "POST",
        path: "/api/v1/test-preparations/{test_plan_uuid}/change",
        description: "Executor test status change",
    },
    RouteInfo {
        method: "POST",
        path: "/api/v1/test-preparations/{test_plan_uuid}/tests/{test_uuid}/finish",
        description: "Executor test result",
    },
    RouteInfo {
        method: "POST",
        path: "/api/v1/test-preparations/{test_plan_uuid}/tests/{test_uuid}/cancel",
        description: "Executor cancellation acknowledgement",
    },
    RouteInfo {
        method: "GET",
        path: "/api/v1/context",
        description: "Diagnostic dump of the in-memory state",
    },
];

pub async fn banner() -> Json<Banner> {
    Json(Banner {
        module: MODULE_NAME,
        status: "RUNNING",
    })
}

pub async fn ping(State(state): State<Arc<AppState>>) -> Json<Ping> {
    Json(Ping {
        alive_since: state.alive_since,
    })
}

pub async fn routes() -> Json<&'static [RouteInfo]> {
    Json(ROUTES)
}

pub async fn list_plans(State(state): State<Arc<AppState>>) -> Json<Vec<TestPlan>> {
    Json(state.orchestrator.registry().list().await)
}

pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let request: CreateTestPlanRequest = json_body(&headers, &body)?;
    let spec = request.into_spec()?;
    let plan = state.orchestrator.submit(spec).await?;

    info!(plan_id = %plan.id, "test plan accepted");
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            test_plan_uuid: plan.id,
            status: TestPlanStatus::Starting,
        }),
    ))
}

pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<String>,
) -> ApiResult<Json<TestPlan>> {
    Ok(Json(state.orchestrator.registry().get(&plan_id).await?))
}

pub async fn cancel_plan(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let status = state.orchestrator.request_cancel(&plan_id).await?;
    info!(plan_id = %plan_id, "cancellation requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            error: None,
            status,
        }),
    ))
}

/// Malformed bodies still wake the waiting worker with a failure.
pub async fn sp_ready(
    State(state): State<Arc<AppState>>,
    Path((plan_id, instance_name)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let parsed = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|value| instantiation_outcome(&value));

    let (outcome, malformed) = match parsed {
        Some(outcome) => (outcome, false),
        None => {
            warn!(plan_id = %plan_id, instance = %instance_name, "malformed sp-ready body");
            (InstantiationOutcome::Failed("Unknown error".to_string()), true)
        }
    };

    state
        .orchestrator
        .on_instance_ready(&plan_id, &instance_name, outcome)
        .await?;

    if malformed {
        Err(ApiError::bad_request("Unknown error"))
    } else {
        Ok(StatusCode::OK)
    }
}

pub async fn test_status_change(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let change: ChangeRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid change body: {e}")))?;
    let status = change.test_status()?;
    state
        .orchestrator
        .on_test_status_change(&plan_id, &change.test_uuid, status)
        .await?;
    Ok(StatusCode::OK)
}

pub async fn test_finished(
    State(state): State<Arc<AppState>>,
    Path((plan_id, test_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let payload = result_payload(&body)?;
    state
        .orchestrator
        .on_test_finished(&plan_id, &test_id, payload)
        .await?;
    Ok(StatusCode::OK)
}

pub async fn test_cancelled(
    State(state): State<Arc<AppState>>,
    Path((plan_id, test_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let payload = result_payload(&body)?;
    state
        .orchestrator
        .on_test_cancelled(&plan_id, &test_id, payload)
        .await?;
    Ok(StatusCode::OK)
}

pub async fn context(State(state): State<Arc<AppState>>) -> Json<ContextDump> {
    let orchestrator = &state.orchestrator;
    let pending_callbacks = orchestrator
        .registry()
        .synchronizer()
        .pending_keys()
        .into_iter()
        .map(|(test_plan_uuid, event)| PendingCallback {
            test_plan_uuid,
            event,
        })
        .collect();

    Json(ContextDump {
        alive_since: state.alive_since,
        test_plans: orchestrator.registry().list().await,
        pending_callbacks,
        platform_usage: orchestrator.selector().usage_snapshot(),
    })
}

fn json_body<T: serde::de::DeserializeOwned>(headers: &HeaderMap, body: &Bytes) -> ApiResult<T> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim_start().starts_with("application/json"));
    if !is_json {
        return Err(ApiError::not_acceptable("request body must be application/json"));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::not_acceptable(format!("invalid JSON: {e}")))?;
    serde_json::from_value(value).map_err(|e| ApiError::bad_request(e.to_string()))
}

/// Executor payloads are kept raw; an empty body counts as `{}`.
fn result_payload(body: &Bytes) -> ApiResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("invalid result body: {e}")))
}
