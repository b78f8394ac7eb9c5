//! Request and response bodies of the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::models::{
    DescriptorRef, NetworkServiceDescriptor, PlannerCallback, TestDescriptor, TestPlan,
    TestPlanSpec, TestPlanStatus, TestStatus,
};
use crate::domain::{CuratorError, CuratorResult};
use crate::services::platform_selector::UsageCounters;
use crate::services::InstantiationOutcome;

/// Create request sent by the planner.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTestPlanRequest {
    #[serde(default)]
    pub test_plan_uuid: Option<String>,
    #[serde(default)]
    pub nsd_uuid: Option<String>,
    #[serde(default)]
    pub testd_uuid: Option<String>,
    #[serde(default)]
    pub nsd: Option<Value>,
    #[serde(default)]
    pub testd: Option<Value>,
    #[serde(default)]
    pub test_plan_callbacks: Option<Vec<PlannerCallback>>,
}

impl CreateTestPlanRequest {
    /// Validate the request into a plan spec, collecting every problem.
    pub fn into_spec(self) -> CuratorResult<TestPlanSpec> {
        let mut problems = Vec::new();

        let id = non_empty(self.test_plan_uuid);
        let network_service = descriptor_ref(
            non_empty(self.nsd_uuid),
            self.nsd,
            "nsd",
            NetworkServiceDescriptor::new,
            &mut problems,
        );
        let test = descriptor_ref(
            non_empty(self.testd_uuid),
            self.testd,
            "testd",
            TestDescriptor::new,
            &mut problems,
        );

        let callbacks = match self.test_plan_callbacks {
            Some(callbacks) => {
                if callbacks.iter().any(|c| c.url.trim().is_empty()) {
                    problems.push("test_plan_callbacks entries need a url".to_string());
                }
                callbacks
            }
            None => {
                problems.push("test_plan_callbacks is required".to_string());
                Vec::new()
            }
        };

        match (network_service, test) {
            (Some(network_service), Some(test)) if problems.is_empty() => Ok(TestPlanSpec {
                id,
                network_service,
                test,
                callbacks,
            }),
            _ => Err(CuratorError::Validation(problems.join("; "))),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn descriptor_ref<T>(
    uuid: Option<String>,
    inline: Option<Value>,
    key: &str,
    wrap: fn(Value) -> T,
    problems: &mut Vec<String>,
) -> Option<DescriptorRef<T>> {
    match inline {
        Some(doc) if doc.is_object() => Some(DescriptorRef::Inline {
            uuid,
            descriptor: wrap(doc),
        }),
        Some(Value::Null) | None => match uuid {
            Some(uuid) => Some(DescriptorRef::Catalogue(uuid)),
            None => {
                problems.push(format!("either {key}_uuid or {key} is required"));
                None
            }
        },
        Some(_) => {
            problems.push(format!("{key} must be an object"));
            None
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub test_plan_uuid: String,
    pub status: TestPlanStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub error: Option<String>,
    pub status: TestPlanStatus,
}

/// Platform adapter `sp-ready` body.
///
/// Returns `None` when the body carries neither an error nor the ready keys.
pub fn instantiation_outcome(body: &Value) -> Option<InstantiationOutcome> {
    let error = match body.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };
    if let Some(reason) = error {
        return Some(InstantiationOutcome::Failed(reason));
    }

    let service_instance_id = body.get("ns_instance_uuid")?.as_str()?.to_string();
    let functions = match body.get("functions") {
        Some(Value::Array(functions)) => functions.clone(),
        _ => Vec::new(),
    };
    Some(InstantiationOutcome::Ready {
        service_instance_id,
        functions,
    })
}

/// Executor `change` body.
#[derive(Debug, Deserialize)]
pub struct ChangeRequest {
    #[serde(alias = "test-uuid")]
    pub test_uuid: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl ChangeRequest {
    pub fn test_status(&self) -> CuratorResult<TestStatus> {
        match self.status.as_deref() {
            None => Ok(TestStatus::Running),
            Some(raw) => TestStatus::from_str(raw)
                .ok_or_else(|| CuratorError::Validation(format!("unknown test status {raw}"))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Banner {
    pub module: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Ping {
    pub alive_since: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RouteInfo {
    pub method: &'static str,
    pub path: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PendingCallback {
    pub test_plan_uuid: String,
    pub event: String,
}

/// Diagnostic dump served at `/api/v1/context`.
#[derive(Debug, Serialize)]
pub struct ContextDump {
    pub alive_since: DateTime<Utc>,
    pub test_plans: Vec<TestPlan>,
    pub pending_callbacks: Vec<PendingCallback>,
    pub platform_usage: UsageCounters,
}
