//! Test plan domain model.
//!
//! A test plan binds one test descriptor to one network service descriptor
//! and fans out into one service-instance record per declared platform.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::descriptor::{NetworkServiceDescriptor, TestDescriptor};

/// Aggregate status of a test plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestPlanStatus {
    /// Accepted, descriptors not yet resolved
    Starting,
    /// Platforms are being instantiated
    Instantiating,
    /// At least one test is running on the executor
    Running,
    /// Every instance completed successfully
    Completed,
    /// At least one instance or a plan-level step failed
    Error,
    /// Cancellation requested, running tests are being stopped
    Cancelling,
    /// Cancellation finished
    Cancelled,
}

impl TestPlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Instantiating => "INSTANTIATING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Cancelling => "CANCELLING",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }
}

impl std::fmt::Display for TestPlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the test running against one service instance.
///
/// Only moves forward: `Starting -> Running -> {Completed, Error, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    #[default]
    Starting,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Lenient parse of the status strings the executor reports.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "STARTING" | "SCHEDULED" | "PENDING" => Some(Self::Starting),
            "RUNNING" | "IN_PROGRESS" => Some(Self::Running),
            "COMPLETED" | "COMPLETE" | "SUCCESS" | "PASSED" => Some(Self::Completed),
            "ERROR" | "FAILED" | "FAILURE" => Some(Self::Error),
            "CANCELLED" | "CANCELED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Check if the instance still has live work on the executor.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    fn rank(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Running => 1,
            Self::Completed | Self::Error | Self::Cancelled => 2,
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A callback the planner registered for test plan events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerCallback {
    #[serde(default, alias = "eventActor", skip_serializing_if = "Option::is_none")]
    pub event_actor: Option<String>,
    pub url: String,
    /// Aggregate status this callback is registered for; `None` means any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Prefix stored in [`Probe::id`] when the probe image could not be pulled.
pub const PROBE_PULL_FAILED: &str = "pull-failed:";

/// A probe image used by the test's setup phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// Local image id, or a [`PROBE_PULL_FAILED`] sentinel
    pub id: String,
    pub name: String,
    pub image: String,
}

impl Probe {
    pub fn pulled(id: impl Into<String>, name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: image.into(),
        }
    }

    pub fn failed(name: impl Into<String>, image: impl Into<String>, reason: &str) -> Self {
        Self {
            id: format!("{PROBE_PULL_FAILED}{reason}"),
            name: name.into(),
            image: image.into(),
        }
    }

    /// False when the id carries the pull-failure sentinel.
    pub fn is_pulled(&self) -> bool {
        !self.id.starts_with(PROBE_PULL_FAILED)
    }
}

/// One instantiation attempt of the network service on one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstanceRecord {
    pub platform_type: String,
    pub platform_name: Option<String>,
    pub instance_name: String,
    /// Deployed service id; never set together with `error`
    pub service_instance_id: Option<String>,
    /// Instantiation-time output parameters reported by the adapter
    pub functions: Vec<Value>,
    pub package_id: Option<String>,
    pub package_uploaded: bool,
    pub test_id: Option<String>,
    pub test_status: TestStatus,
    /// Instantiation failure
    pub error: Option<String>,
    /// Failure after the service was deployed (resolution, submission, cancel)
    pub test_error: Option<String>,
    pub terminated: bool,
}

impl ServiceInstanceRecord {
    pub fn new(platform_type: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            platform_type: platform_type.into(),
            platform_name: None,
            instance_name: instance_name.into(),
            service_instance_id: None,
            functions: Vec::new(),
            package_id: None,
            package_uploaded: false,
            test_id: None,
            test_status: TestStatus::Starting,
            error: None,
            test_error: None,
            terminated: false,
        }
    }

    /// Move the test status forward; backward or repeated moves are ignored.
    pub fn advance(&mut self, next: TestStatus) -> bool {
        if self.test_status.can_transition_to(next) {
            self.test_status = next;
            true
        } else {
            false
        }
    }

    /// Record a successful deployment reported by the platform adapter.
    pub fn mark_deployed(&mut self, service_instance_id: String, functions: Vec<Value>) {
        self.error = None;
        self.service_instance_id = Some(service_instance_id);
        self.functions = functions;
    }

    /// Record a failure that happened before a service was deployed.
    pub fn mark_instantiation_failed(&mut self, reason: impl Into<String>) {
        self.service_instance_id = None;
        self.error = Some(reason.into());
        self.advance(TestStatus::Error);
    }

    /// Record a failure that happened after the service was deployed.
    pub fn mark_test_failed(&mut self, reason: impl Into<String>) {
        self.test_error = Some(reason.into());
        self.advance(TestStatus::Error);
    }

    pub fn failure(&self) -> Option<&str> {
        self.error.as_deref().or(self.test_error.as_deref())
    }

    /// A deployment exists that still needs to be torn down.
    pub fn needs_termination(&self) -> bool {
        self.service_instance_id.is_some() && !self.terminated
    }
}

/// One entry of the result list handed to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResultSummary {
    pub test_uuid: String,
    pub results_uuid: Option<String>,
    pub test_status: TestStatus,
}

/// How a descriptor reaches the curator: by catalogue uuid or inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorRef<T> {
    Catalogue(String),
    Inline { uuid: Option<String>, descriptor: T },
}

impl<T> DescriptorRef<T> {
    pub fn uuid(&self) -> Option<&str> {
        match self {
            Self::Catalogue(uuid) => Some(uuid),
            Self::Inline { uuid, .. } => uuid.as_deref(),
        }
    }
}

/// A validated request to run a test plan.
#[derive(Debug, Clone, PartialEq)]
pub struct TestPlanSpec {
    pub id: Option<String>,
    pub network_service: DescriptorRef<NetworkServiceDescriptor>,
    pub test: DescriptorRef<TestDescriptor>,
    pub callbacks: Vec<PlannerCallback>,
}

/// Live state of one test plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPlan {
    pub id: String,
    pub status: TestPlanStatus,
    pub nsd_uuid: Option<String>,
    pub testd_uuid: Option<String>,
    pub network_service_descriptor: Option<NetworkServiceDescriptor>,
    pub test_descriptor: Option<TestDescriptor>,
    pub callbacks: Vec<PlannerCallback>,
    pub probes: Vec<Probe>,
    pub service_instances: Vec<ServiceInstanceRecord>,
    pub test_results: Vec<Value>,
    /// Plan-level failure, reported as the planner `exception`
    pub error: Option<String>,
    pub finalizing: bool,
    /// Platform branches the run worker has started and not yet settled
    #[serde(default)]
    pub starting_branches: usize,
    /// Outcomes reported for test ids no instance has recorded yet
    #[serde(default)]
    pub unclaimed_outcomes: HashMap<String, TestStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestPlan {
    pub fn new(id: impl Into<String>, spec: TestPlanSpec) -> Self {
        let now = Utc::now();
        let nsd_uuid = spec.network_service.uuid().map(str::to_string);
        let testd_uuid = spec.test.uuid().map(str::to_string);
        let network_service_descriptor = match spec.network_service {
            DescriptorRef::Inline { descriptor, .. } => Some(descriptor),
            DescriptorRef::Catalogue(_) => None,
        };
        let test_descriptor = match spec.test {
            DescriptorRef::Inline { descriptor, .. } => Some(descriptor),
            DescriptorRef::Catalogue(_) => None,
        };

        Self {
            id: id.into(),
            status: TestPlanStatus::Starting,
            nsd_uuid,
            testd_uuid,
            network_service_descriptor,
            test_descriptor,
            callbacks: spec.callbacks,
            probes: Vec::new(),
            service_instances: Vec::new(),
            test_results: Vec::new(),
            error: None,
            finalizing: false,
            starting_branches: 0,
            unclaimed_outcomes: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump `updated_at`, never moving it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    pub fn instance(&self, instance_name: &str) -> Option<&ServiceInstanceRecord> {
        self.service_instances
            .iter()
            .find(|i| i.instance_name == instance_name)
    }

    pub fn instance_mut(&mut self, instance_name: &str) -> Option<&mut ServiceInstanceRecord> {
        self.service_instances
            .iter_mut()
            .find(|i| i.instance_name == instance_name)
    }

    pub fn instance_by_test_mut(&mut self, test_id: &str) -> Option<&mut ServiceInstanceRecord> {
        self.service_instances
            .iter_mut()
            .find(|i| i.test_id.as_deref() == Some(test_id))
    }

    /// True when every instance reached a terminal test status.
    ///
    /// Vacuously true with no instances: a plan that never started an
    /// instance is still finalized.
    pub fn all_instances_terminal(&self) -> bool {
        self.service_instances
            .iter()
            .all(|i| i.test_status.is_terminal())
    }

    /// COMPLETED iff there is at least one instance and all completed.
    pub fn completion_status(&self) -> TestPlanStatus {
        let all_completed = !self.service_instances.is_empty()
            && self
                .service_instances
                .iter()
                .all(|i| i.test_status == TestStatus::Completed);
        if all_completed && self.error.is_none() {
            TestPlanStatus::Completed
        } else {
            TestPlanStatus::Error
        }
    }

    /// Result list for the planner: one entry per instance that reached the executor.
    pub fn result_summaries(&self) -> Vec<TestResultSummary> {
        self.service_instances
            .iter()
            .filter_map(|instance| {
                let test_uuid = instance.test_id.clone()?;
                let results_uuid = self.results_uuid_for(&test_uuid);
                Some(TestResultSummary {
                    test_uuid,
                    results_uuid,
                    test_status: instance.test_status,
                })
            })
            .collect()
    }

    fn results_uuid_for(&self, test_uuid: &str) -> Option<String> {
        self.test_results
            .iter()
            .rev()
            .filter(|r| r.get("test_uuid").and_then(Value::as_str) == Some(test_uuid))
            .find_map(|r| {
                r.get("results_uuid")
                    .or_else(|| r.get("result_uuid"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
    }

    /// Failure text for the planner: the plan error plus every instance failure.
    pub fn failure_summary(&self) -> Option<String> {
        let mut parts: Vec<String> = self.error.iter().cloned().collect();
        parts.extend(self.service_instances.iter().filter_map(|i| {
            i.failure()
                .map(|reason| format!("{}: {reason}", i.instance_name))
        }));
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}
