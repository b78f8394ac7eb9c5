//! Domain models.

pub mod config;
pub mod descriptor;
pub mod platform;
pub mod test_plan;

pub use config::{
    CollaboratorsConfig, Config, HttpClientConfig, ImagesConfig, LoggingConfig,
    OrchestratorConfig, PlatformsConfig, ServerConfig,
};
pub use descriptor::{DescriptorIdentity, NetworkServiceDescriptor, ProbeSpec, TestDescriptor};
pub use platform::{normalize_platform_type, SelectionStrategy, ServicePlatform};
pub use test_plan::{
    DescriptorRef, PlannerCallback, Probe, ServiceInstanceRecord, TestPlan, TestPlanSpec,
    TestPlanStatus, TestResultSummary, TestStatus, PROBE_PULL_FAILED,
};
