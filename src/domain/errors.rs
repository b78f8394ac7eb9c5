//! Domain errors for the curator.

use std::time::Duration;

use thiserror::Error;

use crate::domain::ports::ClientError;

/// Domain-level errors raised while orchestrating test plans.
///
/// Instance-local variants (`Instantiation`, `Execution`, `Timeout`,
/// `Resolution`) end up recorded on a single service-instance record and
/// never abort sibling instances. `Cleanup` is always logged and swallowed.
#[derive(Debug, Error)]
pub enum CuratorError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Test plan not found: {0}")]
    PlanNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Test plan {0} already exists")]
    AlreadyExists(String),

    #[error("No service platform available for type {platform_type}: {reason}")]
    PlatformUnavailable { platform_type: String, reason: String },

    #[error("Catalogue lookup failed: {0}")]
    Catalogue(String),

    #[error("Instantiation failed: {0}")]
    Instantiation(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Timed out after {:?} waiting for {waiting_for}", .after)]
    Timeout { waiting_for: String, after: Duration },

    #[error("Unresolved placeholders: {}", .0.join(", "))]
    Resolution(Vec<String>),

    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    #[error("Test plan {0} is already being finalized")]
    AlreadyFinalizing(String),

    #[error("Wait on {0} was abandoned before it was signalled")]
    WaitAbandoned(String),
}

pub type CuratorResult<T> = Result<T, CuratorError>;

impl CuratorError {
    /// Map a collaborator failure on the instantiation step.
    pub fn instantiation(err: &ClientError) -> Self {
        Self::Instantiation(err.to_string())
    }

    /// Map a collaborator failure on an executor call.
    pub fn execution(err: &ClientError) -> Self {
        Self::Execution(err.to_string())
    }

    /// Map a collaborator failure during cleanup.
    pub fn cleanup(err: &ClientError) -> Self {
        Self::Cleanup(err.to_string())
    }

    /// True for errors that identify a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PlanNotFound(_) | Self::NotFound(_))
    }
}
