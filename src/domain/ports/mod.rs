//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces for the collaborators the curator drives:
//! - Catalogue: descriptor lookups
//! - PlatformAdapter: service instantiation and termination
//! - Executor: test submission and cancellation
//! - Planner: final test plan report
//! - ImageProvider: probe image lifecycle
//!
//! The orchestrator depends only on these traits, so tests can swap in
//! in-memory collaborators.

pub mod catalogue;
pub mod errors;
pub mod executor;
pub mod image_provider;
pub mod planner;
pub mod platform_adapter;

pub use catalogue::{Catalogue, CatalogueEntry};
pub use errors::ClientError;
pub use executor::{ExecutionAck, ExecutionCallback, Executor};
pub use image_provider::ImageProvider;
pub use planner::{Planner, PlannerReport};
pub use platform_adapter::{InstantiationAck, InstantiationRequest, PlatformAdapter};
