//! Curator - V&V test plan orchestration
//!
//! The curator receives test plans from the planner, instantiates the
//! network service under test on every platform the test descriptor
//! names, submits the test to the executor and reports the aggregate
//! outcome back to the planner once every instance has settled.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Test plan model, errors and collaborator ports
//! - **Service Layer** (`services`): Registry, synchronizer, selector, resolver, orchestrator
//! - **Infrastructure Layer** (`infrastructure`): HTTP clients, docker, config, logging
//! - **Adapters** (`adapters`): Inbound HTTP API
//! - **CLI Layer** (`cli`): Command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Config, PlannerCallback, ServiceInstanceRecord, TestPlan, TestPlanSpec, TestPlanStatus,
    TestStatus,
};
pub use domain::{CuratorError, CuratorResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Orchestrator, TestPlanRegistry};
