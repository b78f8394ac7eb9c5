//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML project files or an explicit `--config` file
//! - Legacy collaborator variables and `CURATOR_*` overrides
//! - Validation into typed errors

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
