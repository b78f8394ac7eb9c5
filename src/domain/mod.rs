//! Domain layer for the curator
//!
//! This module contains the test plan model, the error taxonomy and the
//! ports every collaborator client implements.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{CuratorError, CuratorResult};
