//! Infrastructure layer module
//!
//! Implementations of the domain ports and process-level plumbing:
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - HTTP clients for the collaborating services (reqwest)
//! - Probe image providers (docker CLI)

pub mod clients;
pub mod config;
pub mod images;
pub mod logging;
