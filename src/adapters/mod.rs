//! Inbound adapters.
//!
//! The HTTP surface the planner, the platform adapter and the executor
//! call into.

pub mod http;
