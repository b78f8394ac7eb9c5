//! reqwest clients for the collaborating V&V services.

pub mod catalogue;
pub mod executor;
pub mod http;
pub mod planner;
pub mod platform_adapter;

pub use catalogue::CatalogueClient;
pub use executor::ExecutorClient;
pub use http::{build_client, RetryPolicy};
pub use planner::PlannerClient;
pub use platform_adapter::PlatformAdapterClient;
