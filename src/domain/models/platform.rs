//! Service platforms known to the platform adapter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A concrete service platform instance (e.g. one SONATA deployment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePlatform {
    pub name: String,
    #[serde(rename = "type")]
    pub platform_type: String,
    /// Adapter-specific fields, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServicePlatform {
    pub fn new(name: impl Into<String>, platform_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform_type: platform_type.into(),
            extra: Map::new(),
        }
    }
}

/// Strategy used to pick one platform out of the available pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Use the configured platform name for the type
    Override,
    /// Uniform random choice
    Random,
    /// Least-used platform first
    RoundRobin,
    /// First platform in the pool
    #[default]
    First,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Random => "random",
            Self::RoundRobin => "round_robin",
            Self::First => "first",
        }
    }
}

/// Lower-cased platform type as used by the platform adapter.
pub fn normalize_platform_type(platform_type: &str) -> String {
    platform_type.trim().to_lowercase()
}
