//! Network service and test descriptors.
//!
//! Descriptors are owned by the catalogue and evolve independently of the
//! curator, so they are kept as JSON documents with typed accessors for the
//! handful of fields the orchestration reads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::{CuratorError, CuratorResult};

/// Phase id holding the probe configuration.
pub const SETUP_PHASE_ID: &str = "setup";
/// Step action, inside the setup phase, that lists the probes.
pub const CONFIGURE_ACTION: &str = "configure";

/// `(vendor, name, version)` triple identifying a descriptor in the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DescriptorIdentity {
    pub vendor: String,
    pub name: String,
    pub version: String,
}

impl std::fmt::Display for DescriptorIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.vendor, self.name, self.version)
    }
}

fn identity_of(doc: &Value, kind: &str) -> CuratorResult<DescriptorIdentity> {
    let field = |key: &str| {
        doc.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CuratorError::Validation(format!("{kind} is missing '{key}'")))
    };
    Ok(DescriptorIdentity {
        vendor: field("vendor")?,
        name: field("name")?,
        version: field("version")?,
    })
}

/// A network service descriptor (NSD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkServiceDescriptor(Value);

impl NetworkServiceDescriptor {
    pub fn new(doc: Value) -> Self {
        Self(doc)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn identity(&self) -> CuratorResult<DescriptorIdentity> {
        identity_of(&self.0, "network service descriptor")
    }
}

/// Name and image of a probe declared in the setup phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSpec {
    pub name: String,
    pub image: String,
}

/// A test descriptor (TD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestDescriptor(Value);

impl TestDescriptor {
    pub fn new(doc: Value) -> Self {
        Self(doc)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn as_value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn identity(&self) -> CuratorResult<DescriptorIdentity> {
        identity_of(&self.0, "test descriptor")
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// Declared target platform types, in declaration order.
    pub fn service_platforms(&self) -> CuratorResult<Vec<String>> {
        let platforms = self
            .0
            .get("service_platforms")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                CuratorError::Validation(
                    "test descriptor 'service_platforms' must be a list".to_string(),
                )
            })?;

        platforms
            .iter()
            .map(|p| {
                p.as_str().map(str::to_string).ok_or_else(|| {
                    CuratorError::Validation(format!("invalid service platform entry: {p}"))
                })
            })
            .collect()
    }

    /// The `configure` step of the setup phase, if the descriptor has one.
    pub fn configure_step(&self) -> Option<&Value> {
        self.0
            .get("phases")?
            .as_array()?
            .iter()
            .find(|phase| phase.get("id").and_then(Value::as_str) == Some(SETUP_PHASE_ID))?
            .get("steps")?
            .as_array()?
            .iter()
            .find(|step| step.get("action").and_then(Value::as_str) == Some(CONFIGURE_ACTION))
    }

    pub fn configure_step_mut(&mut self) -> Option<&mut Value> {
        self.0
            .get_mut("phases")?
            .as_array_mut()?
            .iter_mut()
            .find(|phase| phase.get("id").and_then(Value::as_str) == Some(SETUP_PHASE_ID))?
            .get_mut("steps")?
            .as_array_mut()?
            .iter_mut()
            .find(|step| step.get("action").and_then(Value::as_str) == Some(CONFIGURE_ACTION))
    }

    /// Probes declared by the setup phase. Entries without an image are skipped.
    pub fn setup_probes(&self) -> Vec<ProbeSpec> {
        self.configure_step()
            .and_then(|step| step.get("probes"))
            .and_then(Value::as_array)
            .map(|probes| {
                probes
                    .iter()
                    .filter_map(|probe| {
                        let image = probe.get("image").and_then(Value::as_str)?;
                        let name = probe
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or(image);
                        Some(ProbeSpec {
                            name: name.to_string(),
                            image: image.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
