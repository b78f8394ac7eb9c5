//! Placeholder resolution for test descriptors.
//!
//! Probe parameters in the setup phase's `configure` step may reference
//! instantiation-time outputs with `$(name/seg/seg...)`:
//!
//! - `name` selects the instantiation parameter whose `name` field matches
//! - `key:value` selects, from a list, the element whose `key` equals `value`
//! - any other segment reads a field of a mapping
//!
//! The value at the last segment replaces the placeholder. Anything left
//! unresolved after the pass is an error.

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::errors::{CuratorError, CuratorResult};
use crate::domain::models::TestDescriptor;

/// Identifiers stamped onto a resolved descriptor instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorStamp {
    pub test_descriptor_uuid: Option<String>,
    pub package_descriptor_uuid: Option<String>,
    pub network_service_descriptor_uuid: Option<String>,
    pub service_instance_uuid: Option<String>,
}

/// Returns the path segments of a `$(...)` placeholder.
pub fn placeholder_path(raw: &str) -> Option<Vec<&str>> {
    let inner = raw.trim().strip_prefix("$(")?.strip_suffix(')')?;
    Some(inner.split('/').collect())
}

pub fn is_placeholder(raw: &str) -> bool {
    placeholder_path(raw).is_some()
}

/// Resolve every placeholder of the descriptor and stamp the identifiers.
///
/// Returns the test descriptor instance ready for the executor.
pub fn resolve(
    descriptor: &TestDescriptor,
    parameters: &[Value],
    stamp: &DescriptorStamp,
) -> CuratorResult<TestDescriptor> {
    let mut instance = descriptor.clone();

    if let Some(step) = instance.configure_step_mut() {
        for param in probe_parameters_mut(step) {
            let Some(raw) = param.get("value").and_then(Value::as_str) else {
                continue;
            };
            let Some(path) = placeholder_path(raw) else {
                continue;
            };
            match lookup(parameters, &path) {
                Some(value) => {
                    debug!(placeholder = raw, resolved = %value, "resolved probe parameter");
                    param["value"] = value;
                }
                None => warn!(placeholder = raw, "no instantiation parameter matches placeholder"),
            }
        }
    } else {
        debug!("test descriptor has no setup configure step, nothing to resolve");
    }

    apply_stamp(instance.as_value_mut(), stamp);

    let unresolved = unresolved_placeholders(&instance);
    if unresolved.is_empty() {
        Ok(instance)
    } else {
        Err(CuratorError::Resolution(unresolved))
    }
}

/// Placeholders still present in the descriptor's probe parameters.
pub fn unresolved_placeholders(descriptor: &TestDescriptor) -> Vec<String> {
    descriptor
        .configure_step()
        .and_then(|step| step.get("probes"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|probe| probe.get("parameters").and_then(Value::as_array))
        .flatten()
        .filter_map(|param| param.get("value").and_then(Value::as_str))
        .filter(|raw| is_placeholder(raw))
        .map(str::to_string)
        .collect()
}

fn probe_parameters_mut(step: &mut Value) -> impl Iterator<Item = &mut Value> {
    step.get_mut("probes")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flatten()
        .filter_map(|probe| probe.get_mut("parameters").and_then(Value::as_array_mut))
        .flatten()
}

fn lookup(parameters: &[Value], path: &[&str]) -> Option<Value> {
    let (name, rest) = path.split_first()?;
    // A bare name would substitute a whole parameter record.
    if rest.is_empty() {
        return None;
    }
    let root = parameters
        .iter()
        .find(|p| p.get("name").and_then(Value::as_str) == Some(*name))?;
    walk(root, rest).cloned()
}

fn walk<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let Some((segment, rest)) = segments.split_first() else {
        return Some(value);
    };
    let next = match segment.split_once(':') {
        Some((key, expected)) => value
            .as_array()?
            .iter()
            .find(|item| item.get(key).is_some_and(|field| matches_text(field, expected)))?,
        None => value.as_object()?.get(*segment)?,
    };
    walk(next, rest)
}

fn matches_text(field: &Value, expected: &str) -> bool {
    match field {
        Value::String(s) => s == expected,
        Value::Number(_) | Value::Bool(_) => field.to_string() == expected,
        _ => false,
    }
}

fn apply_stamp(doc: &mut Value, stamp: &DescriptorStamp) {
    let Some(object) = doc.as_object_mut() else {
        return;
    };
    let fields = [
        ("test_descriptor_uuid", &stamp.test_descriptor_uuid),
        ("package_descriptor_uuid", &stamp.package_descriptor_uuid),
        (
            "network_service_descriptor_uuid",
            &stamp.network_service_descriptor_uuid,
        ),
        ("service_instance_uuid", &stamp.service_instance_uuid),
    ];
    for (key, value) in fields {
        let value = value.clone().map_or(Value::Null, Value::String);
        object.insert(key.to_string(), value);
    }
}
