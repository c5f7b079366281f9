//! Replica field access on loosely-typed objects
//!
//! Objects returned by the dynamic client carry `spec.replicas` as a plain JSON
//! number whose width depends on how the object was produced. All reads and
//! writes of the field go through this module.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::{Number, Value};

use crate::error::{Error, Result};

/// Read `spec.replicas` and normalize it to a non-negative `i32`.
pub fn read_replicas(obj: &DynamicObject) -> Result<i32> {
    let name = obj.name_any();
    let spec = obj
        .data
        .get("spec")
        .ok_or_else(|| Error::field_shape(format!("{}: spec not found", name)))?;
    let spec = spec
        .as_object()
        .ok_or_else(|| Error::field_shape(format!("{}: spec is not an object", name)))?;
    let replicas = spec
        .get("replicas")
        .ok_or_else(|| Error::field_shape(format!("{}: replicas not found", name)))?;

    match replicas {
        Value::Number(n) => normalize(n).ok_or_else(|| {
            Error::field_shape(format!(
                "{}: replicas {} is not a non-negative 32-bit integer",
                name, n
            ))
        }),
        other => Err(Error::field_shape(format!(
            "{}: replicas has unsupported encoding {}",
            name,
            value_type(other)
        ))),
    }
}

/// Set `spec.replicas`. The `spec` object must already exist.
pub fn write_replicas(obj: &mut DynamicObject, replicas: i32) -> Result<()> {
    let name = obj.name_any();
    let spec = obj
        .data
        .get_mut("spec")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| Error::field_shape(format!("{}: spec not found", name)))?;
    spec.insert("replicas".to_string(), Value::from(replicas));
    Ok(())
}

// Both signed and unsigned 64-bit encodings are accepted; floats never are,
// even when integral.
fn normalize(n: &Number) -> Option<i32> {
    if let Some(v) = n.as_i64() {
        return i32::try_from(v).ok().filter(|v| *v >= 0);
    }
    n.as_u64().and_then(|v| i32::try_from(v).ok())
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
