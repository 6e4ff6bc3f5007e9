//! Wire encoding of containers
//!
//! Containers travel as internally tagged JSON:
//! - `{"Type":"Discrete","Value":3}`
//! - `{"Type":"Box","Dtype":"uint32","Shape":[5],"Data":[...]}`
//! - `{"Type":"Dict","Items":{"name": ...}}`
//! - `{"Type":"Tuple","Items":[...]}`
//!
//! [`decode`] is the only way externally sourced values become containers, and
//! it always checks them against the expected space.

use serde_json::{Map, Value, json};

use crate::container::{BoxData, BoxValue, Container, describe};
use crate::error::{OpenEnvError, Result, ValidationError};
use crate::space::Space;

/// Encode a container into its wire value. Total.
pub fn encode(container: &Container) -> Value {
    match container {
        Container::Discrete(v) => json!({ "Type": "Discrete", "Value": v }),
        Container::Box(b) => json!({
            "Type": "Box",
            "Dtype": b.dtype().name(),
            "Shape": b.shape(),
            "Data": b.data().to_json(),
        }),
        Container::Dict(items) => {
            let items: Map<String, Value> = items
                .iter()
                .map(|(name, item)| (name.clone(), encode(item)))
                .collect();
            json!({ "Type": "Dict", "Items": items })
        }
        Container::Tuple(items) => {
            let items: Vec<Value> = items.iter().map(encode).collect();
            json!({ "Type": "Tuple", "Items": items })
        }
    }
}

/// Encode a container into JSON bytes
pub fn to_bytes(container: &Container) -> Vec<u8> {
    encode(container).to_string().into_bytes()
}

/// Decode a wire value against the space it must satisfy
pub fn decode(value: &Value, space: &Space) -> std::result::Result<Container, ValidationError> {
    decode_at(value, space, "$")
}

/// Decode JSON bytes against the space they must satisfy
pub fn from_bytes(bytes: &[u8], space: &Space) -> Result<Container> {
    let value: Value = serde_json::from_slice(bytes)?;
    decode(&value, space).map_err(OpenEnvError::from)
}

fn field<'a>(
    obj: &'a Map<String, Value>,
    name: &str,
    path: &str,
) -> std::result::Result<&'a Value, ValidationError> {
    obj.get(name)
        .ok_or_else(|| ValidationError::mismatch(path, format!("field '{}'", name), "missing"))
}

fn decode_at(
    value: &Value,
    space: &Space,
    path: &str,
) -> std::result::Result<Container, ValidationError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ValidationError::mismatch(path, space.kind(), describe(value)))?;
    let tag = field(obj, "Type", path)?;
    if tag.as_str() != Some(space.kind()) {
        return Err(ValidationError::mismatch(
            path,
            space.kind(),
            tag.as_str().map(str::to_string).unwrap_or_else(|| describe(tag)),
        ));
    }

    match space {
        Space::Discrete { n } => {
            let raw = field(obj, "Value", path)?;
            let v = raw
                .as_i64()
                .ok_or_else(|| ValidationError::mismatch(path, "integer", describe(raw)))?;
            if v < 0 || (v as u64) >= *n {
                return Err(ValidationError::range(path, v, format!("[0, {})", n)));
            }
            Ok(Container::Discrete(v))
        }
        Space::Box {
            low,
            high,
            shape,
            dtype,
        } => {
            if let Some(raw) = obj.get("Dtype") {
                if raw.as_str() != Some(dtype.name()) {
                    return Err(ValidationError::mismatch(path, dtype.name(), describe(raw)));
                }
            }
            if let Some(raw) = obj.get("Shape") {
                let matches = raw.as_array().is_some_and(|dims| {
                    dims.len() == shape.len()
                        && dims
                            .iter()
                            .zip(shape)
                            .all(|(d, s)| d.as_u64() == Some(*s as u64))
                });
                if !matches {
                    return Err(ValidationError::mismatch(
                        path,
                        format!("shape {:?}", shape),
                        raw.to_string(),
                    ));
                }
            }
            let raw = field(obj, "Data", path)?;
            let items = raw
                .as_array()
                .ok_or_else(|| ValidationError::mismatch(path, "array", describe(raw)))?;
            let expected: usize = shape.iter().product();
            if items.len() != expected {
                return Err(ValidationError::mismatch(
                    path,
                    format!("{} elements", expected),
                    format!("{} elements", items.len()),
                ));
            }
            let data = BoxData::from_json(*dtype, items, path)?;
            data.check_bounds(*low, *high, path)?;
            Ok(Container::Box(BoxValue::from_parts(shape.clone(), data)))
        }
        Space::Dict { spaces } => {
            let raw = field(obj, "Items", path)?;
            let items = raw
                .as_object()
                .ok_or_else(|| ValidationError::mismatch(path, "object", describe(raw)))?;
            if let Some(extra) = items.keys().find(|k| !spaces.contains_key(*k)) {
                return Err(ValidationError::mismatch(
                    &format!("{}.{}", path, extra),
                    "no entry",
                    "unexpected key",
                ));
            }
            let mut out = std::collections::BTreeMap::new();
            for (name, sub) in spaces {
                let child = format!("{}.{}", path, name);
                let item = items
                    .get(name)
                    .ok_or_else(|| ValidationError::mismatch(&child, sub.kind(), "missing"))?;
                out.insert(name.clone(), decode_at(item, sub, &child)?);
            }
            Ok(Container::Dict(out))
        }
        Space::Tuple { spaces } => {
            let raw = field(obj, "Items", path)?;
            let items = raw
                .as_array()
                .ok_or_else(|| ValidationError::mismatch(path, "array", describe(raw)))?;
            if items.len() != spaces.len() {
                return Err(ValidationError::mismatch(
                    path,
                    format!("{} items", spaces.len()),
                    format!("{} items", items.len()),
                ));
            }
            spaces
                .iter()
                .zip(items)
                .enumerate()
                .map(|(i, (sub, item))| decode_at(item, sub, &format!("{}[{}]", path, i)))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Container::Tuple)
        }
    }
}
