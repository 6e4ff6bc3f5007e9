//! Spaces: the structure of observations and actions, without data

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::container::{BoxData, BoxValue, Container};
use crate::error::{OpenEnvError, Result, ValidationError};

/// Fixed-width numeric type of a Box space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl Dtype {
    /// Wire name, e.g. `uint32`
    pub fn name(&self) -> &'static str {
        match self {
            Dtype::Int8 => "int8",
            Dtype::Int16 => "int16",
            Dtype::Int32 => "int32",
            Dtype::Int64 => "int64",
            Dtype::UInt8 => "uint8",
            Dtype::UInt16 => "uint16",
            Dtype::UInt32 => "uint32",
            Dtype::UInt64 => "uint64",
            Dtype::Float32 => "float32",
            Dtype::Float64 => "float64",
        }
    }

    pub fn is_integer(&self) -> bool {
        !matches!(self, Dtype::Float32 | Dtype::Float64)
    }

    /// Representable range as f64
    fn limits(&self) -> (f64, f64) {
        match self {
            Dtype::Int8 => (i8::MIN as f64, i8::MAX as f64),
            Dtype::Int16 => (i16::MIN as f64, i16::MAX as f64),
            Dtype::Int32 => (i32::MIN as f64, i32::MAX as f64),
            Dtype::Int64 => (i64::MIN as f64, i64::MAX as f64),
            Dtype::UInt8 => (0.0, u8::MAX as f64),
            Dtype::UInt16 => (0.0, u16::MAX as f64),
            Dtype::UInt32 => (0.0, u32::MAX as f64),
            Dtype::UInt64 => (0.0, u64::MAX as f64),
            Dtype::Float32 => (f32::MIN as f64, f32::MAX as f64),
            Dtype::Float64 => (f64::MIN, f64::MAX),
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Description of a value's shape, bounds and type
///
/// Spaces are value objects: environments typically build them fresh on every
/// call. Build them through the checked constructors; deserialized spaces
/// should go through [`Space::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "PascalCase")]
pub enum Space {
    /// Integer category in `[0, n)`
    Discrete {
        #[serde(rename = "N")]
        n: u64,
    },
    /// Fixed-shape numeric array with inclusive bounds applied to every element
    Box {
        #[serde(rename = "Low")]
        low: f64,
        #[serde(rename = "High")]
        high: f64,
        #[serde(rename = "Shape")]
        shape: Vec<usize>,
        #[serde(rename = "Dtype")]
        dtype: Dtype,
    },
    /// Named sub-spaces, kept sorted by name for a stable wire order
    Dict {
        #[serde(rename = "Spaces")]
        spaces: BTreeMap<String, Space>,
    },
    /// Ordered sub-spaces
    Tuple {
        #[serde(rename = "Spaces")]
        spaces: Vec<Space>,
    },
}

impl Space {
    /// Discrete space with `n` categories
    pub fn discrete(n: u64) -> Result<Self> {
        let space = Space::Discrete { n };
        space.validate()?;
        Ok(space)
    }

    /// Box space with scalar bounds
    pub fn boxed(low: f64, high: f64, shape: impl Into<Vec<usize>>, dtype: Dtype) -> Result<Self> {
        let space = Space::Box {
            low,
            high,
            shape: shape.into(),
            dtype,
        };
        space.validate()?;
        Ok(space)
    }

    /// Dict space; duplicate names are rejected
    pub fn dict<I, K>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Space)>,
        K: Into<String>,
    {
        let mut spaces = BTreeMap::new();
        for (name, space) in entries {
            let name = name.into();
            if spaces.insert(name.clone(), space).is_some() {
                return Err(OpenEnvError::Configuration(format!(
                    "duplicate dict entry '{}'",
                    name
                )));
            }
        }
        let space = Space::Dict { spaces };
        space.validate()?;
        Ok(space)
    }

    /// Tuple space
    pub fn tuple(spaces: impl Into<Vec<Space>>) -> Result<Self> {
        let space = Space::Tuple {
            spaces: spaces.into(),
        };
        space.validate()?;
        Ok(space)
    }

    /// Variant name
    pub fn kind(&self) -> &'static str {
        match self {
            Space::Discrete { .. } => "Discrete",
            Space::Box { .. } => "Box",
            Space::Dict { .. } => "Dict",
            Space::Tuple { .. } => "Tuple",
        }
    }

    /// Check the whole tree for structural consistency
    pub fn validate(&self) -> Result<()> {
        self.validate_at("$")
    }

    fn validate_at(&self, path: &str) -> Result<()> {
        let fail = |msg: String| Err(OpenEnvError::Configuration(format!("{}: {}", path, msg)));
        match self {
            Space::Discrete { n } => {
                if *n == 0 {
                    return fail("discrete space needs n >= 1".into());
                }
            }
            Space::Box {
                low,
                high,
                shape,
                dtype,
            } => {
                if !low.is_finite() || !high.is_finite() {
                    return fail(format!(
                        "box bounds [{}, {}] must be finite; use the dtype limits for an unbounded box",
                        low, high
                    ));
                }
                if low > high {
                    return fail(format!("box low {} exceeds high {}", low, high));
                }
                if shape.is_empty() {
                    return fail("box shape needs at least one dimension".into());
                }
                if shape.contains(&0) {
                    return fail(format!("box shape {:?} has an empty dimension", shape));
                }
                let (min, max) = dtype.limits();
                if dtype.is_integer() {
                    let (lo, hi) = (low.ceil(), high.floor());
                    if lo > hi {
                        return fail(format!(
                            "no {} value lies in [{}, {}]",
                            dtype, low, high
                        ));
                    }
                    if lo < min || hi > max {
                        return fail(format!(
                            "bounds [{}, {}] not representable as {}",
                            low, high, dtype
                        ));
                    }
                } else if *low < min || *high > max {
                    return fail(format!(
                        "bounds [{}, {}] not representable as {}",
                        low, high, dtype
                    ));
                }
            }
            Space::Dict { spaces } => {
                if spaces.is_empty() {
                    return fail("dict space needs at least one entry".into());
                }
                for (name, space) in spaces {
                    space.validate_at(&format!("{}.{}", path, name))?;
                }
            }
            Space::Tuple { spaces } => {
                if spaces.is_empty() {
                    return fail("tuple space needs at least one entry".into());
                }
                for (i, space) in spaces.iter().enumerate() {
                    space.validate_at(&format!("{}[{}]", path, i))?;
                }
            }
        }
        Ok(())
    }

    /// Verify that `value` conforms to this space
    pub fn check(&self, value: &Container) -> std::result::Result<(), ValidationError> {
        self.check_at(value, "$")
    }

    /// Whether `value` conforms to this space
    pub fn contains(&self, value: &Container) -> bool {
        self.check(value).is_ok()
    }

    fn check_at(&self, value: &Container, path: &str) -> std::result::Result<(), ValidationError> {
        match (self, value) {
            (Space::Discrete { n }, Container::Discrete(v)) => {
                if *v < 0 || (*v as u64) >= *n {
                    return Err(ValidationError::range(path, v, format!("[0, {})", n)));
                }
                Ok(())
            }
            (
                Space::Box {
                    low,
                    high,
                    shape,
                    dtype,
                },
                Container::Box(b),
            ) => {
                if b.shape() != shape.as_slice() {
                    return Err(ValidationError::mismatch(
                        path,
                        format!("shape {:?}", shape),
                        format!("shape {:?}", b.shape()),
                    ));
                }
                if b.dtype() != *dtype {
                    return Err(ValidationError::mismatch(
                        path,
                        dtype.name(),
                        b.dtype().name(),
                    ));
                }
                b.data().check_bounds(*low, *high, path)
            }
            (Space::Dict { spaces }, Container::Dict(items)) => {
                for name in items.keys() {
                    if !spaces.contains_key(name) {
                        return Err(ValidationError::mismatch(
                            &format!("{}.{}", path, name),
                            "no entry",
                            "unexpected key",
                        ));
                    }
                }
                for (name, space) in spaces {
                    let child = format!("{}.{}", path, name);
                    match items.get(name) {
                        Some(item) => space.check_at(item, &child)?,
                        None => return Err(ValidationError::mismatch(&child, space.kind(), "missing")),
                    }
                }
                Ok(())
            }
            (Space::Tuple { spaces }, Container::Tuple(items)) => {
                if spaces.len() != items.len() {
                    return Err(ValidationError::mismatch(
                        path,
                        format!("{} items", spaces.len()),
                        format!("{} items", items.len()),
                    ));
                }
                for (i, (space, item)) in spaces.iter().zip(items).enumerate() {
                    space.check_at(item, &format!("{}[{}]", path, i))?;
                }
                Ok(())
            }
            (space, value) => Err(ValidationError::mismatch(path, space.kind(), value.kind())),
        }
    }

    /// Total number of scalar elements carried by a value of this space
    pub fn flat_len(&self) -> usize {
        match self {
            Space::Discrete { .. } => 1,
            Space::Box { shape, .. } => shape.iter().product(),
            Space::Dict { spaces } => spaces.values().map(Space::flat_len).sum(),
            Space::Tuple { spaces } => spaces.iter().map(Space::flat_len).sum(),
        }
    }

    /// A value valid for this space: category 0, boxes filled with their lower bound
    pub fn default_value(&self) -> Container {
        match self {
            Space::Discrete { .. } => Container::Discrete(0),
            Space::Box {
                low, shape, dtype, ..
            } => {
                let len = shape.iter().product();
                Container::Box(BoxValue::from_parts(
                    shape.clone(),
                    BoxData::filled(*dtype, *low, len),
                ))
            }
            Space::Dict { spaces } => Container::Dict(
                spaces
                    .iter()
                    .map(|(name, space)| (name.clone(), space.default_value()))
                    .collect(),
            ),
            Space::Tuple { spaces } => {
                Container::Tuple(spaces.iter().map(Space::default_value).collect())
            }
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Space::Discrete { n } => write!(f, "DiscreteSpace(n={})", n),
            Space::Box {
                low,
                high,
                shape,
                dtype,
            } => write!(
                f,
                "BoxSpace(low={}, high={}, shape={:?}, dtype={})",
                low, high, shape, dtype
            ),
            Space::Dict { spaces } => {
                f.write_str("DictSpace{")?;
                for (i, (name, space)) in spaces.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", name, space)?;
                }
                f.write_str("}")
            }
            Space::Tuple { spaces } => {
                f.write_str("TupleSpace(")?;
                for (i, space) in spaces.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", space)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_space() -> Space {
        Space::dict([
            (
                "box",
                Space::boxed(0.0, 10.0, [5], Dtype::UInt32).unwrap(),
            ),
            ("discrete", Space::discrete(5).unwrap()),
        ])
        .unwrap()
    }

    #[test]
    fn test_constructor_rejects_bad_shapes() {
        assert!(matches!(
            Space::discrete(0),
            Err(OpenEnvError::Configuration(_))
        ));
        assert!(Space::boxed(10.0, 0.0, [5], Dtype::Float32).is_err());
        assert!(Space::boxed(0.0, 1.0, Vec::<usize>::new(), Dtype::Float32).is_err());
        assert!(Space::boxed(0.0, 1.0, [3, 0], Dtype::Float32).is_err());
        assert!(Space::boxed(f64::NAN, 1.0, [3], Dtype::Float64).is_err());
        assert!(Space::boxed(f64::NEG_INFINITY, f64::INFINITY, [2], Dtype::Float64).is_err());
        assert!(Space::boxed(0.0, f64::INFINITY, [2], Dtype::Float32).is_err());
        assert!(Space::boxed(f64::MIN, f64::MAX, [2], Dtype::Float32).is_err());
        assert!(Space::boxed(f32::MIN as f64, f32::MAX as f64, [2], Dtype::Float32).is_ok());
        assert!(Space::boxed(-1.0, 1.0, [3], Dtype::UInt8).is_err());
        assert!(Space::boxed(0.2, 0.8, [3], Dtype::Int32).is_err());
        assert!(Space::tuple(Vec::new()).is_err());
        assert!(Space::dict(Vec::<(String, Space)>::new()).is_err());
    }

    #[test]
    fn test_dict_rejects_duplicate_names() {
        let d = Space::discrete(2).unwrap();
        let err = Space::dict([("a", d.clone()), ("a", d)]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_reports_nested_path() {
        let space = Space::Tuple {
            spaces: vec![
                Space::Discrete { n: 3 },
                Space::Discrete { n: 0 },
            ],
        };
        let err = space.validate().unwrap_err();
        assert!(err.to_string().contains("$[1]"), "{}", err);
    }

    #[test]
    fn test_check_discrete_bounds() {
        let space = Space::discrete(5).unwrap();
        assert!(space.contains(&Container::Discrete(0)));
        assert!(space.contains(&Container::Discrete(4)));
        assert!(matches!(
            space.check(&Container::Discrete(5)),
            Err(ValidationError::Range { .. })
        ));
        assert!(matches!(
            space.check(&Container::Discrete(-1)),
            Err(ValidationError::Range { .. })
        ));
    }

    #[test]
    fn test_check_box_rejects_instead_of_clamping() {
        let space = Space::boxed(0.0, 10.0, [3], Dtype::Float32).unwrap();
        let ok = Container::Box(BoxValue::new([3], vec![0.0f32, 5.5, 10.0]).unwrap());
        assert!(space.contains(&ok));

        let high = Container::Box(BoxValue::new([3], vec![0.0f32, 10.5, 1.0]).unwrap());
        match space.check(&high) {
            Err(ValidationError::Range { path, .. }) => assert_eq!(path, "$[1]"),
            other => panic!("expected range error, got {:?}", other),
        }

        let nan = Container::Box(BoxValue::new([3], vec![f32::NAN, 1.0, 1.0]).unwrap());
        assert!(!space.contains(&nan));

        let wrong_dtype = Container::Box(BoxValue::new([3], vec![1.0f64, 1.0, 1.0]).unwrap());
        assert!(matches!(
            space.check(&wrong_dtype),
            Err(ValidationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_check_dict_keys() {
        let space = node_space();
        let mut value = space.default_value();
        assert!(space.contains(&value));

        if let Container::Dict(items) = &mut value {
            items.remove("discrete");
        }
        match space.check(&value) {
            Err(ValidationError::TypeMismatch { path, found, .. }) => {
                assert_eq!(path, "$.discrete");
                assert_eq!(found, "missing");
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_variant_mismatch() {
        let space = node_space();
        let err = space.check(&Container::Discrete(1)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::mismatch("$", "Dict", "Discrete")
        );
    }

    #[test]
    fn test_default_value_respects_integer_bounds() {
        let space = Space::boxed(1.5, 4.0, [2, 2], Dtype::Int16).unwrap();
        let value = space.default_value();
        assert!(space.contains(&value));
        let b = value.as_box().unwrap();
        assert_eq!(b.data(), &BoxData::Int16(vec![2, 2, 2, 2]));
    }

    #[test]
    fn test_flat_len() {
        let space = Space::tuple([node_space(), Space::boxed(0.0, 1.0, [2, 3], Dtype::Float64).unwrap()])
            .unwrap();
        assert_eq!(space.flat_len(), 5 + 1 + 6);
    }

    #[test]
    fn test_serialized_form_is_tagged() {
        let json = serde_json::to_value(node_space()).unwrap();
        assert_eq!(json["Type"], "Dict");
        assert_eq!(json["Spaces"]["box"]["Type"], "Box");
        assert_eq!(json["Spaces"]["box"]["Dtype"], "uint32");
        assert_eq!(json["Spaces"]["box"]["Shape"], serde_json::json!([5]));
        assert_eq!(json["Spaces"]["discrete"]["N"], 5);

        let back: Space = serde_json::from_value(json).unwrap();
        assert_eq!(back, node_space());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            node_space().to_string(),
            "DictSpace{box: BoxSpace(low=0, high=10, shape=[5], dtype=uint32), discrete: DiscreteSpace(n=5)}"
        );
    }
}
