//! Containers: concrete values conforming to a [`Space`](crate::Space)

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{OpenEnvError, Result, ValidationError};
use crate::space::Dtype;

/// Fixed-width scalar that can live in a Box buffer
pub trait Element: Copy + PartialOrd + fmt::Display + Sized {
    const DTYPE: Dtype;

    /// Smallest element satisfying `>= low`
    fn lower(low: f64) -> Self;

    /// Largest element satisfying `<= high`
    fn upper(high: f64) -> Self;

    /// Parse a wire number; `None` if not representable in this type
    fn from_json(value: &Value) -> Option<Self>;

    fn to_json(self) -> Value;
}

macro_rules! int_element {
    ($($ty:ty => $dtype:ident, $as_wide:ident);* $(;)?) => {
        $(
            impl Element for $ty {
                const DTYPE: Dtype = Dtype::$dtype;

                fn lower(low: f64) -> Self {
                    low.ceil() as $ty
                }

                fn upper(high: f64) -> Self {
                    high.floor() as $ty
                }

                fn from_json(value: &Value) -> Option<Self> {
                    value.$as_wide().and_then(|v| <$ty>::try_from(v).ok())
                }

                fn to_json(self) -> Value {
                    Value::from(self)
                }
            }
        )*
    };
}

int_element! {
    i8 => Int8, as_i64;
    i16 => Int16, as_i64;
    i32 => Int32, as_i64;
    i64 => Int64, as_i64;
    u8 => UInt8, as_u64;
    u16 => UInt16, as_u64;
    u32 => UInt32, as_u64;
    u64 => UInt64, as_u64;
}

impl Element for f32 {
    const DTYPE: Dtype = Dtype::Float32;

    fn lower(low: f64) -> Self {
        low as f32
    }

    fn upper(high: f64) -> Self {
        high as f32
    }

    fn from_json(value: &Value) -> Option<Self> {
        value
            .as_f64()
            .filter(|v| v.abs() <= f32::MAX as f64)
            .map(|v| v as f32)
    }

    fn to_json(self) -> Value {
        Value::from(self as f64)
    }
}

impl Element for f64 {
    const DTYPE: Dtype = Dtype::Float64;

    fn lower(low: f64) -> Self {
        low
    }

    fn upper(high: f64) -> Self {
        high
    }

    fn from_json(value: &Value) -> Option<Self> {
        value.as_f64()
    }

    fn to_json(self) -> Value {
        Value::from(self)
    }
}

fn check_elements<T: Element>(
    data: &[T],
    low: f64,
    high: f64,
    path: &str,
) -> std::result::Result<(), ValidationError> {
    let (lo, hi) = (T::lower(low), T::upper(high));
    for (i, v) in data.iter().enumerate() {
        // NaN fails both comparisons; bounds are finite so infinities fail too
        if !(lo <= *v && *v <= hi) {
            return Err(ValidationError::range(
                &format!("{}[{}]", path, i),
                v,
                format!("[{}, {}]", low, high),
            ));
        }
    }
    Ok(())
}

fn decode_elements<T: Element>(
    items: &[Value],
    path: &str,
) -> std::result::Result<Vec<T>, ValidationError> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            T::from_json(item).ok_or_else(|| {
                ValidationError::mismatch(
                    &format!("{}[{}]", path, i),
                    T::DTYPE.name(),
                    describe(item),
                )
            })
        })
        .collect()
}

fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, data: &[T]) -> fmt::Result {
    for (i, v) in data.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{}", v)?;
    }
    Ok(())
}

macro_rules! box_data {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// Flat Box buffer, one variant per dtype
        #[derive(Debug, Clone, PartialEq)]
        pub enum BoxData {
            $($variant(Vec<$ty>),)*
        }

        impl BoxData {
            pub fn dtype(&self) -> Dtype {
                match self {
                    $(BoxData::$variant(_) => Dtype::$variant,)*
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $(BoxData::$variant(v) => v.len(),)*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Buffer of `len` copies of the smallest element `>= low`
            pub fn filled(dtype: Dtype, low: f64, len: usize) -> Self {
                match dtype {
                    $(Dtype::$variant => BoxData::$variant(vec![<$ty>::lower(low); len]),)*
                }
            }

            /// Elements widened to f64 (lossy for 64-bit integers beyond 2^53)
            pub fn to_f64_vec(&self) -> Vec<f64> {
                match self {
                    $(BoxData::$variant(v) => v.iter().map(|x| *x as f64).collect(),)*
                }
            }

            pub(crate) fn check_bounds(
                &self,
                low: f64,
                high: f64,
                path: &str,
            ) -> std::result::Result<(), ValidationError> {
                match self {
                    $(BoxData::$variant(v) => check_elements(v, low, high, path),)*
                }
            }

            pub(crate) fn to_json(&self) -> Vec<Value> {
                match self {
                    $(BoxData::$variant(v) => v.iter().map(|x| x.to_json()).collect(),)*
                }
            }

            pub(crate) fn from_json(
                dtype: Dtype,
                items: &[Value],
                path: &str,
            ) -> std::result::Result<Self, ValidationError> {
                Ok(match dtype {
                    $(Dtype::$variant => BoxData::$variant(decode_elements::<$ty>(items, path)?),)*
                })
            }
        }

        $(
            impl From<Vec<$ty>> for BoxData {
                fn from(v: Vec<$ty>) -> Self {
                    BoxData::$variant(v)
                }
            }
        )*

        impl fmt::Display for BoxData {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(BoxData::$variant(v) => join(f, v),)*
                }
            }
        }
    };
}

box_data! {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
}

/// Shaped Box payload; the buffer length always equals the product of the shape
#[derive(Debug, Clone, PartialEq)]
pub struct BoxValue {
    shape: Vec<usize>,
    data: BoxData,
}

impl BoxValue {
    pub fn new(shape: impl Into<Vec<usize>>, data: impl Into<BoxData>) -> Result<Self> {
        let shape = shape.into();
        let data = data.into();
        let expected: usize = shape.iter().product();
        if shape.is_empty() || data.len() != expected {
            return Err(OpenEnvError::Configuration(format!(
                "box buffer of {} elements does not fit shape {:?}",
                data.len(),
                shape
            )));
        }
        Ok(Self { shape, data })
    }

    /// Caller guarantees `data.len() == product(shape)`
    pub(crate) fn from_parts(shape: Vec<usize>, data: BoxData) -> Self {
        Self { shape, data }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &BoxData {
        &self.data
    }

    pub fn dtype(&self) -> Dtype {
        self.data.dtype()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> BoxData {
        self.data
    }
}

/// A value conforming to a space
#[derive(Debug, Clone, PartialEq)]
pub enum Container {
    Discrete(i64),
    Box(BoxValue),
    Dict(BTreeMap<String, Container>),
    Tuple(Vec<Container>),
}

impl Container {
    pub fn discrete(value: i64) -> Self {
        Container::Discrete(value)
    }

    pub fn boxed(shape: impl Into<Vec<usize>>, data: impl Into<BoxData>) -> Result<Self> {
        BoxValue::new(shape, data).map(Container::Box)
    }

    pub fn dict<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Container)>,
        K: Into<String>,
    {
        Container::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn tuple(items: impl Into<Vec<Container>>) -> Self {
        Container::Tuple(items.into())
    }

    /// Variant name, matching [`Space::kind`](crate::Space::kind)
    pub fn kind(&self) -> &'static str {
        match self {
            Container::Discrete(_) => "Discrete",
            Container::Box(_) => "Box",
            Container::Dict(_) => "Dict",
            Container::Tuple(_) => "Tuple",
        }
    }

    pub fn as_discrete(&self) -> Option<i64> {
        match self {
            Container::Discrete(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_box(&self) -> Option<&BoxValue> {
        match self {
            Container::Box(b) => Some(b),
            _ => None,
        }
    }

    /// Dict entry by name
    pub fn get(&self, name: &str) -> Option<&Container> {
        match self {
            Container::Dict(items) => items.get(name),
            _ => None,
        }
    }

    /// Tuple item by position
    pub fn item(&self, index: usize) -> Option<&Container> {
        match self {
            Container::Tuple(items) => items.get(index),
            _ => None,
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Container::Discrete(v) => write!(f, "Discrete({})", v),
            Container::Box(b) => {
                write!(f, "Box<{}>{:?}[", b.dtype(), b.shape())?;
                write!(f, "{}", b.data())?;
                f.write_str("]")
            }
            Container::Dict(items) => {
                f.write_str("Dict{")?;
                for (i, (name, item)) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", name, item)?;
                }
                f.write_str("}")
            }
            Container::Tuple(items) => {
                f.write_str("Tuple(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Short description of a wire value for error messages
pub(crate) fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("bool {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(_) => "string".into(),
        Value::Array(a) => format!("array of {}", a.len()),
        Value::Object(_) => "object".into(),
    }
}
