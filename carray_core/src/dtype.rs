//! Scalar kinds, item dtypes and single values.
//!
//! The set of supported element types is closed: every container picks one
//! [`ScalarKind`] at construction and all raw-byte handling dispatches on it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
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

impl ScalarKind {
    /// Size in bytes of one scalar.
    pub fn size(self) -> usize {
        match self {
            ScalarKind::Bool | ScalarKind::Int8 | ScalarKind::UInt8 => 1,
            ScalarKind::Int16 | ScalarKind::UInt16 => 2,
            ScalarKind::Int32 | ScalarKind::UInt32 | ScalarKind::Float32 => 4,
            ScalarKind::Int64 | ScalarKind::UInt64 | ScalarKind::Float64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int8 => "int8",
            ScalarKind::Int16 => "int16",
            ScalarKind::Int32 => "int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::UInt8 => "uint8",
            ScalarKind::UInt16 => "uint16",
            ScalarKind::UInt32 => "uint32",
            ScalarKind::UInt64 => "uint64",
            ScalarKind::Float32 => "float32",
            ScalarKind::Float64 => "float64",
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, ScalarKind::Bool | ScalarKind::Float32 | ScalarKind::Float64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarKind::Float32 | ScalarKind::Float64)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Item type of a container: a scalar kind plus an optional fixed sub-shape
/// for multi-dimensional items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DType {
    pub kind: ScalarKind,
    #[serde(default)]
    pub item_shape: Vec<usize>,
}

impl DType {
    pub fn scalar(kind: ScalarKind) -> Self {
        Self {
            kind,
            item_shape: Vec::new(),
        }
    }

    pub fn with_item_shape(kind: ScalarKind, item_shape: Vec<usize>) -> Self {
        Self { kind, item_shape }
    }

    /// Number of scalars making up one item (1 for plain scalars).
    pub fn scalars_per_item(&self) -> usize {
        self.item_shape.iter().product()
    }

    /// Bytes per item.
    pub fn itemsize(&self) -> usize {
        self.kind.size() * self.scalars_per_item()
    }

    pub fn is_scalar(&self) -> bool {
        self.item_shape.is_empty()
    }

    /// Fail with `TypeMismatch` unless `other` has the same kind and item shape.
    pub fn check_compatible(&self, other: &DType) -> Result<()> {
        if self != other {
            return Err(Error::TypeMismatch(format!(
                "expected {}, got {}",
                self, other
            )));
        }
        Ok(())
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.item_shape.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "({}, {:?})", self.kind, self.item_shape)
        }
    }
}

/// One element read out of a container.
///
/// Items with a sub-shape come back as `Array`, holding the flattened scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
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
    Array(Vec<Value>),
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from!(
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
);

impl Value {
    /// Scalar kind, or `None` for sub-shaped items.
    pub fn kind(&self) -> Option<ScalarKind> {
        Some(match self {
            Value::Bool(_) => ScalarKind::Bool,
            Value::Int8(_) => ScalarKind::Int8,
            Value::Int16(_) => ScalarKind::Int16,
            Value::Int32(_) => ScalarKind::Int32,
            Value::Int64(_) => ScalarKind::Int64,
            Value::UInt8(_) => ScalarKind::UInt8,
            Value::UInt16(_) => ScalarKind::UInt16,
            Value::UInt32(_) => ScalarKind::UInt32,
            Value::UInt64(_) => ScalarKind::UInt64,
            Value::Float32(_) => ScalarKind::Float32,
            Value::Float64(_) => ScalarKind::Float64,
            Value::Array(_) => return None,
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Value::Bool(b) => b as i128,
            Value::Int8(v) => v as i128,
            Value::Int16(v) => v as i128,
            Value::Int32(v) => v as i128,
            Value::Int64(v) => v as i128,
            Value::UInt8(v) => v as i128,
            Value::UInt16(v) => v as i128,
            Value::UInt32(v) => v as i128,
            Value::UInt64(v) => v as i128,
            _ => return None,
        })
    }

    /// Integer view; `None` for floats, arrays, or values outside `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    /// Numeric view as `f64`; `None` for arrays.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float32(v) => Some(v as f64),
            Value::Float64(v) => Some(v),
            Value::Array(_) => None,
            _ => self.as_i128().map(|v| v as f64),
        }
    }

    /// Convert to `kind`, failing with `TypeMismatch` when the conversion
    /// would lose meaning: float to int, number to bool, an integer outside
    /// the target range, a finite float that overflows `f32`, or an integer
    /// the target float cannot hold exactly. Rounding a float's fraction to
    /// `f32` precision is accepted.
    pub fn cast(&self, kind: ScalarKind) -> Result<Value> {
        if self.kind() == Some(kind) {
            return Ok(self.clone());
        }
        let mismatch = || {
            Error::TypeMismatch(format!("cannot store {:?} in a {} item", self, kind))
        };
        if kind == ScalarKind::Bool {
            return Err(mismatch());
        }
        if kind.is_float() {
            let v = self.as_f64().ok_or_else(mismatch)?;
            let out = match kind {
                ScalarKind::Float32 => {
                    let f = v as f32;
                    if v.is_finite() && !f.is_finite() {
                        return Err(mismatch());
                    }
                    Value::Float32(f)
                }
                _ => Value::Float64(v),
            };
            if let Some(i) = self.as_i128() {
                if out.as_f64().map(|f| f as i128) != Some(i) {
                    return Err(mismatch());
                }
            }
            return Ok(out);
        }
        let v = self.as_i128().ok_or_else(mismatch)?;
        macro_rules! narrow {
            ($t:ty, $variant:ident) => {
                <$t>::try_from(v).map(Value::$variant).map_err(|_| mismatch())
            };
        }
        match kind {
            ScalarKind::Int8 => narrow!(i8, Int8),
            ScalarKind::Int16 => narrow!(i16, Int16),
            ScalarKind::Int32 => narrow!(i32, Int32),
            ScalarKind::Int64 => narrow!(i64, Int64),
            ScalarKind::UInt8 => narrow!(u8, UInt8),
            ScalarKind::UInt16 => narrow!(u16, UInt16),
            ScalarKind::UInt32 => narrow!(u32, UInt32),
            ScalarKind::UInt64 => narrow!(u64, UInt64),
            ScalarKind::Bool | ScalarKind::Float32 | ScalarKind::Float64 => unreachable!(),
        }
    }

    /// Decode one scalar of `kind` from little-endian bytes.
    pub(crate) fn read_scalar(kind: ScalarKind, bytes: &[u8]) -> Value {
        macro_rules! le {
            ($t:ty, $variant:ident) => {{
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                Value::$variant(<$t>::from_le_bytes(buf))
            }};
        }
        match kind {
            ScalarKind::Bool => Value::Bool(bytes[0] != 0),
            ScalarKind::Int8 => le!(i8, Int8),
            ScalarKind::Int16 => le!(i16, Int16),
            ScalarKind::Int32 => le!(i32, Int32),
            ScalarKind::Int64 => le!(i64, Int64),
            ScalarKind::UInt8 => le!(u8, UInt8),
            ScalarKind::UInt16 => le!(u16, UInt16),
            ScalarKind::UInt32 => le!(u32, UInt32),
            ScalarKind::UInt64 => le!(u64, UInt64),
            ScalarKind::Float32 => le!(f32, Float32),
            ScalarKind::Float64 => le!(f64, Float64),
        }
    }

    /// Decode one item (possibly sub-shaped) of `dtype`.
    pub(crate) fn read_item(dtype: &DType, bytes: &[u8]) -> Value {
        if dtype.is_scalar() {
            return Value::read_scalar(dtype.kind, bytes);
        }
        let size = dtype.kind.size();
        Value::Array(
            bytes[..dtype.itemsize()]
                .chunks_exact(size)
                .map(|b| Value::read_scalar(dtype.kind, b))
                .collect(),
        )
    }

    /// Encode this value as one item of `dtype`, casting scalars as needed.
    pub(crate) fn write_item(&self, dtype: &DType, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Value::Array(items) => {
                if dtype.is_scalar() || items.len() != dtype.scalars_per_item() {
                    return Err(Error::TypeMismatch(format!(
                        "item of {} scalars does not fit dtype {}",
                        items.len(),
                        dtype
                    )));
                }
                for v in items {
                    v.write_scalar(dtype.kind, out)?;
                }
                Ok(())
            }
            _ if !dtype.is_scalar() => Err(Error::TypeMismatch(format!(
                "scalar value does not fit dtype {}",
                dtype
            ))),
            _ => self.write_scalar(dtype.kind, out),
        }
    }

    fn write_scalar(&self, kind: ScalarKind, out: &mut Vec<u8>) -> Result<()> {
        match self.cast(kind)? {
            Value::Bool(v) => out.push(v as u8),
            Value::Int8(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Int16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Int64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::UInt8(v) => out.push(v),
            Value::UInt16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::UInt32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::UInt64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Float32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Float64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Array(_) => {
                return Err(Error::TypeMismatch("nested arrays are not supported".into()))
            }
        }
        Ok(())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", if *v { "True" } else { "False" }),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt8(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v:?}"),
            Value::Float64(v) => write!(f, "{v:?}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}
