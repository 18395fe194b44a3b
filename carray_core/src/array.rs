//! Dense, uncompressed arrays: a dtype plus a little-endian byte buffer.
//!
//! This is the exchange format between callers and compressed containers.
//! Seeds, appended batches, decompressed chunks and evaluation results are
//! all `Array`s.

use crate::dtype::{DType, ScalarKind, Value};
use crate::error::{Error, Result};

/// Rust scalar types that map one-to-one onto a [`ScalarKind`].
pub trait Element: Copy + Send + Sync + 'static {
    const KIND: ScalarKind;

    fn write_le(self, out: &mut Vec<u8>);

    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! numeric_element {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const KIND: ScalarKind = ScalarKind::$kind;

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                    <$t>::from_le_bytes(buf)
                }
            }
        )*
    };
}

numeric_element!(
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

impl Element for bool {
    const KIND: ScalarKind = ScalarKind::Bool;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    dtype: DType,
    data: Vec<u8>,
}

impl Array {
    /// An empty array of `dtype`.
    pub fn empty(dtype: DType) -> Self {
        Self {
            dtype,
            data: Vec::new(),
        }
    }

    /// `len` zero-valued items.
    pub fn zeros(dtype: DType, len: usize) -> Self {
        let data = vec![0u8; dtype.itemsize() * len];
        Self { dtype, data }
    }

    /// Wrap a raw little-endian buffer; its length must be a whole number of items.
    pub fn from_bytes(dtype: DType, data: Vec<u8>) -> Result<Self> {
        let itemsize = dtype.itemsize();
        if itemsize == 0 {
            return Err(Error::invalid(format!("dtype {} has zero-sized items", dtype)));
        }
        if data.len() % itemsize != 0 {
            return Err(Error::invalid(format!(
                "buffer of {} bytes is not a multiple of itemsize {}",
                data.len(),
                itemsize
            )));
        }
        Ok(Self { dtype, data })
    }

    pub fn from_slice<T: Element>(values: &[T]) -> Self {
        let mut data = Vec::with_capacity(values.len() * T::KIND.size());
        for v in values {
            v.write_le(&mut data);
        }
        Self {
            dtype: DType::scalar(T::KIND),
            data,
        }
    }

    pub fn from_vec<T: Element>(values: Vec<T>) -> Self {
        Self::from_slice(&values)
    }

    /// Build multi-dimensional items from flattened scalars.
    pub fn from_slice_with_item_shape<T: Element>(
        values: &[T],
        item_shape: Vec<usize>,
    ) -> Result<Self> {
        let dtype = DType::with_item_shape(T::KIND, item_shape);
        let mut data = Vec::with_capacity(values.len() * T::KIND.size());
        for v in values {
            v.write_le(&mut data);
        }
        Self::from_bytes(dtype, data)
    }

    /// Encode `values` as items of `dtype`, casting where lossless.
    pub fn from_values(dtype: DType, values: &[Value]) -> Result<Self> {
        let mut data = Vec::with_capacity(values.len() * dtype.itemsize());
        for v in values {
            v.write_item(&dtype, &mut data)?;
        }
        Self::from_bytes(dtype, data)
    }

    /// `len` copies of `value`.
    pub fn filled(dtype: DType, value: &Value, len: usize) -> Result<Self> {
        let mut item = Vec::with_capacity(dtype.itemsize());
        value.write_item(&dtype, &mut item)?;
        let data = item.repeat(len);
        Self::from_bytes(dtype, data)
    }

    pub fn dtype(&self) -> &DType {
        &self.dtype
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        match self.dtype.itemsize() {
            0 => 0,
            n => self.data.len() / n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `[len, item_shape...]`
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = vec![self.len()];
        shape.extend_from_slice(&self.dtype.item_shape);
        shape
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        let itemsize = self.dtype.itemsize();
        let start = index.checked_mul(itemsize)?;
        let bytes = self.data.get(start..start + itemsize)?;
        Some(Value::read_item(&self.dtype, bytes))
    }

    /// Items `start..stop`, clamped to the array length.
    pub fn slice(&self, start: usize, stop: usize) -> Array {
        let itemsize = self.dtype.itemsize();
        let stop = stop.min(self.len());
        let start = start.min(stop);
        Array {
            dtype: self.dtype.clone(),
            data: self.data[start * itemsize..stop * itemsize].to_vec(),
        }
    }

    /// Iterate the items as [`Value`]s.
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.data
            .chunks_exact(self.dtype.itemsize().max(1))
            .map(|b| Value::read_item(&self.dtype, b))
    }

    /// Flattened scalars as `T`; fails with `TypeMismatch` on a kind mismatch.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if self.dtype.kind != T::KIND {
            return Err(Error::TypeMismatch(format!(
                "array holds {}, requested {}",
                self.dtype.kind,
                T::KIND
            )));
        }
        Ok(self
            .data
            .chunks_exact(T::KIND.size())
            .map(T::read_le)
            .collect())
    }
}

impl<T: Element> From<Vec<T>> for Array {
    fn from(values: Vec<T>) -> Self {
        Array::from_vec(values)
    }
}

impl<T: Element> From<&[T]> for Array {
    fn from(values: &[T]) -> Self {
        Array::from_slice(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_roundtrip_and_slice() {
        let a = Array::from_vec(vec![1.5f64, -2.0, 3.25]);
        assert_eq!(a.len(), 3);
        assert_eq!(a.to_vec::<f64>().unwrap(), vec![1.5, -2.0, 3.25]);
        assert_eq!(a.slice(1, 10).to_vec::<f64>().unwrap(), vec![-2.0, 3.25]);
        assert!(a.to_vec::<i64>().is_err());
    }

    #[test]
    fn from_bytes_rejects_partial_items() {
        let err = Array::from_bytes(DType::scalar(ScalarKind::Int32), vec![0; 6]).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn item_shape_is_part_of_shape() {
        let a = Array::from_slice_with_item_shape(&[1i32, 2, 3, 4, 5, 6], vec![3]).unwrap();
        assert_eq!(a.shape(), vec![2, 3]);
        assert_eq!(
            a.get(1),
            Some(Value::Array(vec![Value::Int32(4), Value::Int32(5), Value::Int32(6)]))
        );
    }
}
