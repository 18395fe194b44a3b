//! Container constructors that build chunk by chunk, so at most one chunk of
//! raw data is held at a time.

use tracing::debug;

use crate::carray::CArray;
use crate::config::ArrayOptions;
use crate::dtype::{DType, ScalarKind, Value};
use crate::error::{Error, Result};

fn empty_for(dtype: DType, len: Option<usize>, opts: &ArrayOptions) -> Result<CArray> {
    match (opts.expected_len, len) {
        (None, Some(n)) => CArray::empty(dtype, &opts.clone().expected_len(n)),
        _ => CArray::empty(dtype, opts),
    }
}

/// Build a container from a sequence of values, cast to `dtype`.
///
/// With `count` set, exactly that many values are taken and a shorter
/// sequence is an error; otherwise the sequence is read to exhaustion.
pub fn fromiter<I>(values: I, dtype: DType, count: Option<usize>, opts: &ArrayOptions) -> Result<CArray>
where
    I: IntoIterator<Item = Value>,
{
    let mut out = empty_for(dtype, count, opts)?;
    let block_items = out.chunklen();
    let itemsize = out.dtype().itemsize();
    let mut buf = Vec::with_capacity(block_items * itemsize);
    let mut seen = 0usize;
    let limit = count.unwrap_or(usize::MAX);
    for value in values.into_iter().take(limit) {
        value.write_item(out.dtype(), &mut buf)?;
        seen += 1;
        if buf.len() == block_items * itemsize {
            out.store_append(&buf)?;
            buf.clear();
        }
    }
    if !buf.is_empty() {
        out.store_append(&buf)?;
    }
    if let Some(n) = count {
        if seen < n {
            return Err(Error::invalid(format!(
                "iterator yielded {seen} values, {n} were requested"
            )));
        }
    }
    Ok(out)
}

fn repeat_item(dtype: DType, item: &[u8], len: usize, opts: &ArrayOptions) -> Result<CArray> {
    let mut out = empty_for(dtype, Some(len), opts)?;
    let block = item.repeat(out.chunklen().min(len.max(1)));
    let block_items = block.len() / item.len().max(1);
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(block_items);
        out.store_append(&block[..n * item.len()])?;
        remaining -= n;
    }
    Ok(out)
}

/// `len` copies of a scalar `value`.
pub fn fill(len: usize, value: impl Into<Value>, opts: &ArrayOptions) -> Result<CArray> {
    let value = value.into();
    let kind = value
        .kind()
        .ok_or_else(|| Error::TypeMismatch("fill needs a scalar value".into()))?;
    let dtype = DType::scalar(kind);
    let mut item = Vec::with_capacity(dtype.itemsize());
    value.write_item(&dtype, &mut item)?;
    repeat_item(dtype, &item, len, opts)
}

/// `len` zero-valued items of `dtype`.
pub fn zeros(len: usize, dtype: DType, opts: &ArrayOptions) -> Result<CArray> {
    let item = vec![0u8; dtype.itemsize()];
    repeat_item(dtype, &item, len, opts)
}

/// `len` items of `dtype` with every scalar set to one (`true` for bool).
pub fn ones(len: usize, dtype: DType, opts: &ArrayOptions) -> Result<CArray> {
    let one = match dtype.kind {
        ScalarKind::Bool => Value::Bool(true),
        _ => Value::Int8(1),
    };
    let value = if dtype.is_scalar() {
        one
    } else {
        Value::Array(vec![one; dtype.scalars_per_item()])
    };
    let mut item = Vec::with_capacity(dtype.itemsize());
    value.write_item(&dtype, &mut item)?;
    repeat_item(dtype, &item, len, opts)
}

/// Evenly spaced values in `[start, stop)` with the given `step`.
///
/// For integer kinds `start` and `step` must be whole numbers.
pub fn arange(start: f64, stop: f64, step: f64, kind: ScalarKind, opts: &ArrayOptions) -> Result<CArray> {
    if step == 0.0 || !step.is_finite() || !start.is_finite() || !stop.is_finite() {
        return Err(Error::invalid("arange needs finite bounds and a non-zero step"));
    }
    if kind == ScalarKind::Bool {
        return Err(Error::invalid("arange does not produce bool values"));
    }
    let integral = kind.is_integer();
    if integral && (start.fract() != 0.0 || step.fract() != 0.0) {
        return Err(Error::invalid(format!(
            "arange of {kind} needs whole-number start and step"
        )));
    }
    let len = ((stop - start) / step).ceil().max(0.0) as usize;
    let dtype = DType::scalar(kind);
    let mut out = empty_for(dtype.clone(), Some(len), opts)?;
    let block_items = out.chunklen();
    let mut buf = Vec::with_capacity(block_items * dtype.itemsize());
    let mut i = 0usize;
    while i < len {
        let end = (i + block_items).min(len);
        buf.clear();
        for k in i..end {
            let v = if integral {
                Value::Int64(start as i64 + (k as i64) * (step as i64))
            } else {
                Value::Float64(start + (k as f64) * step)
            };
            v.write_item(&dtype, &mut buf)?;
        }
        out.store_append(&buf)?;
        i = end;
    }
    debug!(len, kind = %kind, "built arange");
    Ok(out)
}
