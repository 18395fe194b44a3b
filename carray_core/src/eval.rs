//! Chunk-wise evaluation of expressions over containers.
//!
//! Operands are split into aligned blocks (one chunk when every container
//! shares a chunk length), each block is evaluated on its own and the
//! results are appended to the output container in block order. Peak extra
//! memory is a few blocks, never the whole operand.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::debug;

use crate::array::Array;
use crate::carray::CArray;
use crate::config::ArrayOptions;
use crate::dtype::{DType, ScalarKind, Value};
use crate::engine;
use crate::error::{Error, Result};
use crate::expr::{self, Binding, Bindings, Evaluated};
use crate::store::calc_chunklen;

/// Something an expression variable can be bound to.
#[derive(Debug, Clone)]
pub enum Operand<'a> {
    CArray(&'a CArray),
    Array(&'a Array),
    Scalar(Value),
}

impl Operand<'_> {
    fn len(&self) -> Option<usize> {
        match self {
            Operand::CArray(c) => Some(c.len()),
            Operand::Array(a) => Some(a.len()),
            Operand::Scalar(_) => None,
        }
    }

    fn dtype(&self) -> Option<&DType> {
        match self {
            Operand::CArray(c) => Some(c.dtype()),
            Operand::Array(a) => Some(a.dtype()),
            Operand::Scalar(_) => None,
        }
    }
}

impl<'a> From<&'a CArray> for Operand<'a> {
    fn from(c: &'a CArray) -> Self {
        Operand::CArray(c)
    }
}

impl<'a> From<&'a Array> for Operand<'a> {
    fn from(a: &'a Array) -> Self {
        Operand::Array(a)
    }
}

impl From<Value> for Operand<'_> {
    fn from(v: Value) -> Self {
        Operand::Scalar(v)
    }
}

/// Explicit name-to-operand mapping for [`eval`].
#[derive(Debug, Clone, Default)]
pub struct Vars<'a> {
    entries: HashMap<String, Operand<'a>>,
}

impl<'a> Vars<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, returning the operand it replaces.
    pub fn insert(&mut self, name: impl Into<String>, operand: impl Into<Operand<'a>>) -> Option<Operand<'a>> {
        self.entries.insert(name.into(), operand.into())
    }

    pub fn with(mut self, name: impl Into<String>, operand: impl Into<Operand<'a>>) -> Self {
        self.insert(name, operand);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Operand<'a>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What [`eval`] produces: a new container, or a single value when no
/// array operand took part.
#[derive(Debug)]
pub enum EvalOutput {
    Array(CArray),
    Scalar(Value),
}

impl EvalOutput {
    pub fn into_carray(self) -> Option<CArray> {
        match self {
            EvalOutput::Array(c) => Some(c),
            EvalOutput::Scalar(_) => None,
        }
    }

    pub fn into_scalar(self) -> Option<Value> {
        match self {
            EvalOutput::Array(_) => None,
            EvalOutput::Scalar(v) => Some(v),
        }
    }
}

struct Plan<'v, 'a> {
    expr: expr::Expr,
    operands: Vec<(&'v str, &'v Operand<'a>)>,
}

impl Plan<'_, '_> {
    /// Evaluate items `start..stop` of every operand.
    fn block(&self, start: usize, stop: usize, cached: bool) -> Result<Array> {
        let mut bindings = Bindings::with_capacity(self.operands.len());
        for (name, operand) in &self.operands {
            let binding = match operand {
                Operand::CArray(c) if cached => Binding::Array(c.read_range(start, stop)?),
                Operand::CArray(c) => Binding::Array(c.read_range_uncached(start, stop)?),
                Operand::Array(a) => Binding::Array(a.slice(start, stop)),
                Operand::Scalar(v) => Binding::Scalar(v.clone()),
            };
            bindings.insert(name.to_string(), binding);
        }
        let n = stop - start;
        match expr::evaluate(&self.expr, &bindings)? {
            Evaluated::Array(a) if a.len() == n => Ok(a),
            Evaluated::Array(_) => Err(Error::Expression(
                "reduction operations are not supported".into(),
            )),
            Evaluated::Scalar(v) => {
                let kind = v.kind().unwrap_or(ScalarKind::Float64);
                Array::filled(DType::scalar(kind), &v, n)
            }
        }
    }
}

/// Evaluate `expression` chunk by chunk over the operands in `vars`.
///
/// Every array operand must have the same length. The output container is
/// built with `opts`, using the operand length as its expected length unless
/// `opts` sets one.
pub fn eval(expression: &str, vars: &Vars<'_>, opts: &ArrayOptions) -> Result<EvalOutput> {
    let parsed = expr::parse(expression)?;
    let names = parsed.variables();
    let mut operands = Vec::with_capacity(names.len());
    for name in &names {
        let operand = vars
            .get(name)
            .ok_or_else(|| Error::UnknownVariable(name.clone()))?;
        if let Some(dtype) = operand.dtype() {
            if dtype.kind == ScalarKind::UInt64 {
                return Err(Error::TypeMismatch(format!(
                    "variable '{name}' is uint64, which expressions do not support"
                )));
            }
            if !dtype.is_scalar() {
                return Err(Error::TypeMismatch(format!(
                    "variable '{name}' has multidimensional items ({dtype})"
                )));
            }
        }
        operands.push((name.as_str(), operand));
    }

    let mut lengths = operands.iter().filter_map(|(_, o)| o.len());
    let Some(vlen) = lengths.next() else {
        let bindings: Bindings = operands
            .iter()
            .filter_map(|(name, o)| match o {
                Operand::Scalar(v) => Some((name.to_string(), Binding::Scalar(v.clone()))),
                _ => None,
            })
            .collect();
        return match expr::evaluate(&parsed, &bindings)? {
            Evaluated::Scalar(v) => Ok(EvalOutput::Scalar(v)),
            Evaluated::Array(_) => Err(Error::Expression(
                "scalar operands produced an array result".into(),
            )),
        };
    };
    if let Some(bad) = lengths.find(|&l| l != vlen) {
        return Err(Error::LengthMismatch {
            expected: vlen,
            actual: bad,
        });
    }

    let chunklens: Vec<usize> = operands
        .iter()
        .filter_map(|(_, o)| match o {
            Operand::CArray(c) => Some(c.chunklen()),
            _ => None,
        })
        .collect();
    let aligned = chunklens.windows(2).all(|w| w[0] == w[1]);
    let blocklen = match chunklens.iter().min() {
        Some(&min) => min,
        None => calc_chunklen(vlen, std::mem::size_of::<f64>()),
    };

    let blocks: Vec<(usize, usize)> = (0..vlen.max(1))
        .step_by(blocklen)
        .map(|start| (start, (start + blocklen).min(vlen)))
        .collect();
    debug!(
        expression,
        len = vlen,
        blocklen,
        aligned,
        blocks = blocks.len(),
        "chunk-wise eval"
    );

    let plan = Plan {
        expr: parsed,
        operands,
    };
    let (first_start, first_stop) = blocks[0];
    let first = plan.block(first_start, first_stop, true)?;
    let out_opts = opts
        .clone()
        .expected_len(opts.expected_len.unwrap_or(vlen));
    let mut out = CArray::empty(first.dtype().clone(), &out_opts)?;
    out.append(&first)?;

    let rest = &blocks[1..];
    match engine::pool() {
        Some(pool) if rest.len() > 1 => {
            let wave = pool.current_num_threads().max(1);
            for group in rest.chunks(wave) {
                let results: Vec<Array> = pool.install(|| {
                    group
                        .par_iter()
                        .map(|&(start, stop)| plan.block(start, stop, false))
                        .collect::<Result<_>>()
                })?;
                for block in &results {
                    out.append(block)?;
                }
            }
        }
        _ => {
            for &(start, stop) in rest {
                let block = plan.block(start, stop, true)?;
                out.append(&block)?;
            }
        }
    }
    Ok(EvalOutput::Array(out))
}
