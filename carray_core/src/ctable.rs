//! Column tables: ordered, equally long, named [`CArray`] columns.
//!
//! Columns are owned by the table. Adding an existing container moves it in;
//! sharing a column between tables takes an explicit `clone()` (a cheap copy
//! of the compressed chunks) or [`CArray::copy`].

use std::collections::HashMap;
use std::fmt;
use std::iter::StepBy;
use std::ops::{Index, Range};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::array::{Array, Element};
use crate::carray::CArray;
use crate::config::{ArrayOptions, CParams};
use crate::dtype::{DType, ScalarKind, Value};
use crate::error::{Error, Result};
use crate::eval::{eval, EvalOutput, Vars};
use crate::iter::{check_mask, ChunkCursor, MaskScan, MaskSource};
use crate::store::ChunkStore;
use crate::utils::{human_bytes, ratio, DISPLAY_FULL_LIMIT};

/// Name of the synthetic row-number field accepted in `outcols`.
pub const NROW: &str = "nrow__";

/// Data for a new column: a container to move in, or values to compress.
#[derive(Debug)]
pub enum ColumnData {
    CArray(CArray),
    Array(Array),
}

impl From<CArray> for ColumnData {
    fn from(c: CArray) -> Self {
        ColumnData::CArray(c)
    }
}

impl From<Array> for ColumnData {
    fn from(a: Array) -> Self {
        ColumnData::Array(a)
    }
}

impl<T: Element> From<Vec<T>> for ColumnData {
    fn from(v: Vec<T>) -> Self {
        ColumnData::Array(Array::from_vec(v))
    }
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::CArray(c) => c.len(),
            ColumnData::Array(a) => a.len(),
        }
    }
}

/// A batch of rows for [`CTable::append`].
#[derive(Debug)]
pub enum Rows<'a> {
    /// One array per column, in column order.
    Columns(Vec<Array>),
    /// One record per row, each holding a value per column in column order.
    Records(Vec<Vec<Value>>),
    /// Every row of another table with the same column names.
    Table(&'a CTable),
}

/// Row selector for [`CTable::filter`].
#[derive(Debug, Clone, Copy)]
pub enum Predicate<'a> {
    /// A boolean expression over the column names.
    Expr(&'a str),
    /// A boolean container of table length.
    Mask(&'a CArray),
}

impl<'a> From<&'a str> for Predicate<'a> {
    fn from(e: &'a str) -> Self {
        Predicate::Expr(e)
    }
}

impl<'a> From<&'a CArray> for Predicate<'a> {
    fn from(m: &'a CArray) -> Self {
        Predicate::Mask(m)
    }
}

/// One table row, restricted to the requested output columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    names: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let i = self.names.iter().position(|n| n == name)?;
        self.values.get(i)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, i: usize) -> &Value {
        &self.values[i]
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, (n, v)) in self.names.iter().zip(&self.values).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{n}={v}")?;
        }
        f.write_str(")")
    }
}

enum Positions<'a> {
    Range(StepBy<Range<usize>>),
    Mask(MaskScan<'a>),
}

enum Field<'a> {
    Column {
        store: &'a ChunkStore,
        cursor: ChunkCursor,
    },
    RowNumber,
}

/// Lazy row sequence over a table.
pub struct RowIter<'a> {
    names: Arc<[String]>,
    fields: Vec<Field<'a>>,
    positions: Positions<'a>,
    failed: bool,
}

impl RowIter<'_> {
    /// Output column names, in row order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    fn row_at(&mut self, index: usize) -> Result<Row> {
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &mut self.fields {
            values.push(match field {
                Field::Column { store, cursor } => cursor.value(store, index)?,
                Field::RowNumber => Value::Int64(index as i64),
            });
        }
        Ok(Row {
            names: Arc::clone(&self.names),
            values,
        })
    }
}

impl Iterator for RowIter<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let index = match &mut self.positions {
            Positions::Range(r) => Ok(r.next()?),
            Positions::Mask(scan) => scan.next()?,
        };
        let row = index.and_then(|i| self.row_at(i));
        self.failed = row.is_err();
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.positions {
            _ if self.failed => (0, Some(0)),
            Positions::Range(r) => r.size_hint(),
            Positions::Mask(_) => (0, None),
        }
    }
}

/// Fail unless `name` can be used as a column name: an identifier that
/// does not start with `__` and is not the row-number field.
fn check_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::invalid(format!(
            "column name '{name}' is not a valid identifier"
        )));
    }
    if name.starts_with("__") || name == NROW || name == "True" || name == "False" {
        return Err(Error::invalid(format!("column name '{name}' is reserved")));
    }
    Ok(())
}

/// An ordered set of named, equally long compressed columns.
#[derive(Clone)]
pub struct CTable {
    names: Vec<String>,
    cols: HashMap<String, CArray>,
    len: usize,
    options: ArrayOptions,
}

impl CTable {
    /// An empty table. `options` is used for every column the table builds.
    pub fn new(options: ArrayOptions) -> Self {
        Self {
            names: Vec::new(),
            cols: HashMap::new(),
            len: 0,
            options,
        }
    }

    /// Build a table from columns. Missing names default to `f0`, `f1`, ...
    pub fn from_columns(
        columns: Vec<ColumnData>,
        names: Option<Vec<String>>,
        options: ArrayOptions,
    ) -> Result<Self> {
        let names = match names {
            Some(n) if n.len() != columns.len() => {
                return Err(Error::invalid(format!(
                    "{} names given for {} columns",
                    n.len(),
                    columns.len()
                )))
            }
            Some(n) => n,
            None => (0..columns.len()).map(|i| format!("f{i}")).collect(),
        };
        let mut table = Self::new(options);
        for (col, name) in columns.into_iter().zip(names) {
            table.addcol(col, Some(name.as_str()), None)?;
        }
        Ok(table)
    }

    /// Build a table from row records matching `schema`, compressing as it
    /// goes.
    pub fn from_records<I>(schema: &[(&str, DType)], records: I, options: ArrayOptions) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let mut table = Self::new(options);
        for (name, dtype) in schema {
            let col = CArray::empty(dtype.clone(), &table.options)?;
            table.addcol(col, Some(*name), None)?;
        }
        let batch_len = table.cols.values().map(CArray::chunklen).max().unwrap_or(1);
        let mut batch = Vec::with_capacity(batch_len);
        for record in records {
            batch.push(record);
            if batch.len() == batch_len {
                table.append(Rows::Records(std::mem::take(&mut batch)))?;
            }
        }
        if !batch.is_empty() {
            table.append(Rows::Records(batch))?;
        }
        Ok(table)
    }

    // ── attributes ─────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn ncols(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// `[len]`
    pub fn shape(&self) -> Vec<usize> {
        vec![self.len]
    }

    /// `(name, dtype)` for every column, in order.
    pub fn dtype(&self) -> Vec<(String, DType)> {
        self.columns()
            .map(|(n, c)| (n.to_string(), c.dtype().clone()))
            .collect()
    }

    pub fn options(&self) -> &ArrayOptions {
        &self.options
    }

    pub fn cparams(&self) -> CParams {
        self.options.cparams
    }

    pub fn nbytes(&self) -> usize {
        self.cols.values().map(CArray::nbytes).sum()
    }

    pub fn cbytes(&self) -> usize {
        self.cols.values().map(CArray::cbytes).sum()
    }

    pub fn ratio(&self) -> f64 {
        ratio(self.nbytes(), self.cbytes())
    }

    pub fn column(&self, name: &str) -> Option<&CArray> {
        self.cols.get(name)
    }

    /// Columns in table order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &CArray)> {
        self.names
            .iter()
            .filter_map(|n| self.cols.get(n).map(|c| (n.as_str(), c)))
    }

    /// Check that every column has the table length.
    pub fn validate(&self) -> Result<()> {
        for (name, col) in self.columns() {
            if col.len() != self.len {
                warn!(column = name, len = col.len(), table_len = self.len, "column length diverged");
                return Err(Error::LengthMismatch {
                    expected: self.len,
                    actual: col.len(),
                });
            }
        }
        Ok(())
    }

    fn column_options(&self, len: usize) -> ArrayOptions {
        let expected = self.options.expected_len.unwrap_or(len);
        self.options.clone().expected_len(expected)
    }

    // ── column management ──────────────────────────────────────────────────

    /// Add a column named `name` at position `pos`.
    ///
    /// Give `name` to append at the end, `pos` to insert under the default
    /// name `f{pos}`, or both. The column length must match the table unless
    /// the table has no columns yet.
    pub fn addcol(
        &mut self,
        column: impl Into<ColumnData>,
        name: Option<&str>,
        pos: Option<usize>,
    ) -> Result<()> {
        let ncols = self.names.len();
        let (name, pos) = match (name, pos) {
            (None, None) => return Err(Error::invalid("addcol needs a name or a position")),
            (Some(n), None) => (n.to_string(), ncols),
            (None, Some(p)) => (format!("f{p}"), p),
            (Some(n), Some(p)) => (n.to_string(), p),
        };
        if pos > ncols {
            return Err(Error::invalid(format!(
                "position {pos} out of range for {ncols} columns"
            )));
        }
        check_name(&name)?;
        if self.cols.contains_key(&name) {
            return Err(Error::DuplicateName(name));
        }
        let column = column.into();
        if ncols > 0 && column.len() != self.len {
            return Err(Error::LengthMismatch {
                expected: self.len,
                actual: column.len(),
            });
        }
        let col = match column {
            ColumnData::CArray(c) => c,
            ColumnData::Array(a) => CArray::new(&a, &self.column_options(a.len()))?,
        };
        if ncols == 0 {
            self.len = col.len();
        }
        debug!(column = %name, pos, len = col.len(), dtype = %col.dtype(), "added column");
        self.names.insert(pos, name.clone());
        self.cols.insert(name, col);
        self.validate()
    }

    /// Remove a column by name, position, or both (which must agree), and
    /// hand it back.
    pub fn delcol(&mut self, name: Option<&str>, pos: Option<usize>) -> Result<CArray> {
        let pos = match (name, pos) {
            (None, None) => return Err(Error::invalid("delcol needs a name or a position")),
            (Some(n), p) => {
                let found = self
                    .names
                    .iter()
                    .position(|c| c == n)
                    .ok_or_else(|| Error::invalid(format!("column '{n}' not found")))?;
                match p {
                    Some(p) if p != found => {
                        return Err(Error::invalid(format!(
                            "column '{n}' is at position {found}, not {p}"
                        )))
                    }
                    _ => found,
                }
            }
            (None, Some(p)) if p < self.names.len() => p,
            (None, Some(p)) => {
                return Err(Error::invalid(format!(
                    "position {p} out of range for {} columns",
                    self.names.len()
                )))
            }
        };
        let name = self.names.remove(pos);
        let col = self
            .cols
            .remove(&name)
            .ok_or_else(|| Error::invalid(format!("column '{name}' not found")))?;
        if self.names.is_empty() {
            self.len = 0;
        }
        debug!(column = %name, pos, "removed column");
        self.validate()?;
        Ok(col)
    }

    // ── growth and shrinking ───────────────────────────────────────────────

    /// Append a batch of rows to every column.
    ///
    /// Either every column grows by the batch size or, on failure, every
    /// column is rolled back to its previous length.
    pub fn append(&mut self, rows: Rows<'_>) -> Result<usize> {
        let ncols = self.names.len();
        if ncols == 0 {
            return Err(Error::invalid("cannot append rows to a table without columns"));
        }
        let batches = match rows {
            Rows::Table(other) => return self.append_table(other),
            Rows::Columns(arrays) => self.prepare_columns(arrays)?,
            Rows::Records(records) => self.prepare_records(&records)?,
        };
        let n = batches.first().map_or(0, Array::len);
        let before = self.len;
        self.append_each(|col, i| col.append(&batches[i]), before)?;
        self.len += n;
        self.validate()?;
        Ok(n)
    }

    fn prepare_columns(&self, arrays: Vec<Array>) -> Result<Vec<Array>> {
        if arrays.len() != self.names.len() {
            return Err(Error::invalid(format!(
                "{} arrays given for {} columns",
                arrays.len(),
                self.names.len()
            )));
        }
        let n = arrays[0].len();
        let mut out = Vec::with_capacity(arrays.len());
        for (array, (name, col)) in arrays.into_iter().zip(self.columns()) {
            if array.len() != n {
                return Err(Error::LengthMismatch {
                    expected: n,
                    actual: array.len(),
                });
            }
            if array.dtype() == col.dtype() {
                out.push(array);
            } else {
                let values: Vec<Value> = array.values().collect();
                let cast = Array::from_values(col.dtype().clone(), &values).map_err(|e| {
                    Error::TypeMismatch(format!("column '{name}': {e}"))
                })?;
                out.push(cast);
            }
        }
        Ok(out)
    }

    fn prepare_records(&self, records: &[Vec<Value>]) -> Result<Vec<Array>> {
        let ncols = self.names.len();
        if let Some(bad) = records.iter().find(|r| r.len() != ncols) {
            return Err(Error::invalid(format!(
                "record of {} values given for {} columns",
                bad.len(),
                ncols
            )));
        }
        self.columns()
            .enumerate()
            .map(|(i, (name, col))| {
                let values: Vec<Value> = records.iter().map(|r| r[i].clone()).collect();
                Array::from_values(col.dtype().clone(), &values)
                    .map_err(|e| Error::TypeMismatch(format!("column '{name}': {e}")))
            })
            .collect()
    }

    fn append_table(&mut self, other: &CTable) -> Result<usize> {
        let mut sources = Vec::with_capacity(self.names.len());
        for (name, col) in self.columns() {
            let src = other.column(name).ok_or_else(|| {
                Error::invalid(format!("source table has no column '{name}'"))
            })?;
            col.dtype().check_compatible(src.dtype())?;
            sources.push(src);
        }
        if other.ncols() != self.ncols() {
            return Err(Error::invalid(format!(
                "source table has {} columns, expected {}",
                other.ncols(),
                self.ncols()
            )));
        }
        let before = self.len;
        self.append_each(|col, i| col.extend_from(sources[i]), before)?;
        self.len += other.len();
        self.validate()?;
        Ok(other.len())
    }

    /// Run `op` on every column in order, rolling all of them back to
    /// `before` items if any call fails.
    fn append_each<F>(&mut self, mut op: F, before: usize) -> Result<()>
    where
        F: FnMut(&mut CArray, usize) -> Result<usize>,
    {
        for i in 0..self.names.len() {
            let col = self
                .cols
                .get_mut(&self.names[i])
                .ok_or_else(|| Error::invalid(format!("column '{}' missing", self.names[i])))?;
            if let Err(e) = op(col, i) {
                warn!(column = %self.names[i], error = %e, "append failed; rolling back");
                for name in &self.names[..=i] {
                    if let Some(c) = self.cols.get_mut(name) {
                        c.rollback(before);
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Remove the trailing `nitems` rows.
    pub fn trim(&mut self, nitems: usize) -> Result<()> {
        if nitems > self.len {
            return Err(Error::invalid(format!(
                "cannot trim {} rows from a table of length {}",
                nitems, self.len
            )));
        }
        self.resize(self.len - nitems)
    }

    /// Set the row count, truncating or padding every column with zeros.
    pub fn resize(&mut self, nitems: usize) -> Result<()> {
        let before = self.len;
        if nitems > before {
            self.append_each(|col, _| col.resize(nitems).map(|_| nitems - before), before)?;
        } else {
            // Every column's cut is decompressed up front, so a failure here
            // leaves all columns at their old length.
            let mut cuts = Vec::with_capacity(self.names.len());
            for name in &self.names {
                let col = self
                    .column(name)
                    .ok_or_else(|| Error::invalid(format!("column '{name}' is missing")))?;
                cuts.push((name.clone(), col.plan_truncate(nitems)?));
            }
            for (name, cut) in cuts {
                if let Some(col) = self.cols.get_mut(&name) {
                    col.apply_truncate(cut);
                }
            }
        }
        self.len = nitems;
        self.validate()
    }

    // ── copies ─────────────────────────────────────────────────────────────

    /// Recompress every column under `opts` (default: each column's own
    /// layout). The new table uses `opts` as its default options.
    pub fn copy(&self, opts: Option<&ArrayOptions>) -> Result<CTable> {
        let mut out = CTable::new(opts.cloned().unwrap_or_else(|| self.options.clone()));
        for (name, col) in self.columns() {
            out.addcol(col.copy(opts)?, Some(name), None)?;
        }
        Ok(out)
    }

    /// A new table holding copies of the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<CTable> {
        let mut out = CTable::new(self.options.clone());
        for name in names {
            let col = self
                .column(name)
                .ok_or_else(|| Error::invalid(format!("column '{name}' not found")))?;
            out.addcol(col.clone(), Some(*name), None)?;
        }
        Ok(out)
    }

    // ── reads ──────────────────────────────────────────────────────────────

    /// Row `index` with every column.
    pub fn get_row(&self, index: usize) -> Result<Row> {
        if index >= self.len {
            return Err(Error::invalid(format!(
                "row {} out of range for length {}",
                index, self.len
            )));
        }
        let values = self
            .columns()
            .map(|(_, c)| c.get(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Row {
            names: self.names.clone().into(),
            values,
        })
    }

    /// Evaluate `expression` over the columns, chunk by chunk.
    ///
    /// The result always has the table length; a constant expression is
    /// broadcast.
    pub fn eval(&self, expression: &str) -> Result<CArray> {
        self.eval_with(expression, &Vars::new())
    }

    /// Like [`eval`](Self::eval), with extra variables next to the columns.
    /// An extra variable may not reuse a column name.
    pub fn eval_with(&self, expression: &str, extra: &Vars<'_>) -> Result<CArray> {
        let mut vars = extra.clone();
        for (name, col) in self.columns() {
            if vars.insert(name, col).is_some() {
                return Err(Error::invalid(format!(
                    "variable '{name}' clashes with a column name"
                )));
            }
        }
        let opts = self.column_options(self.len);
        match eval(expression, &vars, &opts)? {
            EvalOutput::Array(c) => Ok(c),
            EvalOutput::Scalar(v) => {
                let kind = v.kind().unwrap_or(ScalarKind::Float64);
                let filled = Array::filled(DType::scalar(kind), &v, self.len)?;
                CArray::new(&filled, &opts)
            }
        }
    }

    fn fields(&self, outcols: Option<&[&str]>) -> Result<(Arc<[String]>, Vec<Field<'_>>)> {
        let names: Vec<String> = match outcols {
            Some(cols) => cols.iter().map(|s| s.to_string()).collect(),
            None => self.names.clone(),
        };
        let mut fields = Vec::with_capacity(names.len());
        for name in &names {
            if name == NROW {
                fields.push(Field::RowNumber);
                continue;
            }
            let col = self
                .column(name)
                .ok_or_else(|| Error::invalid(format!("output column '{name}' not found")))?;
            fields.push(Field::Column {
                store: col.store(),
                cursor: ChunkCursor::new(),
            });
        }
        Ok((names.into(), fields))
    }

    /// Rows `start, start+step, ...` below `stop` (default: the length),
    /// restricted to `outcols` (default: all columns). `outcols` may name
    /// [`NROW`] to include the row number.
    pub fn iter(
        &self,
        start: usize,
        stop: Option<usize>,
        step: usize,
        outcols: Option<&[&str]>,
    ) -> Result<RowIter<'_>> {
        if step == 0 {
            return Err(Error::invalid("step must be a positive integer"));
        }
        if start > self.len {
            return Err(Error::invalid(format!(
                "start {} out of range for length {}",
                start, self.len
            )));
        }
        let stop = stop.unwrap_or(self.len).min(self.len).max(start);
        let (names, fields) = self.fields(outcols)?;
        Ok(RowIter {
            names,
            fields,
            positions: Positions::Range((start..stop).step_by(step)),
            failed: false,
        })
    }

    /// Every row with every column.
    pub fn rows(&self) -> Result<RowIter<'_>> {
        self.iter(0, None, 1, None)
    }

    /// Rows where `predicate` holds, in row order.
    pub fn filter<'a>(
        &'a self,
        predicate: impl Into<Predicate<'a>>,
        outcols: Option<&[&str]>,
    ) -> Result<RowIter<'a>> {
        let mask = match predicate.into() {
            Predicate::Mask(m) => {
                check_mask(m, self.len)?;
                MaskSource::Borrowed(m)
            }
            Predicate::Expr(e) => {
                let m = self.eval(e)?;
                if m.dtype().kind != ScalarKind::Bool {
                    return Err(Error::TypeMismatch(format!(
                        "filter expression '{e}' yields {}, not bool",
                        m.dtype()
                    )));
                }
                MaskSource::Shared(Arc::new(m))
            }
        };
        let (names, fields) = self.fields(outcols)?;
        Ok(RowIter {
            names,
            fields,
            positions: Positions::Mask(MaskScan::new(mask)),
            failed: false,
        })
    }
}

impl fmt::Debug for CTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CTable")
            .field("len", &self.len)
            .field("names", &self.names)
            .field("options", &self.options)
            .finish()
    }
}

impl fmt::Display for CTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schema: Vec<String> = self
            .columns()
            .map(|(n, c)| format!("('{n}', '{}')", c.dtype()))
            .collect();
        writeln!(f, "ctable(({},), [{}])", self.len, schema.join(", "))?;
        writeln!(
            f,
            "  nbytes: {}; cbytes: {}; ratio: {:.2}",
            human_bytes(self.nbytes()),
            human_bytes(self.cbytes()),
            self.ratio()
        )?;
        writeln!(f, "  {}", self.cparams())?;
        let elided = self.len > DISPLAY_FULL_LIMIT;
        let shown: Vec<usize> = if elided {
            (0..3).chain(self.len - 3..self.len).collect()
        } else {
            (0..self.len).collect()
        };
        f.write_str("[")?;
        for (k, i) in shown.iter().enumerate() {
            if k > 0 {
                f.write_str(if elided && k == 3 { ",\n ...\n " } else { ",\n " })?;
            }
            match self.get_row(*i) {
                Ok(row) => write!(f, "{row}")?,
                Err(_) => f.write_str("?")?,
            }
        }
        f.write_str("]")
    }
}
