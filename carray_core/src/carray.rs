use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::array::{Array, Element};
use crate::cache::{CacheStats, ChunkCache};
use crate::codec::Codec;
use crate::config::{ArrayOptions, CParams};
use crate::dtype::{DType, Value};
use crate::error::{Error, Result};
use crate::iter::{check_mask, Iter, WhereIter, WhereTrueIter};
use crate::store::{calc_chunklen, ChunkStore, Truncation, DEFAULT_EXPECTED_LEN};
use crate::utils::{human_bytes, range_len, ratio, DISPLAY_FULL_LIMIT};

/// A chunked, compressed, one-dimensional container.
///
/// Content lives in a [`ChunkStore`]: immutable compressed chunks of
/// `chunklen` items plus an uncompressed leftover tail. Random reads go
/// through a small [`ChunkCache`]; iterators carry their own one-chunk
/// buffer instead.
///
/// Mutation takes `&mut self`, so the borrow checker enforces the single
/// writer. Reads take `&self` and may run concurrently.
///
/// `Clone` duplicates the compressed chunks as they are, without
/// recompressing, and starts with a cold cache.
#[derive(Clone)]
pub struct CArray {
    store: ChunkStore,
    cache: ChunkCache,
}

impl CArray {
    /// Build a container holding a copy of `seed`.
    ///
    /// Unless `opts` says otherwise, the chunk length is derived from the
    /// seed length.
    pub fn new(seed: &Array, opts: &ArrayOptions) -> Result<Self> {
        let expected = opts.expected_len.unwrap_or(seed.len());
        let mut array = Self::with_expected(seed.dtype().clone(), opts, expected)?;
        array.store.append(seed.as_bytes())?;
        Ok(array)
    }

    /// An empty container of `dtype`.
    pub fn empty(dtype: DType, opts: &ArrayOptions) -> Result<Self> {
        let expected = opts.expected_len.unwrap_or(DEFAULT_EXPECTED_LEN);
        Self::with_expected(dtype, opts, expected)
    }

    pub fn from_slice<T: Element>(values: &[T], opts: &ArrayOptions) -> Result<Self> {
        Self::new(&Array::from_slice(values), opts)
    }

    fn with_expected(dtype: DType, opts: &ArrayOptions, expected: usize) -> Result<Self> {
        let chunklen = match opts.chunklen {
            Some(n) => n,
            None => calc_chunklen(expected, dtype.itemsize()),
        };
        let store = ChunkStore::new(Arc::clone(&opts.codec), opts.cparams, dtype, chunklen)?;
        Ok(Self {
            store,
            cache: ChunkCache::new(opts.cache_capacity),
        })
    }

    // ── attributes ─────────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn dtype(&self) -> &DType {
        self.store.dtype()
    }

    /// `[len, item_shape...]`
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = vec![self.len()];
        shape.extend_from_slice(&self.dtype().item_shape);
        shape
    }

    pub fn chunklen(&self) -> usize {
        self.store.chunklen()
    }

    pub fn cparams(&self) -> CParams {
        self.store.cparams()
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        self.store.codec()
    }

    /// Uncompressed size in bytes.
    pub fn nbytes(&self) -> usize {
        self.store.nbytes()
    }

    /// Compressed size in bytes (the leftover counts uncompressed).
    pub fn cbytes(&self) -> usize {
        self.store.cbytes()
    }

    pub fn ratio(&self) -> f64 {
        ratio(self.nbytes(), self.cbytes())
    }

    pub fn nchunks(&self) -> usize {
        self.store.nchunks()
    }

    pub fn leftover_len(&self) -> usize {
        self.store.leftover_len()
    }

    /// Read-only view of the underlying chunk store.
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The options that would rebuild a container with this layout.
    pub fn options(&self) -> ArrayOptions {
        ArrayOptions::new(Arc::clone(self.codec()))
            .cparams(self.cparams())
            .chunklen(self.chunklen())
            .cache_capacity(self.cache.capacity())
    }

    // ── growth ─────────────────────────────────────────────────────────────

    /// Append the items of `data`, which must have this container's dtype.
    ///
    /// Returns the number of items appended.
    pub fn append(&mut self, data: &Array) -> Result<usize> {
        self.dtype().check_compatible(data.dtype())?;
        self.store.append(data.as_bytes())
    }

    pub fn append_slice<T: Element>(&mut self, values: &[T]) -> Result<usize> {
        self.append(&Array::from_slice(values))
    }

    /// Append values, casting each to this container's dtype.
    pub fn append_values(&mut self, values: &[Value]) -> Result<usize> {
        let data = Array::from_values(self.dtype().clone(), values)?;
        self.store.append(data.as_bytes())
    }

    /// Append the full content of `other` one chunk at a time.
    ///
    /// On failure the receiver is restored to its previous length.
    pub fn extend_from(&mut self, other: &CArray) -> Result<usize> {
        self.dtype().check_compatible(other.dtype())?;
        let before = self.len();
        if let Err(e) = self.append_chunks_of(other) {
            self.rollback(before);
            return Err(e);
        }
        Ok(other.len())
    }

    fn append_chunks_of(&mut self, other: &CArray) -> Result<()> {
        for ci in 0..other.nchunks() {
            let raw = other.store.decompress(ci)?;
            self.store.append(&raw)?;
        }
        self.store.append(other.store.leftover_bytes())?;
        Ok(())
    }

    /// Append raw little-endian items of this container's dtype.
    pub(crate) fn store_append(&mut self, raw: &[u8]) -> Result<usize> {
        self.store.append(raw)
    }

    pub(crate) fn rollback(&mut self, len: usize) {
        if self.len() > len {
            if let Err(e) = self.store.truncate(len, &self.cache) {
                warn!(error = %e, target_len = len, "rollback truncate failed");
            }
        }
    }

    // ── shrinking ──────────────────────────────────────────────────────────

    /// Shrink to `new_len` items.
    pub fn truncate(&mut self, new_len: usize) -> Result<()> {
        self.store.truncate(new_len, &self.cache)
    }

    pub(crate) fn plan_truncate(&self, new_len: usize) -> Result<Truncation> {
        self.store.plan_truncate(new_len)
    }

    pub(crate) fn apply_truncate(&mut self, cut: Truncation) {
        self.store.apply_truncate(cut, &self.cache)
    }

    /// Remove the trailing `nitems` items.
    pub fn trim(&mut self, nitems: usize) -> Result<()> {
        let len = self.len();
        if nitems > len {
            return Err(Error::invalid(format!(
                "cannot trim {} items from a container of length {}",
                nitems, len
            )));
        }
        self.truncate(len - nitems)
    }

    /// Set the length to `nitems`, truncating or padding with zero-valued items.
    pub fn resize(&mut self, nitems: usize) -> Result<()> {
        let len = self.len();
        if nitems <= len {
            return self.truncate(nitems);
        }
        let block = Array::zeros(self.dtype().clone(), self.chunklen());
        let mut remaining = nitems - len;
        while remaining > 0 {
            let n = remaining.min(block.len());
            let part = if n == block.len() { block.clone() } else { block.slice(0, n) };
            if let Err(e) = self.store.append(part.as_bytes()) {
                self.rollback(len);
                return Err(e);
            }
            remaining -= n;
        }
        Ok(())
    }

    // ── reads ──────────────────────────────────────────────────────────────

    /// The item at `index`.
    pub fn get(&self, index: usize) -> Result<Value> {
        let bytes = self.store.read(index, Some(&self.cache))?;
        Ok(Value::read_item(self.dtype(), &bytes))
    }

    /// Items `start..stop` as a dense array, through the chunk cache.
    pub fn read_range(&self, start: usize, stop: usize) -> Result<Array> {
        let bytes = self.store.read_range(start, stop, Some(&self.cache))?;
        Array::from_bytes(self.dtype().clone(), bytes)
    }

    /// Same as [`read_range`](Self::read_range) but bypassing the cache,
    /// for use from worker threads.
    pub(crate) fn read_range_uncached(&self, start: usize, stop: usize) -> Result<Array> {
        let bytes = self.store.read_range(start, stop, None)?;
        Array::from_bytes(self.dtype().clone(), bytes)
    }

    /// Items `start, start+step, ...` below `stop` as a dense array.
    ///
    /// `stop` is clamped to the length; `step` must be at least 1.
    pub fn slice(&self, start: usize, stop: usize, step: usize) -> Result<Array> {
        let (start, stop) = self.check_range(start, Some(stop), step)?;
        if step == 1 {
            return self.read_range(start, stop);
        }
        let mut data = Vec::with_capacity(range_len(start, stop, step) * self.store.itemsize());
        for item in Iter::new(&self.store, start, stop, step) {
            item?.write_item(self.dtype(), &mut data)?;
        }
        Array::from_bytes(self.dtype().clone(), data)
    }

    /// Materialize the whole content.
    pub fn to_array(&self) -> Result<Array> {
        self.read_range(0, self.len())
    }

    /// Materialize the whole content as flattened scalars of `T`.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        self.to_array()?.to_vec()
    }

    fn check_range(&self, start: usize, stop: Option<usize>, step: usize) -> Result<(usize, usize)> {
        if step == 0 {
            return Err(Error::invalid("step must be a positive integer"));
        }
        let len = self.len();
        let stop = stop.unwrap_or(len).min(len);
        if start > len {
            return Err(Error::invalid(format!(
                "start {} out of range for length {}",
                start, len
            )));
        }
        Ok((start, stop.max(start)))
    }

    // ── iteration ──────────────────────────────────────────────────────────

    /// Every item, in order.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(&self.store, 0, self.len(), 1)
    }

    /// Items at `start, start+step, ...` below `stop` (default: the length).
    pub fn iter_range(&self, start: usize, stop: Option<usize>, step: usize) -> Result<Iter<'_>> {
        let (start, stop) = self.check_range(start, stop, step)?;
        Ok(Iter::new(&self.store, start, stop, step))
    }

    /// Values at the positions where `mask` is true, in index order.
    ///
    /// `mask` must be a bool container of the same length.
    pub fn filter<'a>(&'a self, mask: &'a CArray) -> Result<WhereIter<'a>> {
        check_mask(mask, self.len())?;
        Ok(WhereIter::new(&self.store, mask))
    }

    /// Indices where this bool container is true.
    pub fn wheretrue(&self) -> Result<WhereTrueIter<'_>> {
        check_mask(self, self.len())?;
        Ok(WhereTrueIter::new(self))
    }

    // ── copies ─────────────────────────────────────────────────────────────

    /// Re-chunk and recompress the full content under `opts` (default: the
    /// current layout). The receiver is left unchanged.
    pub fn copy(&self, opts: Option<&ArrayOptions>) -> Result<CArray> {
        let current;
        let opts = match opts {
            Some(o) => o,
            None => {
                current = self.options();
                &current
            }
        };
        let expected = opts.expected_len.unwrap_or(self.len());
        let mut out = Self::with_expected(self.dtype().clone(), opts, expected)?;
        out.extend_from(self)?;
        debug!(
            len = out.len(),
            chunklen = out.chunklen(),
            clevel = out.cparams().clevel(),
            "copied container"
        );
        Ok(out)
    }
}

impl fmt::Debug for CArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CArray")
            .field("len", &self.len())
            .field("dtype", self.dtype())
            .field("chunklen", &self.chunklen())
            .field("nchunks", &self.nchunks())
            .field("leftover", &self.leftover_len())
            .field("cparams", &self.cparams())
            .field("codec", &self.codec().name())
            .finish()
    }
}

impl fmt::Display for CArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.shape().iter().map(usize::to_string).collect();
        let shape = match dims.len() {
            1 => format!("({},)", dims[0]),
            _ => format!("({})", dims.join(", ")),
        };
        writeln!(
            f,
            "carray({}, {})  nbytes: {}; cbytes: {}; ratio: {:.2}",
            shape,
            self.dtype(),
            human_bytes(self.nbytes()),
            human_bytes(self.cbytes()),
            self.ratio()
        )?;
        writeln!(f, "  {}", self.cparams())?;
        let len = self.len();
        let show = |f: &mut fmt::Formatter<'_>, range: std::ops::Range<usize>| -> fmt::Result {
            for i in range {
                match self.get(i) {
                    Ok(v) => write!(f, "{v}")?,
                    Err(_) => f.write_str("?")?,
                }
                if i + 1 < len {
                    f.write_str(", ")?;
                }
            }
            Ok(())
        };
        f.write_str("[")?;
        if len > DISPLAY_FULL_LIMIT {
            show(f, 0..3)?;
            f.write_str("..., ")?;
            show(f, len - 3..len)?;
        } else {
            show(f, 0..len)?;
        }
        f.write_str("]")
    }
}
