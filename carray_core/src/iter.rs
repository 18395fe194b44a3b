//! Lazy, forward-only sequences over a container.
//!
//! Every iterator walks chunks in increasing order and keeps only the chunk
//! it is currently reading, so peak memory is one decompressed chunk per
//! container involved. Decompression failures are yielded as `Err` once,
//! after which the iterator is exhausted.

use std::iter::StepBy;
use std::ops::Range;
use std::sync::Arc;

use crate::carray::CArray;
use crate::dtype::{ScalarKind, Value};
use crate::error::{Error, Result};
use crate::store::ChunkStore;

/// Holds the one decompressed chunk an iterator is positioned on.
#[derive(Debug, Default)]
pub(crate) struct ChunkCursor {
    current: Option<(usize, Arc<Vec<u8>>)>,
}

impl ChunkCursor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The block (chunk or leftover) containing item `index`, together with
    /// the logical index of its first item.
    pub(crate) fn block<'s>(&'s mut self, store: &'s ChunkStore, index: usize) -> Result<(usize, &'s [u8])> {
        let ci = index / store.chunklen();
        if ci >= store.nchunks() {
            return Ok((store.nchunks() * store.chunklen(), store.leftover_bytes()));
        }
        let stale = !matches!(&self.current, Some((c, _)) if *c == ci);
        if stale {
            self.current = None;
        }
        let (_, bytes) = match self.current.take() {
            Some(entry) => self.current.insert(entry),
            None => self.current.insert((ci, Arc::new(store.decompress(ci)?))),
        };
        Ok((ci * store.chunklen(), bytes.as_slice()))
    }

    /// Decode the item at `index`.
    pub(crate) fn value(&mut self, store: &ChunkStore, index: usize) -> Result<Value> {
        let itemsize = store.itemsize();
        let (base, bytes) = self.block(store, index)?;
        let offset = (index - base) * itemsize;
        Ok(Value::read_item(store.dtype(), &bytes[offset..offset + itemsize]))
    }
}

/// Strided sequential read of a container.
pub struct Iter<'a> {
    store: &'a ChunkStore,
    cursor: ChunkCursor,
    positions: StepBy<Range<usize>>,
    failed: bool,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(store: &'a ChunkStore, start: usize, stop: usize, step: usize) -> Self {
        Self {
            store,
            cursor: ChunkCursor::new(),
            positions: (start..stop.max(start)).step_by(step),
            failed: false,
        }
    }
}

impl Iterator for Iter<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let index = self.positions.next()?;
        let item = self.cursor.value(self.store, index);
        self.failed = item.is_err();
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            (0, Some(0))
        } else {
            self.positions.size_hint()
        }
    }
}

/// Where a boolean mask lives: borrowed from the caller, or computed by
/// the library and shared between iterators.
#[derive(Clone)]
pub(crate) enum MaskSource<'a> {
    Borrowed(&'a CArray),
    Shared(Arc<CArray>),
}

impl MaskSource<'_> {
    fn array(&self) -> &CArray {
        match self {
            MaskSource::Borrowed(a) => a,
            MaskSource::Shared(a) => a,
        }
    }
}

/// Fail unless `mask` is a scalar boolean container of length `len`.
pub(crate) fn check_mask(mask: &CArray, len: usize) -> Result<()> {
    if mask.dtype().kind != ScalarKind::Bool || !mask.dtype().is_scalar() {
        return Err(Error::TypeMismatch(format!(
            "filter mask must be bool, got {}",
            mask.dtype()
        )));
    }
    if mask.len() != len {
        return Err(Error::LengthMismatch {
            expected: len,
            actual: mask.len(),
        });
    }
    Ok(())
}

/// Scans a boolean mask chunk by chunk and yields the true positions.
pub(crate) struct MaskScan<'a> {
    mask: MaskSource<'a>,
    cursor: ChunkCursor,
    pos: usize,
    failed: bool,
}

impl<'a> MaskScan<'a> {
    pub(crate) fn new(mask: MaskSource<'a>) -> Self {
        Self {
            mask,
            cursor: ChunkCursor::new(),
            pos: 0,
            failed: false,
        }
    }
}

impl Iterator for MaskScan<'_> {
    type Item = Result<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let store = self.mask.array().store();
        let len = store.len();
        while self.pos < len {
            let (base, bytes) = match self.cursor.block(store, self.pos) {
                Ok(block) => block,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            };
            let offset = self.pos - base;
            match bytes[offset..].iter().position(|b| *b != 0) {
                Some(k) => {
                    let found = self.pos + k;
                    self.pos = found + 1;
                    return Some(Ok(found));
                }
                None => self.pos = base + bytes.len(),
            }
        }
        None
    }
}

/// Indices where a boolean container is true.
pub struct WhereTrueIter<'a> {
    scan: MaskScan<'a>,
}

impl<'a> WhereTrueIter<'a> {
    pub(crate) fn new(mask: &'a CArray) -> Self {
        Self {
            scan: MaskScan::new(MaskSource::Borrowed(mask)),
        }
    }
}

impl Iterator for WhereTrueIter<'_> {
    type Item = Result<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        self.scan.next()
    }
}

/// Values of a container at the positions where an aligned mask is true.
pub struct WhereIter<'a> {
    store: &'a ChunkStore,
    cursor: ChunkCursor,
    scan: MaskScan<'a>,
    failed: bool,
}

impl<'a> WhereIter<'a> {
    pub(crate) fn new(store: &'a ChunkStore, mask: &'a CArray) -> Self {
        Self {
            store,
            cursor: ChunkCursor::new(),
            scan: MaskScan::new(MaskSource::Borrowed(mask)),
            failed: false,
        }
    }
}

impl Iterator for WhereIter<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = match self.scan.next()? {
            Ok(index) => self.cursor.value(self.store, index),
            Err(e) => Err(e),
        };
        self.failed = item.is_err();
        Some(item)
    }
}
