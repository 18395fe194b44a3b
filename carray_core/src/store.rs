use std::borrow::Cow;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::cache::ChunkCache;
use crate::codec::Codec;
use crate::config::CParams;
use crate::dtype::DType;
use crate::engine;
use crate::error::{Error, Result};
use crate::shuffle::{shuffle, unshuffle};

/// Smallest chunk byte budget picked by the heuristic: 16 KB.
pub const MIN_CHUNK_BYTES: usize = 16 * 1024;

/// Largest chunk byte budget picked by the heuristic: 1 MB.
pub const MAX_CHUNK_BYTES: usize = 1024 * 1024;

pub const MIN_CHUNKLEN: usize = 1;
pub const MAX_CHUNKLEN: usize = 1 << 20;

/// Default expected length when the caller gives no hint.
pub const DEFAULT_EXPECTED_LEN: usize = 1 << 16;

/// Pick a chunk length for a container expected to hold `expected_len`
/// items of `itemsize` bytes.
///
/// The byte budget starts at [`MIN_CHUNK_BYTES`] and doubles for every decade
/// of expected size above 1 MB, capped at [`MAX_CHUNK_BYTES`]. The result is
/// clamped to `MIN_CHUNKLEN..=MAX_CHUNKLEN` items.
pub fn calc_chunklen(expected_len: usize, itemsize: usize) -> usize {
    let itemsize = itemsize.max(1);
    let expected_mb = expected_len.saturating_mul(itemsize) as f64 / (1 << 20) as f64;
    let zone = if expected_mb < 1.0 {
        0
    } else {
        (expected_mb.log10().floor() as u32 + 1).min(6)
    };
    let budget = (MIN_CHUNK_BYTES << zone).min(MAX_CHUNK_BYTES);
    (budget / itemsize).clamp(MIN_CHUNKLEN, MAX_CHUNKLEN)
}

/// One immutable compressed chunk holding exactly `chunklen` items.
#[derive(Debug, Clone)]
pub struct Chunk {
    data: Vec<u8>,
    nitems: usize,
    raw_len: usize,
    /// Byte-shuffled before compression.
    shuffled: bool,
    /// Stored verbatim (`clevel == 0`).
    stored: bool,
    /// xxhash3-64 of `data`.
    checksum: u64,
}

impl Chunk {
    pub fn nitems(&self) -> usize {
        self.nitems
    }

    /// Compressed size in bytes.
    pub fn cbytes(&self) -> usize {
        self.data.len()
    }

    /// Uncompressed size in bytes.
    pub fn nbytes(&self) -> usize {
        self.raw_len
    }
}

/// Ordered compressed chunks plus the uncompressed leftover tail.
///
/// # Invariants
/// - Every chunk holds exactly `chunklen` items.
/// - The leftover holds fewer than `chunklen` items.
/// - `len() == nchunks() * chunklen + leftover_len()`.
///
/// Mutations compress everything they need before touching any field, so a
/// codec failure leaves the store unchanged.
#[derive(Clone)]
pub struct ChunkStore {
    codec: Arc<dyn Codec>,
    cparams: CParams,
    dtype: DType,
    chunklen: usize,
    chunks: Vec<Chunk>,
    leftover: Vec<u8>,
}

impl ChunkStore {
    pub fn new(
        codec: Arc<dyn Codec>,
        cparams: CParams,
        dtype: DType,
        chunklen: usize,
    ) -> Result<Self> {
        if chunklen == 0 {
            return Err(Error::invalid("chunklen must be at least 1"));
        }
        if dtype.itemsize() == 0 {
            return Err(Error::invalid(format!("dtype {} has zero-sized items", dtype)));
        }
        Ok(Self {
            codec,
            cparams,
            dtype,
            chunklen,
            chunks: Vec::new(),
            leftover: Vec::new(),
        })
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    pub fn cparams(&self) -> CParams {
        self.cparams
    }

    pub fn dtype(&self) -> &DType {
        &self.dtype
    }

    pub fn chunklen(&self) -> usize {
        self.chunklen
    }

    pub fn itemsize(&self) -> usize {
        self.dtype.itemsize()
    }

    pub fn nchunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Items currently held in the leftover buffer.
    pub fn leftover_len(&self) -> usize {
        self.leftover.len() / self.itemsize()
    }

    pub fn leftover_bytes(&self) -> &[u8] {
        &self.leftover
    }

    /// Logical length in items.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Chunk::nitems).sum::<usize>() + self.leftover_len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.leftover.is_empty()
    }

    /// Uncompressed size of the whole content.
    pub fn nbytes(&self) -> usize {
        self.len() * self.itemsize()
    }

    /// Compressed size: chunk payloads plus the raw leftover.
    pub fn cbytes(&self) -> usize {
        self.chunks.iter().map(Chunk::cbytes).sum::<usize>() + self.leftover.len()
    }

    /// Append whole items given as raw little-endian bytes.
    ///
    /// Every time the leftover reaches `chunklen` items it is compressed and
    /// pushed as a new chunk. Returns the number of items appended.
    pub fn append(&mut self, raw: &[u8]) -> Result<usize> {
        let itemsize = self.itemsize();
        if raw.len() % itemsize != 0 {
            return Err(Error::invalid(format!(
                "{} bytes is not a whole number of {}-byte items",
                raw.len(),
                itemsize
            )));
        }
        let chunk_bytes = self.chunklen * itemsize;
        let total = self.leftover.len() + raw.len();
        let nfull = total / chunk_bytes;

        if nfull == 0 {
            self.leftover.extend_from_slice(raw);
            return Ok(raw.len() / itemsize);
        }

        // Gather the raw contents of every chunk this call completes.
        let mut pending: Vec<Cow<'_, [u8]>> = Vec::with_capacity(nfull);
        let mut rest = raw;
        if !self.leftover.is_empty() {
            let take = chunk_bytes - self.leftover.len();
            let mut first = Vec::with_capacity(chunk_bytes);
            first.extend_from_slice(&self.leftover);
            first.extend_from_slice(&rest[..take]);
            pending.push(Cow::Owned(first));
            rest = &rest[take..];
        }
        while pending.len() < nfull {
            let (head, tail) = rest.split_at(chunk_bytes);
            pending.push(Cow::Borrowed(head));
            rest = tail;
        }

        let compressed = self.compress_many(&pending)?;
        let tail = rest.to_vec();

        let first_new = self.chunks.len();
        self.chunks.extend(compressed);
        self.leftover = tail;
        debug!(
            first_chunk = first_new,
            new_chunks = nfull,
            leftover = self.leftover_len(),
            "promoted leftover to chunks"
        );
        Ok(raw.len() / itemsize)
    }

    fn compress_many(&self, blocks: &[Cow<'_, [u8]>]) -> Result<Vec<Chunk>> {
        match engine::pool() {
            Some(pool) if blocks.len() > 1 => {
                pool.install(|| blocks.par_iter().map(|b| self.compress(b)).collect())
            }
            _ => blocks.iter().map(|b| self.compress(b)).collect(),
        }
    }

    fn compress(&self, raw: &[u8]) -> Result<Chunk> {
        let typesize = self.dtype.kind.size();
        let nitems = raw.len() / self.itemsize();
        if self.cparams.clevel() == 0 {
            let data = raw.to_vec();
            let checksum = xxh3_64(&data);
            return Ok(Chunk {
                data,
                nitems,
                raw_len: raw.len(),
                shuffled: false,
                stored: true,
                checksum,
            });
        }
        let shuffled = self.cparams.shuffle() && typesize > 1;
        let filtered: Cow<'_, [u8]> = if shuffled {
            Cow::Owned(shuffle(typesize, raw))
        } else {
            Cow::Borrowed(raw)
        };
        let data = self
            .codec
            .compress_block(&filtered, self.cparams.clevel())
            .map_err(|e| Error::codec(format!("{} compress", self.codec.name()), e))?;
        let checksum = xxh3_64(&data);
        Ok(Chunk {
            data,
            nitems,
            raw_len: raw.len(),
            shuffled,
            stored: false,
            checksum,
        })
    }

    /// Decompress chunk `idx`, verifying its checksum and recorded size.
    pub fn decompress(&self, idx: usize) -> Result<Vec<u8>> {
        let chunk = self.chunks.get(idx).ok_or_else(|| {
            Error::invalid(format!(
                "chunk index {} out of range (total {})",
                idx,
                self.chunks.len()
            ))
        })?;

        let computed = xxh3_64(&chunk.data);
        if computed != chunk.checksum {
            return Err(Error::compression(format!(
                "chunk {} checksum mismatch: expected {:016x}, got {:016x}",
                idx, chunk.checksum, computed
            )));
        }

        let raw = if chunk.stored {
            chunk.data.clone()
        } else {
            let decoded = self
                .codec
                .decompress_block(&chunk.data, chunk.raw_len)
                .map_err(|e| Error::codec(format!("{} decompress chunk {}", self.codec.name(), idx), e))?;
            if chunk.shuffled {
                unshuffle(self.dtype.kind.size(), &decoded)
            } else {
                decoded
            }
        };

        if raw.len() != chunk.raw_len {
            return Err(Error::compression(format!(
                "chunk {} decompressed to {} bytes but {} were recorded",
                idx,
                raw.len(),
                chunk.raw_len
            )));
        }
        Ok(raw)
    }

    /// Raw bytes of chunk `idx`, through `cache` when given.
    pub fn chunk_bytes(&self, idx: usize, cache: Option<&ChunkCache>) -> Result<Arc<Vec<u8>>> {
        match cache {
            Some(cache) => cache.get(idx, self),
            None => Ok(Arc::new(self.decompress(idx)?)),
        }
    }

    /// Raw bytes of the item at logical `index`.
    pub fn read(&self, index: usize, cache: Option<&ChunkCache>) -> Result<Vec<u8>> {
        let len = self.len();
        if index >= len {
            return Err(Error::invalid(format!(
                "index {} out of range for length {}",
                index, len
            )));
        }
        let itemsize = self.itemsize();
        let ci = index / self.chunklen;
        if ci < self.chunks.len() {
            let block = self.chunk_bytes(ci, cache)?;
            let offset = (index % self.chunklen) * itemsize;
            Ok(block[offset..offset + itemsize].to_vec())
        } else {
            let offset = (index - self.chunks.len() * self.chunklen) * itemsize;
            Ok(self.leftover[offset..offset + itemsize].to_vec())
        }
    }

    /// Raw bytes of items `start..stop`, decompressing each touched chunk once.
    pub fn read_range(
        &self,
        start: usize,
        stop: usize,
        cache: Option<&ChunkCache>,
    ) -> Result<Vec<u8>> {
        let len = self.len();
        if start > stop || stop > len {
            return Err(Error::invalid(format!(
                "range {}..{} invalid for length {}",
                start, stop, len
            )));
        }
        let itemsize = self.itemsize();
        let mut out = Vec::with_capacity((stop - start) * itemsize);
        if start == stop {
            return Ok(out);
        }

        let stored_items = self.chunks.len() * self.chunklen;
        let mut pos = start;
        while pos < stop.min(stored_items) {
            let ci = pos / self.chunklen;
            let chunk_start = ci * self.chunklen;
            let lo = pos - chunk_start;
            let hi = (stop - chunk_start).min(self.chunklen);
            let block = self.chunk_bytes(ci, cache)?;
            out.extend_from_slice(&block[lo * itemsize..hi * itemsize]);
            pos = chunk_start + hi;
        }
        if stop > stored_items {
            let lo = pos - stored_items;
            let hi = stop - stored_items;
            out.extend_from_slice(&self.leftover[lo * itemsize..hi * itemsize]);
        }
        Ok(out)
    }

    /// Shrink to `new_len` items.
    ///
    /// Whole trailing chunks are dropped. When the cut falls inside a chunk,
    /// that chunk's surviving prefix becomes the new leftover.
    pub fn truncate(&mut self, new_len: usize, cache: &ChunkCache) -> Result<()> {
        let cut = self.plan_truncate(new_len)?;
        self.apply_truncate(cut, cache);
        Ok(())
    }

    /// The fallible half of [`truncate`](Self::truncate): validates the new
    /// length and decompresses the chunk the cut falls in, without touching
    /// the store.
    pub(crate) fn plan_truncate(&self, new_len: usize) -> Result<Truncation> {
        let len = self.len();
        if new_len > len {
            return Err(Error::invalid(format!(
                "cannot truncate length {} to larger length {}",
                len, new_len
            )));
        }
        let keep = new_len / self.chunklen;
        let leftover = if keep < self.chunks.len() && new_len % self.chunklen > 0 {
            let mut raw = self.decompress(keep)?;
            raw.truncate((new_len % self.chunklen) * self.itemsize());
            Some(raw)
        } else {
            None
        };
        Ok(Truncation { new_len, keep, leftover })
    }

    /// Apply a cut produced by [`plan_truncate`](Self::plan_truncate) on
    /// this store. Cannot fail.
    pub(crate) fn apply_truncate(&mut self, cut: Truncation, cache: &ChunkCache) {
        let len = self.len();
        if cut.keep >= self.chunks.len() {
            let stored_items = self.chunks.len() * self.chunklen;
            self.leftover.truncate((cut.new_len - stored_items) * self.itemsize());
        } else {
            self.chunks.truncate(cut.keep);
            self.leftover = cut.leftover.unwrap_or_default();
            cache.invalidate_from(cut.keep);
        }
        debug!(from = len, to = cut.new_len, nchunks = self.chunks.len(), "truncated chunk store");
    }
}

/// A prepared shrink: the surviving chunk count plus the new leftover when
/// the cut lands inside a chunk.
#[derive(Debug)]
pub(crate) struct Truncation {
    new_len: usize,
    keep: usize,
    leftover: Option<Vec<u8>>,
}
