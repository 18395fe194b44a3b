use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{Error, Result};

/// Default compression level.
pub const DEFAULT_CLEVEL: u8 = 5;

/// Highest accepted compression level.
pub const MAX_CLEVEL: u8 = 9;

/// Default number of decompressed chunks kept per container.
pub const DEFAULT_CACHE_CAPACITY: usize = 1;

/// Compression parameters, fixed for the lifetime of a container.
///
/// Changing them means producing a new container with
/// [`CArray::copy`](crate::CArray::copy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CParams {
    clevel: u8,
    shuffle: bool,
}

impl CParams {
    /// `clevel` must be in `0..=9`; 0 stores chunks uncompressed.
    pub fn new(clevel: u8, shuffle: bool) -> Result<Self> {
        if clevel > MAX_CLEVEL {
            return Err(Error::invalid(format!(
                "clevel must be in 0..={MAX_CLEVEL}, got {clevel}"
            )));
        }
        Ok(Self { clevel, shuffle })
    }

    pub fn clevel(&self) -> u8 {
        self.clevel
    }

    /// Whether the shuffle filter was requested. It is still skipped for
    /// single-byte scalar types.
    pub fn shuffle(&self) -> bool {
        self.shuffle
    }
}

impl Default for CParams {
    fn default() -> Self {
        Self {
            clevel: DEFAULT_CLEVEL,
            shuffle: true,
        }
    }
}

impl fmt::Display for CParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cparams(clevel={}, shuffle={})",
            self.clevel,
            if self.shuffle { "True" } else { "False" }
        )
    }
}

/// Construction parameters for a [`CArray`](crate::CArray).
///
/// Tables keep one of these as the default for columns they build themselves.
#[derive(Clone)]
pub struct ArrayOptions {
    pub codec: Arc<dyn Codec>,
    pub cparams: CParams,
    /// Hint used by the chunk-length heuristic.
    pub expected_len: Option<usize>,
    /// Explicit chunk length; overrides the heuristic.
    pub chunklen: Option<usize>,
    pub cache_capacity: usize,
}

impl ArrayOptions {
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self {
            codec,
            cparams: CParams::default(),
            expected_len: None,
            chunklen: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    pub fn cparams(mut self, cparams: CParams) -> Self {
        self.cparams = cparams;
        self
    }

    pub fn expected_len(mut self, expected_len: usize) -> Self {
        self.expected_len = Some(expected_len);
        self
    }

    pub fn chunklen(mut self, chunklen: usize) -> Self {
        self.chunklen = Some(chunklen);
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

impl fmt::Debug for ArrayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayOptions")
            .field("codec", &self.codec.name())
            .field("cparams", &self.cparams)
            .field("expected_len", &self.expected_len)
            .field("chunklen", &self.chunklen)
            .field("cache_capacity", &self.cache_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clevel_is_bounded() {
        assert!(CParams::new(9, false).is_ok());
        assert_eq!(CParams::new(10, true).unwrap_err().code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn default_cparams_display() {
        let p = CParams::default();
        assert_eq!(p.clevel(), 5);
        assert!(p.shuffle());
        assert_eq!(p.to_string(), "cparams(clevel=5, shuffle=True)");
    }
}
