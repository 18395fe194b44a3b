/// Stable codec identifiers.
pub const CODEC_PASSTHROUGH: u16 = 0;
pub const CODEC_ZSTD: u16 = 1;
pub const CODEC_LZ4: u16 = 2;
pub const CODEC_DEFLATE: u16 = 3;

/// Byte-level compression backend used for every chunk of a container.
///
/// Each `Codec` implementation:
/// - Compresses and decompresses individual chunks independently. No state
///   is carried between chunks, which is what lets a container decode any
///   chunk on its own.
/// - Receives bytes that may already have been byte-shuffled by the caller;
///   the codec never needs to know the item layout.
/// - Is shared across threads, so it must not hold per-call mutable state.
pub trait Codec: Send + Sync {
    /// Stable codec ID.
    fn id(&self) -> u16;

    /// Human-readable codec name for display.
    fn name(&self) -> &'static str;

    /// Version of the underlying library.
    fn version(&self) -> String;

    /// Compress a single chunk at `clevel` (1..=9; 0 never reaches the codec).
    fn compress_block(&self, raw: &[u8], clevel: u8) -> anyhow::Result<Vec<u8>>;

    /// Decompress a single chunk. `raw_len` is the exact uncompressed size
    /// recorded when the chunk was written.
    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Identity codec for unit tests.
    pub(crate) struct Raw;

    impl Codec for Raw {
        fn id(&self) -> u16 {
            CODEC_PASSTHROUGH
        }

        fn name(&self) -> &'static str {
            "raw"
        }

        fn version(&self) -> String {
            "0".into()
        }

        fn compress_block(&self, raw: &[u8], _clevel: u8) -> anyhow::Result<Vec<u8>> {
            Ok(raw.to_vec())
        }

        fn decompress_block(&self, compressed: &[u8], _raw_len: usize) -> anyhow::Result<Vec<u8>> {
            Ok(compressed.to_vec())
        }
    }
}
