use carray_core::codec::{Codec, CODEC_PASSTHROUGH};

/// No-op codec: stores chunks verbatim.
///
/// Useful for isolating container logic from any codec, and for data that
/// does not compress.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn id(&self) -> u16 {
        CODEC_PASSTHROUGH
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn compress_block(&self, raw: &[u8], _clevel: u8) -> anyhow::Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        anyhow::ensure!(
            compressed.len() == raw_len,
            "stored chunk is {} bytes, expected {}",
            compressed.len(),
            raw_len
        );
        Ok(compressed.to_vec())
    }
}
