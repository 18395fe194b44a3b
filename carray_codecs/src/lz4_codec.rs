use anyhow::Context;
use carray_core::codec::{Codec, CODEC_LZ4};
use lz4_flex::block::{compress, decompress};

/// LZ4 block codec.
///
/// Fastest decode of the bundled codecs. LZ4 has no levels, so `clevel`
/// only decides whether the codec is called at all.
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn id(&self) -> u16 {
        CODEC_LZ4
    }

    fn name(&self) -> &'static str {
        "lz4"
    }

    fn version(&self) -> String {
        "lz4_flex block format".to_string()
    }

    fn compress_block(&self, raw: &[u8], _clevel: u8) -> anyhow::Result<Vec<u8>> {
        Ok(compress(raw))
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        decompress(compressed, raw_len).context("lz4 decompress error")
    }
}
