use carray_core::codec::{Codec, CODEC_ZSTD};

/// Zstandard block codec.
///
/// `clevel` 1..=9 maps onto zstd levels 1..=19, spreading the fast levels
/// out and reserving the slow ones for 8 and 9.
pub struct ZstdCodec;

const LEVELS: [i32; 10] = [0, 1, 2, 3, 5, 7, 9, 12, 15, 19];

impl ZstdCodec {
    pub fn level_for(clevel: u8) -> i32 {
        LEVELS[usize::from(clevel.min(9))]
    }
}

impl Codec for ZstdCodec {
    fn id(&self) -> u16 {
        CODEC_ZSTD
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn version(&self) -> String {
        zstd::zstd_safe::version_string().to_string()
    }

    fn compress_block(&self, raw: &[u8], clevel: u8) -> anyhow::Result<Vec<u8>> {
        let compressed = zstd::bulk::compress(raw, Self::level_for(clevel))?;
        Ok(compressed)
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        let raw = zstd::bulk::decompress(compressed, raw_len)?;
        Ok(raw)
    }
}
