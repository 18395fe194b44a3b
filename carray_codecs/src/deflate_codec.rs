use std::io::{Read, Write};

use carray_core::codec::{Codec, CODEC_DEFLATE};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

/// Raw DEFLATE codec, for interoperability with zlib-based tooling.
///
/// `clevel` maps directly onto flate2 levels 1..=9.
pub struct DeflateCodec;

impl Codec for DeflateCodec {
    fn id(&self) -> u16 {
        CODEC_DEFLATE
    }

    fn name(&self) -> &'static str {
        "deflate"
    }

    fn version(&self) -> String {
        "flate2 raw deflate".to_string()
    }

    fn compress_block(&self, raw: &[u8], clevel: u8) -> anyhow::Result<Vec<u8>> {
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::new(u32::from(clevel.min(9))));
        enc.write_all(raw)?;
        Ok(enc.finish()?)
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> anyhow::Result<Vec<u8>> {
        let mut raw = Vec::with_capacity(raw_len);
        DeflateDecoder::new(compressed).read_to_end(&mut raw)?;
        Ok(raw)
    }
}
