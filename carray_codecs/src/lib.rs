mod deflate_codec;
mod lz4_codec;
mod passthrough;
mod zstd_codec;

pub use deflate_codec::DeflateCodec;
pub use lz4_codec::Lz4Codec;
pub use passthrough::PassThroughCodec;
pub use zstd_codec::ZstdCodec;

use carray_core::codec::{CODEC_DEFLATE, CODEC_LZ4, CODEC_PASSTHROUGH, CODEC_ZSTD};
use carray_core::{ArrayOptions, Codec};
use std::sync::Arc;

/// Resolve a codec from its stable `id`.
pub fn codec_by_id(id: u16) -> anyhow::Result<Arc<dyn Codec>> {
    match id {
        CODEC_PASSTHROUGH => Ok(Arc::new(PassThroughCodec)),
        CODEC_ZSTD => Ok(Arc::new(ZstdCodec)),
        CODEC_LZ4 => Ok(Arc::new(Lz4Codec)),
        CODEC_DEFLATE => Ok(Arc::new(DeflateCodec)),
        _ => anyhow::bail!(
            "unknown codec id {}; supported: 0 (passthrough), 1 (zstd), 2 (lz4), 3 (deflate)",
            id
        ),
    }
}

/// Resolve a codec from its display name (case-insensitive).
pub fn codec_by_name(name: &str) -> anyhow::Result<Arc<dyn Codec>> {
    match name.to_ascii_lowercase().as_str() {
        "passthrough" | "none" => codec_by_id(CODEC_PASSTHROUGH),
        "zstd" => codec_by_id(CODEC_ZSTD),
        "lz4" => codec_by_id(CODEC_LZ4),
        "deflate" | "zlib" => codec_by_id(CODEC_DEFLATE),
        other => anyhow::bail!("unknown codec '{}'; expected zstd, lz4, deflate or passthrough", other),
    }
}

/// The codec used when the caller does not pick one: zstd.
pub fn default_codec() -> Arc<dyn Codec> {
    Arc::new(ZstdCodec)
}

/// Container options with the default codec and default parameters.
pub fn default_options() -> ArrayOptions {
    ArrayOptions::new(default_codec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_codec_roundtrips_a_block() {
        let raw: Vec<u8> = (0..4096u32).flat_map(|i| (i / 7).to_le_bytes()).collect();
        for id in [CODEC_PASSTHROUGH, CODEC_ZSTD, CODEC_LZ4, CODEC_DEFLATE] {
            let codec = codec_by_id(id).unwrap();
            assert_eq!(codec.id(), id);
            let packed = codec.compress_block(&raw, 5).unwrap();
            let back = codec.decompress_block(&packed, raw.len()).unwrap();
            assert_eq!(back, raw, "codec {}", codec.name());
        }
    }

    #[test]
    fn versions_name_the_backend_without_pinned_numbers() {
        assert_eq!(Lz4Codec.version(), "lz4_flex block format");
        assert_eq!(DeflateCodec.version(), "flate2 raw deflate");
        assert!(ZstdCodec.version().starts_with(|c: char| c.is_ascii_digit()));
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(codec_by_name("LZ4").unwrap().id(), CODEC_LZ4);
        assert!(codec_by_name("brotli").is_err());
        assert!(codec_by_id(42).is_err());
    }
}
