mod bzip2_codec;
mod framing;
mod gzip;
mod lz4_codec;
mod snappy;
mod stream;
mod zlib;
mod zstd_codec;

pub use bzip2_codec::BZip2Codec;
pub use gzip::GzipCodec;
pub use lz4_codec::Lz4Codec;
pub use snappy::SnappyCodec;
pub use zlib::ZlibCodec;
pub use zstd_codec::ZstdCodec;

use seqfile_core::format::CompressionCodec;
use seqfile_core::{Codec, CodecRegistry};
use std::sync::Arc;

/// The bundled adapter for `codec`, with default settings.
pub fn codec_for(codec: CompressionCodec) -> Arc<dyn Codec> {
    match codec {
        CompressionCodec::Gzip => Arc::new(GzipCodec::default()),
        CompressionCodec::Snappy => Arc::new(SnappyCodec),
        CompressionCodec::Zlib => Arc::new(ZlibCodec::default()),
        CompressionCodec::BZip2 => Arc::new(BZip2Codec::default()),
        CompressionCodec::Zstd => Arc::new(ZstdCodec::default()),
        CompressionCodec::Lz4 => Arc::new(Lz4Codec),
    }
}

/// Resolve a codec from the Hadoop class name stored in a header.
pub fn codec_by_class_name(name: &str) -> anyhow::Result<Arc<dyn Codec>> {
    match CompressionCodec::from_class_name(name) {
        Some(codec) => Ok(codec_for(codec)),
        None => anyhow::bail!("unknown compression codec class {}", name),
    }
}

/// A registry holding every bundled codec, ready to hand to a reader.
pub fn registry() -> CodecRegistry {
    CompressionCodec::ALL
        .into_iter()
        .fold(CodecRegistry::new(), |registry, codec| registry.with(codec_for(codec)))
}
