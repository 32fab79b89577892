use lz4_flex::block::{compress_into, decompress_into, get_maximum_output_size};
use seqfile_core::codec::{Codec, Compressor, Decompressor};
use seqfile_core::format::CompressionCodec;

use crate::framing::{FramedCompressor, FramedDecompressor, RawBlock};

/// Hadoop `Lz4Codec`: raw LZ4 blocks inside block-compressor framing.
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn codec(&self) -> CompressionCodec {
        CompressionCodec::Lz4
    }

    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compressor(&self) -> Box<dyn Compressor> {
        Box::new(FramedCompressor::new(Lz4Block))
    }

    fn decompressor(&self) -> Box<dyn Decompressor> {
        Box::new(FramedDecompressor::new(Lz4Block))
    }
}

struct Lz4Block;

impl RawBlock for Lz4Block {
    fn max_compressed_len(&self, len: usize) -> usize {
        get_maximum_output_size(len)
    }

    fn compress_into(&mut self, raw: &[u8], out: &mut [u8]) -> anyhow::Result<usize> {
        compress_into(raw, out).map_err(|e| anyhow::anyhow!("lz4 compress error: {}", e))
    }

    fn decompress_into(&mut self, compressed: &[u8], out: &mut [u8]) -> anyhow::Result<usize> {
        decompress_into(compressed, out).map_err(|e| anyhow::anyhow!("lz4 decompress error: {}", e))
    }
}
