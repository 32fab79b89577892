use seqfile_core::codec::{Codec, Compressor, Decompressor};
use seqfile_core::format::CompressionCodec;
use snap::raw::{max_compress_len, Decoder, Encoder};

use crate::framing::{FramedCompressor, FramedDecompressor, RawBlock};

/// Hadoop `SnappyCodec`: raw snappy blocks inside block-compressor framing.
pub struct SnappyCodec;

impl Codec for SnappyCodec {
    fn codec(&self) -> CompressionCodec {
        CompressionCodec::Snappy
    }

    fn name(&self) -> &'static str {
        "snappy"
    }

    fn compressor(&self) -> Box<dyn Compressor> {
        Box::new(FramedCompressor::new(SnappyBlock {
            encoder: Encoder::new(),
            decoder: Decoder::new(),
        }))
    }

    fn decompressor(&self) -> Box<dyn Decompressor> {
        Box::new(FramedDecompressor::new(SnappyBlock {
            encoder: Encoder::new(),
            decoder: Decoder::new(),
        }))
    }
}

struct SnappyBlock {
    encoder: Encoder,
    decoder: Decoder,
}

impl RawBlock for SnappyBlock {
    fn max_compressed_len(&self, len: usize) -> usize {
        max_compress_len(len)
    }

    fn compress_into(&mut self, raw: &[u8], out: &mut [u8]) -> anyhow::Result<usize> {
        Ok(self.encoder.compress(raw, out)?)
    }

    fn decompress_into(&mut self, compressed: &[u8], out: &mut [u8]) -> anyhow::Result<usize> {
        Ok(self.decoder.decompress(compressed, out)?)
    }
}
