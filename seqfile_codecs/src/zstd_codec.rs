use std::io::{self, Cursor};

use seqfile_core::codec::{Codec, Compressor, Decompressor};
use seqfile_core::format::CompressionCodec;
use zstd::stream::read::Decoder;

use crate::stream::{StreamDecoder, StreamDecompressor};

/// Hadoop `ZStandardCodec`.
///
/// Each compressed unit is one zstd frame, compressed at the configured
/// level (default: 3). The frame carries its own content size.
pub struct ZstdCodec {
    /// Compression level (1 = fast / larger, 22 = slow / smallest).
    pub level: i32,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self { level: 3 }
    }
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Codec for ZstdCodec {
    fn codec(&self) -> CompressionCodec {
        CompressionCodec::Zstd
    }

    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compressor(&self) -> Box<dyn Compressor> {
        Box::new(ZstdCompressor {
            level: self.level,
            ctx: None,
            buf: Vec::new(),
        })
    }

    fn decompressor(&self) -> Box<dyn Decompressor> {
        Box::new(StreamDecompressor::<Decoder<'static, Cursor<Vec<u8>>>>::new())
    }
}

struct ZstdCompressor {
    level: i32,
    /// Created on first use, then reused for every unit.
    ctx: Option<zstd::bulk::Compressor<'static>>,
    buf: Vec<u8>,
}

impl Compressor for ZstdCompressor {
    fn compress(&mut self, raw: &[u8]) -> anyhow::Result<&[u8]> {
        let mut ctx = match self.ctx.take() {
            Some(ctx) => ctx,
            None => zstd::bulk::Compressor::new(self.level)?,
        };
        self.buf.clear();
        self.buf.reserve(zstd::zstd_safe::compress_bound(raw.len()));
        let written = ctx.compress_to_buffer(raw, &mut self.buf);
        self.ctx = Some(ctx);
        written?;
        Ok(&self.buf)
    }
}


impl StreamDecoder for Decoder<'static, Cursor<Vec<u8>>> {
    fn open(input: Cursor<Vec<u8>>) -> io::Result<Self> {
        Decoder::with_buffer(input)
    }

    fn into_input(self) -> Cursor<Vec<u8>> {
        self.finish()
    }
}
