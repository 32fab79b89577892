use std::io::{self, Cursor, Write};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use seqfile_core::codec::{Codec, Compressor, Decompressor};
use seqfile_core::format::CompressionCodec;

use crate::stream::{StreamDecoder, StreamDecompressor};

/// Hadoop `GzipCodec`: each compressed unit is a complete gzip member.
pub struct GzipCodec {
    pub level: Compression,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Codec for GzipCodec {
    fn codec(&self) -> CompressionCodec {
        CompressionCodec::Gzip
    }

    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compressor(&self) -> Box<dyn Compressor> {
        Box::new(GzipCompressor {
            level: self.level,
            buf: Vec::new(),
        })
    }

    fn decompressor(&self) -> Box<dyn Decompressor> {
        Box::new(StreamDecompressor::<MultiGzDecoder<Cursor<Vec<u8>>>>::new())
    }
}

struct GzipCompressor {
    level: Compression,
    buf: Vec<u8>,
}

impl Compressor for GzipCompressor {
    fn compress(&mut self, raw: &[u8]) -> anyhow::Result<&[u8]> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let mut encoder = GzEncoder::new(buf, self.level);
        encoder.write_all(raw)?;
        self.buf = encoder.finish()?;
        Ok(&self.buf)
    }
}

impl StreamDecoder for MultiGzDecoder<Cursor<Vec<u8>>> {
    fn open(input: Cursor<Vec<u8>>) -> io::Result<Self> {
        Ok(MultiGzDecoder::new(input))
    }

    fn into_input(self) -> Cursor<Vec<u8>> {
        self.into_inner()
    }
}
