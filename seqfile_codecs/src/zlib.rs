use std::io::{self, Cursor, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use seqfile_core::codec::{Codec, Compressor, Decompressor};
use seqfile_core::format::CompressionCodec;

use crate::stream::{StreamDecoder, StreamDecompressor};

/// Hadoop `DefaultCodec`: a zlib (RFC 1950) stream per compressed unit.
pub struct ZlibCodec {
    pub level: Compression,
}

impl Default for ZlibCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Codec for ZlibCodec {
    fn codec(&self) -> CompressionCodec {
        CompressionCodec::Zlib
    }

    fn name(&self) -> &'static str {
        "zlib"
    }

    fn compressor(&self) -> Box<dyn Compressor> {
        Box::new(ZlibCompressor {
            level: self.level,
            buf: Vec::new(),
        })
    }

    fn decompressor(&self) -> Box<dyn Decompressor> {
        Box::new(StreamDecompressor::<ZlibDecoder<Cursor<Vec<u8>>>>::new())
    }
}

struct ZlibCompressor {
    level: Compression,
    buf: Vec<u8>,
}

impl Compressor for ZlibCompressor {
    fn compress(&mut self, raw: &[u8]) -> anyhow::Result<&[u8]> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let mut encoder = ZlibEncoder::new(buf, self.level);
        encoder.write_all(raw)?;
        self.buf = encoder.finish()?;
        Ok(&self.buf)
    }
}

impl StreamDecoder for ZlibDecoder<Cursor<Vec<u8>>> {
    fn open(input: Cursor<Vec<u8>>) -> io::Result<Self> {
        Ok(ZlibDecoder::new(input))
    }

    fn into_input(self) -> Cursor<Vec<u8>> {
        self.into_inner()
    }
}
