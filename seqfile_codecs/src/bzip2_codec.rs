use std::io::{self, Cursor, Write};

use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use seqfile_core::codec::{Codec, Compressor, Decompressor};
use seqfile_core::format::CompressionCodec;

use crate::stream::{StreamDecoder, StreamDecompressor};

/// Hadoop `BZip2Codec`: a complete bzip2 stream per compressed unit.
pub struct BZip2Codec {
    pub level: Compression,
}

impl Default for BZip2Codec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Codec for BZip2Codec {
    fn codec(&self) -> CompressionCodec {
        CompressionCodec::BZip2
    }

    fn name(&self) -> &'static str {
        "bzip2"
    }

    fn compressor(&self) -> Box<dyn Compressor> {
        Box::new(BZip2Compressor {
            level: self.level,
            buf: Vec::new(),
        })
    }

    fn decompressor(&self) -> Box<dyn Decompressor> {
        Box::new(StreamDecompressor::<MultiBzDecoder<Cursor<Vec<u8>>>>::new())
    }
}

struct BZip2Compressor {
    level: Compression,
    buf: Vec<u8>,
}

impl Compressor for BZip2Compressor {
    fn compress(&mut self, raw: &[u8]) -> anyhow::Result<&[u8]> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let mut encoder = BzEncoder::new(buf, self.level);
        encoder.write_all(raw)?;
        self.buf = encoder.finish()?;
        Ok(&self.buf)
    }
}

impl StreamDecoder for MultiBzDecoder<Cursor<Vec<u8>>> {
    fn open(input: Cursor<Vec<u8>>) -> io::Result<Self> {
        Ok(MultiBzDecoder::new(input))
    }

    fn into_input(self) -> Cursor<Vec<u8>> {
        self.into_inner()
    }
}
