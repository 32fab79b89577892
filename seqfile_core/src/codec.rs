use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::format::CompressionCodec;

/// One-shot compressor owned by a single writer.
///
/// Implementations keep a scratch buffer between calls. The slice returned
/// by [`compress`](Compressor::compress) borrows that buffer and is only
/// valid until the next call.
pub trait Compressor: Send {
    /// Compress `raw` into one self-contained unit that the matching
    /// [`Decompressor`] can read back after a `reset`.
    fn compress(&mut self, raw: &[u8]) -> anyhow::Result<&[u8]>;
}

/// Streaming decompressor owned by a single reader.
///
/// [`reset`](Decompressor::reset) rebinds the decompressor to a new
/// compressed input while keeping its internal buffers; the decompressed
/// bytes are then pulled through [`Read`] until it returns 0.
pub trait Decompressor: Read + Send {
    fn reset(&mut self, compressed: &[u8]) -> anyhow::Result<()>;
}

/// Core compression abstraction.
///
/// A `Codec` is a stateless factory identified by the [`CompressionCodec`]
/// stored in the file header. Every reader or writer asks it for its own
/// compressor/decompressor, which carry the per-instance buffers.
pub trait Codec: Send + Sync {
    /// The header identifier this codec reads and writes.
    fn codec(&self) -> CompressionCodec;

    /// Human-readable codec name for logs.
    fn name(&self) -> &'static str;

    fn compressor(&self) -> Box<dyn Compressor>;

    fn decompressor(&self) -> Box<dyn Decompressor>;
}

/// Maps header codec identifiers to codec implementations.
///
/// Readers resolve the header's codec here, so new codecs can be added
/// without touching the reader or writer.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<CompressionCodec, Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `codec` under its own identifier, returning any codec it
    /// replaced.
    pub fn register(&mut self, codec: Arc<dyn Codec>) -> Option<Arc<dyn Codec>> {
        self.codecs.insert(codec.codec(), codec)
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, codec: Arc<dyn Codec>) -> Self {
        self.register(codec);
        self
    }

    pub fn get(&self, codec: CompressionCodec) -> Option<Arc<dyn Codec>> {
        self.codecs.get(&codec).cloned()
    }

    pub fn contains(&self, codec: CompressionCodec) -> bool {
        self.codecs.contains_key(&codec)
    }

    /// Like [`get`](Self::get), but a missing codec is an error.
    pub fn resolve(&self, codec: CompressionCodec) -> Result<Arc<dyn Codec>> {
        self.get(codec)
            .ok_or_else(|| Error::unsupported(format!("no {} codec registered", codec)))
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&'static str> = self.codecs.values().map(|c| c.name()).collect();
        names.sort_unstable();
        f.debug_struct("CodecRegistry").field("codecs", &names).finish()
    }
}

/// Decompress `compressed` fully into `out`, replacing its contents.
pub(crate) fn decompress_into(
    decompressor: &mut dyn Decompressor,
    compressed: &[u8],
    out: &mut Vec<u8>,
) -> Result<()> {
    decompressor.reset(compressed)?;
    out.clear();
    decompressor.read_to_end(out).map_err(Error::from_decompress)?;
    Ok(())
}

/// A reversible toy codec for unit tests inside this crate.
///
/// Output is `[u32 BE length][bytes ^ 0x5a]`, so a value that skipped
/// decompression never looks like the original.
#[cfg(test)]
pub(crate) mod testing {
    use std::io::{self, Read};

    use super::{Codec, Compressor, Decompressor};
    use crate::format::CompressionCodec;

    pub struct XorCodec;

    struct XorCompressor {
        buf: Vec<u8>,
    }

    struct XorDecompressor {
        data: Vec<u8>,
        pos: usize,
    }

    impl Codec for XorCodec {
        fn codec(&self) -> CompressionCodec {
            CompressionCodec::Zlib
        }

        fn name(&self) -> &'static str {
            "xor"
        }

        fn compressor(&self) -> Box<dyn Compressor> {
            Box::new(XorCompressor { buf: Vec::new() })
        }

        fn decompressor(&self) -> Box<dyn Decompressor> {
            Box::new(XorDecompressor { data: Vec::new(), pos: 0 })
        }
    }

    impl Compressor for XorCompressor {
        fn compress(&mut self, raw: &[u8]) -> anyhow::Result<&[u8]> {
            self.buf.clear();
            self.buf.extend_from_slice(&(raw.len() as u32).to_be_bytes());
            self.buf.extend(raw.iter().map(|b| b ^ 0x5a));
            Ok(&self.buf)
        }
    }

    impl Decompressor for XorDecompressor {
        fn reset(&mut self, compressed: &[u8]) -> anyhow::Result<()> {
            let (len, body) = compressed
                .split_first_chunk::<4>()
                .ok_or_else(|| anyhow::anyhow!("xor input shorter than its length prefix"))?;
            if u32::from_be_bytes(*len) as usize != body.len() {
                anyhow::bail!("xor length prefix does not match payload");
            }
            self.data.clear();
            self.data.extend(body.iter().map(|b| b ^ 0x5a));
            self.pos = 0;
            Ok(())
        }
    }

    impl Read for XorDecompressor {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
