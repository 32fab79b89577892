//! Hadoop `BlockCompressorStream` framing, used by the snappy and LZ4
//! codecs whose raw formats carry no length information.
//!
//! ```text
//! repeat:
//!   raw length:u32 BE
//!   repeat until raw length bytes are produced:
//!     compressed length:u32 BE
//!     compressed chunk
//! ```
//!
//! A zero raw length ends the stream.

use std::io::{self, Read};

use anyhow::{bail, Context};
use seqfile_core::codec::{Compressor, Decompressor};

/// Largest slice of input compressed as a single chunk.
pub(crate) const MAX_CHUNK: usize = 256 * 1024;

/// A block compression primitive without framing of its own.
pub(crate) trait RawBlock: Send {
    /// Upper bound on the compressed size of `len` input bytes.
    fn max_compressed_len(&self, len: usize) -> usize;

    /// Compress `raw` into `out`, returning the bytes used.
    fn compress_into(&mut self, raw: &[u8], out: &mut [u8]) -> anyhow::Result<usize>;

    /// Decompress one chunk into `out`, returning the bytes produced.
    fn decompress_into(&mut self, compressed: &[u8], out: &mut [u8]) -> anyhow::Result<usize>;
}

pub(crate) struct FramedCompressor<B> {
    block: B,
    buf: Vec<u8>,
}

impl<B: RawBlock> FramedCompressor<B> {
    pub(crate) fn new(block: B) -> Self {
        Self {
            block,
            buf: Vec::new(),
        }
    }

    fn push_chunk(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
        let len_at = self.buf.len();
        let start = len_at + 4;
        self.buf.resize(start + self.block.max_compressed_len(chunk.len()), 0);
        let n = self.block.compress_into(chunk, &mut self.buf[start..])?;
        self.buf.truncate(start + n);
        let n = u32::try_from(n).context("compressed chunk too large")?;
        self.buf[len_at..start].copy_from_slice(&n.to_be_bytes());
        Ok(())
    }
}

impl<B: RawBlock> Compressor for FramedCompressor<B> {
    fn compress(&mut self, raw: &[u8]) -> anyhow::Result<&[u8]> {
        let raw_len = u32::try_from(raw.len()).context("input too large for block framing")?;
        self.buf.clear();
        self.buf.extend_from_slice(&raw_len.to_be_bytes());
        if raw.is_empty() {
            self.push_chunk(raw)?;
        }
        for chunk in raw.chunks(MAX_CHUNK) {
            self.push_chunk(chunk)?;
        }
        Ok(&self.buf)
    }
}

/// Decodes a whole framed unit on reset and serves it through `Read`.
pub(crate) struct FramedDecompressor<B> {
    block: B,
    out: Vec<u8>,
    pos: usize,
}

impl<B: RawBlock> FramedDecompressor<B> {
    pub(crate) fn new(block: B) -> Self {
        Self {
            block,
            out: Vec::new(),
            pos: 0,
        }
    }
}

fn take_u32(input: &mut &[u8]) -> anyhow::Result<usize> {
    let Some((len, rest)) = input.split_first_chunk::<4>() else {
        bail!("framed stream ends inside a length field");
    };
    *input = rest;
    Ok(u32::from_be_bytes(*len) as usize)
}

impl<B: RawBlock> Decompressor for FramedDecompressor<B> {
    fn reset(&mut self, compressed: &[u8]) -> anyhow::Result<()> {
        self.out.clear();
        self.pos = 0;

        let mut input = compressed;
        while !input.is_empty() {
            let raw_len = take_u32(&mut input)?;
            if raw_len == 0 {
                break;
            }
            let target = self.out.len() + raw_len;
            while self.out.len() < target {
                let chunk_len = take_u32(&mut input)?;
                if chunk_len > input.len() {
                    bail!(
                        "chunk of {} bytes but only {} remain",
                        chunk_len,
                        input.len()
                    );
                }
                let (chunk, rest) = input.split_at(chunk_len);
                input = rest;

                let start = self.out.len();
                self.out.resize(target, 0);
                let n = self.block.decompress_into(chunk, &mut self.out[start..])?;
                self.out.truncate(start + n);
                if n == 0 {
                    bail!("empty chunk inside a group of {} bytes", raw_len);
                }
            }
        }
        Ok(())
    }
}

impl<B: RawBlock> Read for FramedDecompressor<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.out.len() - self.pos);
        buf[..n].copy_from_slice(&self.out[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
