use std::io::{self, Cursor, Read};

use seqfile_core::codec::Decompressor;

/// A `Read` adapter that decodes a self-delimiting compressed stream
/// (gzip, zlib, bzip2, zstd) owned in memory.
pub(crate) trait StreamDecoder: Read + Send + Sized {
    fn open(input: Cursor<Vec<u8>>) -> io::Result<Self>;

    /// Give back the input buffer so the next reset can reuse it.
    fn into_input(self) -> Cursor<Vec<u8>>;
}

/// Decompressor that copies each compressed unit into a reusable buffer
/// and streams it through a [`StreamDecoder`].
pub(crate) struct StreamDecompressor<D> {
    decoder: Option<D>,
}

impl<D> StreamDecompressor<D> {
    pub(crate) fn new() -> Self {
        Self { decoder: None }
    }
}

impl<D: StreamDecoder> Decompressor for StreamDecompressor<D> {
    fn reset(&mut self, compressed: &[u8]) -> anyhow::Result<()> {
        let mut input = self
            .decoder
            .take()
            .map(|decoder| decoder.into_input().into_inner())
            .unwrap_or_default();
        input.clear();
        input.extend_from_slice(compressed);
        self.decoder = Some(D::open(Cursor::new(input))?);
        Ok(())
    }
}

impl<D: StreamDecoder> Read for StreamDecompressor<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.decoder.as_mut() {
            Some(decoder) => decoder.read(buf),
            None => Ok(0),
        }
    }
}
