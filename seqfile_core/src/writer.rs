use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::block::{encode_lengths, BlockBuffer};
use crate::codec::{Codec, Compressor};
use crate::error::{Error, Result};
use crate::format::{
    CompressionType, Header, SyncMarker, DEFAULT_BLOCK_SIZE, DEFAULT_SYNC_INTERVAL, SYNC_ESCAPE,
    SYNC_SIZE, VERSION,
};
use crate::vint::encode_vint;
use crate::writable::{Writable, WritableKind, BYTES_WRITABLE_CLASS_NAME};

/// Everything a [`Writer`] needs to know before it writes the header.
///
/// ```ignore
/// let options = WriterOptions::new()
///     .key_class(TEXT_CLASS_NAME)
///     .compression(CompressionType::Block, Arc::new(SnappyCodec))
///     .metadata("created-by", "ingest");
/// let mut writer = Writer::new(file, options)?;
/// ```
pub struct WriterOptions {
    key_class_name: String,
    value_class_name: String,
    compression: CompressionType,
    codec: Option<Arc<dyn Codec>>,
    metadata: BTreeMap<String, String>,
    sync_marker: Option<SyncMarker>,
    rng: Option<Box<dyn RngCore + Send>>,
    block_size: usize,
    sync_interval: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            key_class_name: BYTES_WRITABLE_CLASS_NAME.to_string(),
            value_class_name: BYTES_WRITABLE_CLASS_NAME.to_string(),
            compression: CompressionType::None,
            codec: None,
            metadata: BTreeMap::new(),
            sync_marker: None,
            rng: None,
            block_size: DEFAULT_BLOCK_SIZE,
            sync_interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

impl WriterOptions {
    /// Uncompressed `BytesWritable` keys and values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_class(mut self, name: impl Into<String>) -> Self {
        self.key_class_name = name.into();
        self
    }

    pub fn value_class(mut self, name: impl Into<String>) -> Self {
        self.value_class_name = name.into();
        self
    }

    /// Compress records or blocks with `codec`.
    pub fn compression(mut self, compression: CompressionType, codec: Arc<dyn Codec>) -> Self {
        self.compression = compression;
        self.codec = Some(codec);
        self
    }

    /// Write records uncompressed (the default).
    pub fn uncompressed(mut self) -> Self {
        self.compression = CompressionType::None;
        self.codec = None;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Use a fixed sync marker instead of a random one.
    pub fn sync_marker(mut self, marker: SyncMarker) -> Self {
        self.sync_marker = Some(marker);
        self
    }

    /// Random source for the sync marker. Defaults to an entropy-seeded
    /// [`StdRng`].
    pub fn rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    /// Raw key+value bytes buffered before a block is flushed.
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Bytes written between sync points in the record layouts.
    pub fn sync_interval(mut self, sync_interval: usize) -> Self {
        self.sync_interval = sync_interval;
        self
    }

    fn generate_marker(&mut self) -> SyncMarker {
        if let Some(marker) = self.sync_marker {
            return marker;
        }
        let mut marker = [0u8; SYNC_SIZE];
        match self.rng.as_mut() {
            Some(rng) => rng.fill_bytes(&mut marker),
            None => StdRng::from_entropy().fill_bytes(&mut marker),
        }
        marker
    }
}

impl fmt::Debug for WriterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterOptions")
            .field("key_class_name", &self.key_class_name)
            .field("value_class_name", &self.value_class_name)
            .field("compression", &self.compression)
            .field("codec", &self.codec.as_ref().map(|c| c.name()))
            .field("metadata", &self.metadata)
            .field("sync_marker", &self.sync_marker)
            .field("block_size", &self.block_size)
            .field("sync_interval", &self.sync_interval)
            .finish_non_exhaustive()
    }
}

/// Output stream that counts bytes since the last sync point and refuses
/// further writes once one has failed, since a failed write may have left
/// a partial record behind.
struct Sink<W> {
    inner: W,
    since_sync: usize,
    failed: Option<(io::ErrorKind, String)>,
}

impl<W: Write> Sink<W> {
    fn check(&self) -> Result<()> {
        match &self.failed {
            Some((kind, msg)) => Err(Error::Io(io::Error::new(
                *kind,
                format!("writer failed earlier: {}", msg),
            ))),
            None => Ok(()),
        }
    }

    fn fail(&mut self, err: io::Error) -> Error {
        self.failed = Some((err.kind(), err.to_string()));
        Error::Io(err)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.check()?;
        match self.inner.write_all(buf) {
            Ok(()) => {
                self.since_sync += buf.len();
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.check()?;
        self.inner.flush().map_err(|e| self.fail(e))
    }
}

/// Streaming writer for SequenceFiles.
///
/// # Write contract
/// The header is written on the first [`append`](Writer::append) (or an
/// explicit [`write_header`](Writer::write_header)). In the record layouts
/// every append writes one record, preceded by a sync point once more than
/// `sync_interval` bytes have gone out since the last one. In the block
/// layout records are buffered and written as one compressed block once
/// `block_size` raw bytes have gathered. Call [`close`](Writer::close) to
/// write the trailing partial block.
///
/// Each record or block is serialized in memory and handed to the stream
/// in a single write, so a compression failure never leaves a partial
/// frame behind. If the stream itself fails, every later call returns an
/// error without writing.
pub struct Writer<W: Write> {
    sink: Sink<W>,
    options: WriterOptions,
    header: Option<Header>,
    compressor: Option<Box<dyn Compressor>>,
    block: BlockBuffer,
    /// One serialized record or block.
    frame: Vec<u8>,
    /// Scratch for an encoded length section.
    lengths: Vec<u8>,
}

impl<W: Write> Writer<W> {
    /// Check `options` and wrap `inner`. Nothing is written yet.
    pub fn new(inner: W, options: WriterOptions) -> Result<Self> {
        match (options.compression, &options.codec) {
            (CompressionType::None, Some(codec)) => {
                return Err(Error::unsupported(format!(
                    "codec {} set without record or block compression",
                    codec.name()
                )))
            }
            (CompressionType::Record | CompressionType::Block, None) => {
                return Err(Error::unsupported(format!(
                    "{:?} compression requires a codec",
                    options.compression
                )))
            }
            _ => {}
        }
        if options.block_size == 0 {
            return Err(Error::unsupported("block size must be positive"));
        }

        let compressor = options.codec.as_ref().map(|codec| codec.compressor());
        Ok(Self {
            sink: Sink {
                inner,
                since_sync: 0,
                failed: None,
            },
            options,
            header: None,
            compressor,
            block: BlockBuffer::default(),
            frame: Vec::new(),
            lengths: Vec::new(),
        })
    }

    /// Generate the sync marker and write the header.
    ///
    /// Called implicitly by the first append. Fails if the header has
    /// already been written.
    pub fn write_header(&mut self) -> Result<&Header> {
        if self.header.is_some() {
            return Err(Error::unsupported("header has already been written"));
        }
        self.sink.check()?;

        let header = Header {
            version: VERSION,
            key_class_name: self.options.key_class_name.clone(),
            value_class_name: self.options.value_class_name.clone(),
            compression: self.options.compression,
            codec: self.options.codec.as_ref().map(|codec| codec.codec()),
            metadata: self.options.metadata.clone(),
            sync_marker: self.options.generate_marker(),
        };
        let bytes = header.to_bytes()?;
        self.sink.write_all(&bytes)?;
        debug!(
            "wrote SequenceFile header: key={} value={} compression={:?} codec={:?} metadata={}",
            header.key_class_name,
            header.value_class_name,
            header.compression,
            header.codec,
            header.metadata.len()
        );

        Ok(&*self.header.insert(header))
    }

    /// The header, once written.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    fn ensure_header(&mut self) -> Result<SyncMarker> {
        if let Some(header) = &self.header {
            return Ok(header.sync_marker);
        }
        Ok(self.write_header()?.sync_marker)
    }

    /// Append one record of raw key and value bytes.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.sink.check()?;
        let marker = self.ensure_header()?;
        match self.options.compression {
            CompressionType::Block => {
                self.block.push(key, value);
                if self.block.raw_size() >= self.options.block_size {
                    self.write_block(&marker)?;
                }
                Ok(())
            }
            CompressionType::None | CompressionType::Record => {
                self.write_record(&marker, key, value)
            }
        }
    }

    /// Append a record of typed values, checked against the header's key
    /// and value classes.
    pub fn append_writable(&mut self, key: &Writable, value: &Writable) -> Result<()> {
        let key = WritableKind::resolve(&self.options.key_class_name)?.encode(key)?;
        let value = WritableKind::resolve(&self.options.value_class_name)?.encode(value)?;
        self.append(&key, &value)
    }

    fn write_record(&mut self, marker: &SyncMarker, key: &[u8], value: &[u8]) -> Result<()> {
        self.frame.clear();
        if self.sink.since_sync > self.options.sync_interval {
            self.frame.extend_from_slice(&SYNC_ESCAPE.to_be_bytes());
            self.frame.extend_from_slice(marker);
            trace!("sync point after {} bytes", self.sink.since_sync);
        }
        let sync_len = self.frame.len();

        let value = match self.compressor.as_mut() {
            Some(compressor) => compressor.compress(value)?,
            None => value,
        };
        let total = key
            .len()
            .checked_add(value.len())
            .and_then(|total| i32::try_from(total).ok())
            .ok_or_else(|| {
                Error::unsupported(format!(
                    "record of {} key and {} value bytes is too large",
                    key.len(),
                    value.len()
                ))
            })?;

        self.frame.extend_from_slice(&total.to_be_bytes());
        self.frame.extend_from_slice(&(key.len() as i32).to_be_bytes());
        self.frame.extend_from_slice(key);
        self.frame.extend_from_slice(value);

        self.sink.write_all(&self.frame)?;
        if sync_len > 0 {
            self.sink.since_sync = self.frame.len() - sync_len;
        }
        Ok(())
    }

    /// Compress and write the buffered block. An empty buffer writes
    /// nothing.
    fn write_block(&mut self, marker: &SyncMarker) -> Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        let compressor = self
            .compressor
            .as_mut()
            .ok_or_else(|| Error::unsupported("block compression without a compressor"))?;

        self.frame.clear();
        self.frame.extend_from_slice(&SYNC_ESCAPE.to_be_bytes());
        self.frame.extend_from_slice(marker);
        encode_vint(self.block.len() as i64, &mut self.frame);

        encode_lengths(&self.block.key_lengths, &mut self.lengths);
        push_section(&mut self.frame, compressor.compress(&self.lengths)?);
        push_section(&mut self.frame, compressor.compress(&self.block.keys)?);
        encode_lengths(&self.block.value_lengths, &mut self.lengths);
        push_section(&mut self.frame, compressor.compress(&self.lengths)?);
        push_section(&mut self.frame, compressor.compress(&self.block.values)?);

        self.sink.write_all(&self.frame)?;
        self.sink.since_sync = 0;
        debug!(
            "flushed block of {} records: {} raw bytes, {} written",
            self.block.len(),
            self.block.raw_size(),
            self.frame.len()
        );
        self.block.clear();
        Ok(())
    }

    /// Write any buffered block and flush the stream.
    pub fn flush(&mut self) -> Result<()> {
        self.sink.check()?;
        if !self.block.is_empty() {
            let marker = self.ensure_header()?;
            self.write_block(&marker)?;
        }
        self.sink.flush()
    }

    /// Write the header if nothing has been appended, flush any pending
    /// block, and return the stream.
    pub fn close(mut self) -> Result<W> {
        self.sink.check()?;
        self.ensure_header()?;
        self.flush()?;
        Ok(self.sink.inner)
    }

    pub fn get_ref(&self) -> &W {
        &self.sink.inner
    }
}

fn push_section(frame: &mut Vec<u8>, compressed: &[u8]) {
    encode_vint(compressed.len() as i64, frame);
    frame.extend_from_slice(compressed);
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::testing::XorCodec;
    use crate::codec::CodecRegistry;
    use crate::reader::Reader;
    use crate::writable::{INT_WRITABLE_CLASS_NAME, TEXT_CLASS_NAME};

    const MARKER: SyncMarker = *b"fedcba9876543210";

    fn registry() -> CodecRegistry {
        CodecRegistry::new().with(Arc::new(XorCodec))
    }

    fn read_all(bytes: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut reader = Reader::new(Cursor::new(bytes), registry());
        reader.read_header().unwrap();
        let mut out = Vec::new();
        while reader.scan().unwrap() {
            out.push((reader.key().to_vec(), reader.value().to_vec()));
        }
        out
    }

    /// Fails every write once `budget` bytes have been accepted.
    struct FailingWriter {
        written: Vec<u8>,
        budget: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written.len() + buf.len() > self.budget {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_uncompressed_record_bytes() {
        let options = WriterOptions::new().sync_marker(MARKER);
        let mut writer = Writer::new(Vec::new(), options).unwrap();
        writer.append(b"k", b"value").unwrap();
        let bytes = writer.close().unwrap();

        let header_len = writer_header_len(&bytes);
        assert_eq!(
            &bytes[header_len..],
            &[0, 0, 0, 6, 0, 0, 0, 1, b'k', b'v', b'a', b'l', b'u', b'e']
        );
        assert_eq!(read_all(&bytes), vec![(b"k".to_vec(), b"value".to_vec())]);
    }

    fn writer_header_len(bytes: &[u8]) -> usize {
        let header = Header::read_from(&mut Cursor::new(bytes)).unwrap();
        header.to_bytes().unwrap().len()
    }

    #[test]
    fn test_empty_file_is_just_a_header() {
        let options = WriterOptions::new().sync_marker(MARKER).metadata("a", "b");
        let bytes = Writer::new(Vec::new(), options).unwrap().close().unwrap();
        let header = Header::read_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(header.sync_marker, MARKER);
        assert_eq!(header.metadata.get("a").map(String::as_str), Some("b"));
        assert_eq!(bytes.len(), header.to_bytes().unwrap().len());
        assert!(read_all(&bytes).is_empty());
    }

    #[test]
    fn test_sync_points_follow_interval() {
        let options = WriterOptions::new().sync_marker(MARKER).sync_interval(100);
        let mut writer = Writer::new(Vec::new(), options).unwrap();
        for i in 0..50u8 {
            writer.append(&[i], &[i; 20]).unwrap();
        }
        let bytes = writer.close().unwrap();

        let mut sync_point = SYNC_ESCAPE.to_be_bytes().to_vec();
        sync_point.extend_from_slice(&MARKER);
        let syncs = bytes.windows(sync_point.len()).filter(|w| *w == &sync_point[..]).count();
        // 50 records of 29 bytes, with a sync point once more than 100
        // bytes have gone out since the last one.
        assert!((10..=15).contains(&syncs), "found {syncs} sync points");

        let records = read_all(&bytes);
        assert_eq!(records.len(), 50);
        assert_eq!(records[49], (vec![49], vec![49; 20]));
    }

    #[test]
    fn test_record_compression_roundtrip() {
        let options = WriterOptions::new()
            .sync_marker(MARKER)
            .compression(CompressionType::Record, Arc::new(XorCodec));
        let mut writer = Writer::new(Vec::new(), options).unwrap();
        writer.append(b"key", b"plain value").unwrap();
        writer.append(b"", b"").unwrap();
        let bytes = writer.close().unwrap();

        assert!(!bytes.windows(11).any(|w| w == b"plain value"));
        assert_eq!(
            read_all(&bytes),
            vec![
                (b"key".to_vec(), b"plain value".to_vec()),
                (Vec::new(), Vec::new())
            ]
        );
    }

    #[test]
    fn test_blocks_flush_at_block_size() {
        let options = WriterOptions::new()
            .sync_marker(MARKER)
            .compression(CompressionType::Block, Arc::new(XorCodec))
            .block_size(64);
        let mut writer = Writer::new(Vec::new(), options).unwrap();
        for i in 0..10u8 {
            writer.append(&[i; 4], &[i; 12]).unwrap();
        }
        // 4 records fill a block; 2 are still buffered.
        let mut sync_point = SYNC_ESCAPE.to_be_bytes().to_vec();
        sync_point.extend_from_slice(&MARKER);
        let count = |bytes: &[u8]| bytes.windows(20).filter(|w| *w == &sync_point[..]).count();
        assert_eq!(count(&writer.get_ref()[..]), 2);

        let bytes = writer.close().unwrap();
        assert_eq!(count(&bytes[..]), 3);
        let records = read_all(&bytes);
        assert_eq!(records.len(), 10);
        for (i, (key, value)) in records.iter().enumerate() {
            assert_eq!(key, &vec![i as u8; 4]);
            assert_eq!(value, &vec![i as u8; 12]);
        }
    }

    #[test]
    fn test_flush_writes_pending_block() {
        let options = WriterOptions::new()
            .sync_marker(MARKER)
            .compression(CompressionType::Block, Arc::new(XorCodec));
        let mut writer = Writer::new(Vec::new(), options).unwrap();
        writer.append(b"a", b"1").unwrap();
        let header_only = writer.get_ref().len();
        writer.flush().unwrap();
        assert!(writer.get_ref().len() > header_only);
        // Nothing buffered: a second flush writes nothing.
        let flushed = writer.get_ref().len();
        writer.flush().unwrap();
        assert_eq!(writer.get_ref().len(), flushed);

        let bytes = writer.close().unwrap();
        assert_eq!(bytes.len(), flushed);
        assert_eq!(read_all(&bytes), vec![(b"a".to_vec(), b"1".to_vec())]);
    }

    #[test]
    fn test_marker_from_rng() {
        let marker = |seed| {
            let options = WriterOptions::new().rng(StdRng::seed_from_u64(seed));
            let mut writer = Writer::new(Vec::new(), options).unwrap();
            let marker = writer.write_header().unwrap().sync_marker;
            marker
        };
        assert_eq!(marker(7), marker(7));
        assert_ne!(marker(7), marker(8));
    }

    #[test]
    fn test_generated_marker_roundtrips_through_header() {
        let seeded = WriterOptions::new().rng(StdRng::seed_from_u64(11));
        for options in [WriterOptions::new(), seeded] {
            let mut writer = Writer::new(Vec::new(), options).unwrap();
            writer.append(b"k", b"v").unwrap();
            let written = writer.header().unwrap().clone();
            let bytes = writer.close().unwrap();

            let read = Header::read_from(&mut &bytes[..]).unwrap();
            assert_eq!(read, written);
            assert_eq!(read.sync_marker, written.sync_marker);
            // The marker also frames the records that follow.
            assert_eq!(read_all(&bytes), vec![(b"k".to_vec(), b"v".to_vec())]);
        }
    }

    #[test]
    fn test_header_written_once() {
        let mut writer = Writer::new(Vec::new(), WriterOptions::new()).unwrap();
        assert!(writer.header().is_none());
        let marker = writer.write_header().unwrap().sync_marker;
        assert!(writer.write_header().is_err());
        writer.append(b"k", b"v").unwrap();
        assert_eq!(writer.header().unwrap().sync_marker, marker);
    }

    #[test]
    fn test_invalid_options() {
        let options = WriterOptions::new().compression(CompressionType::None, Arc::new(XorCodec));
        let err = Writer::new(Vec::new(), options).err().unwrap();
        assert!(matches!(err, Error::Unsupported(_)));

        let err = Writer::new(Vec::new(), WriterOptions::new().block_size(0)).err().unwrap();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[test]
    fn test_append_writable_checks_classes() {
        let options = WriterOptions::new()
            .key_class(TEXT_CLASS_NAME)
            .value_class(INT_WRITABLE_CLASS_NAME)
            .sync_marker(MARKER);
        let mut writer = Writer::new(Vec::new(), options).unwrap();
        writer
            .append_writable(&Writable::Text("answer".into()), &Writable::Int(42))
            .unwrap();
        let err = writer
            .append_writable(&Writable::Int(1), &Writable::Int(2))
            .unwrap_err();
        assert!(matches!(err, Error::Writable(_)));

        let bytes = writer.close().unwrap();
        let records = read_all(&bytes);
        assert_eq!(records.len(), 1);
        assert_eq!(
            WritableKind::Text.decode(&records[0].0).unwrap(),
            Writable::Text("answer".into())
        );
        assert_eq!(WritableKind::Int.decode(&records[0].1).unwrap(), Writable::Int(42));
    }

    #[test]
    fn test_failed_write_poisons_writer() {
        let sink = FailingWriter {
            written: Vec::new(),
            budget: 200,
        };
        let options = WriterOptions::new().sync_marker(MARKER);
        let mut writer = Writer::new(sink, options).unwrap();
        writer.append(b"k", b"small").unwrap();
        let before = writer.get_ref().written.len();

        assert!(matches!(writer.append(b"k", &[0u8; 500]), Err(Error::Io(_))));
        // The next record would fit, but the writer stays failed.
        assert!(matches!(writer.append(b"k", b"v"), Err(Error::Io(_))));
        assert!(matches!(writer.flush(), Err(Error::Io(_))));
        assert_eq!(writer.get_ref().written.len(), before);
        assert!(writer.close().is_err());
    }
}
