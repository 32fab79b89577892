use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::vint::{read_vint, write_vint};

/// Magic bytes at the start of every SequenceFile.
pub const MAGIC: &[u8; 3] = b"SEQ";

/// Header version written by this crate (adds the metadata section).
pub const VERSION: u8 = 6;

/// Oldest header version accepted on read (custom codec class names).
pub const MIN_VERSION: u8 = 5;

/// Size of the sync marker in bytes.
pub const SYNC_SIZE: usize = 16;

/// Record length value announcing a sync point instead of a record.
pub const SYNC_ESCAPE: i32 = -1;

/// Bytes written between sync points in record layouts.
pub const DEFAULT_SYNC_INTERVAL: usize = 2000;

/// Raw key+value bytes buffered before a block is flushed.
pub const DEFAULT_BLOCK_SIZE: usize = 1_000_000;

/// Upper bound on metadata pairs; larger counts indicate corruption.
pub const MAX_METADATA_PAIRS: i32 = 1024;

/// How far [`Reader::sync`](crate::Reader::sync) scans before giving up.
pub const MAX_SYNC_SCAN: u64 = 100 * 1024 * 1024;

/// The per-file synchronization marker.
pub type SyncMarker = [u8; SYNC_SIZE];

// ── Compression ────────────────────────────────────────────────────────────

/// Record layout selected by the header's two compression flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionType {
    #[default]
    None,
    /// Each value is compressed on its own; keys and framing stay raw.
    Record,
    /// Records are batched into column-oriented compressed blocks.
    Block,
}

/// Compression codecs recognized in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionCodec {
    Gzip,
    Snappy,
    /// Hadoop's `DefaultCodec`: a plain zlib stream.
    Zlib,
    BZip2,
    Zstd,
    Lz4,
}

pub const GZIP_CLASS_NAME: &str = "org.apache.hadoop.io.compress.GzipCodec";
pub const SNAPPY_CLASS_NAME: &str = "org.apache.hadoop.io.compress.SnappyCodec";
pub const ZLIB_CLASS_NAME: &str = "org.apache.hadoop.io.compress.DefaultCodec";
pub const BZIP2_CLASS_NAME: &str = "org.apache.hadoop.io.compress.BZip2Codec";
pub const ZSTD_CLASS_NAME: &str = "org.apache.hadoop.io.compress.ZStandardCodec";
pub const LZ4_CLASS_NAME: &str = "org.apache.hadoop.io.compress.Lz4Codec";

impl CompressionCodec {
    pub const ALL: [CompressionCodec; 6] = [
        CompressionCodec::Gzip,
        CompressionCodec::Snappy,
        CompressionCodec::Zlib,
        CompressionCodec::BZip2,
        CompressionCodec::Zstd,
        CompressionCodec::Lz4,
    ];

    /// The Java class name stored in the header.
    pub fn class_name(self) -> &'static str {
        match self {
            CompressionCodec::Gzip => GZIP_CLASS_NAME,
            CompressionCodec::Snappy => SNAPPY_CLASS_NAME,
            CompressionCodec::Zlib => ZLIB_CLASS_NAME,
            CompressionCodec::BZip2 => BZIP2_CLASS_NAME,
            CompressionCodec::Zstd => ZSTD_CLASS_NAME,
            CompressionCodec::Lz4 => LZ4_CLASS_NAME,
        }
    }

    pub fn from_class_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.class_name() == name)
    }
}

impl fmt::Display for CompressionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionCodec::Gzip => "gzip",
            CompressionCodec::Snappy => "snappy",
            CompressionCodec::Zlib => "zlib",
            CompressionCodec::BZip2 => "bzip2",
            CompressionCodec::Zstd => "zstd",
            CompressionCodec::Lz4 => "lz4",
        };
        f.write_str(name)
    }
}

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded SequenceFile header.
///
/// ```text
/// "SEQ" version:u8
/// key class      VInt length + UTF-8
/// value class    VInt length + UTF-8
/// value compression:bool  block compression:bool
/// [codec class   VInt length + UTF-8]        iff compressed
/// metadata count:u32 BE + (key, value)*     version >= 6
/// sync marker    16 bytes
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub key_class_name: String,
    pub value_class_name: String,
    pub compression: CompressionType,
    /// Set iff `compression` is not [`CompressionType::None`].
    pub codec: Option<CompressionCodec>,
    /// Kept sorted so serialization is deterministic.
    pub metadata: BTreeMap<String, String>,
    pub sync_marker: SyncMarker,
}

impl Header {
    /// Parse a header from the start of a stream.
    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).map_err(Error::from_read)?;
        if &magic[..3] != MAGIC {
            return Err(Error::malformed_header(format!(
                "invalid magic {:02x?}, not a SequenceFile",
                &magic[..3]
            )));
        }

        let version = magic[3];
        if !(MIN_VERSION..=VERSION).contains(&version) {
            return Err(Error::malformed_header(format!(
                "unsupported version {} (supported {}..={})",
                version, MIN_VERSION, VERSION
            )));
        }

        let key_class_name = read_string(r)?;
        let value_class_name = read_string(r)?;

        let value_compression = read_bool(r)?;
        let block_compression = read_bool(r)?;
        let compression = if block_compression {
            CompressionType::Block
        } else if value_compression {
            CompressionType::Record
        } else {
            CompressionType::None
        };

        let codec = if compression != CompressionType::None {
            let class_name = read_string(r)?;
            let codec = CompressionCodec::from_class_name(&class_name).ok_or_else(|| {
                Error::malformed_header(format!("unsupported compression codec {}", class_name))
            })?;
            Some(codec)
        } else {
            None
        };

        let metadata = if version >= 6 { read_metadata(r)? } else { BTreeMap::new() };

        let mut sync_marker = [0u8; SYNC_SIZE];
        r.read_exact(&mut sync_marker).map_err(Error::from_read)?;

        Ok(Self {
            version,
            key_class_name,
            value_class_name,
            compression,
            codec,
            metadata,
            sync_marker,
        })
    }

    /// Serialize to the exact on-disk byte layout.
    ///
    /// Only the current [`VERSION`] can be written.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.version != VERSION {
            return Err(Error::unsupported(format!(
                "writing header version {} (only version {} is written)",
                self.version, VERSION
            )));
        }
        match (self.compression, self.codec) {
            (CompressionType::None, Some(codec)) => {
                return Err(Error::unsupported(format!(
                    "codec {} set without record or block compression",
                    codec
                )))
            }
            (CompressionType::Record | CompressionType::Block, None) => {
                return Err(Error::unsupported(format!(
                    "{:?} compression requires a codec",
                    self.compression
                )))
            }
            _ => {}
        }
        if self.metadata.len() > MAX_METADATA_PAIRS as usize {
            return Err(Error::unsupported(format!(
                "{} metadata pairs exceeds the limit of {}",
                self.metadata.len(),
                MAX_METADATA_PAIRS
            )));
        }

        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(MAGIC);
        buf.push(self.version);
        write_string(&mut buf, &self.key_class_name);
        write_string(&mut buf, &self.value_class_name);
        // Hadoop sets the value flag for block-compressed files too.
        buf.push((self.compression != CompressionType::None) as u8);
        buf.push((self.compression == CompressionType::Block) as u8);
        if let Some(codec) = self.codec {
            write_string(&mut buf, codec.class_name());
        }
        buf.extend_from_slice(&(self.metadata.len() as u32).to_be_bytes());
        for (key, value) in &self.metadata {
            write_string(&mut buf, key);
            write_string(&mut buf, value);
        }
        buf.extend_from_slice(&self.sync_marker);
        Ok(buf)
    }

    /// Serialize and write the header, returning the number of bytes written.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<usize> {
        let bytes = self.to_bytes()?;
        w.write_all(&bytes)?;
        Ok(bytes.len())
    }
}

fn read_bool<R: Read + ?Sized>(r: &mut R) -> Result<bool> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b).map_err(Error::from_read)?;
    Ok(b[0] != 0)
}

/// Read a Hadoop `Text` string: VInt byte length followed by UTF-8.
fn read_string<R: Read + ?Sized>(r: &mut R) -> Result<String> {
    let len = read_vint(r)?;
    if len < 0 {
        return Err(Error::malformed_header(format!("negative string length {}", len)));
    }

    // Grow with the data instead of trusting the length for the allocation.
    let mut buf = Vec::new();
    r.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() as i64 != len {
        return Err(Error::UnexpectedEof);
    }
    String::from_utf8(buf)
        .map_err(|e| Error::malformed_header(format!("string is not UTF-8: {}", e)))
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    // Writing into a Vec cannot fail.
    let _ = write_vint(buf, s.len() as i64);
    buf.extend_from_slice(s.as_bytes());
}

fn read_metadata<R: Read + ?Sized>(r: &mut R) -> Result<BTreeMap<String, String>> {
    let mut count = [0u8; 4];
    r.read_exact(&mut count).map_err(Error::from_read)?;
    let pairs = i32::from_be_bytes(count);
    if !(0..=MAX_METADATA_PAIRS).contains(&pairs) {
        return Err(Error::malformed_header(format!("invalid metadata pair count {}", pairs)));
    }

    let mut metadata = BTreeMap::new();
    for _ in 0..pairs {
        let key = read_string(r)?;
        let value = read_string(r)?;
        metadata.insert(key, value);
    }
    Ok(metadata)
}
