//! Error types for SequenceFile reading and writing.

use std::io;

use thiserror::Error;

/// The result type used throughout `seqfile_core`.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for SequenceFile operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad magic, unsupported version, unknown codec class, or an
    /// out-of-bounds metadata count.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The stream ended in the middle of a field or record.
    ///
    /// A stream that ends exactly on a record boundary is not an error.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Sync marker bytes were found but differ from the header's marker.
    #[error("sync marker mismatch: expected {expected}, found {found}")]
    SyncMismatch { expected: String, found: String },

    /// The reader or writer was configured with a combination it cannot
    /// handle (for example block compression without a codec).
    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    /// A compression adapter failed.
    #[error("codec failure: {0:#}")]
    Codec(#[from] anyhow::Error),

    /// The resync scan gave up without seeing a sync marker.
    #[error("no sync marker found within {0} bytes")]
    NoSyncFound(u64),

    /// A record-level length field is negative or inconsistent.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// A block's length sections do not describe its data sections.
    #[error("corrupt block: {0}")]
    CorruptBlock(String),

    /// A Writable value did not match its wire format or declared class.
    #[error("malformed writable: {0}")]
    Writable(String),

    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Creates a new malformed header error.
    pub fn malformed_header(msg: impl Into<String>) -> Self {
        Error::MalformedHeader(msg.into())
    }

    /// Creates a new unsupported configuration error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Creates a new corrupt block error.
    pub fn corrupt_block(msg: impl Into<String>) -> Self {
        Error::CorruptBlock(msg.into())
    }

    /// Creates a new corrupt record error.
    pub fn corrupt_record(msg: impl Into<String>) -> Self {
        Error::CorruptRecord(msg.into())
    }

    /// Maps an I/O error, turning a short read into [`Error::UnexpectedEof`].
    pub(crate) fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(err)
        }
    }

    /// Maps a failure while reading decompressed bytes out of a codec.
    ///
    /// The compressed unit is always fully staged before it is decoded, so
    /// a short read here means the unit itself is truncated.
    pub(crate) fn from_decompress(err: io::Error) -> Self {
        let context = if err.kind() == io::ErrorKind::UnexpectedEof {
            "compressed data ends early"
        } else {
            "decompressing"
        };
        Error::Codec(anyhow::Error::new(err).context(context))
    }
}
