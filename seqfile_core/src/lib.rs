pub mod codec;
pub mod error;
pub mod format;
pub mod reader;
pub mod sync;
pub mod vint;
pub mod writable;
pub mod writer;

mod block;

pub use codec::{Codec, CodecRegistry, Compressor, Decompressor};
pub use error::{Error, Result};
pub use format::{CompressionCodec, CompressionType, Header, SyncMarker, MAGIC, VERSION};
pub use reader::{Reader, Record, Records};
pub use writable::{Writable, WritableKind};
pub use writer::{Writer, WriterOptions};
