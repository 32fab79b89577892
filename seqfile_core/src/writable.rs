//! Wire formats of the common Hadoop `Writable` types.
//!
//! These are independent of the container: a record's key and value bytes
//! are whatever the key/value classes serialize to, and these helpers
//! convert between those bytes and plain Rust values.

use std::fmt;

use crate::error::{Error, Result};
use crate::vint::{decode_vint, encode_vint};

pub const BYTES_WRITABLE_CLASS_NAME: &str = "org.apache.hadoop.io.BytesWritable";
pub const TEXT_CLASS_NAME: &str = "org.apache.hadoop.io.Text";
pub const INT_WRITABLE_CLASS_NAME: &str = "org.apache.hadoop.io.IntWritable";
pub const LONG_WRITABLE_CLASS_NAME: &str = "org.apache.hadoop.io.LongWritable";

/// `BytesWritable`: 4-byte big-endian length, then the bytes.
pub fn bytes_writable(b: &[u8]) -> Result<&[u8]> {
    let (len, body) = b
        .split_first_chunk::<4>()
        .ok_or_else(|| Error::Writable("BytesWritable shorter than its length prefix".into()))?;
    let len = i32::from_be_bytes(*len);
    if len < 0 || len as usize != body.len() {
        return Err(Error::Writable(format!(
            "BytesWritable declares {} bytes but carries {}",
            len,
            body.len()
        )));
    }
    Ok(body)
}

pub fn put_bytes_writable(b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + b.len());
    out.extend_from_slice(&(b.len() as u32).to_be_bytes());
    out.extend_from_slice(b);
    out
}

/// `Text`: VInt length, then UTF-8 bytes.
pub fn text(b: &[u8]) -> Result<&str> {
    let (len, used) = decode_vint(b)?;
    let body = &b[used..];
    if len < 0 || len as usize != body.len() {
        return Err(Error::Writable(format!(
            "Text declares {} bytes but carries {}",
            len,
            body.len()
        )));
    }
    std::str::from_utf8(body).map_err(|e| Error::Writable(format!("Text is not UTF-8: {}", e)))
}

pub fn put_text(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() + 5);
    encode_vint(s.len() as i64, &mut out);
    out.extend_from_slice(s.as_bytes());
    out
}

/// `IntWritable`: 4-byte big-endian signed integer.
pub fn int_writable(b: &[u8]) -> Result<i32> {
    let bytes: [u8; 4] = b
        .try_into()
        .map_err(|_| Error::Writable(format!("IntWritable needs 4 bytes, got {}", b.len())))?;
    Ok(i32::from_be_bytes(bytes))
}

pub fn put_int_writable(i: i32) -> Vec<u8> {
    i.to_be_bytes().to_vec()
}

/// `LongWritable`: 8-byte big-endian signed integer.
pub fn long_writable(b: &[u8]) -> Result<i64> {
    let bytes: [u8; 8] = b
        .try_into()
        .map_err(|_| Error::Writable(format!("LongWritable needs 8 bytes, got {}", b.len())))?;
    Ok(i64::from_be_bytes(bytes))
}

pub fn put_long_writable(i: i64) -> Vec<u8> {
    i.to_be_bytes().to_vec()
}

/// A Writable type, selected by the class name in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WritableKind {
    Bytes,
    Text,
    Int,
    Long,
}

impl WritableKind {
    pub fn class_name(self) -> &'static str {
        match self {
            WritableKind::Bytes => BYTES_WRITABLE_CLASS_NAME,
            WritableKind::Text => TEXT_CLASS_NAME,
            WritableKind::Int => INT_WRITABLE_CLASS_NAME,
            WritableKind::Long => LONG_WRITABLE_CLASS_NAME,
        }
    }

    /// Accepts the Java class names and the short aliases
    /// `bytes`, `text`, `int32`, `int64`.
    pub fn from_class_name(name: &str) -> Option<Self> {
        match name {
            BYTES_WRITABLE_CLASS_NAME | "bytes" => Some(WritableKind::Bytes),
            TEXT_CLASS_NAME | "text" => Some(WritableKind::Text),
            INT_WRITABLE_CLASS_NAME | "int32" => Some(WritableKind::Int),
            LONG_WRITABLE_CLASS_NAME | "int64" => Some(WritableKind::Long),
            _ => None,
        }
    }

    /// Like [`from_class_name`](Self::from_class_name), but unknown names
    /// are an error.
    pub fn resolve(name: &str) -> Result<Self> {
        Self::from_class_name(name)
            .ok_or_else(|| Error::Writable(format!("unsupported writable class {}", name)))
    }

    pub fn decode(self, b: &[u8]) -> Result<Writable> {
        Ok(match self {
            WritableKind::Bytes => Writable::Bytes(bytes_writable(b)?.to_vec()),
            WritableKind::Text => Writable::Text(text(b)?.to_string()),
            WritableKind::Int => Writable::Int(int_writable(b)?),
            WritableKind::Long => Writable::Long(long_writable(b)?),
        })
    }

    /// Serialize `value`, which must be of this kind.
    pub fn encode(self, value: &Writable) -> Result<Vec<u8>> {
        if value.kind() != self {
            return Err(Error::Writable(format!(
                "cannot write a {} value as {}",
                value.kind(),
                self.class_name()
            )));
        }
        Ok(value.to_bytes())
    }
}

impl fmt::Display for WritableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WritableKind::Bytes => "bytes",
            WritableKind::Text => "text",
            WritableKind::Int => "int32",
            WritableKind::Long => "int64",
        })
    }
}

/// A decoded Writable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Writable {
    Bytes(Vec<u8>),
    Text(String),
    Int(i32),
    Long(i64),
}

impl Writable {
    pub fn kind(&self) -> WritableKind {
        match self {
            Writable::Bytes(_) => WritableKind::Bytes,
            Writable::Text(_) => WritableKind::Text,
            Writable::Int(_) => WritableKind::Int,
            Writable::Long(_) => WritableKind::Long,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Writable::Bytes(b) => put_bytes_writable(b),
            Writable::Text(s) => put_text(s),
            Writable::Int(i) => put_int_writable(*i),
            Writable::Long(i) => put_long_writable(*i),
        }
    }
}
