//! Column-oriented compressed blocks.
//!
//! ```text
//! sentinel:i32 = -1   marker[16]
//! count:VInt
//! VInt len + compressed(key lengths as VInts)
//! VInt len + compressed(keys, concatenated)
//! VInt len + compressed(value lengths as VInts)
//! VInt len + compressed(values, concatenated)
//! ```

use crate::error::{Error, Result};
use crate::vint::{decode_vint, encode_vint};

/// Where the block reader is within the current block.
///
/// Each phase consumes one unit of the stream. A phase only advances once
/// its unit has been fully read, so a short read leaves the reader in the
/// same phase and a later call picks up where it stopped.
#[derive(Debug, Default)]
pub(crate) enum BlockPhase {
    /// Expecting the `-1` sentinel and sync marker that open every block.
    #[default]
    AwaitingSync,
    /// Positioned just after a marker found by a resync scan. The marker
    /// may be the header's, in which case a sentinel still follows.
    Resynced,
    ReadingCount,
    ReadingKeyLengths {
        count: usize,
    },
    ReadingKeys {
        key_lengths: Vec<usize>,
    },
    ReadingValueLengths {
        key_lengths: Vec<usize>,
        keys: Vec<u8>,
    },
    ReadingValues {
        key_lengths: Vec<usize>,
        keys: Vec<u8>,
        value_lengths: Vec<usize>,
    },
    Ready(Block),
    /// The last record of the block has been handed out.
    Exhausted,
}

/// A fully decompressed block, iterated record by record.
#[derive(Debug)]
pub(crate) struct Block {
    key_lengths: Vec<usize>,
    keys: Vec<u8>,
    value_lengths: Vec<usize>,
    values: Vec<u8>,
    index: usize,
    key_offset: usize,
    value_offset: usize,
}

impl Block {
    /// Assemble a block, checking that the length arrays describe the data
    /// sections exactly.
    pub(crate) fn new(
        key_lengths: Vec<usize>,
        keys: Vec<u8>,
        value_lengths: Vec<usize>,
        values: Vec<u8>,
    ) -> Result<Self> {
        check_section("key", &key_lengths, keys.len())?;
        check_section("value", &value_lengths, values.len())?;
        if key_lengths.len() != value_lengths.len() {
            return Err(Error::corrupt_block(format!(
                "{} key lengths but {} value lengths",
                key_lengths.len(),
                value_lengths.len()
            )));
        }
        Ok(Self {
            key_lengths,
            keys,
            value_lengths,
            values,
            index: 0,
            key_offset: 0,
            value_offset: 0,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.key_lengths.len()
    }

    /// True once every record has been handed out.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.index >= self.len()
    }

    /// Next record in block order, or `None` once the block is used up.
    pub(crate) fn next_record(&mut self) -> Option<(&[u8], &[u8])> {
        if self.index >= self.len() {
            return None;
        }
        let key_end = self.key_offset + self.key_lengths[self.index];
        let value_end = self.value_offset + self.value_lengths[self.index];
        let key = &self.keys[self.key_offset..key_end];
        let value = &self.values[self.value_offset..value_end];
        self.key_offset = key_end;
        self.value_offset = value_end;
        self.index += 1;
        Some((key, value))
    }
}

fn check_section(what: &str, lengths: &[usize], actual: usize) -> Result<()> {
    let declared = lengths
        .iter()
        .try_fold(0usize, |acc, &l| acc.checked_add(l))
        .ok_or_else(|| Error::corrupt_block(format!("{} lengths overflow", what)))?;
    if declared != actual {
        return Err(Error::corrupt_block(format!(
            "{} lengths sum to {} but the {} section holds {} bytes",
            what, declared, what, actual
        )));
    }
    Ok(())
}

/// Parse exactly `count` non-negative VInts from a decompressed length
/// section. Leftover or missing bytes mean the section is corrupt.
pub(crate) fn parse_lengths(section: &[u8], count: usize) -> Result<Vec<usize>> {
    let mut lengths = Vec::with_capacity(count.min(section.len()));
    let mut pos = 0;
    for i in 0..count {
        let (len, used) = decode_vint(&section[pos..]).map_err(|_| {
            Error::corrupt_block(format!("length section ends after {} of {} entries", i, count))
        })?;
        if len < 0 {
            return Err(Error::corrupt_block(format!("negative length {} at entry {}", len, i)));
        }
        lengths.push(len as usize);
        pos += used;
    }
    if pos != section.len() {
        return Err(Error::corrupt_block(format!(
            "{} unused bytes after {} lengths",
            section.len() - pos,
            count
        )));
    }
    Ok(lengths)
}

/// Raw records waiting to be written as one block.
#[derive(Debug, Default)]
pub(crate) struct BlockBuffer {
    pub(crate) keys: Vec<u8>,
    pub(crate) key_lengths: Vec<usize>,
    pub(crate) values: Vec<u8>,
    pub(crate) value_lengths: Vec<usize>,
}

impl BlockBuffer {
    pub(crate) fn push(&mut self, key: &[u8], value: &[u8]) {
        self.keys.extend_from_slice(key);
        self.key_lengths.push(key.len());
        self.values.extend_from_slice(value);
        self.value_lengths.push(value.len());
    }

    pub(crate) fn len(&self) -> usize {
        self.key_lengths.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.key_lengths.is_empty()
    }

    /// Raw key and value bytes buffered so far.
    pub(crate) fn raw_size(&self) -> usize {
        self.keys.len() + self.values.len()
    }

    pub(crate) fn clear(&mut self) {
        self.keys.clear();
        self.key_lengths.clear();
        self.values.clear();
        self.value_lengths.clear();
    }
}

/// Serialize a length array as consecutive VInts into `out`.
pub(crate) fn encode_lengths(lengths: &[usize], out: &mut Vec<u8>) {
    out.clear();
    for &len in lengths {
        encode_vint(len as i64, out);
    }
}
