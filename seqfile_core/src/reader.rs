use std::io::{self, Read};

use log::{debug, trace, warn};

use crate::block::{parse_lengths, Block, BlockPhase};
use crate::codec::{decompress_into, CodecRegistry, Decompressor};
use crate::error::{Error, Result};
use crate::format::{CompressionType, Header, SyncMarker, MAX_SYNC_SCAN, SYNC_ESCAPE, SYNC_SIZE};
use crate::sync::scan_for_marker;
use crate::vint::{decode_vint, vint_len_from_first_byte};

/// Largest single step by which the staging buffer grows, so a corrupt
/// length field cannot force one huge allocation up front.
const STAGE_CHUNK: usize = 64 * 1024;

/// An owned key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Streaming reader for SequenceFiles.
///
/// # Read sequence
/// 1. [`read_header`](Reader::read_header) parses the header and picks the
///    decompressor for the file's codec out of the [`CodecRegistry`].
/// 2. [`scan`](Reader::scan) advances to the next record, transparently
///    skipping sync points and decompressing values or whole blocks.
/// 3. [`key`](Reader::key) / [`value`](Reader::value) expose the current
///    record until the next `scan`.
///
/// The reader never reads past the unit it is parsing, so the underlying
/// stream is left exactly after the last record returned. If the stream
/// ends mid-record, `scan` fails with [`Error::UnexpectedEof`] but keeps the
/// bytes it already consumed; calling `scan` again once more data is
/// available resumes from the same position.
///
/// After an external seek to an arbitrary offset, call
/// [`sync`](Reader::sync) to realign on the next sync point.
pub struct Reader<R> {
    inner: R,
    header: Option<Header>,
    registry: CodecRegistry,
    decompressor: Option<Box<dyn Decompressor>>,
    /// Bytes pulled from `inner` for the unit currently being parsed.
    staged: Vec<u8>,
    /// Scratch for a decompressed block section.
    section: Vec<u8>,
    phase: BlockPhase,
    key: Vec<u8>,
    value: Vec<u8>,
    max_sync_scan: u64,
}

impl<R: Read> Reader<R> {
    /// Wrap a stream positioned at the start of a SequenceFile.
    ///
    /// `registry` supplies the codec named in the header; an empty registry
    /// is enough for uncompressed files.
    pub fn new(inner: R, registry: CodecRegistry) -> Self {
        Self {
            inner,
            header: None,
            registry,
            decompressor: None,
            staged: Vec::new(),
            section: Vec::new(),
            phase: BlockPhase::default(),
            key: Vec::new(),
            value: Vec::new(),
            max_sync_scan: MAX_SYNC_SCAN,
        }
    }

    /// Wrap a stream that is already past the header, using a header read
    /// elsewhere (for example by another reader on the same file).
    pub fn with_header(inner: R, header: Header, registry: CodecRegistry) -> Result<Self> {
        let mut reader = Self::new(inner, registry);
        reader.install_header(header)?;
        Ok(reader)
    }

    /// Parse the file header. Must be the first operation on the stream.
    pub fn read_header(&mut self) -> Result<&Header> {
        if self.header.is_some() {
            return Err(Error::unsupported("header has already been read"));
        }
        let header = Header::read_from(&mut self.inner)?;
        debug!(
            "read header: version={} key={} value={} compression={:?} codec={:?} metadata={}",
            header.version,
            header.key_class_name,
            header.value_class_name,
            header.compression,
            header.codec,
            header.metadata.len()
        );
        self.install_header(header)?;
        self.header()
    }

    fn install_header(&mut self, header: Header) -> Result<()> {
        self.decompressor = match (header.compression, header.codec) {
            (CompressionType::None, _) => None,
            (_, Some(codec)) => Some(self.registry.resolve(codec)?.decompressor()),
            (compression, None) => {
                return Err(Error::unsupported(format!(
                    "{:?} compression without a codec",
                    compression
                )))
            }
        };
        self.header = Some(header);
        self.reset();
        Ok(())
    }

    /// The parsed header.
    pub fn header(&self) -> Result<&Header> {
        self.header
            .as_ref()
            .ok_or_else(|| Error::unsupported("header has not been read"))
    }

    fn sync_marker(&self) -> Result<SyncMarker> {
        Ok(self.header()?.sync_marker)
    }

    /// Forget any partially read record or block.
    ///
    /// Use after seeking the underlying stream to a known record or block
    /// boundary (such as the end of the header).
    pub fn reset(&mut self) {
        self.staged.clear();
        self.phase = BlockPhase::AwaitingSync;
        self.key.clear();
        self.value.clear();
    }

    /// Scan forward to the next sync marker after an external seek.
    ///
    /// On `Ok(true)` the stream sits immediately after a marker and the
    /// next [`scan`](Reader::scan) returns the record (or the first record
    /// of the block) that follows it. `Ok(false)` means the stream ended
    /// before another marker. Gives up with [`Error::NoSyncFound`] after
    /// scanning [`MAX_SYNC_SCAN`] bytes.
    pub fn sync(&mut self) -> Result<bool> {
        let marker = self.sync_marker()?;
        self.reset();
        if !scan_for_marker(&mut self.inner, &marker, self.max_sync_scan)? {
            return Ok(false);
        }
        if self.header()?.compression == CompressionType::Block {
            self.phase = BlockPhase::Resynced;
        }
        Ok(true)
    }

    /// Limit how far [`sync`](Reader::sync) scans before failing.
    pub fn set_max_sync_scan(&mut self, limit: u64) {
        self.max_sync_scan = limit;
    }

    /// Advance to the next record.
    ///
    /// Returns `Ok(false)` when the stream ends cleanly on a record boundary.
    pub fn scan(&mut self) -> Result<bool> {
        match self.header()?.compression {
            CompressionType::Block => self.scan_block(),
            CompressionType::None | CompressionType::Record => self.scan_record(),
        }
    }

    /// Key of the current record; valid until the next `scan`.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Decompressed value of the current record; valid until the next `scan`.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Scan and copy out the next record.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if self.scan()? {
            Ok(Some(Record {
                key: self.key.clone(),
                value: self.value.clone(),
            }))
        } else {
            Ok(None)
        }
    }

    /// Iterate over the remaining records. Iteration stops after the first
    /// error.
    pub fn records(&mut self) -> Records<'_, R> {
        Records {
            reader: self,
            done: false,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutable access to the stream, e.g. to seek it. Follow a seek with
    /// [`sync`](Reader::sync) or [`reset`](Reader::reset).
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    // ── Staging ─────────────────────────────────────────────────────────────

    /// Make sure at least `n` bytes are staged.
    ///
    /// Returns `Ok(false)` only when the stream ended before a single byte
    /// of this unit was staged. Any other shortfall is `UnexpectedEof`, with
    /// the staged bytes kept for a retry.
    fn stage(&mut self, n: usize) -> Result<bool> {
        while self.staged.len() < n {
            let start = self.staged.len();
            let want = (n - start).min(STAGE_CHUNK);
            self.staged.resize(start + want, 0);
            match self.inner.read(&mut self.staged[start..]) {
                Ok(0) => {
                    self.staged.truncate(start);
                    return if start == 0 { Ok(false) } else { Err(Error::UnexpectedEof) };
                }
                Ok(read) => self.staged.truncate(start + read),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => self.staged.truncate(start),
                Err(e) => {
                    self.staged.truncate(start);
                    return Err(Error::from_read(e));
                }
            }
        }
        Ok(true)
    }

    /// Like [`stage`](Self::stage), but running out of input is always an error.
    fn stage_exact(&mut self, n: usize) -> Result<()> {
        if self.stage(n)? {
            Ok(())
        } else {
            Err(Error::UnexpectedEof)
        }
    }

    /// Stage a VInt starting at `at`, returning its value and the offset
    /// just past it.
    fn stage_vint(&mut self, at: usize) -> Result<(i64, usize)> {
        self.stage_exact(at + 1)?;
        let len = vint_len_from_first_byte(self.staged[at]);
        self.stage_exact(at + len)?;
        let (value, used) = decode_vint(&self.staged[at..])?;
        Ok((value, at + used))
    }

    fn read_i32_at(&self, at: usize) -> i32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.staged[at..at + 4]);
        i32::from_be_bytes(bytes)
    }

    /// Compare the staged marker at `at` with the header's.
    fn check_sync(&self, at: usize) -> Result<()> {
        let expected = self.sync_marker()?;
        let found = &self.staged[at..at + SYNC_SIZE];
        if found != &expected[..] {
            warn!("sync marker mismatch: expected {:02x?}, found {:02x?}", expected, found);
            return Err(Error::SyncMismatch {
                expected: hex(&expected),
                found: hex(found),
            });
        }
        Ok(())
    }

    // ── Uncompressed and record-compressed layouts ──────────────────────────

    fn scan_record(&mut self) -> Result<bool> {
        loop {
            if !self.stage(4)? {
                return Ok(false);
            }
            let total = self.read_i32_at(0);
            if total == SYNC_ESCAPE {
                self.stage_exact(4 + SYNC_SIZE)?;
                self.check_sync(4)?;
                trace!("skipped sync point");
                self.staged.clear();
                continue;
            }
            if total < 0 {
                return Err(Error::corrupt_record(format!("negative record length {}", total)));
            }

            self.stage_exact(8)?;
            let key_len = self.read_i32_at(4);
            if key_len < 0 || key_len > total {
                return Err(Error::corrupt_record(format!(
                    "key length {} outside record length {}",
                    key_len, total
                )));
            }

            let (total, key_len) = (total as usize, key_len as usize);
            self.stage_exact(8 + total)?;

            let key_end = 8 + key_len;
            self.key.clear();
            self.key.extend_from_slice(&self.staged[8..key_end]);
            let value = &self.staged[key_end..8 + total];
            let decoded = match self.decompressor.as_mut() {
                Some(decompressor) => {
                    decompress_into(decompressor.as_mut(), value, &mut self.value)
                }
                None => {
                    self.value.clear();
                    self.value.extend_from_slice(value);
                    Ok(())
                }
            };
            // The record is consumed even when its value does not decode.
            self.staged.clear();
            decoded?;
            return Ok(true);
        }
    }

    // ── Block-compressed layout ─────────────────────────────────────────────

    fn scan_block(&mut self) -> Result<bool> {
        loop {
            match &mut self.phase {
                BlockPhase::Ready(block) => match block.next_record() {
                    Some((key, value)) => {
                        self.key.clear();
                        self.key.extend_from_slice(key);
                        self.value.clear();
                        self.value.extend_from_slice(value);
                        if block.is_exhausted() {
                            self.phase = BlockPhase::Exhausted;
                        }
                        return Ok(true);
                    }
                    None => self.phase = BlockPhase::AwaitingSync,
                },
                BlockPhase::Exhausted => self.phase = BlockPhase::AwaitingSync,
                BlockPhase::Resynced => {
                    if !self.stage(1)? {
                        return Ok(false);
                    }
                    // A record count is never negative, so 0xff opens a
                    // sentinel: the marker we landed on was the header's.
                    // The peeked byte stays staged for the next phase.
                    self.phase = if self.staged[0] == 0xff {
                        BlockPhase::AwaitingSync
                    } else {
                        BlockPhase::ReadingCount
                    };
                }
                _ => {
                    if !self.advance_block()? {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Complete the current phase and move to the next one. Returns
    /// `Ok(false)` if the stream ended cleanly before a new block started.
    fn advance_block(&mut self) -> Result<bool> {
        let phase = std::mem::take(&mut self.phase);
        match self.advance_phase(phase) {
            Ok(Some(next)) => {
                self.staged.clear();
                self.phase = next;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err((_, err @ Error::Codec(_))) => {
                // A section that does not decode poisons the rest of its
                // block; only a sync can realign.
                self.staged.clear();
                self.phase = BlockPhase::AwaitingSync;
                Err(err)
            }
            Err((phase, err)) => {
                // Keep the phase (and its staged bytes) for a retry.
                self.phase = phase;
                Err(err)
            }
        }
    }

    fn advance_phase(
        &mut self,
        phase: BlockPhase,
    ) -> std::result::Result<Option<BlockPhase>, (BlockPhase, Error)> {
        macro_rules! attempt {
            ($phase:expr, $e:expr) => {
                match $e {
                    Ok(v) => v,
                    Err(err) => return Err(($phase, err)),
                }
            };
        }

        let next = match phase {
            BlockPhase::AwaitingSync => {
                if !attempt!(BlockPhase::AwaitingSync, self.stage(4 + SYNC_SIZE)) {
                    return Ok(None);
                }
                let sentinel = self.read_i32_at(0);
                if sentinel != SYNC_ESCAPE {
                    let err = Error::corrupt_block(format!(
                        "expected sync sentinel before block, found {}",
                        sentinel
                    ));
                    return Err((BlockPhase::AwaitingSync, err));
                }
                attempt!(BlockPhase::AwaitingSync, self.check_sync(4));
                BlockPhase::ReadingCount
            }
            BlockPhase::ReadingCount => {
                let (count, _) = attempt!(BlockPhase::ReadingCount, self.stage_vint(0));
                if count < 0 {
                    let err = Error::corrupt_block(format!("negative record count {}", count));
                    return Err((BlockPhase::ReadingCount, err));
                }
                BlockPhase::ReadingKeyLengths {
                    count: count as usize,
                }
            }
            BlockPhase::ReadingKeyLengths { count } => {
                let section = attempt!(
                    BlockPhase::ReadingKeyLengths { count },
                    self.read_section()
                );
                let key_lengths = attempt!(
                    BlockPhase::ReadingKeyLengths { count },
                    parse_lengths(section, count)
                );
                BlockPhase::ReadingKeys { key_lengths }
            }
            BlockPhase::ReadingKeys { key_lengths } => match self.read_section() {
                Ok(section) => BlockPhase::ReadingValueLengths {
                    keys: section.to_vec(),
                    key_lengths,
                },
                Err(err) => return Err((BlockPhase::ReadingKeys { key_lengths }, err)),
            },
            BlockPhase::ReadingValueLengths { key_lengths, keys } => {
                let parsed = self
                    .read_section()
                    .and_then(|section| parse_lengths(section, key_lengths.len()));
                match parsed {
                    Ok(value_lengths) => BlockPhase::ReadingValues {
                        key_lengths,
                        keys,
                        value_lengths,
                    },
                    Err(err) => {
                        return Err((BlockPhase::ReadingValueLengths { key_lengths, keys }, err))
                    }
                }
            }
            BlockPhase::ReadingValues {
                key_lengths,
                keys,
                value_lengths,
            } => match self.read_section() {
                Ok(section) => {
                    let values = section.to_vec();
                    let block = match Block::new(key_lengths, keys, value_lengths, values) {
                        Ok(block) => block,
                        Err(err) => {
                            self.staged.clear();
                            return Err((BlockPhase::AwaitingSync, err));
                        }
                    };
                    debug!("loaded block of {} records", block.len());
                    BlockPhase::Ready(block)
                }
                Err(err) => {
                    return Err((
                        BlockPhase::ReadingValues {
                            key_lengths,
                            keys,
                            value_lengths,
                        },
                        err,
                    ))
                }
            },
            phase @ (BlockPhase::Resynced | BlockPhase::Ready(_) | BlockPhase::Exhausted) => phase,
        };
        Ok(Some(next))
    }

    /// Stage one VInt-prefixed compressed section and decompress it into
    /// the section scratch buffer.
    fn read_section(&mut self) -> Result<&[u8]> {
        let (len, start) = self.stage_vint(0)?;
        if len < 0 {
            return Err(Error::corrupt_block(format!("negative section length {}", len)));
        }
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| start.checked_add(len))
            .ok_or_else(|| Error::corrupt_block(format!("section length {} too large", len)))?;
        self.stage_exact(end)?;

        let decompressor = self
            .decompressor
            .as_mut()
            .ok_or_else(|| Error::unsupported("block compression without a decompressor"))?;
        decompress_into(decompressor.as_mut(), &self.staged[start..], &mut self.section)?;
        Ok(&self.section)
    }
}

/// Iterator returned by [`Reader::records`].
pub struct Records<'a, R> {
    reader: &'a mut Reader<R>,
    done: bool,
}

impl<R: Read> Iterator for Records<'_, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
