//! Realigning on sync markers after a seek to an arbitrary offset.

use std::io::{self, Read};

use log::warn;

use crate::error::{Error, Result};
use crate::format::{SyncMarker, SYNC_SIZE};

/// Consume bytes from `r` until just past the next occurrence of `marker`.
///
/// The scan keeps a 16-byte window. When the tail of the window matches a
/// prefix of the marker, the window is shifted and only the missing bytes
/// are read, so nothing past the marker is consumed.
///
/// Returns `Ok(false)` if the stream ends before a marker, and
/// [`Error::NoSyncFound`] once `max` bytes have been scanned.
pub fn scan_for_marker<R: Read + ?Sized>(
    r: &mut R,
    marker: &SyncMarker,
    max: u64,
) -> Result<bool> {
    let mut window = [0u8; SYNC_SIZE];
    let mut filled = 0usize;
    let mut scanned = 0u64;

    loop {
        while filled < SYNC_SIZE {
            match r.read(&mut window[filled..]) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    filled += n;
                    scanned += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::from_read(e)),
            }
        }

        if window == *marker {
            return Ok(true);
        }

        // Shortest shift that leaves a marker prefix at the front.
        filled = (1..SYNC_SIZE)
            .find(|&off| window[off..] == marker[..SYNC_SIZE - off])
            .map_or(0, |off| {
                window.copy_within(off.., 0);
                SYNC_SIZE - off
            });

        if scanned >= max {
            warn!("no sync marker within {} bytes, giving up", max);
            return Err(Error::NoSyncFound(max));
        }
    }
}
