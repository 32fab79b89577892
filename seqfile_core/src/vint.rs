//! Hadoop's variable-length signed integer ("VInt"/"VLong") encoding.
//!
//! Values in `[-112, 127]` are a single byte. Anything else is a length byte
//! followed by 1–8 big-endian magnitude bytes. The length byte is
//! `-112 - n` for non-negative values and `-120 - n` for negative ones,
//! where `n` is the number of magnitude bytes. Negative values are stored
//! bit-inverted.

use std::io::{self, Read, Write};

use crate::error::{Error, Result};

/// Longest possible encoding: one length byte plus eight magnitude bytes.
pub const MAX_VINT_SIZE: usize = 9;

/// Encode `value` into `buf`, returning the number of bytes used.
fn encode_into(value: i64, buf: &mut [u8; MAX_VINT_SIZE]) -> usize {
    if (-112..=127).contains(&value) {
        buf[0] = value as u8;
        return 1;
    }

    let (magnitude, mut len_byte) = if value < 0 { (!value, -120i32) } else { (value, -112i32) };

    let mut tmp = magnitude;
    while tmp != 0 {
        tmp >>= 8;
        len_byte -= 1;
    }
    buf[0] = len_byte as i8 as u8;

    let n = (if len_byte < -120 { -(len_byte + 120) } else { -(len_byte + 112) }) as usize;
    for i in 0..n {
        buf[1 + i] = (magnitude >> (8 * (n - 1 - i))) as u8;
    }
    n + 1
}

/// Append the encoding of `value` to `out`.
pub fn encode_vint(value: i64, out: &mut Vec<u8>) {
    let mut buf = [0u8; MAX_VINT_SIZE];
    let n = encode_into(value, &mut buf);
    out.extend_from_slice(&buf[..n]);
}

/// Write the encoding of `value`, returning the number of bytes written.
pub fn write_vint<W: Write + ?Sized>(w: &mut W, value: i64) -> io::Result<usize> {
    let mut buf = [0u8; MAX_VINT_SIZE];
    let n = encode_into(value, &mut buf);
    w.write_all(&buf[..n])?;
    Ok(n)
}

/// Number of bytes `value` occupies once encoded.
pub fn vint_size(value: i64) -> usize {
    let mut buf = [0u8; MAX_VINT_SIZE];
    encode_into(value, &mut buf)
}

/// Total encoded size (length byte included) implied by the first byte.
pub fn vint_len_from_first_byte(first: u8) -> usize {
    let b = first as i8 as i32;
    if b >= -112 {
        1
    } else if b >= -120 {
        (-111 - b) as usize
    } else {
        (-119 - b) as usize
    }
}

fn assemble(first: u8, magnitude: &[u8]) -> i64 {
    let value = magnitude.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
    if (first as i8) < -120 {
        !value as i64
    } else {
        value as i64
    }
}

/// Decode a VInt from the front of `buf`, returning the value and the
/// number of bytes consumed.
pub fn decode_vint(buf: &[u8]) -> Result<(i64, usize)> {
    let first = *buf.first().ok_or(Error::UnexpectedEof)?;
    let len = vint_len_from_first_byte(first);
    if len == 1 {
        return Ok((first as i8 as i64, 1));
    }
    let magnitude = buf.get(1..len).ok_or(Error::UnexpectedEof)?;
    Ok((assemble(first, magnitude), len))
}

/// Read a VInt from `r` using at most two reads: one for the length byte
/// and one for the magnitude bytes.
pub fn read_vint<R: Read + ?Sized>(r: &mut R) -> Result<i64> {
    let mut first = [0u8; 1];
    r.read_exact(&mut first).map_err(Error::from_read)?;

    let len = vint_len_from_first_byte(first[0]);
    if len == 1 {
        return Ok(first[0] as i8 as i64);
    }

    let mut magnitude = [0u8; MAX_VINT_SIZE - 1];
    r.read_exact(&mut magnitude[..len - 1]).map_err(Error::from_read)?;
    Ok(assemble(first[0], &magnitude[..len - 1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    // Generated with org.apache.hadoop.io.WritableUtils.writeVLong.
    const VINTS: &[(&[u8], i64)] = &[
        (&[0x00], 0),
        (&[0x01], 1),
        (&[0xff], -1),
        (&[0x64], 100),
        (&[0x9c], -100),
        (&[0x8f, 0xc8], 200),
        (&[0x87, 0xc7], -200),
        (&[0x8e, 0x1f, 0xff], 8191),
        (&[0x86, 0x1f, 0xfe], -8191),
        (&[0x8c, 0x7f, 0xff, 0xff, 0xff], 2147483647),
        (&[0x84, 0x7f, 0xff, 0xff, 0xfe], -2147483647),
        (&[0x8c, 0x6d, 0x7f, 0x77, 0x58], 1837070168),
        (&[0x84, 0x6d, 0x7f, 0x77, 0x57], -1837070168),
        (&[0x8c, 0xff, 0xff, 0xff, 0xfe], 4294967294),
        (&[0x84, 0xff, 0xff, 0xff, 0xfd], -4294967294),
        (&[0x88, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], 576460752303423488),
        (&[0x80, 0x07, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff], -576460752303423488),
    ];

    #[test]
    fn test_known_encodings() {
        for &(bytes, number) in VINTS {
            let mut out = Vec::new();
            encode_vint(number, &mut out);
            assert_eq!(out, bytes, "encoding {number}");
            assert_eq!(vint_size(number), bytes.len());

            let mut cursor = Cursor::new(bytes);
            assert_eq!(read_vint(&mut cursor).unwrap(), number, "reading {number}");
            assert_eq!(cursor.position() as usize, bytes.len());

            assert_eq!(decode_vint(bytes).unwrap(), (number, bytes.len()));
        }
    }

    #[test]
    fn test_write_vint_reports_size() {
        let mut out = Vec::new();
        assert_eq!(write_vint(&mut out, 200).unwrap(), 2);
        assert_eq!(write_vint(&mut out, -1).unwrap(), 1);
        assert_eq!(out, vec![0x8f, 0xc8, 0xff]);
    }

    #[test]
    fn test_range_edges() {
        assert_eq!(vint_size(127), 1);
        assert_eq!(vint_size(-112), 1);
        assert_eq!(vint_size(128), 2);
        assert_eq!(vint_size(-113), 2);
        assert_eq!(vint_size(i64::MAX), 9);
        assert_eq!(vint_size(i64::MIN), 9);
    }

    #[test]
    fn test_truncated_input() {
        assert!(matches!(read_vint(&mut Cursor::new(&[0u8; 0][..])), Err(Error::UnexpectedEof)));
        assert!(matches!(
            read_vint(&mut Cursor::new(&[0x8c, 0x7f, 0xff][..])),
            Err(Error::UnexpectedEof)
        ));
        assert!(matches!(decode_vint(&[0x8e, 0x1f]), Err(Error::UnexpectedEof)));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(value in any::<i64>()) {
            let mut out = Vec::new();
            encode_vint(value, &mut out);
            prop_assert_eq!(out.len(), vint_size(value));
            prop_assert_eq!(vint_len_from_first_byte(out[0]), out.len());
            prop_assert_eq!(decode_vint(&out).unwrap(), (value, out.len()));
            prop_assert_eq!(read_vint(&mut Cursor::new(&out)).unwrap(), value);
        }

        #[test]
        fn prop_minimal_length(value in any::<i64>()) {
            let magnitude = (if value < 0 { !value } else { value }) as u64;
            let expected = if (-112..=127).contains(&value) {
                1
            } else {
                1 + (64 - magnitude.leading_zeros() as usize + 7) / 8
            };
            prop_assert_eq!(vint_size(value), expected);
        }
    }
}
