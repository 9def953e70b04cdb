//! Variable-length quantities (VLQ) as used for delta times and meta lengths.
//!
//! Values are split into 7-bit groups, most significant first. Every byte
//! except the last has its high bit set, so a reader always knows where a
//! value ends.

use super::error::{MidiError, Result};

/// Longest encoding of a `u32` (5 groups of 7 bits).
const MAX_VLQ_BYTES: usize = 5;

/// Writes a variable-length quantity to the end of `buffer`.
///
/// # Arguments
///
/// * `value` - The value to encode
/// * `buffer` - Output buffer to append to
pub fn write_vlq(value: u32, buffer: &mut Vec<u8>) {
    if value == 0 {
        buffer.push(0);
        return;
    }

    let mut temp = value;
    let mut groups = [0u8; MAX_VLQ_BYTES];
    let mut len = 0;

    while temp > 0 {
        groups[len] = (temp & 0x7F) as u8;
        temp >>= 7;
        len += 1;
    }

    // Most significant group first, continuation bit on all but the last
    for i in (0..len).rev() {
        if i > 0 {
            buffer.push(groups[i] | 0x80);
        } else {
            buffer.push(groups[i]);
        }
    }
}

/// Encodes a value into a fresh byte vector.
pub fn encode_vlq(value: u32) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(4);
    write_vlq(value, &mut buffer);
    buffer
}

/// Decodes a variable-length quantity from the start of `bytes`.
///
/// # Returns
///
/// The decoded value and the number of bytes consumed
///
/// # Errors
///
/// Returns `TruncatedVlq` if the buffer ends before a terminating byte and
/// `VlqOverflow` if the value does not fit in 32 bits
pub fn decode_vlq(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut value: u64 = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        if i >= MAX_VLQ_BYTES {
            return Err(MidiError::VlqOverflow);
        }
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            let value = u32::try_from(value).map_err(|_| MidiError::VlqOverflow)?;
            return Ok((value, i + 1));
        }
    }

    Err(MidiError::TruncatedVlq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlq_encoding() {
        assert_eq!(encode_vlq(0), vec![0x00]);
        assert_eq!(encode_vlq(127), vec![0x7F]);
        assert_eq!(encode_vlq(128), vec![0x81, 0x00]);
        assert_eq!(encode_vlq(960), vec![0x87, 0x40]);
        assert_eq!(encode_vlq(0x3FFF), vec![0xFF, 0x7F]);
        assert_eq!(encode_vlq(0x4000), vec![0x81, 0x80, 0x00]);
        assert_eq!(encode_vlq(0x0FFF_FFFF), vec![0xFF, 0xFF, 0xFF, 0x7F]);
        assert_eq!(encode_vlq(u32::MAX), vec![0x8F, 0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn test_vlq_round_trip() {
        // Every group boundary plus a spread of values up to 2^28
        let mut values = vec![0u32, 1, u32::MAX];
        for shift in 0..=28 {
            let v = 1u32 << shift;
            values.extend([v - 1, v, v + 1]);
        }
        values.extend((0..(1u32 << 28)).step_by(9_973));

        for x in values {
            let encoded = encode_vlq(x);
            assert_eq!(decode_vlq(&encoded).unwrap(), (x, encoded.len()), "value {x}");
        }
    }

    #[test]
    fn test_vlq_prefix_free() {
        // Decoding stops at the first terminating byte, ignoring what follows
        let mut stream = encode_vlq(300);
        stream.extend(encode_vlq(5));
        let (first, used) = decode_vlq(&stream).unwrap();
        assert_eq!((first, used), (300, 2));
        assert_eq!(decode_vlq(&stream[used..]).unwrap(), (5, 1));
    }

    #[test]
    fn test_vlq_decode_errors() {
        assert!(matches!(decode_vlq(&[]), Err(MidiError::TruncatedVlq)));
        assert!(matches!(decode_vlq(&[0x81, 0x80]), Err(MidiError::TruncatedVlq)));
        assert!(matches!(
            decode_vlq(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]),
            Err(MidiError::VlqOverflow)
        ));
        assert!(matches!(
            decode_vlq(&[0x9F, 0xFF, 0xFF, 0xFF, 0x7F]),
            Err(MidiError::VlqOverflow)
        ));
    }
}
