//! Variable-length signed integers.
//!
//! Big-endian groups of 7 bits, high bit set on every byte except the last.
//! Bit 0x40 of the first byte carries the sign, so the shortest encoding of a
//! value is unique and any leading byte that only repeats the sign is
//! rejected on read.

use crate::error::FormatError;

pub const MAX_VLC_LONG_LENGTH: usize = 10;

/// Number of bytes needed to encode `x`.
pub fn vlc_length(x: i64) -> usize {
    let magnitude_bits = if x < 0 { 64 - (!x).leading_zeros() } else { 64 - x.leading_zeros() };
    // one extra bit for the sign, rounded up to whole 7-bit groups
    ((magnitude_bits + 1 + 6) / 7) as usize
}

pub fn write_vlc_long(out: &mut Vec<u8>, x: i64) {
    let n = vlc_length(x);
    for i in (1..n).rev() {
        out.push(0x80 | ((x >> (7 * i)) as u8 & 0x7f));
    }
    out.push(x as u8 & 0x7f);
}

/// Reads one VLC long at `*pos`, advancing `pos` past it on success.
pub fn read_vlc_long(bytes: &[u8], pos: &mut usize) -> Result<i64, FormatError> {
    let start = *pos;
    let first = *bytes.get(start).ok_or(FormatError::Truncated)?;
    let mut acc = i128::from(first & 0x3f);
    if first & 0x40 != 0 {
        acc -= 0x40;
    }
    let mut len = 1;
    let mut byte = first;
    while byte & 0x80 != 0 {
        if len >= MAX_VLC_LONG_LENGTH {
            return Err(FormatError::VlcTooLong);
        }
        byte = *bytes.get(start + len).ok_or(FormatError::Truncated)?;
        if len == 1 {
            let lead = first & 0x7f;
            let sign = byte & 0x40 != 0;
            if (lead == 0x00 && !sign) || (lead == 0x7f && sign) {
                return Err(FormatError::NonCanonical("redundant leading VLC byte"));
            }
        }
        acc = (acc << 7) | i128::from(byte & 0x7f);
        len += 1;
    }
    let value = i64::try_from(acc).map_err(|_| FormatError::VlcOverflow)?;
    *pos = start + len;
    Ok(value)
}

/// Reads a VLC count: a non-negative long not above `max`.
pub fn read_vlc_count(bytes: &[u8], pos: &mut usize, max: u64) -> Result<u64, FormatError> {
    let n = read_vlc_long(bytes, pos)?;
    if n < 0 {
        return Err(FormatError::Invalid(format!("negative count {n}")));
    }
    let n = n as u64;
    if n > max {
        return Err(FormatError::Invalid(format!("count {n} exceeds {max}")));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(x: i64) -> Vec<u8> {
        let mut v = Vec::new();
        write_vlc_long(&mut v, x);
        v
    }

    fn dec(bytes: &[u8]) -> Result<i64, FormatError> {
        let mut pos = 0;
        let v = read_vlc_long(bytes, &mut pos)?;
        assert_eq!(pos, bytes.len());
        Ok(v)
    }

    #[test]
    fn small_values() {
        assert_eq!(enc(0), vec![0x00]);
        assert_eq!(enc(1), vec![0x01]);
        assert_eq!(enc(63), vec![0x3f]);
        assert_eq!(enc(64), vec![0x80, 0x40]);
        assert_eq!(enc(-1), vec![0x7f]);
        assert_eq!(enc(-64), vec![0x40]);
        assert_eq!(enc(-65), vec![0xff, 0x3f]);
        assert_eq!(enc(8191), vec![0xbf, 0x7f]);
    }

    #[test]
    fn extremes_take_ten_bytes() {
        assert_eq!(vlc_length(i64::MAX), 10);
        assert_eq!(vlc_length(i64::MIN), 10);
        assert_eq!(enc(i64::MIN), vec![0xff, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x00]);
        assert_eq!(dec(&enc(i64::MAX)), Ok(i64::MAX));
        assert_eq!(dec(&enc(i64::MIN)), Ok(i64::MIN));
    }

    #[test]
    fn length_matches_encoding() {
        for x in [0, 1, -1, 63, 64, -64, -65, 8191, 8192, -8192, 1 << 40, i64::MAX, i64::MIN] {
            assert_eq!(enc(x).len(), vlc_length(x), "x = {x}");
            assert_eq!(dec(&enc(x)), Ok(x));
        }
    }

    #[test]
    fn rejects_redundant_lead() {
        assert_eq!(dec(&[0x80, 0x01]), Err(FormatError::NonCanonical("redundant leading VLC byte")));
        assert_eq!(dec(&[0xff, 0x7f]), Err(FormatError::NonCanonical("redundant leading VLC byte")));
        // 0x80 0x40 is the shortest form of 64
        assert_eq!(dec(&[0x80, 0x40]), Ok(64));
    }

    #[test]
    fn rejects_truncated() {
        assert_eq!(dec(&[]), Err(FormatError::Truncated));
        assert_eq!(dec(&[0x81]), Err(FormatError::Truncated));
    }
}
