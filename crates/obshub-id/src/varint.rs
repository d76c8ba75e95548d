//! Variable-length unsigned integers, 7 bits per byte with a continuation bit.
//!
//! Two group orders are provided:
//!
//! - **LEB128** ([`put_leb128`], [`get_leb128`]): least-significant group
//!   first. Used for the scope prefix of the byte and text forms.
//! - **VLQ** ([`put_vlq`], [`get_vlq`]): most-significant group first. Used
//!   for the byte form of long-backed local ids. Among encodings of the same
//!   length, unsigned lexicographic byte order equals numeric order.

/// Number of bytes [`put_leb128`] writes for `value`.
pub fn leb128_len(value: u64) -> usize {
    groups(value)
}

/// Appends the LEB128 encoding of `value` to `out`.
pub fn put_leb128(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Reads a LEB128 value from the start of `buf`.
///
/// Returns the value and the number of bytes consumed, or `None` if the
/// buffer ends mid-value or the value overflows 64 bits.
pub fn get_leb128(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, &byte) in buf.iter().enumerate() {
        if shift > 63 {
            return None;
        }
        let bits = u64::from(byte & 0x7f);
        if shift == 63 && bits > 1 {
            return None;
        }
        value |= bits << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
    }
    None
}

/// Number of bytes [`put_vlq`] writes for `value`.
pub fn vlq_len(value: u64) -> usize {
    groups(value)
}

/// Appends the big-endian VLQ encoding of `value` to `out`.
pub fn put_vlq(value: u64, out: &mut Vec<u8>) {
    let n = groups(value);
    for i in (0..n).rev() {
        let group = ((value >> (7 * i)) & 0x7f) as u8;
        out.push(if i > 0 { group | 0x80 } else { group });
    }
}

/// Decodes `buf` as exactly one canonical VLQ value.
///
/// Returns `None` if the buffer is empty, has a leading zero group, has
/// trailing bytes after the terminating group, or overflows 64 bits.
pub fn get_vlq(buf: &[u8]) -> Option<u64> {
    if buf.is_empty() || (buf.len() > 1 && buf[0] == 0x80) {
        return None;
    }
    let mut value = 0u64;
    let last = buf.len() - 1;
    for (i, &byte) in buf.iter().enumerate() {
        if (i == last) == (byte & 0x80 != 0) {
            return None;
        }
        if value > (u64::MAX >> 7) {
            return None;
        }
        value = (value << 7) | u64::from(byte & 0x7f);
    }
    Some(value)
}

fn groups(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leb128_known_values() {
        let mut out = Vec::new();
        put_leb128(300, &mut out);
        assert_eq!(out, vec![0xac, 0x02]);
        assert_eq!(get_leb128(&out), Some((300, 2)));
        assert_eq!(leb128_len(300), 2);
    }

    #[test]
    fn leb128_reports_consumed_prefix() {
        let buf = [0x05, 0xff, 0x01];
        assert_eq!(get_leb128(&buf), Some((5, 1)));
    }

    #[test]
    fn leb128_rejects_truncated_input() {
        assert_eq!(get_leb128(&[0x80, 0x80]), None);
        assert_eq!(get_leb128(&[]), None);
    }

    #[test]
    fn leb128_max_value() {
        let mut out = Vec::new();
        put_leb128(u64::MAX, &mut out);
        assert_eq!(out.len(), 10);
        assert_eq!(get_leb128(&out), Some((u64::MAX, 10)));
    }

    #[test]
    fn vlq_known_values() {
        let mut out = Vec::new();
        put_vlq(300, &mut out);
        assert_eq!(out, vec![0x82, 0x2c]);
        assert_eq!(get_vlq(&out), Some(300));

        out.clear();
        put_vlq(0, &mut out);
        assert_eq!(out, vec![0x00]);
    }

    #[test]
    fn vlq_rejects_non_canonical_input() {
        // leading zero group
        assert_eq!(get_vlq(&[0x80, 0x01]), None);
        // missing terminator
        assert_eq!(get_vlq(&[0x81]), None);
        // trailing byte after terminator
        assert_eq!(get_vlq(&[0x01, 0x01]), None);
    }

    #[test]
    fn vlq_equal_length_preserves_order() {
        let encode = |v: u64| {
            let mut out = Vec::new();
            put_vlq(v, &mut out);
            out
        };
        assert!(encode(129) < encode(256));
        assert!(encode(200) < encode(16_383));
    }
}
