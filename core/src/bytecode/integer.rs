//! Integer encodings.
//!
//! **BER** (unsigned): 7-bit groups, most significant first, every byte but
//! the last with the high bit set.
//!
//! **Compact** (signed): one byte for small values, a length-prefixed
//! little-endian magnitude for medium ones and an escaped BER magnitude for
//! the rest.
//!
//! | value                  | bytes                                  |
//! |------------------------|----------------------------------------|
//! | `0`                    | `0x00`                                 |
//! | `1..=122`              | `n + 5`                                |
//! | `-123..=-1`            | `n - 5` (two's complement byte)        |
//! | `|n| < 2^30`           | `±len` (1..=4), then `len` LE bytes    |
//! | otherwise              | `±5`, then BER magnitude               |

/// Largest value with a one-byte compact form.
pub const SMALL_MAX: i64 = 122;
/// Smallest value with a one-byte compact form.
pub const SMALL_MIN: i64 = -123;

const SMALL_BIAS: i64 = 5;
const ESCAPE: i8 = 5;
const WIDE_LIMIT: u64 = 1 << 30;

pub fn write_ber(out: &mut Vec<u8>, value: u64) {
    let mut groups = [0u8; 10];
    let mut count = 0;
    let mut rest = value;
    loop {
        groups[count] = (rest & 0x7f) as u8;
        count += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..count).rev() {
        let continuation = if i > 0 { 0x80 } else { 0 };
        out.push(groups[i] | continuation);
    }
}

/// Decode a BER value at the start of `bytes`; returns it with the number of
/// bytes read, or `None` when the input ends early or overflows `u64`.
pub fn read_ber(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        if value > (u64::MAX >> 7) {
            return None;
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

pub fn write_compact(out: &mut Vec<u8>, value: i64) {
    if value == 0 {
        out.push(0);
        return;
    }
    if (1..=SMALL_MAX).contains(&value) {
        out.push((value + SMALL_BIAS) as u8);
        return;
    }
    if (SMALL_MIN..=-1).contains(&value) {
        out.push((value - SMALL_BIAS) as i8 as u8);
        return;
    }

    let negative = value < 0;
    let magnitude = value.unsigned_abs();
    let sign = |n: i8| if negative { -n } else { n };
    if magnitude >= WIDE_LIMIT {
        out.push(sign(ESCAPE) as u8);
        write_ber(out, magnitude);
        return;
    }
    let len = (64 - magnitude.leading_zeros()).div_ceil(8) as usize;
    out.push(sign(len as i8) as u8);
    out.extend_from_slice(&magnitude.to_le_bytes()[..len]);
}

/// Decode a compact integer at the start of `bytes`; returns it with the
/// number of bytes read.
pub fn read_compact(bytes: &[u8]) -> Option<(i64, usize)> {
    let head = *bytes.first()? as i8;
    let (length, negative) = match head {
        0 => return Some((0, 1)),
        6..=127 => return Some((i64::from(head) - SMALL_BIAS, 1)),
        -128..=-6 => return Some((i64::from(head) + SMALL_BIAS, 1)),
        _ => (head.unsigned_abs(), head < 0),
    };

    let (magnitude, read) = if length == ESCAPE as u8 {
        let (magnitude, read) = read_ber(&bytes[1..])?;
        (magnitude, read + 1)
    } else {
        let len = usize::from(length);
        let digits = bytes.get(1..1 + len)?;
        let mut le = [0u8; 8];
        le[..len].copy_from_slice(digits);
        (u64::from_le_bytes(le), len + 1)
    };

    let value = if negative {
        0i64.checked_sub_unsigned(magnitude)?
    } else {
        i64::try_from(magnitude).ok()?
    };
    Some((value, read))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compact(value: i64) -> Vec<u8> {
        let mut out = Vec::new();
        write_compact(&mut out, value);
        out
    }

    fn ber(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        write_ber(&mut out, value);
        out
    }

    #[test]
    fn test_ber_groups_most_significant_first() {
        assert_eq!(ber(0), vec![0x00]);
        assert_eq!(ber(127), vec![0x7f]);
        assert_eq!(ber(128), vec![0x81, 0x00]);
        assert_eq!(ber(300), vec![0x82, 0x2c]);
        assert_eq!(ber(1 << 30), vec![0x84, 0x80, 0x80, 0x80, 0x00]);
        assert_eq!(read_ber(&[0x82, 0x2c, 0xff]), Some((300, 2)));
        assert_eq!(read_ber(&[0x82]), None);
    }

    #[test]
    fn test_compact_boundaries() {
        assert_eq!(compact(0), vec![0x00]);
        assert_eq!(compact(1), vec![6]);
        assert_eq!(compact(122), vec![127]);
        assert_eq!(compact(123), vec![1, 123]);
        assert_eq!(compact(-1), vec![0xfa]);
        assert_eq!(compact(-123), vec![0x80]);
        assert_eq!(compact(-124), vec![0xff, 124]);
        assert_eq!(compact(256), vec![2, 0x00, 0x01]);
        assert_eq!(compact((1 << 30) - 1), vec![4, 0xff, 0xff, 0xff, 0x3f]);
        assert_eq!(compact(1 << 30), vec![5, 0x84, 0x80, 0x80, 0x80, 0x00]);
        assert_eq!(compact(-(1 << 30)), vec![0xfb, 0x84, 0x80, 0x80, 0x80, 0x00]);
        assert_eq!(compact(-(1 << 30) - 1), vec![0xfb, 0x84, 0x80, 0x80, 0x80, 0x01]);
    }

    #[test]
    fn test_compact_reads_back() {
        let values = [
            0,
            122,
            123,
            -123,
            -124,
            (1 << 30) - 1,
            1 << 30,
            -(1 << 30),
            -(1 << 30) - 1,
            i64::MAX,
            i64::MIN,
        ];
        for value in values {
            let bytes = compact(value);
            assert_eq!(read_compact(&bytes), Some((value, bytes.len())), "{value}");
        }
    }

    #[test]
    fn test_compact_rejects_truncation() {
        assert_eq!(read_compact(&[]), None);
        assert_eq!(read_compact(&[3, 0x01]), None);
        assert_eq!(read_compact(&[5, 0x81]), None);
    }
}
