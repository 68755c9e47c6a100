//! Variable length integers, compatible with LEB128 and zig-zag signed
//! encoding used inside commit markers.
use crate::error::{Error, Result};
use crate::memcmp::BytesExtendable;

pub const MAX_VARINT_LEN64: usize = 10;

#[inline]
pub fn uvarint_len(mut v: u64) -> usize {
    let mut n = 1;
    while v >= 0x80 {
        v >>= 7;
        n += 1;
    }
    n
}

#[inline]
pub fn extend_uvarint<T: BytesExtendable>(buf: &mut T, mut v: u64) {
    while v >= 0x80 {
        buf.push_byte((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push_byte(v as u8);
}

/// Read an unsigned varint from front of the input.
#[inline]
pub fn read_uvarint(input: &mut &[u8]) -> Result<u64> {
    let mut x = 0u64;
    let mut s = 0u32;
    for (i, b) in input.iter().copied().enumerate() {
        if i == MAX_VARINT_LEN64 {
            return Err(Error::VarintOverflow);
        }
        if b < 0x80 {
            if i == MAX_VARINT_LEN64 - 1 && b > 1 {
                return Err(Error::VarintOverflow);
            }
            *input = &input[i + 1..];
            return Ok(x | (b as u64) << s);
        }
        x |= ((b & 0x7f) as u64) << s;
        s += 7;
    }
    Err(Error::UnexpectedEof)
}

#[inline]
pub fn extend_varint<T: BytesExtendable>(buf: &mut T, v: i64) {
    let ux = ((v as u64) << 1) ^ ((v >> 63) as u64);
    extend_uvarint(buf, ux)
}

#[inline]
pub fn read_varint(input: &mut &[u8]) -> Result<i64> {
    let ux = read_uvarint(input)?;
    let x = (ux >> 1) as i64;
    if ux & 1 != 0 {
        return Ok(!x);
    }
    Ok(x)
}
