use crate::error::{Error, Result};
use std::mem::size_of;

/// Extendable byte container.
pub trait BytesExtendable {
    /// Push single byte into the container.
    fn push_byte(&mut self, value: u8);

    /// Extend from a byte slice.
    fn extend_from_byte_slice(&mut self, values: &[u8]);

    fn extend_repeat_n(&mut self, val: u8, n: usize);
}

impl BytesExtendable for Vec<u8> {
    #[inline]
    fn push_byte(&mut self, value: u8) {
        self.push(value);
    }

    #[inline]
    fn extend_from_byte_slice(&mut self, values: &[u8]) {
        self.extend_from_slice(values);
    }

    #[inline]
    fn extend_repeat_n(&mut self, val: u8, n: usize) {
        self.extend(std::iter::repeat_n(val, n))
    }
}

/// Memory comparable format ensure sort result of encoded value is
/// identical to original value. This is the layout used by keys of the
/// transactional key-value store.
///
/// 1. Unsigned integer: Use Bigendian encoding.
/// 2. Signed integer: Use Bigendian encoding, then flip most significant bit.
/// 3. Descending unsigned integer: Use Bigendian encoding of all bits flipped.
/// 4. variable length bytes: Use grouped encoding.
///
/// Grouped encoding:
///
/// 1. Split the value into groups. Each group has 8 bytes.
///    If group has less than 8 bytes, append 0x00 until it's length equal to 8.
///    If length of the value is multiple of 8, an extra all-padding group
///    is appended.
/// 2. Append one marker byte at end of each group, which is 0xFF minus
///    number of padding bytes of this group.
pub trait MemCmpFormat {
    /// Returns exact encoded length of this value.
    fn enc_mcf_len(&self) -> usize;

    /// Attach to end of the buffer with the memory comparable format.
    fn extend_mcf_to<T: BytesExtendable>(&self, buf: &mut T);

    /// Encode into a new vector.
    #[inline]
    fn to_mcf(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.enc_mcf_len());
        self.extend_mcf_to(&mut buf);
        buf
    }
}

/// Read a value in memory comparable format from front of the input,
/// and advance the input.
pub trait MemCmpRead: Sized {
    fn read_mcf(input: &mut &[u8]) -> Result<Self>;
}

pub const GROUP_SIZE: usize = 8;
const GROUP_MARKER: u8 = 0xFF;
const GROUP_PAD: u8 = 0x00;

macro_rules! impl_mcf_for_u {
    ($t1:ty) => {
        impl MemCmpFormat for $t1 {
            #[inline]
            fn enc_mcf_len(&self) -> usize {
                size_of::<$t1>()
            }

            #[inline]
            fn extend_mcf_to<T: BytesExtendable>(&self, buf: &mut T) {
                let bs = self.to_be_bytes();
                buf.extend_from_byte_slice(&bs);
            }
        }

        impl MemCmpRead for $t1 {
            #[inline]
            fn read_mcf(input: &mut &[u8]) -> Result<Self> {
                let (head, rest) = input
                    .split_first_chunk::<{ size_of::<$t1>() }>()
                    .ok_or(Error::UnexpectedEof)?;
                *input = rest;
                Ok(<$t1>::from_be_bytes(*head))
            }
        }
    };
}

impl_mcf_for_u!(u32);
impl_mcf_for_u!(u64);

macro_rules! impl_mcf_for_i {
    ($t1:ty) => {
        impl MemCmpFormat for $t1 {
            #[inline]
            fn enc_mcf_len(&self) -> usize {
                size_of::<$t1>()
            }

            #[inline]
            fn extend_mcf_to<T: BytesExtendable>(&self, buf: &mut T) {
                let mut bs = self.to_be_bytes();
                bs[0] ^= 0x80;
                buf.extend_from_byte_slice(&bs);
            }
        }

        impl MemCmpRead for $t1 {
            #[inline]
            fn read_mcf(input: &mut &[u8]) -> Result<Self> {
                let (head, rest) = input
                    .split_first_chunk::<{ size_of::<$t1>() }>()
                    .ok_or(Error::UnexpectedEof)?;
                *input = rest;
                let mut bs = *head;
                bs[0] ^= 0x80;
                Ok(<$t1>::from_be_bytes(bs))
            }
        }
    };
}

impl_mcf_for_i!(i32);
impl_mcf_for_i!(i64);

/// Descending order of an unsigned integer.
/// Used for timestamps so that newer versions sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Desc<T>(pub T);

impl MemCmpFormat for Desc<u64> {
    #[inline]
    fn enc_mcf_len(&self) -> usize {
        size_of::<u64>()
    }

    #[inline]
    fn extend_mcf_to<T: BytesExtendable>(&self, buf: &mut T) {
        (!self.0).extend_mcf_to(buf)
    }
}

impl MemCmpRead for Desc<u64> {
    #[inline]
    fn read_mcf(input: &mut &[u8]) -> Result<Self> {
        u64::read_mcf(input).map(|v| Desc(!v))
    }
}

#[repr(transparent)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupedBytes<'a>(pub &'a [u8]);

impl MemCmpFormat for GroupedBytes<'_> {
    #[inline]
    fn enc_mcf_len(&self) -> usize {
        (self.0.len() / GROUP_SIZE + 1) * (GROUP_SIZE + 1)
    }

    #[inline]
    fn extend_mcf_to<T: BytesExtendable>(&self, buf: &mut T) {
        let mut chunks = self.0.chunks_exact(GROUP_SIZE);
        for c in chunks.by_ref() {
            buf.extend_from_byte_slice(c);
            buf.push_byte(GROUP_MARKER);
        }
        let rem = chunks.remainder();
        let pad = GROUP_SIZE - rem.len();
        buf.extend_from_byte_slice(rem);
        buf.extend_repeat_n(GROUP_PAD, pad);
        buf.push_byte(GROUP_MARKER - pad as u8);
    }
}

/// Read grouped bytes from front of the input.
#[inline]
pub fn read_grouped_bytes(input: &mut &[u8]) -> Result<Vec<u8>> {
    let mut res = Vec::with_capacity(input.len());
    loop {
        let (group, rest) = input
            .split_first_chunk::<{ GROUP_SIZE + 1 }>()
            .ok_or(Error::UnexpectedEof)?;
        let marker = group[GROUP_SIZE];
        let pad = (GROUP_MARKER - marker) as usize;
        if pad > GROUP_SIZE {
            return Err(Error::InvalidMarker(marker));
        }
        let real = GROUP_SIZE - pad;
        res.extend_from_slice(&group[..real]);
        *input = rest;
        if pad != 0 {
            if group[real..GROUP_SIZE].iter().any(|b| *b != GROUP_PAD) {
                return Err(Error::InvalidPadding);
            }
            return Ok(res);
        }
    }
}
