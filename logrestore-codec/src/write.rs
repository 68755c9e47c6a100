//! Commit marker stored in the write column family.
//!
//! ```text
//! write_type(1B) | uvarint(start_ts) | [flag | payload]*
//! ```
use crate::error::{Error, Result};
use crate::memcmp::{BytesExtendable, MemCmpFormat, MemCmpRead};
use crate::varint::{extend_uvarint, read_uvarint, uvarint_len};
use std::mem;

const FLAG_SHORT_VALUE: u8 = b'v';
const FLAG_OVERLAPPED_ROLLBACK: u8 = b'R';
const FLAG_GC_FENCE: u8 = b'F';
const FLAG_LAST_CHANGE: u8 = b'l';
const FLAG_TXN_SOURCE: u8 = b'S';

/// Max length of a value inlined into the commit marker.
pub const SHORT_VALUE_MAX_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WriteType {
    Put = b'P',
    Delete = b'D',
    Lock = b'L',
    Rollback = b'R',
}

impl TryFrom<u8> for WriteType {
    type Error = Error;
    #[inline]
    fn try_from(value: u8) -> Result<Self> {
        let res = match value {
            b'P' => WriteType::Put,
            b'D' => WriteType::Delete,
            b'L' => WriteType::Lock,
            b'R' => WriteType::Rollback,
            _ => return Err(Error::UnknownWriteType(value)),
        };
        Ok(res)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastChange {
    pub ts: u64,
    pub versions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCfValue {
    pub write_type: WriteType,
    pub start_ts: u64,
    pub short_value: Option<Vec<u8>>,
    pub has_overlapped_rollback: bool,
    pub gc_fence: Option<u64>,
    pub last_change: Option<LastChange>,
    pub txn_source: u64,
}

impl WriteCfValue {
    #[inline]
    pub fn new(write_type: WriteType, start_ts: u64, short_value: Option<Vec<u8>>) -> Self {
        WriteCfValue {
            write_type,
            start_ts,
            short_value,
            has_overlapped_rollback: false,
            gc_fence: None,
            last_change: None,
            txn_source: 0,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let (&tp, mut input) = data.split_first().ok_or(Error::UnexpectedEof)?;
        let write_type = WriteType::try_from(tp)?;
        let start_ts = read_uvarint(&mut input)?;
        let mut res = WriteCfValue::new(write_type, start_ts, None);
        while let Some((&flag, rest)) = input.split_first() {
            input = rest;
            match flag {
                FLAG_SHORT_VALUE => {
                    let (&len, rest) = input.split_first().ok_or(Error::UnexpectedEof)?;
                    let len = len as usize;
                    if rest.len() < len {
                        return Err(Error::UnexpectedEof);
                    }
                    res.short_value = Some(rest[..len].to_vec());
                    input = &rest[len..];
                }
                FLAG_OVERLAPPED_ROLLBACK => res.has_overlapped_rollback = true,
                FLAG_GC_FENCE => res.gc_fence = Some(u64::read_mcf(&mut input)?),
                FLAG_LAST_CHANGE => {
                    let ts = u64::read_mcf(&mut input)?;
                    let versions = read_uvarint(&mut input)?;
                    res.last_change = Some(LastChange { ts, versions });
                }
                FLAG_TXN_SOURCE => res.txn_source = read_uvarint(&mut input)?,
                _ => return Err(Error::UnknownWriteFlag(flag)),
            }
        }
        Ok(res)
    }

    #[inline]
    fn encoded_len(&self) -> usize {
        let mut len = 1 + uvarint_len(self.start_ts);
        if let Some(v) = &self.short_value {
            len += 2 + v.len();
        }
        if self.has_overlapped_rollback {
            len += 1;
        }
        if self.gc_fence.is_some() {
            len += 1 + mem::size_of::<u64>();
        }
        if let Some(lc) = &self.last_change {
            len += 1 + mem::size_of::<u64>() + uvarint_len(lc.versions);
        }
        if self.txn_source != 0 {
            len += 1 + uvarint_len(self.txn_source);
        }
        len
    }

    /// Encode with flags in canonical order.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push_byte(self.write_type as u8);
        extend_uvarint(&mut buf, self.start_ts);
        if let Some(v) = &self.short_value {
            if v.len() > SHORT_VALUE_MAX_LEN {
                return Err(Error::ShortValueTooLong(v.len()));
            }
            buf.push_byte(FLAG_SHORT_VALUE);
            buf.push_byte(v.len() as u8);
            buf.extend_from_byte_slice(v);
        }
        if self.has_overlapped_rollback {
            buf.push_byte(FLAG_OVERLAPPED_ROLLBACK);
        }
        if let Some(fence) = self.gc_fence {
            buf.push_byte(FLAG_GC_FENCE);
            fence.extend_mcf_to(&mut buf);
        }
        if let Some(lc) = &self.last_change {
            buf.push_byte(FLAG_LAST_CHANGE);
            lc.ts.extend_mcf_to(&mut buf);
            extend_uvarint(&mut buf, lc.versions);
        }
        if self.txn_source != 0 {
            buf.push_byte(FLAG_TXN_SOURCE);
            extend_uvarint(&mut buf, self.txn_source);
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_cf_value_minimal() {
        let data = [b'P', 0xAC, 0x02];
        let v = WriteCfValue::parse(&data).unwrap();
        assert_eq!(v.write_type, WriteType::Put);
        assert_eq!(v.start_ts, 300);
        assert!(v.short_value.is_none());
        assert_eq!(v.encode().unwrap(), data.to_vec());
    }

    #[test]
    fn test_write_cf_value_all_flags() {
        let mut v = WriteCfValue::new(WriteType::Delete, 400036290571534337, Some(b"abc".to_vec()));
        v.has_overlapped_rollback = true;
        v.gc_fence = Some(12);
        v.last_change = Some(LastChange { ts: 8, versions: 3 });
        v.txn_source = 1;
        let data = v.encode().unwrap();
        assert_eq!(data.len(), v.encoded_len());
        let parsed = WriteCfValue::parse(&data).unwrap();
        assert_eq!(parsed, v);
        assert_eq!(parsed.encode().unwrap(), data);
    }

    #[test]
    fn test_write_cf_value_invalid() {
        assert_eq!(WriteCfValue::parse(&[]), Err(Error::UnexpectedEof));
        assert_eq!(WriteCfValue::parse(&[b'X', 1]), Err(Error::UnknownWriteType(b'X')));
        assert_eq!(
            WriteCfValue::parse(&[b'P', 1, b'z']),
            Err(Error::UnknownWriteFlag(b'z'))
        );
        // short value shorter than its length byte.
        assert_eq!(
            WriteCfValue::parse(&[b'P', 1, b'v', 3, b'a']),
            Err(Error::UnexpectedEof)
        );
        assert_eq!(
            WriteCfValue::parse(&[b'L', 1, b'F', 0, 0]),
            Err(Error::UnexpectedEof)
        );
        let v = WriteCfValue::new(WriteType::Put, 1, Some(vec![0; 256]));
        assert_eq!(v.encode(), Err(Error::ShortValueTooLong(256)));
    }
}
