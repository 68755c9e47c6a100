//! Data key prefixes of tables and indexes, used to build physical
//! ranges for garbage collection.
use crate::memcmp::{BytesExtendable, MemCmpFormat};
use std::mem;

pub const TABLE_PREFIX: u8 = b't';
pub const INDEX_PREFIX_SEP: &[u8] = b"_i";
/// Reserved high bits marking a temporary index.
pub const TEMP_INDEX_PREFIX: i64 = 0x7FFF_0000_0000_0000;

const TABLE_PREFIX_LEN: usize = 1 + mem::size_of::<i64>();
const TABLE_INDEX_PREFIX_LEN: usize = TABLE_PREFIX_LEN + 2 + mem::size_of::<i64>();

#[inline]
pub fn encode_table_prefix(table_id: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TABLE_PREFIX_LEN);
    buf.push_byte(TABLE_PREFIX);
    table_id.extend_mcf_to(&mut buf);
    buf
}

#[inline]
pub fn encode_table_index_prefix(table_id: i64, index_id: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TABLE_INDEX_PREFIX_LEN);
    buf.push_byte(TABLE_PREFIX);
    table_id.extend_mcf_to(&mut buf);
    buf.extend_from_byte_slice(INDEX_PREFIX_SEP);
    index_id.extend_mcf_to(&mut buf);
    buf
}

#[inline]
pub fn temp_index_id(index_id: i64) -> i64 {
    index_id | TEMP_INDEX_PREFIX
}

#[inline]
pub fn is_temp_index_id(index_id: i64) -> bool {
    index_id & TEMP_INDEX_PREFIX == TEMP_INDEX_PREFIX
}

/// Smallest key greater than every key prefixed by `key`.
#[inline]
pub fn prefix_next(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    for b in next.iter_mut().rev() {
        if *b == u8::MAX {
            *b = 0;
        } else {
            *b += 1;
            return next;
        }
    }
    // all bytes are 0xFF.
    next.copy_from_slice(key);
    next.push(0);
    next
}

/// Half-open physical key range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    /// All data of one physical table.
    #[inline]
    pub fn table(table_id: i64) -> Self {
        let start = encode_table_prefix(table_id);
        let end = match table_id.checked_add(1) {
            Some(next_id) => encode_table_prefix(next_id),
            None => prefix_next(&start),
        };
        KeyRange { start, end }
    }

    /// All entries of one index inside one physical table.
    #[inline]
    pub fn index(table_id: i64, index_id: i64) -> Self {
        let start = encode_table_index_prefix(table_id, index_id);
        let end = match index_id.checked_add(1) {
            Some(next_id) => encode_table_index_prefix(table_id, next_id),
            None => prefix_next(&start),
        };
        KeyRange { start, end }
    }

    #[inline]
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= &self.start[..] && key < &self.end[..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_prefix() {
        assert_eq!(
            encode_table_prefix(1),
            vec![b't', 0x80, 0, 0, 0, 0, 0, 0, 1]
        );
        let r = KeyRange::table(100);
        assert!(r.contains(&encode_table_index_prefix(100, 1)));
        assert!(r.contains(&encode_table_index_prefix(100, temp_index_id(1))));
        assert!(!r.contains(&encode_table_prefix(101)));
        assert!(!r.contains(&encode_table_prefix(99)));
    }

    #[test]
    fn test_index_range() {
        let r = KeyRange::index(100, 2);
        assert_eq!(&r.start[..9], &encode_table_prefix(100)[..]);
        assert_eq!(&r.start[9..11], INDEX_PREFIX_SEP);
        assert!(!r.contains(&encode_table_index_prefix(100, 3)));
        assert!(!r.contains(&encode_table_index_prefix(101, 2)));
        let mut row = encode_table_index_prefix(100, 2);
        row.extend_from_slice(b"value");
        assert!(r.contains(&row));
    }

    #[test]
    fn test_range_of_max_id() {
        let r = KeyRange::table(i64::MAX);
        assert!(r.start < r.end);
        assert!(r.contains(&encode_table_index_prefix(i64::MAX, 1)));
        assert_eq!(r.end, vec![TABLE_PREFIX + 1, 0, 0, 0, 0, 0, 0, 0, 0]);

        let index_id = temp_index_id(0xFFFF_FFFF_FFFF);
        assert_eq!(index_id, i64::MAX);
        let r = KeyRange::index(100, index_id);
        let mut row = encode_table_index_prefix(100, index_id);
        row.extend_from_slice(b"value");
        assert!(r.contains(&row));
        // the next index prefix of the table is `_j`.
        assert_eq!(&r.end[9..11], b"_j");
        assert!(!r.contains(&encode_table_prefix(101)));

        assert_eq!(prefix_next(&[1, 0xFF]), vec![2, 0]);
        assert_eq!(prefix_next(&[0xFF, 0xFF]), vec![0xFF, 0xFF, 0]);
    }

    #[test]
    fn test_temp_index_id() {
        assert_eq!(temp_index_id(2), 0x7FFF_0000_0000_0002);
        assert!(is_temp_index_id(temp_index_id(2)));
        assert!(!is_temp_index_id(2));
        // temp index sorts after every normal index of the table.
        assert!(
            KeyRange::index(100, temp_index_id(1)).start > KeyRange::index(100, 1000).end
        );
    }
}
