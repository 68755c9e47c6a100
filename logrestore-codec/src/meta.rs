//! Layout of metadata keys in the transactional store.
//!
//! A metadata entry lives in a hash structure. The raw key is
//!
//! ```text
//! 'm' | bytes(hash_key) | u64('h') | bytes(field)
//! ```
//!
//! The key written to the store is the raw key in grouped encoding,
//! followed by the descending timestamp.
//!
//! Other structures share the `m` prefix with a different type tag,
//! e.g. string keys like `NextGlobalID` end right after `u64('s')`.
use crate::error::{Error, Result};
use crate::memcmp::{
    BytesExtendable, Desc, GroupedBytes, MemCmpFormat, MemCmpRead, read_grouped_bytes,
};
use std::mem;
use std::str;

pub const META_PREFIX: u8 = b'm';
pub const HASH_DATA_TYPE: u64 = b'h' as u64;

/// Hash key of all databases.
pub const DBS_KEY: &[u8] = b"DBs";
/// Hash key of finished DDL jobs.
pub const DDL_JOB_HISTORY_KEY: &[u8] = b"DDLJobHistory";

const DB_PREFIX: &str = "DB";
const TABLE_PREFIX: &str = "Table";
const AUTO_INCREMENT_ID_PREFIX: &str = "IID";
const AUTO_TABLE_ID_PREFIX: &str = "TID";
const AUTO_RANDOM_TABLE_ID_PREFIX: &str = "TARID";
const SEQUENCE_PREFIX: &str = "SID";

/// Metadata key with its version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxnMetaKey {
    pub key: Vec<u8>,
    pub field: Vec<u8>,
    pub ts: u64,
}

impl TxnMetaKey {
    #[inline]
    pub fn new(key: impl Into<Vec<u8>>, field: impl Into<Vec<u8>>, ts: u64) -> Self {
        TxnMetaKey {
            key: key.into(),
            field: field.into(),
            ts,
        }
    }

    /// Returns whether the encoded key belongs to metadata.
    /// Grouped encoding keeps the first byte as is.
    #[inline]
    pub fn is_meta_key(data: &[u8]) -> bool {
        data.first() == Some(&META_PREFIX)
    }

    /// Raw key without timestamp.
    /// It identifies the logical key across all versions.
    #[inline]
    pub fn encode_raw(&self) -> Vec<u8> {
        let key = GroupedBytes(&self.key);
        let field = GroupedBytes(&self.field);
        let mut buf = Vec::with_capacity(
            1 + key.enc_mcf_len() + mem::size_of::<u64>() + field.enc_mcf_len(),
        );
        buf.push_byte(META_PREFIX);
        key.extend_mcf_to(&mut buf);
        HASH_DATA_TYPE.extend_mcf_to(&mut buf);
        field.extend_mcf_to(&mut buf);
        buf
    }

    #[inline]
    pub fn encode(&self) -> Vec<u8> {
        let raw = self.encode_raw();
        let raw = GroupedBytes(&raw);
        let mut buf = Vec::with_capacity(raw.enc_mcf_len() + mem::size_of::<u64>());
        raw.extend_mcf_to(&mut buf);
        Desc(self.ts).extend_mcf_to(&mut buf);
        buf
    }

    /// Parse a key which must be a hash field.
    #[inline]
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_hash_field(data)?.ok_or(Error::InvalidMetaKey("not a hash field"))
    }

    /// Parse a meta key, returns None if it is not a hash field.
    #[inline]
    pub fn parse_hash_field(data: &[u8]) -> Result<Option<Self>> {
        let mut input = data;
        let raw = read_grouped_bytes(&mut input)?;
        let Desc(ts) = Desc::<u64>::read_mcf(&mut input)?;
        if !input.is_empty() {
            return Err(Error::TrailingBytes("txn meta key"));
        }
        let parsed = Self::parse_raw(&raw)?;
        Ok(parsed.map(|(key, field)| TxnMetaKey { key, field, ts }))
    }

    #[inline]
    fn parse_raw(raw: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let mut input = match raw.split_first() {
            Some((&META_PREFIX, rest)) => rest,
            _ => return Err(Error::InvalidMetaKey("missing meta prefix")),
        };
        let key = read_grouped_bytes(&mut input)?;
        if u64::read_mcf(&mut input)? != HASH_DATA_TYPE {
            return Ok(None);
        }
        let field = read_grouped_bytes(&mut input)?;
        if !input.is_empty() {
            return Err(Error::TrailingBytes("raw meta key"));
        }
        Ok(Some((key, field)))
    }
}

#[inline]
fn encode_id_field(prefix: &str, id: i64) -> Vec<u8> {
    format!("{prefix}:{id}").into_bytes()
}

#[inline]
fn has_id_prefix(prefix: &str, field: &[u8]) -> bool {
    field.starts_with(prefix.as_bytes()) && field.get(prefix.len()) == Some(&b':')
}

#[inline]
fn parse_id_field(prefix: &str, field: &[u8]) -> Result<i64> {
    let invalid = || Error::InvalidMetaField(String::from_utf8_lossy(field).into_owned());
    if !has_id_prefix(prefix, field) {
        return Err(invalid());
    }
    let digits = str::from_utf8(&field[prefix.len() + 1..]).map_err(|_| invalid())?;
    digits.parse::<i64>().map_err(|_| invalid())
}

#[inline]
pub fn db_key(db_id: i64) -> Vec<u8> {
    encode_id_field(DB_PREFIX, db_id)
}

#[inline]
pub fn is_db_key(field: &[u8]) -> bool {
    has_id_prefix(DB_PREFIX, field)
}

#[inline]
pub fn parse_db_key(field: &[u8]) -> Result<i64> {
    parse_id_field(DB_PREFIX, field)
}

#[inline]
pub fn table_key(table_id: i64) -> Vec<u8> {
    encode_id_field(TABLE_PREFIX, table_id)
}

#[inline]
pub fn is_table_key(field: &[u8]) -> bool {
    has_id_prefix(TABLE_PREFIX, field)
}

#[inline]
pub fn parse_table_key(field: &[u8]) -> Result<i64> {
    parse_id_field(TABLE_PREFIX, field)
}

#[inline]
pub fn auto_increment_id_key(table_id: i64) -> Vec<u8> {
    encode_id_field(AUTO_INCREMENT_ID_PREFIX, table_id)
}

#[inline]
pub fn parse_auto_increment_id_key(field: &[u8]) -> Result<i64> {
    parse_id_field(AUTO_INCREMENT_ID_PREFIX, field)
}

#[inline]
pub fn auto_table_id_key(table_id: i64) -> Vec<u8> {
    encode_id_field(AUTO_TABLE_ID_PREFIX, table_id)
}

#[inline]
pub fn parse_auto_table_id_key(field: &[u8]) -> Result<i64> {
    parse_id_field(AUTO_TABLE_ID_PREFIX, field)
}

#[inline]
pub fn auto_random_table_id_key(table_id: i64) -> Vec<u8> {
    encode_id_field(AUTO_RANDOM_TABLE_ID_PREFIX, table_id)
}

#[inline]
pub fn parse_auto_random_table_id_key(field: &[u8]) -> Result<i64> {
    parse_id_field(AUTO_RANDOM_TABLE_ID_PREFIX, field)
}

#[inline]
pub fn sequence_key(sequence_id: i64) -> Vec<u8> {
    encode_id_field(SEQUENCE_PREFIX, sequence_id)
}

#[inline]
pub fn parse_sequence_key(field: &[u8]) -> Result<i64> {
    parse_id_field(SEQUENCE_PREFIX, field)
}

/// Kinds of table-scoped fields stored under hash key `DB:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaFieldKind {
    Table,
    AutoIncrementID,
    AutoTableID,
    AutoRandomTableID,
    Sequence,
}

impl MetaFieldKind {
    pub const ALL: [MetaFieldKind; 5] = [
        MetaFieldKind::Table,
        MetaFieldKind::AutoIncrementID,
        MetaFieldKind::AutoTableID,
        MetaFieldKind::AutoRandomTableID,
        MetaFieldKind::Sequence,
    ];

    #[inline]
    pub fn prefix(self) -> &'static str {
        match self {
            MetaFieldKind::Table => TABLE_PREFIX,
            MetaFieldKind::AutoIncrementID => AUTO_INCREMENT_ID_PREFIX,
            MetaFieldKind::AutoTableID => AUTO_TABLE_ID_PREFIX,
            MetaFieldKind::AutoRandomTableID => AUTO_RANDOM_TABLE_ID_PREFIX,
            MetaFieldKind::Sequence => SEQUENCE_PREFIX,
        }
    }

    /// Detect kind of the field, returns None if the field is not
    /// table-scoped.
    #[inline]
    pub fn detect(field: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| has_id_prefix(kind.prefix(), field))
    }

    #[inline]
    pub fn codec(self) -> MetaFieldCodec {
        let (encode, decode): (fn(i64) -> Vec<u8>, fn(&[u8]) -> Result<i64>) = match self {
            MetaFieldKind::Table => (table_key, parse_table_key),
            MetaFieldKind::AutoIncrementID => {
                (auto_increment_id_key, parse_auto_increment_id_key)
            }
            MetaFieldKind::AutoTableID => (auto_table_id_key, parse_auto_table_id_key),
            MetaFieldKind::AutoRandomTableID => {
                (auto_random_table_id_key, parse_auto_random_table_id_key)
            }
            MetaFieldKind::Sequence => (sequence_key, parse_sequence_key),
        };
        MetaFieldCodec {
            kind: self,
            encode,
            decode,
        }
    }
}

/// Encode and decode pair of one field kind, so a single routine
/// can rewrite the embedded id of any table-scoped field.
#[derive(Debug, Clone, Copy)]
pub struct MetaFieldCodec {
    pub kind: MetaFieldKind,
    pub encode: fn(i64) -> Vec<u8>,
    pub decode: fn(&[u8]) -> Result<i64>,
}
