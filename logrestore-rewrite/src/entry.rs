/// Column family of an entry in the transactional store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnFamily {
    /// Holds values, keyed with start timestamp.
    Default,
    /// Holds commit markers, keyed with commit timestamp.
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KvEntry {
    #[inline]
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        KvEntry {
            key: key.into(),
            value: value.into(),
        }
    }
}
