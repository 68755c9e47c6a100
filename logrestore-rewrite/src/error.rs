use logrestore_catalog::UpstreamID;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Database,
    Table,
    Partition,
}

impl fmt::Display for ObjectKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectKind::Database => "database",
            ObjectKind::Table => "table",
            ObjectKind::Partition => "partition",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("{0} {1} has no downstream id")]
    MappingNotFound(ObjectKind, UpstreamID),
    #[error("codec error: {0}")]
    Codec(#[from] logrestore_codec::Error),
    #[error("catalog error: {0}")]
    Catalog(#[from] logrestore_catalog::Error),
    #[error("{failed} sub-jobs of multi-schema-change job {job_id} failed, first: {first}")]
    MultiSchemaChange {
        job_id: i64,
        failed: usize,
        first: String,
    },
    #[error("failed to record delete range: {0}")]
    DeleteRangeSink(String),
    #[error("meta info collector failed: {0}")]
    Collector(String),
    #[error("failed to allocate id: {0}")]
    IdAllocation(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl From<toml::de::Error> for Error {
    #[inline]
    fn from(src: toml::de::Error) -> Self {
        Error::InvalidConfig(src.to_string())
    }
}
