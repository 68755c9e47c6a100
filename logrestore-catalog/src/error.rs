use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("json error: {0}")]
    Json(String),
    #[error("unsupported job type {0}")]
    UnsupportedJobType(i32),
    #[error("unknown job state {0}")]
    UnknownJobState(i32),
    #[error("unknown job version {0}")]
    UnknownJobVersion(i64),
    #[error("unknown reorg type {0}")]
    UnknownReorgType(u8),
    #[error("invalid arguments of {action} job: {reason}")]
    InvalidJobArgs {
        action: &'static str,
        reason: String,
    },
}

impl From<serde_json::Error> for Error {
    #[inline]
    fn from(src: serde_json::Error) -> Self {
        Error::Json(src.to_string())
    }
}
