pub mod error;
pub mod memcmp;
pub mod meta;
pub mod tablecodec;
pub mod varint;
pub mod write;

pub use error::{Error, Result};
