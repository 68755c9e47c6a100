pub mod args;
pub mod error;
pub mod info;
pub mod job;

pub use args::*;
pub use error::{Error, Result};
pub use info::*;
pub use job::*;

pub type ObjID = i64;
pub type SchemaID = ObjID;
pub type TableID = ObjID;
pub type PartitionID = ObjID;
pub type IndexID = ObjID;

/// Identifier recorded by the backed up cluster.
pub type UpstreamID = ObjID;
/// Identifier in the cluster being restored.
pub type DownstreamID = ObjID;
