//! Rewriting of meta entries replayed from a change log into a cluster
//! with a different id space.
//!
//! Restore runs in two passes. [`TableMappingManager`] replays meta
//! entries to discover databases, tables and partitions and to assign
//! their downstream ids. [`SchemasReplace`] then rewrites every meta
//! entry with the final id map and turns DDL history into delete ranges.
pub mod alloc;
pub mod conf;
pub mod entry;
pub mod error;
pub mod id_map;
pub mod replace;
pub mod stats;
pub mod tracker;

pub use alloc::{IdAllocator, SequentialIdAllocator};
pub use conf::{OrphanCommitPolicy, RewriteConfig};
pub use entry::{ColumnFamily, KvEntry};
pub use error::{Error, ObjectKind, Result};
pub use id_map::{DbReplace, DbReplaceMap, TableReplace};
pub use replace::{
    DelRangeParams, DeleteRangeRecorder, IngestIndexItem, IngestRecorder, PreDelRangeQuery,
    SchemasReplace, SqlArg,
};
pub use stats::{RewriteStats, RewriteStatsSnapshot};
pub use tracker::{MetaInfoCollector, TableMappingManager};
