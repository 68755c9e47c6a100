use crate::alloc::IdAllocator;
use crate::error::{Error, Result};
use crate::id_map::DbReplaceMap;
use crate::replace::{DeleteRangeRecorder, SchemasReplace};
use crate::stats::RewriteStats;
use crate::tracker::TableMappingManager;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_REWRITE_TS: u64 = 0;
pub const DEFAULT_ORPHAN_COMMIT: OrphanCommitPolicy = OrphanCommitPolicy::Drop;
pub const DEFAULT_SKIP_UNSUPPORTED_JOBS: bool = true;

/// What to do with a commit marker whose value has not been seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OrphanCommitPolicy {
    /// Keep the commit until the value arrives.
    #[serde(rename = "hold")]
    Hold,
    #[default]
    #[serde(rename = "drop")]
    Drop,
}

impl FromStr for OrphanCommitPolicy {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("hold") {
            Ok(OrphanCommitPolicy::Hold)
        } else if s.eq_ignore_ascii_case("drop") {
            Ok(OrphanCommitPolicy::Drop)
        } else {
            Err(Error::InvalidConfig(format!("unknown orphan commit policy {}", s)))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    // Timestamp stamped on every rewritten write CF key, and the
    // timestamp delete ranges are executed with.
    pub rewrite_ts: u64,
    // Controls handling of commit markers replayed before their values.
    pub orphan_commit: OrphanCommitPolicy,
    // Controls whether DDL jobs of unknown type are skipped with a
    // warning or fail the restore.
    pub skip_unsupported_jobs: bool,
}

impl RewriteConfig {
    #[inline]
    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    #[inline]
    pub fn rewrite_ts(mut self, rewrite_ts: u64) -> Self {
        self.rewrite_ts = rewrite_ts;
        self
    }

    #[inline]
    pub fn orphan_commit(mut self, orphan_commit: OrphanCommitPolicy) -> Self {
        self.orphan_commit = orphan_commit;
        self
    }

    #[inline]
    pub fn skip_unsupported_jobs(mut self, skip_unsupported_jobs: bool) -> Self {
        self.skip_unsupported_jobs = skip_unsupported_jobs;
        self
    }

    /// Tracker for the id discovery pass.
    #[inline]
    pub fn build_table_mapping_manager(&self, stats: Arc<RewriteStats>) -> TableMappingManager {
        TableMappingManager::new()
            .with_orphan_commit(self.orphan_commit)
            .with_stats(stats)
    }

    /// Rewriting session for the restore pass.
    #[inline]
    pub fn build_schemas_replace(
        &self,
        db_replace_map: DbReplaceMap,
        id_allocator: Box<dyn IdAllocator>,
        delete_range_recorder: Box<dyn DeleteRangeRecorder>,
        stats: Arc<RewriteStats>,
    ) -> SchemasReplace {
        SchemasReplace::new(
            db_replace_map,
            self.rewrite_ts,
            id_allocator,
            delete_range_recorder,
        )
        .with_skip_unsupported_jobs(self.skip_unsupported_jobs)
        .with_stats(stats)
    }
}

impl Default for RewriteConfig {
    #[inline]
    fn default() -> Self {
        RewriteConfig {
            rewrite_ts: DEFAULT_REWRITE_TS,
            orphan_commit: DEFAULT_ORPHAN_COMMIT,
            skip_unsupported_jobs: DEFAULT_SKIP_UNSUPPORTED_JOBS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_config_toml() {
        let config = RewriteConfig::default()
            .rewrite_ts(9527)
            .orphan_commit(OrphanCommitPolicy::Hold);
        let s = toml::to_string(&config).unwrap();
        println!("{}", s);
        assert!(s.contains("orphan_commit = \"hold\""));
        let parsed = RewriteConfig::from_toml(&s).unwrap();
        assert_eq!(parsed, config);

        let partial = RewriteConfig::from_toml("rewrite_ts = 42").unwrap();
        assert_eq!(partial.rewrite_ts, 42);
        assert_eq!(partial.orphan_commit, OrphanCommitPolicy::Drop);
        assert!(partial.skip_unsupported_jobs);

        assert!(matches!(
            RewriteConfig::from_toml("orphan_commit = \"keep\""),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_build_sessions() {
        use crate::alloc::SequentialIdAllocator;
        use crate::replace::PreDelRangeQuery;

        let config = RewriteConfig::default().rewrite_ts(9527);
        let stats = Arc::new(RewriteStats::default());
        let tm = config.build_table_mapping_manager(Arc::clone(&stats));
        assert!(Arc::ptr_eq(tm.stats(), &stats));
        let (tx, _rx) = flume::unbounded::<PreDelRangeQuery>();
        let sr = config.build_schemas_replace(
            tm.into_db_replace_map(),
            Box::new(SequentialIdAllocator::new(1)),
            Box::new(tx),
            Arc::clone(&stats),
        );
        assert_eq!(sr.rewrite_ts(), 9527);
        assert!(Arc::ptr_eq(sr.stats(), &stats));
    }

    #[test]
    fn test_orphan_commit_from_str() {
        assert_eq!(
            "HOLD".parse::<OrphanCommitPolicy>().unwrap(),
            OrphanCommitPolicy::Hold
        );
        assert_eq!(
            "drop".parse::<OrphanCommitPolicy>().unwrap(),
            OrphanCommitPolicy::Drop
        );
        assert!("x".parse::<OrphanCommitPolicy>().is_err());
    }
}
