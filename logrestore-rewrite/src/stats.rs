use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters of one restore session.
///
/// Objects out of restore scope are skipped silently. The skip counters
/// make them observable.
#[derive(Debug, Default)]
pub struct RewriteStats {
    pub skipped_dbs: AtomicUsize,
    pub skipped_tables: AtomicUsize,
    pub skipped_partitions: AtomicUsize,
    pub unsupported_jobs: AtomicUsize,
    pub delete_range_batches: AtomicUsize,
    pub delete_ranges: AtomicUsize,
    pub dropped_orphan_commits: AtomicUsize,
    pub held_commits: AtomicUsize,
}

impl RewriteStats {
    #[inline]
    pub(crate) fn incr(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn snapshot(&self) -> RewriteStatsSnapshot {
        RewriteStatsSnapshot {
            skipped_dbs: self.skipped_dbs.load(Ordering::Relaxed),
            skipped_tables: self.skipped_tables.load(Ordering::Relaxed),
            skipped_partitions: self.skipped_partitions.load(Ordering::Relaxed),
            unsupported_jobs: self.unsupported_jobs.load(Ordering::Relaxed),
            delete_range_batches: self.delete_range_batches.load(Ordering::Relaxed),
            delete_ranges: self.delete_ranges.load(Ordering::Relaxed),
            dropped_orphan_commits: self.dropped_orphan_commits.load(Ordering::Relaxed),
            held_commits: self.held_commits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStatsSnapshot {
    pub skipped_dbs: usize,
    pub skipped_tables: usize,
    pub skipped_partitions: usize,
    pub unsupported_jobs: usize,
    pub delete_range_batches: usize,
    pub delete_ranges: usize,
    pub dropped_orphan_commits: usize,
    pub held_commits: usize,
}

impl RewriteStatsSnapshot {
    /// Total objects skipped because they have no mapping.
    #[inline]
    pub fn skipped(&self) -> usize {
        self.skipped_dbs + self.skipped_tables + self.skipped_partitions
    }
}
