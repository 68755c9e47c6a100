use crate::error::Result;
use crate::id_map::DbReplaceMap;
use indexmap::IndexMap;
use log::warn;
use logrestore_catalog::{
    ActionType, FinishedArgs, IndexID, Job, SchemaID, TableID, decode_finished_args,
};

/// Index built by ingestion which must be rebuilt after restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestIndexItem {
    pub db_id: SchemaID,
    pub table_id: TableID,
    pub index_id: IndexID,
    pub is_primary: bool,
}

/// Collects indexes added by ingestion. Ingested data bypasses the log,
/// so these indexes are incomplete after replay.
#[derive(Debug, Default)]
pub struct IngestRecorder {
    items: IndexMap<(SchemaID, TableID), IndexMap<IndexID, bool>>,
}

impl IngestRecorder {
    #[inline]
    pub fn new() -> Self {
        IngestRecorder::default()
    }

    /// Record indexes of a finished ingest job. States of sub-jobs are
    /// not checked for completion, only their parent is.
    pub fn try_add_job(&mut self, job: &Job, is_sub_job: bool) -> Result<()> {
        let finished = if is_sub_job {
            !job.is_cancelled() && !job.is_rollback_done()
        } else {
            job.is_done()
        };
        if !finished || !job.is_ingest() {
            return Ok(());
        }
        let action = match job.action_type() {
            Ok(action @ (ActionType::AddIndex | ActionType::AddPrimaryKey)) => action,
            _ => return Ok(()),
        };
        let FinishedArgs::AddIndex(args) = decode_finished_args(action, job.version, &job.raw_args)?
        else {
            return Ok(());
        };
        let indexes = self
            .items
            .entry((job.schema_id, job.table_id))
            .or_insert_with(IndexMap::new);
        for index_id in args.index_ids {
            indexes.insert(index_id, args.is_primary);
        }
        Ok(())
    }

    /// Translate recorded tables to downstream ids. Tables without
    /// mapping are out of restore scope and removed.
    pub fn rewrite_table_id(&mut self, map: &DbReplaceMap) {
        let items = std::mem::take(&mut self.items);
        for ((db_id, table_id), indexes) in items {
            match (map.db_id(db_id), map.table_id(db_id, table_id)) {
                (Some(new_db_id), Some(new_table_id)) => {
                    self.items
                        .entry((new_db_id, new_table_id))
                        .or_insert_with(IndexMap::new)
                        .extend(indexes);
                }
                _ => warn!(
                    "skip ingest indexes of table {} in database {}: no mapping",
                    table_id, db_id
                ),
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.values().map(|indexes| indexes.len()).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn iter_items(&self) -> impl Iterator<Item = IngestIndexItem> + '_ {
        self.items.iter().flat_map(|((db_id, table_id), indexes)| {
            indexes.iter().map(move |(index_id, is_primary)| IngestIndexItem {
                db_id: *db_id,
                table_id: *table_id,
                index_id: *index_id,
                is_primary: *is_primary,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_map::{DbReplace, TableReplace};
    use logrestore_catalog::{JobState, ReorgMeta, ReorgType};
    use serde_json::json;

    fn ingest_job(id: i64, action: ActionType, state: JobState, args: serde_json::Value) -> Job {
        let mut job = Job::new(id, action, 1, 2);
        job.state = state;
        job.raw_args = args;
        job.reorg_meta = Some(ReorgMeta {
            reorg_tp: ReorgType::Ingest,
        });
        job
    }

    #[test]
    fn test_ingest_recorder() {
        let mut recorder = IngestRecorder::new();
        recorder
            .try_add_job(
                &ingest_job(1, ActionType::AddIndex, JobState::Synced, json!([5, false, []])),
                false,
            )
            .unwrap();
        recorder
            .try_add_job(
                &ingest_job(2, ActionType::AddPrimaryKey, JobState::Done, json!([6, true, []])),
                false,
            )
            .unwrap();
        // not finished
        recorder
            .try_add_job(
                &ingest_job(3, ActionType::AddIndex, JobState::Running, json!([7, false, []])),
                false,
            )
            .unwrap();
        // sub-job state is not checked
        recorder
            .try_add_job(
                &ingest_job(4, ActionType::AddIndex, JobState::Running, json!([8, false, []])),
                true,
            )
            .unwrap();
        let mut txn_job = ingest_job(5, ActionType::AddIndex, JobState::Synced, json!([9, false, []]));
        txn_job.reorg_meta = Some(ReorgMeta {
            reorg_tp: ReorgType::Txn,
        });
        recorder.try_add_job(&txn_job, false).unwrap();
        assert_eq!(recorder.len(), 3);

        let map: DbReplaceMap = [(1, DbReplace::new("db", 11).with_table(2, TableReplace::new("t", 12)))]
            .into_iter()
            .collect();
        recorder.rewrite_table_id(&map);
        let items: Vec<_> = recorder.iter_items().collect();
        assert_eq!(
            items,
            vec![
                IngestIndexItem { db_id: 11, table_id: 12, index_id: 5, is_primary: false },
                IngestIndexItem { db_id: 11, table_id: 12, index_id: 6, is_primary: true },
                IngestIndexItem { db_id: 11, table_id: 12, index_id: 8, is_primary: false },
            ]
        );

        recorder.rewrite_table_id(&DbReplaceMap::new());
        assert!(recorder.is_empty());
    }
}
