use super::SchemasReplace;
use crate::error::{Error, Result};
use crate::id_map::{DbReplaceMap, TableReplace};
use crate::stats::RewriteStats;
use log::{debug, warn};
use logrestore_catalog::{
    ActionType, AddIndexArgs, DownstreamID, DropSchemaArgs, DropTableArgs, FinishedArgs, IndexID,
    Job, PartitionID, TablePartitionArgs, decode_finished_args,
};
use logrestore_codec::tablecodec::{KeyRange, temp_index_id};
use std::collections::HashSet;

pub const INSERT_DELETE_RANGE_SQL_PREFIX: &str =
    "INSERT IGNORE INTO mysql.gc_delete_range VALUES ";
pub const INSERT_DELETE_RANGE_SQL_VALUE: &str = "(%?, %?, %?, %?, %?)";

/// One row of `mysql.gc_delete_range` without its timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelRangeParams {
    pub job_id: i64,
    pub element_id: i64,
    /// Hex encoded start key.
    pub start_key: String,
    /// Hex encoded end key.
    pub end_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlArg {
    Int(i64),
    Uint(u64),
    Str(String),
}

/// Parameterized insert of delete ranges. The timestamp of each row is
/// bound when the statement is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreDelRangeQuery {
    pub sql: String,
    pub params_list: Vec<DelRangeParams>,
}

impl PreDelRangeQuery {
    #[inline]
    pub fn new(params_list: Vec<DelRangeParams>) -> Self {
        let values = vec![INSERT_DELETE_RANGE_SQL_VALUE; params_list.len()].join(",");
        PreDelRangeQuery {
            sql: format!("{}{}", INSERT_DELETE_RANGE_SQL_PREFIX, values),
            params_list,
        }
    }

    /// Flattened arguments matching placeholders of the statement.
    pub fn args(&self, ts: u64) -> Vec<SqlArg> {
        let mut args = Vec::with_capacity(self.params_list.len() * 5);
        for params in &self.params_list {
            args.push(SqlArg::Int(params.job_id));
            args.push(SqlArg::Int(params.element_id));
            args.push(SqlArg::Str(params.start_key.clone()));
            args.push(SqlArg::Str(params.end_key.clone()));
            args.push(SqlArg::Uint(ts));
        }
        args
    }
}

/// Sink of delete range statements.
pub trait DeleteRangeRecorder: Send {
    fn record(&mut self, query: PreDelRangeQuery) -> Result<()>;
}

impl DeleteRangeRecorder for flume::Sender<PreDelRangeQuery> {
    #[inline]
    fn record(&mut self, query: PreDelRangeQuery) -> Result<()> {
        self.send(query)
            .map_err(|e| Error::DeleteRangeSink(e.to_string()))
    }
}

impl<F> DeleteRangeRecorder for F
where
    F: FnMut(PreDelRangeQuery) -> Result<()> + Send,
{
    #[inline]
    fn record(&mut self, query: PreDelRangeQuery) -> Result<()> {
        self(query)
    }
}

/// Whether a finished job leaves physical data to clean up.
pub(crate) fn job_need_gc(job: &Job) -> bool {
    if job.is_cancelled() {
        return false;
    }
    match job.action_type() {
        Ok(
            ActionType::DropSchema
            | ActionType::DropTable
            | ActionType::TruncateTable
            | ActionType::DropIndex
            | ActionType::DropPrimaryKey
            | ActionType::DropTablePartition
            | ActionType::TruncateTablePartition
            | ActionType::DropColumn
            | ActionType::ModifyColumn
            | ActionType::AddIndex
            | ActionType::AddPrimaryKey
            | ActionType::AddVectorIndex
            | ActionType::ReorganizePartition
            | ActionType::RemovePartitioning
            | ActionType::AlterTablePartitioning,
        ) => true,
        Ok(ActionType::MultiSchemaChange) => job
            .sub_jobs()
            .iter()
            .any(|sub| job_need_gc(&sub.to_proxy_job(job))),
        _ => false,
    }
}

impl SchemasReplace {
    /// Turn one DDL history job into delete ranges of its leftover data
    /// and remember the indexes it built by ingestion.
    pub fn process_ingest_index_and_delete_range_from_job(&mut self, job: &Job) -> Result<()> {
        if let Err(err) = job.action_type() {
            return self.on_unsupported_job(job, err);
        }
        if job_need_gc(job) {
            self.delete_range_from_job(job)?;
        }
        self.try_record_ingest_index(job)
    }

    fn try_record_ingest_index(&mut self, job: &Job) -> Result<()> {
        if job.action_type()? == ActionType::MultiSchemaChange {
            for sub in job.sub_jobs() {
                self.ingest_recorder
                    .try_add_job(&sub.to_proxy_job(job), true)?;
            }
            return Ok(());
        }
        self.ingest_recorder.try_add_job(job, false)
    }

    fn on_unsupported_job(&self, job: &Job, err: logrestore_catalog::Error) -> Result<()> {
        RewriteStats::incr(&self.stats.unsupported_jobs, 1);
        if self.skip_unsupported_jobs {
            warn!("skip delete range of job {}: {}", job.id, err);
            return Ok(());
        }
        Err(err.into())
    }

    fn delete_range_from_job(&mut self, job: &Job) -> Result<()> {
        let action = match job.action_type() {
            Ok(action) => action,
            Err(err) => return self.on_unsupported_job(job, err),
        };
        if action == ActionType::MultiSchemaChange {
            return self.delete_range_from_sub_jobs(job);
        }
        let args = decode_finished_args(action, job.version, &job.raw_args)?;
        let planner = DeleteRangePlanner {
            map: &self.db_replace_map,
            stats: &self.stats,
        };
        let batches = planner.plan(job, action, args);
        self.emit_delete_ranges(job, batches)
    }

    /// Sub-jobs are independent. One failing sub-job does not stop the
    /// others.
    fn delete_range_from_sub_jobs(&mut self, job: &Job) -> Result<()> {
        let mut failed = 0;
        let mut first = None;
        for sub in job.sub_jobs() {
            let proxy = sub.to_proxy_job(job);
            let res = match proxy.action_type() {
                Err(err) => self.on_unsupported_job(&proxy, err),
                Ok(_) if job_need_gc(&proxy) => self.delete_range_from_job(&proxy),
                Ok(_) => Ok(()),
            };
            if let Err(err) = res {
                warn!(
                    "failed to build delete range of sub-job {} in job {}: {}",
                    sub.tp, job.id, err
                );
                failed += 1;
                first.get_or_insert_with(|| err.to_string());
            }
        }
        match first {
            None => Ok(()),
            Some(first) => Err(Error::MultiSchemaChange {
                job_id: job.id,
                failed,
                first,
            }),
        }
    }

    fn emit_delete_ranges(&mut self, job: &Job, batches: Vec<Vec<KeyRange>>) -> Result<()> {
        if batches.is_empty() {
            return Ok(());
        }
        let gc_job_id = self.id_allocator.next_id()?;
        let mut element_id = 1;
        for batch in batches {
            let params_list: Vec<_> = batch
                .into_iter()
                .map(|range| {
                    let params = DelRangeParams {
                        job_id: gc_job_id,
                        element_id,
                        start_key: hex::encode(&range.start),
                        end_key: hex::encode(&range.end),
                    };
                    element_id += 1;
                    params
                })
                .collect();
            debug!(
                "record {} delete ranges of job {} as gc job {}",
                params_list.len(),
                job.id,
                gc_job_id
            );
            RewriteStats::incr(&self.stats.delete_range_batches, 1);
            RewriteStats::incr(&self.stats.delete_ranges, params_list.len());
            self.delete_range_recorder
                .record(PreDelRangeQuery::new(params_list))?;
        }
        Ok(())
    }
}

/// Builds downstream key ranges of one job. Each inner vector becomes
/// one insert statement.
struct DeleteRangePlanner<'a> {
    map: &'a DbReplaceMap,
    stats: &'a RewriteStats,
}

impl DeleteRangePlanner<'_> {
    fn plan(&self, job: &Job, action: ActionType, args: FinishedArgs) -> Vec<Vec<KeyRange>> {
        match args {
            FinishedArgs::DropSchema(args) => self.plan_drop_schema(job, args),
            FinishedArgs::DropTable(args) => self.plan_drop_table(job, args),
            FinishedArgs::TablePartition(args) => self.plan_table_partition(job, args),
            FinishedArgs::AddIndex(args) => self.plan_add_index(job, args),
            FinishedArgs::DropIndex(args) => {
                self.plan_drop_indexes(job, &args.index_ids, &args.partition_ids)
            }
            FinishedArgs::IndexesOfColumn(args) => {
                self.plan_drop_indexes(job, &args.index_ids, &args.partition_ids)
            }
            FinishedArgs::MultiSchemaChange | FinishedArgs::NoRanges => {
                debug!("job {} of type {} has no delete range", job.id, action.name());
                vec![]
            }
        }
    }

    fn plan_drop_schema(&self, job: &Job, args: DropSchemaArgs) -> Vec<Vec<KeyRange>> {
        let Some(db) = self.map.db(job.schema_id) else {
            warn!("skip dropped database {}: no mapping", job.schema_id);
            RewriteStats::incr(&self.stats.skipped_dbs, 1);
            return vec![];
        };
        // Empty list means all tables of the database.
        let filter = !args.all_dropped_table_ids.is_empty();
        let mut remaining: HashSet<_> = args.all_dropped_table_ids.into_iter().collect();
        let mut ids = vec![];
        for (table_id, table) in &db.table_map {
            if filter && !remaining.remove(table_id) {
                continue;
            }
            ids.push(table.table_id);
            for (partition_id, downstream_id) in &table.partition_map {
                if filter && !remaining.remove(partition_id) {
                    continue;
                }
                ids.push(*downstream_id);
            }
        }
        if !remaining.is_empty() {
            let mut missing: Vec<_> = remaining.into_iter().collect();
            missing.sort_unstable();
            warn!(
                "skip tables {:?} dropped with database {}: no mapping",
                missing, job.schema_id
            );
            RewriteStats::incr(&self.stats.skipped_tables, missing.len());
        }
        single_batch(ids.into_iter().map(KeyRange::table).collect())
    }

    fn plan_drop_table(&self, job: &Job, args: DropTableArgs) -> Vec<Vec<KeyRange>> {
        let Some(table) = self.table_replace(job) else {
            return vec![];
        };
        let mut batches = vec![];
        if !args.old_partition_ids.is_empty() {
            let ids = self.translate_partitions(job, table, &args.old_partition_ids);
            batches.extend(single_batch(ids.into_iter().map(KeyRange::table).collect()));
        }
        batches.push(vec![KeyRange::table(table.table_id)]);
        batches
    }

    fn plan_table_partition(&self, job: &Job, args: TablePartitionArgs) -> Vec<Vec<KeyRange>> {
        let Some(table) = self.table_replace(job) else {
            return vec![];
        };
        let mut ranges = Vec::with_capacity(args.old_physical_tbl_ids.len());
        for physical_id in args.old_physical_tbl_ids {
            if let Some(id) = table.partition_id(physical_id) {
                ranges.push(KeyRange::table(id));
            } else if physical_id == job.table_id {
                ranges.push(KeyRange::table(table.table_id));
            } else {
                warn!(
                    "skip physical table {} of table {}: no mapping",
                    physical_id, job.table_id
                );
                RewriteStats::incr(&self.stats.skipped_partitions, 1);
            }
        }
        single_batch(ranges)
    }

    fn plan_add_index(&self, job: &Job, args: AddIndexArgs) -> Vec<Vec<KeyRange>> {
        let Some(table) = self.table_replace(job) else {
            return vec![];
        };
        let physical_ids = self.physical_ids(job, table, &args.partition_ids);
        let rollback = job.is_rollback_done();
        let mut batches = vec![];
        for index_id in args.index_ids {
            // A finished index only leaves its temporary index behind.
            let index_ids: Vec<IndexID> = if rollback {
                vec![index_id, temp_index_id(index_id)]
            } else {
                vec![temp_index_id(index_id)]
            };
            for physical_id in &physical_ids {
                batches.push(
                    index_ids
                        .iter()
                        .map(|id| KeyRange::index(*physical_id, *id))
                        .collect(),
                );
            }
        }
        batches
    }

    fn plan_drop_indexes(
        &self,
        job: &Job,
        index_ids: &[IndexID],
        partition_ids: &[PartitionID],
    ) -> Vec<Vec<KeyRange>> {
        if index_ids.is_empty() {
            return vec![];
        }
        let Some(table) = self.table_replace(job) else {
            return vec![];
        };
        self.physical_ids(job, table, partition_ids)
            .into_iter()
            .map(|physical_id| {
                index_ids
                    .iter()
                    .map(|id| KeyRange::index(physical_id, *id))
                    .collect()
            })
            .collect()
    }

    fn table_replace(&self, job: &Job) -> Option<&TableReplace> {
        if self.map.db(job.schema_id).is_none() {
            warn!(
                "skip delete range of job {}: database {} has no mapping",
                job.id, job.schema_id
            );
            RewriteStats::incr(&self.stats.skipped_dbs, 1);
            return None;
        }
        let table = self.map.table(job.schema_id, job.table_id);
        if table.is_none() {
            warn!(
                "skip delete range of job {}: table {} has no mapping",
                job.id, job.table_id
            );
            RewriteStats::incr(&self.stats.skipped_tables, 1);
        }
        table
    }

    fn translate_partitions(
        &self,
        job: &Job,
        table: &TableReplace,
        partition_ids: &[PartitionID],
    ) -> Vec<DownstreamID> {
        let mut ids = Vec::with_capacity(partition_ids.len());
        for partition_id in partition_ids {
            match table.partition_id(*partition_id) {
                Some(id) => ids.push(id),
                None => {
                    warn!(
                        "skip partition {} of table {}: no mapping",
                        partition_id, job.table_id
                    );
                    RewriteStats::incr(&self.stats.skipped_partitions, 1);
                }
            }
        }
        ids
    }

    /// Physical tables an index job touched. Without explicit partitions
    /// every known physical table of the table is used. Listed partitions
    /// without mapping are skipped.
    fn physical_ids(
        &self,
        job: &Job,
        table: &TableReplace,
        partition_ids: &[PartitionID],
    ) -> Vec<DownstreamID> {
        if partition_ids.is_empty() {
            return table.physical_ids();
        }
        self.translate_partitions(job, table, partition_ids)
    }
}

#[inline]
fn single_batch(ranges: Vec<KeyRange>) -> Vec<Vec<KeyRange>> {
    if ranges.is_empty() {
        return vec![];
    }
    vec![ranges]
}
