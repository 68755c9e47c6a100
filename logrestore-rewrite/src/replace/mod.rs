//! Rewriting session of one restore.
//!
//! Keys and values of meta entries are translated into the id space of
//! the restored cluster. Keys in write CF are stamped with one session
//! timestamp. DDL history entries are not restored, they are turned into
//! delete ranges instead.
mod delete_range;
mod ingest;

pub use delete_range::{
    DelRangeParams, DeleteRangeRecorder, INSERT_DELETE_RANGE_SQL_PREFIX,
    INSERT_DELETE_RANGE_SQL_VALUE, PreDelRangeQuery, SqlArg,
};
pub use ingest::{IngestIndexItem, IngestRecorder};

use crate::alloc::IdAllocator;
use crate::entry::{ColumnFamily, KvEntry};
use crate::error::{Error, ObjectKind, Result};
use crate::id_map::{DbReplace, DbReplaceMap, TableReplace};
use crate::stats::RewriteStats;
use log::debug;
use logrestore_catalog::{
    DbInfo, DownstreamID, Job, JsonObject, PartitionID, SchemaID, TableID, TableInfo,
};
use logrestore_codec::meta::{
    self, DBS_KEY, DDL_JOB_HISTORY_KEY, MetaFieldCodec, MetaFieldKind, TxnMetaKey,
};
use logrestore_codec::write::{WriteCfValue, WriteType};
use std::sync::Arc;

/// Hook to adjust a table info after its ids are rewritten. The flag
/// tells whether the table info comes from a delete.
pub type AfterTableRewrittenFn = dyn FnMut(bool, &mut TableInfo) + Send;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InfoKind {
    Database,
    Table(SchemaID),
}

pub struct SchemasReplace {
    pub db_replace_map: DbReplaceMap,
    rewrite_ts: u64,
    skip_unsupported_jobs: bool,
    id_allocator: Box<dyn IdAllocator>,
    delete_range_recorder: Box<dyn DeleteRangeRecorder>,
    after_table_rewritten: Option<Box<AfterTableRewrittenFn>>,
    ingest_recorder: IngestRecorder,
    stats: Arc<RewriteStats>,
}

impl SchemasReplace {
    #[inline]
    pub fn new(
        db_replace_map: DbReplaceMap,
        rewrite_ts: u64,
        id_allocator: Box<dyn IdAllocator>,
        delete_range_recorder: Box<dyn DeleteRangeRecorder>,
    ) -> Self {
        SchemasReplace {
            db_replace_map,
            rewrite_ts,
            skip_unsupported_jobs: true,
            id_allocator,
            delete_range_recorder,
            after_table_rewritten: None,
            ingest_recorder: IngestRecorder::new(),
            stats: Arc::new(RewriteStats::default()),
        }
    }

    #[inline]
    pub fn with_after_table_rewritten<F>(mut self, f: F) -> Self
    where
        F: FnMut(bool, &mut TableInfo) + Send + 'static,
    {
        self.after_table_rewritten = Some(Box::new(f));
        self
    }

    #[inline]
    pub fn with_skip_unsupported_jobs(mut self, skip_unsupported_jobs: bool) -> Self {
        self.skip_unsupported_jobs = skip_unsupported_jobs;
        self
    }

    #[inline]
    pub fn with_stats(mut self, stats: Arc<RewriteStats>) -> Self {
        self.stats = stats;
        self
    }

    #[inline]
    pub fn rewrite_ts(&self) -> u64 {
        self.rewrite_ts
    }

    #[inline]
    pub fn stats(&self) -> &Arc<RewriteStats> {
        &self.stats
    }

    #[inline]
    pub fn ingest_recorder(&self) -> &IngestRecorder {
        &self.ingest_recorder
    }

    /// Translate recorded ingest indexes to downstream table ids.
    #[inline]
    pub fn rewrite_ingest_table_ids(&mut self) {
        self.ingest_recorder.rewrite_table_id(&self.db_replace_map);
    }

    /// Rewrite one meta entry. Returns None if the entry should not be
    /// restored.
    pub fn rewrite_kv_entry(&mut self, entry: &KvEntry, cf: ColumnFamily) -> Result<Option<KvEntry>> {
        if !TxnMetaKey::is_meta_key(&entry.key) {
            return Ok(None);
        }
        let Some(meta_key) = TxnMetaKey::parse_hash_field(&entry.key)? else {
            return Ok(None);
        };
        if meta_key.key == DDL_JOB_HISTORY_KEY {
            if cf == ColumnFamily::Default && !entry.value.is_empty() {
                let job = Job::decode(&entry.value)?;
                self.process_ingest_index_and_delete_range_from_job(&job)?;
            }
            return Ok(None);
        }
        if meta_key.key == DBS_KEY {
            if !meta::is_db_key(&meta_key.field) {
                return Ok(None);
            }
            let value = self.rewrite_value(&entry.value, cf, InfoKind::Database)?;
            let key = self.rewrite_meta_key_for_db(meta_key, cf)?;
            return Ok(Some(KvEntry { key, value }));
        }
        if !meta::is_db_key(&meta_key.key) {
            return Ok(None);
        }
        let Some(kind) = MetaFieldKind::detect(&meta_key.field) else {
            return Ok(None);
        };
        let value = if kind == MetaFieldKind::Table {
            let db_id = meta::parse_db_key(&meta_key.key)?;
            self.rewrite_value(&entry.value, cf, InfoKind::Table(db_id))?
        } else {
            entry.value.clone()
        };
        let key = self.rewrite_meta_key_for_table(meta_key, cf, kind.codec())?;
        Ok(Some(KvEntry { key, value }))
    }

    /// Rewrite key `DBs/DB:<id>`.
    #[inline]
    pub fn rewrite_key_for_db(&self, key: &[u8], cf: ColumnFamily) -> Result<Vec<u8>> {
        let meta_key = TxnMetaKey::parse(key)?;
        self.rewrite_meta_key_for_db(meta_key, cf)
    }

    /// Rewrite key `DB:<id>/<field>:<table_id>` of any table-scoped field.
    #[inline]
    pub fn rewrite_key_for_table(
        &self,
        key: &[u8],
        cf: ColumnFamily,
        codec: MetaFieldCodec,
    ) -> Result<Vec<u8>> {
        let meta_key = TxnMetaKey::parse(key)?;
        self.rewrite_meta_key_for_table(meta_key, cf, codec)
    }

    fn rewrite_meta_key_for_db(&self, mut meta_key: TxnMetaKey, cf: ColumnFamily) -> Result<Vec<u8>> {
        let db_id = meta::parse_db_key(&meta_key.field)?;
        let new_db_id = self
            .db_replace_map
            .db_id(db_id)
            .ok_or(Error::MappingNotFound(ObjectKind::Database, db_id))?;
        meta_key.field = meta::db_key(new_db_id);
        self.stamp_ts(&mut meta_key, cf);
        Ok(meta_key.encode())
    }

    fn rewrite_meta_key_for_table(
        &self,
        mut meta_key: TxnMetaKey,
        cf: ColumnFamily,
        codec: MetaFieldCodec,
    ) -> Result<Vec<u8>> {
        let db_id = meta::parse_db_key(&meta_key.key)?;
        let table_id = (codec.decode)(&meta_key.field)?;
        let new_db_id = self
            .db_replace_map
            .db_id(db_id)
            .ok_or(Error::MappingNotFound(ObjectKind::Database, db_id))?;
        let new_table_id = self
            .db_replace_map
            .table_id(db_id, table_id)
            .ok_or(Error::MappingNotFound(ObjectKind::Table, table_id))?;
        meta_key.key = meta::db_key(new_db_id);
        meta_key.field = (codec.encode)(new_table_id);
        self.stamp_ts(&mut meta_key, cf);
        Ok(meta_key.encode())
    }

    /// Commit markers of all rewritten keys share the session timestamp.
    #[inline]
    fn stamp_ts(&self, meta_key: &mut TxnMetaKey, cf: ColumnFamily) {
        if cf == ColumnFamily::Write {
            meta_key.ts = self.rewrite_ts;
        }
    }

    fn rewrite_value(&mut self, value: &[u8], cf: ColumnFamily, kind: InfoKind) -> Result<Vec<u8>> {
        match cf {
            ColumnFamily::Default => {
                if value.is_empty() {
                    return Ok(vec![]);
                }
                self.rewrite_info(kind, value, false)
            }
            ColumnFamily::Write => {
                let mut write = WriteCfValue::parse(value)?;
                let Some(short_value) = write.short_value.take() else {
                    return Ok(value.to_vec());
                };
                let deleted = write.write_type == WriteType::Delete;
                write.short_value = Some(self.rewrite_info(kind, &short_value, deleted)?);
                Ok(write.encode()?)
            }
        }
    }

    #[inline]
    fn rewrite_info(&mut self, kind: InfoKind, value: &[u8], deleted: bool) -> Result<Vec<u8>> {
        match kind {
            InfoKind::Database => self.rewrite_db_info(value),
            InfoKind::Table(db_id) => self.rewrite_table_info_with(value, db_id, deleted),
        }
    }

    /// Rewrite id of a database info. A database never seen before gets
    /// a new global id.
    pub fn rewrite_db_info(&mut self, value: &[u8]) -> Result<Vec<u8>> {
        let mut db_info = DbInfo::from_json(value)?;
        db_info.id = self.ensure_db(db_info.id, &db_info.db_name.o)?;
        Ok(db_info.to_json()?)
    }

    /// Rewrite ids of a table info and its partitions. TTL is disabled
    /// on the restored table.
    #[inline]
    pub fn rewrite_table_info(&mut self, value: &[u8], db_id: SchemaID) -> Result<Vec<u8>> {
        self.rewrite_table_info_with(value, db_id, false)
    }

    fn rewrite_table_info_with(
        &mut self,
        value: &[u8],
        db_id: SchemaID,
        deleted: bool,
    ) -> Result<Vec<u8>> {
        let mut table_info = TableInfo::from_json(value)?;
        let table_id = table_info.id;
        self.ensure_db(db_id, "")?;
        table_info.id = self.ensure_table(db_id, table_id, &table_info.name.o)?;
        if let Some(partition) = table_info.partition.as_mut() {
            for def in partition.all_definitions_mut() {
                def.id = self.ensure_partition(db_id, table_id, def.id)?;
            }
        }
        if let Some(ttl_info) = table_info.ttl_info.as_mut() {
            ttl_info.enable = false;
        }
        if let Some(f) = self.after_table_rewritten.as_mut() {
            f(deleted, &mut table_info);
        }
        Ok(table_info.to_json()?)
    }

    fn ensure_db(&mut self, db_id: SchemaID, name: &str) -> Result<DownstreamID> {
        if let Some(id) = self.db_replace_map.db_id(db_id) {
            return Ok(id);
        }
        let new_id = self.id_allocator.next_id()?;
        debug!("allocate id {} for database {}", new_id, db_id);
        match self.db_replace_map.db_mut(db_id) {
            Some(db) => db.db_id = new_id,
            None => {
                self.db_replace_map
                    .insert_db(db_id, DbReplace::new(name, new_id));
            }
        }
        Ok(new_id)
    }

    fn ensure_table(&mut self, db_id: SchemaID, table_id: TableID, name: &str) -> Result<DownstreamID> {
        if let Some(id) = self.db_replace_map.table_id(db_id, table_id) {
            return Ok(id);
        }
        let new_id = self.id_allocator.next_id()?;
        debug!("allocate id {} for table {}", new_id, table_id);
        match self.db_replace_map.table_mut(db_id, table_id) {
            Some(table) => table.table_id = new_id,
            None => {
                self.db_replace_map
                    .insert_table(db_id, table_id, TableReplace::new(name, new_id))?;
            }
        }
        Ok(new_id)
    }

    fn ensure_partition(
        &mut self,
        db_id: SchemaID,
        table_id: TableID,
        partition_id: PartitionID,
    ) -> Result<DownstreamID> {
        if let Some(id) = self
            .db_replace_map
            .partition_id(db_id, table_id, partition_id)
        {
            return Ok(id);
        }
        let new_id = self.id_allocator.next_id()?;
        debug!("allocate id {} for partition {}", new_id, partition_id);
        self.db_replace_map
            .insert_partition(db_id, table_id, partition_id, new_id)?;
        Ok(new_id)
    }
}
