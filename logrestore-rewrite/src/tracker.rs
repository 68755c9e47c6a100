//! Replay of meta entries to discover schema objects and grow the
//! id map.
//!
//! A value in default CF is buffered until the commit marker in write CF
//! arrives. Only committed objects update the id map and reach the
//! collector.
//!
//! Objects seen for the first time get negative temporary ids. They are
//! replaced with real global ids in one batch by
//! [`TableMappingManager::replace_temporary_ids`].
use crate::alloc::IdAllocator;
use crate::conf::OrphanCommitPolicy;
use crate::entry::{ColumnFamily, KvEntry};
use crate::error::{Error, Result};
use crate::id_map::{DbReplace, DbReplaceMap, TableReplace};
use crate::stats::RewriteStats;
use log::{debug, info, warn};
use logrestore_catalog::{
    DbInfo, DownstreamID, JsonObject, PartitionID, SchemaID, TableID, TableInfo, UpstreamID,
};
use logrestore_codec::meta::{self, DBS_KEY, TxnMetaKey};
use logrestore_codec::write::{WriteCfValue, WriteType};
use semistr::SemiStr;
use std::collections::HashMap;
use std::sync::Arc;

/// Receives schema objects at the moment they become visible.
pub trait MetaInfoCollector {
    #[inline]
    fn on_database_info(&mut self, _db_id: SchemaID, _db_name: &str, _commit_ts: u64) -> Result<()> {
        Ok(())
    }

    fn on_table_info(
        &mut self,
        db_id: SchemaID,
        table_id: TableID,
        table_info: &TableInfo,
        commit_ts: u64,
    ) -> Result<()>;
}

/// Raw meta key and start timestamp.
type PendingKey = (Vec<u8>, u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaObject {
    Database,
    Table(SchemaID),
}

impl MetaObject {
    #[inline]
    fn classify(key: &TxnMetaKey) -> Result<Option<Self>> {
        if key.key == DBS_KEY && meta::is_db_key(&key.field) {
            return Ok(Some(MetaObject::Database));
        }
        if meta::is_db_key(&key.key) && meta::is_table_key(&key.field) {
            let db_id = meta::parse_db_key(&key.key)?;
            return Ok(Some(MetaObject::Table(db_id)));
        }
        Ok(None)
    }
}

/// Values and held commits stay buffered until their counterpart
/// arrives or [`TableMappingManager::prune_pending`] drops them.
pub struct TableMappingManager {
    db_replace_map: DbReplaceMap,
    // Upstream id of any database, table or partition to its downstream
    // id. A physical table moved by exchange partition keeps its id.
    global_id_map: HashMap<UpstreamID, DownstreamID>,
    temp_id_counter: DownstreamID,
    pending: HashMap<PendingKey, Vec<u8>>,
    held_commits: HashMap<PendingKey, u64>,
    orphan_commit: OrphanCommitPolicy,
    stats: Arc<RewriteStats>,
}

impl Default for TableMappingManager {
    #[inline]
    fn default() -> Self {
        TableMappingManager::new()
    }
}

impl TableMappingManager {
    #[inline]
    pub fn new() -> Self {
        TableMappingManager {
            db_replace_map: DbReplaceMap::new(),
            global_id_map: HashMap::new(),
            temp_id_counter: 0,
            pending: HashMap::new(),
            held_commits: HashMap::new(),
            orphan_commit: OrphanCommitPolicy::default(),
            stats: Arc::new(RewriteStats::default()),
        }
    }

    #[inline]
    pub fn with_orphan_commit(mut self, orphan_commit: OrphanCommitPolicy) -> Self {
        self.orphan_commit = orphan_commit;
        self
    }

    #[inline]
    pub fn with_stats(mut self, stats: Arc<RewriteStats>) -> Self {
        self.stats = stats;
        self
    }

    #[inline]
    pub fn db_replace_map(&self) -> &DbReplaceMap {
        &self.db_replace_map
    }

    #[inline]
    pub fn into_db_replace_map(self) -> DbReplaceMap {
        self.db_replace_map
    }

    #[inline]
    pub fn stats(&self) -> &Arc<RewriteStats> {
        &self.stats
    }

    /// Number of buffered values still waiting for commit.
    #[inline]
    pub fn pending_values(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn held_commits(&self) -> usize {
        self.held_commits.len()
    }

    /// Drop buffered values and held commits with start ts older than
    /// `before_ts`. Returns number of dropped entries.
    pub fn prune_pending(&mut self, before_ts: u64) -> usize {
        let count = self.pending.len() + self.held_commits.len();
        self.pending.retain(|(_, start_ts), _| *start_ts >= before_ts);
        self.held_commits
            .retain(|(_, start_ts), _| *start_ts >= before_ts);
        let pruned = count - self.pending.len() - self.held_commits.len();
        if pruned > 0 {
            debug!("prune {} pending entries before ts {}", pruned, before_ts);
        }
        pruned
    }

    /// Seed with a mapping computed before replay.
    pub fn merge_base_db_replace(&mut self, base: DbReplaceMap) {
        for (db_id, db) in base.iter() {
            self.seed_global_id(*db_id, db.db_id);
            for (table_id, table) in &db.table_map {
                self.seed_global_id(*table_id, table.table_id);
                for (partition_id, downstream_id) in &table.partition_map {
                    self.seed_global_id(*partition_id, *downstream_id);
                }
            }
        }
        info!("merge base id map of {} databases", base.len());
        self.db_replace_map.merge(base);
    }

    #[inline]
    fn seed_global_id(&mut self, upstream_id: UpstreamID, downstream_id: DownstreamID) {
        if downstream_id != 0 {
            self.global_id_map.entry(upstream_id).or_insert(downstream_id);
        }
    }

    /// Consume one entry of the meta key space. Entries other than
    /// database and table infos are ignored.
    pub fn parse_meta_kv_and_update_id_mapping(
        &mut self,
        entry: &KvEntry,
        cf: ColumnFamily,
        collector: &mut dyn MetaInfoCollector,
    ) -> Result<()> {
        if !TxnMetaKey::is_meta_key(&entry.key) {
            return Ok(());
        }
        let Some(key) = TxnMetaKey::parse_hash_field(&entry.key)? else {
            return Ok(());
        };
        let Some(object) = MetaObject::classify(&key)? else {
            return Ok(());
        };
        match cf {
            ColumnFamily::Default => {
                let pending_key = (key.encode_raw(), key.ts);
                if let Some(commit_ts) = self.held_commits.remove(&pending_key) {
                    return self.apply_value(object, &entry.value, commit_ts, collector);
                }
                self.pending.insert(pending_key, entry.value.clone());
                Ok(())
            }
            ColumnFamily::Write => {
                let commit_ts = key.ts;
                let write = WriteCfValue::parse(&entry.value)?;
                let pending_key = (key.encode_raw(), write.start_ts);
                let buffered = self.pending.remove(&pending_key);
                if write.write_type != WriteType::Put {
                    return Ok(());
                }
                match write.short_value.or(buffered) {
                    Some(value) => self.apply_value(object, &value, commit_ts, collector),
                    None => {
                        self.on_orphan_commit(pending_key, commit_ts);
                        Ok(())
                    }
                }
            }
        }
    }

    fn on_orphan_commit(&mut self, pending_key: PendingKey, commit_ts: u64) {
        match self.orphan_commit {
            OrphanCommitPolicy::Hold => {
                debug!(
                    "hold commit at {}, value of start ts {} not arrived",
                    commit_ts, pending_key.1
                );
                RewriteStats::incr(&self.stats.held_commits, 1);
                self.held_commits.insert(pending_key, commit_ts);
            }
            OrphanCommitPolicy::Drop => {
                warn!(
                    "drop commit at {}, value of start ts {} not found",
                    commit_ts, pending_key.1
                );
                RewriteStats::incr(&self.stats.dropped_orphan_commits, 1);
            }
        }
    }

    fn apply_value(
        &mut self,
        object: MetaObject,
        value: &[u8],
        commit_ts: u64,
        collector: &mut dyn MetaInfoCollector,
    ) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        match object {
            MetaObject::Database => {
                let db_info = DbInfo::from_json(value)?;
                self.record_db(db_info.id, &db_info.db_name.o);
                collector.on_database_info(db_info.id, &db_info.db_name.o, commit_ts)
            }
            MetaObject::Table(db_id) => {
                let table_info = TableInfo::from_json(value)?;
                self.record_table(db_id, &table_info);
                collector.on_table_info(db_id, table_info.id, &table_info, commit_ts)
            }
        }
    }

    #[inline]
    fn downstream_id(&mut self, upstream_id: UpstreamID) -> DownstreamID {
        if let Some(id) = self.global_id_map.get(&upstream_id) {
            return *id;
        }
        self.temp_id_counter -= 1;
        let id = self.temp_id_counter;
        self.global_id_map.insert(upstream_id, id);
        id
    }

    fn record_db(&mut self, db_id: SchemaID, name: &str) {
        if let Some(db) = self.db_replace_map.db_mut(db_id) {
            db.name = SemiStr::new(name);
            return;
        }
        let downstream_id = self.downstream_id(db_id);
        debug!("new database {} -> {}", db_id, downstream_id);
        self.db_replace_map
            .insert_db(db_id, DbReplace::new(name, downstream_id));
    }

    fn record_table(&mut self, db_id: SchemaID, table_info: &TableInfo) {
        if self.db_replace_map.db(db_id).is_none() {
            let downstream_id = self.downstream_id(db_id);
            self.db_replace_map
                .insert_db(db_id, DbReplace::new("", downstream_id));
        }
        let table_id = match self.db_replace_map.table_id(db_id, table_info.id) {
            Some(id) => id,
            None => self.downstream_id(table_info.id),
        };
        let mut partitions: Vec<(PartitionID, DownstreamID)> = vec![];
        for partition_id in table_info.partition_ids() {
            let downstream_id = match self
                .db_replace_map
                .partition_id(db_id, table_info.id, partition_id)
            {
                Some(id) => id,
                None => self.downstream_id(partition_id),
            };
            partitions.push((partition_id, downstream_id));
        }
        let Some(db) = self.db_replace_map.db_mut(db_id) else {
            return;
        };
        let table = db
            .table_map
            .entry(table_info.id)
            .or_insert_with(|| TableReplace::new(&table_info.name.o, table_id));
        table.name = SemiStr::new(&table_info.name.o);
        if table.table_id == 0 {
            table.table_id = table_id;
        }
        for (partition_id, downstream_id) in partitions {
            table
                .partition_map
                .entry(partition_id)
                .or_insert(downstream_id);
        }
    }

    /// Replace all temporary ids with ids from the allocator.
    pub fn replace_temporary_ids(&mut self, allocator: &mut dyn IdAllocator) -> Result<()> {
        let mut temp_ids: Vec<DownstreamID> = self
            .global_id_map
            .values()
            .copied()
            .filter(|id| *id < 0)
            .collect();
        if temp_ids.is_empty() {
            return Ok(());
        }
        // -1 first, in order of discovery.
        temp_ids.sort_unstable_by(|a, b| b.cmp(a));
        temp_ids.dedup();
        let real_ids = allocator.alloc_ids(temp_ids.len())?;
        if real_ids.len() != temp_ids.len() {
            return Err(Error::IdAllocation(format!(
                "require {} ids, got {}",
                temp_ids.len(),
                real_ids.len()
            )));
        }
        let replace: HashMap<DownstreamID, DownstreamID> =
            temp_ids.iter().copied().zip(real_ids).collect();
        let fix = |id: &mut DownstreamID| {
            if let Some(real_id) = replace.get(id) {
                *id = *real_id;
            }
        };
        self.global_id_map.values_mut().for_each(fix);
        for (_, db) in self.db_replace_map.iter_mut() {
            fix(&mut db.db_id);
            for table in db.table_map.values_mut() {
                fix(&mut table.table_id);
                table.partition_map.values_mut().for_each(fix);
            }
        }
        info!("replace {} temporary ids", replace.len());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::alloc::SequentialIdAllocator;
    use logrestore_catalog::{PartitionDefinition, PartitionInfo};
    use logrestore_codec::memcmp::{Desc, GroupedBytes, MemCmpFormat};
    use logrestore_codec::meta::{db_key, table_key};
    use std::collections::BTreeMap;

    #[derive(Default)]
    pub(crate) struct MockMetaInfoCollector {
        pub dbs: BTreeMap<SchemaID, String>,
        pub tables: BTreeMap<SchemaID, BTreeMap<TableID, (TableInfo, u64)>>,
    }

    impl MetaInfoCollector for MockMetaInfoCollector {
        fn on_database_info(&mut self, db_id: SchemaID, db_name: &str, _commit_ts: u64) -> Result<()> {
            self.dbs.insert(db_id, db_name.to_string());
            Ok(())
        }

        fn on_table_info(
            &mut self,
            db_id: SchemaID,
            table_id: TableID,
            table_info: &TableInfo,
            commit_ts: u64,
        ) -> Result<()> {
            self.tables
                .entry(db_id)
                .or_default()
                .insert(table_id, (table_info.clone(), commit_ts));
            Ok(())
        }
    }

    pub(crate) fn default_cf_entry(key: &[u8], field: &[u8], start_ts: u64, value: Vec<u8>) -> KvEntry {
        KvEntry::new(TxnMetaKey::new(key, field, start_ts).encode(), value)
    }

    pub(crate) fn write_cf_entry(
        key: &[u8],
        field: &[u8],
        start_ts: u64,
        commit_ts: u64,
        write_type: WriteType,
    ) -> KvEntry {
        let value = WriteCfValue::new(write_type, start_ts, None).encode().unwrap();
        KvEntry::new(TxnMetaKey::new(key, field, commit_ts).encode(), value)
    }

    /// Entry of a string meta key, which has no hash field.
    pub(crate) fn string_meta_entry(key: &[u8], ts: u64, value: Vec<u8>) -> KvEntry {
        let mut raw = vec![b'm'];
        GroupedBytes(key).extend_mcf_to(&mut raw);
        (b's' as u64).extend_mcf_to(&mut raw);
        let mut encoded = GroupedBytes(&raw).to_mcf();
        Desc(ts).extend_mcf_to(&mut encoded);
        KvEntry::new(encoded, value)
    }

    fn partitioned_table(id: TableID, name: &str, partitions: &[(PartitionID, &str)]) -> TableInfo {
        let mut table = TableInfo::new(id, name);
        table.partition = Some(PartitionInfo {
            enable: true,
            definitions: partitions
                .iter()
                .map(|(id, name)| PartitionDefinition::new(*id, name))
                .collect(),
            ..Default::default()
        });
        table
    }

    #[test]
    fn test_commit_makes_table_visible() {
        let mut tm = TableMappingManager::new();
        let mut collector = MockMetaInfoCollector::default();
        let table = partitioned_table(101, "t1", &[(102, "p0"), (103, "p1")]);
        let ts = 400036290571534337;

        let entry = default_cf_entry(&db_key(100), &table_key(101), ts, table.to_json().unwrap());
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Default, &mut collector)
            .unwrap();
        assert!(collector.tables.is_empty());
        assert!(tm.db_replace_map().is_empty());
        assert_eq!(tm.pending_values(), 1);

        let entry = write_cf_entry(&db_key(100), &table_key(101), ts, ts + 1, WriteType::Put);
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Write, &mut collector)
            .unwrap();
        assert_eq!(tm.pending_values(), 0);
        let (observed, commit_ts) = &collector.tables[&100][&101];
        assert_eq!(observed, &table);
        assert_eq!(*commit_ts, ts + 1);

        let map = tm.db_replace_map();
        assert!(map.db_id(100).unwrap() < 0);
        let t = map.table(100, 101).unwrap();
        assert!(t.table_id < 0);
        assert_eq!(t.partition_map.len(), 2);

        let mut alloc = SequentialIdAllocator::new(1000);
        tm.replace_temporary_ids(&mut alloc).unwrap();
        let map = tm.db_replace_map();
        // ids are assigned in order of discovery.
        assert_eq!(map.db_id(100), Some(1000));
        assert_eq!(map.table_id(100, 101), Some(1001));
        assert_eq!(map.partition_id(100, 101, 102), Some(1002));
        assert_eq!(map.partition_id(100, 101, 103), Some(1003));

        // nothing left to replace.
        tm.replace_temporary_ids(&mut alloc).unwrap();
        assert_eq!(alloc.peek(), 1004);
    }

    #[test]
    fn test_uncommitted_value_is_invisible() {
        let mut tm = TableMappingManager::new();
        let mut collector = MockMetaInfoCollector::default();
        let value = TableInfo::new(57, "t").to_json().unwrap();
        let entry = default_cf_entry(&db_key(1), &table_key(57), 10, value);
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Default, &mut collector)
            .unwrap();

        // commit of another start ts.
        let entry = write_cf_entry(&db_key(1), &table_key(57), 9, 11, WriteType::Put);
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Write, &mut collector)
            .unwrap();
        // rollback of the write.
        let entry = write_cf_entry(&db_key(1), &table_key(57), 10, 10, WriteType::Rollback);
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Write, &mut collector)
            .unwrap();

        assert!(collector.tables.is_empty());
        assert!(tm.db_replace_map().is_empty());
        assert_eq!(tm.pending_values(), 0);
        assert_eq!(tm.stats().snapshot().dropped_orphan_commits, 1);
    }

    #[test]
    fn test_short_value_and_database() {
        let mut tm = TableMappingManager::new();
        let mut collector = MockMetaInfoCollector::default();
        let value = DbInfo::new(5, "db5").to_json().unwrap();
        let write = WriteCfValue::new(WriteType::Put, 20, Some(value)).encode().unwrap();
        let entry = KvEntry::new(TxnMetaKey::new(DBS_KEY, db_key(5), 21).encode(), write);
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Write, &mut collector)
            .unwrap();
        assert_eq!(collector.dbs[&5], "db5");
        assert!(tm.db_replace_map().db(5).is_some());

        // other meta entries are ignored.
        let entry = default_cf_entry(&db_key(5), &meta::auto_table_id_key(9), 20, b"100".to_vec());
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Default, &mut collector)
            .unwrap();
        let entry = KvEntry::new(b"t\x80\x00\x00\x00\x00\x00\x00\x01".to_vec(), b"x".to_vec());
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Default, &mut collector)
            .unwrap();
        assert_eq!(tm.pending_values(), 0);
    }

    #[test]
    fn test_string_meta_key_is_ignored() {
        let mut tm = TableMappingManager::new();
        let mut collector = MockMetaInfoCollector::default();
        let entry = string_meta_entry(b"NextGlobalID", 20, b"120".to_vec());
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Default, &mut collector)
            .unwrap();
        let write = WriteCfValue::new(WriteType::Put, 20, Some(b"120".to_vec()))
            .encode()
            .unwrap();
        let entry = string_meta_entry(b"NextGlobalID", 21, write);
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Write, &mut collector)
            .unwrap();
        assert_eq!(tm.pending_values(), 0);
        assert_eq!(tm.held_commits(), 0);
        assert!(tm.db_replace_map().is_empty());
        assert_eq!(tm.stats().snapshot().dropped_orphan_commits, 0);
    }

    #[test]
    fn test_hold_orphan_commit() {
        let mut tm = TableMappingManager::new().with_orphan_commit(OrphanCommitPolicy::Hold);
        let mut collector = MockMetaInfoCollector::default();
        let entry = write_cf_entry(&db_key(1), &table_key(57), 10, 12, WriteType::Put);
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Write, &mut collector)
            .unwrap();
        assert_eq!(tm.held_commits(), 1);
        assert!(collector.tables.is_empty());

        let value = TableInfo::new(57, "t").to_json().unwrap();
        let entry = default_cf_entry(&db_key(1), &table_key(57), 10, value);
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Default, &mut collector)
            .unwrap();
        assert_eq!(tm.held_commits(), 0);
        assert_eq!(tm.pending_values(), 0);
        assert_eq!(collector.tables[&1][&57].1, 12);
        assert_eq!(tm.stats().snapshot().held_commits, 1);
    }

    #[test]
    fn test_prune_pending() {
        let mut tm = TableMappingManager::new().with_orphan_commit(OrphanCommitPolicy::Hold);
        let mut collector = MockMetaInfoCollector::default();
        for start_ts in [10, 20] {
            let value = TableInfo::new(57, "t").to_json().unwrap();
            let entry = default_cf_entry(&db_key(1), &table_key(57), start_ts, value);
            tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Default, &mut collector)
                .unwrap();
        }
        let entry = write_cf_entry(&db_key(1), &table_key(58), 15, 16, WriteType::Put);
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Write, &mut collector)
            .unwrap();
        assert_eq!((tm.pending_values(), tm.held_commits()), (2, 1));

        assert_eq!(tm.prune_pending(18), 2);
        assert_eq!((tm.pending_values(), tm.held_commits()), (1, 0));
        assert_eq!(tm.prune_pending(18), 0);

        // the kept value still commits.
        let entry = write_cf_entry(&db_key(1), &table_key(57), 20, 21, WriteType::Put);
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Write, &mut collector)
            .unwrap();
        assert_eq!(collector.tables[&1][&57].1, 21);
    }

    #[test]
    fn test_invalid_values() {
        let mut tm = TableMappingManager::new();
        let mut collector = MockMetaInfoCollector::default();
        let entry = default_cf_entry(&db_key(1), &table_key(57), 10, b"{oops".to_vec());
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Default, &mut collector)
            .unwrap();
        let entry = write_cf_entry(&db_key(1), &table_key(57), 10, 11, WriteType::Put);
        let res = tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Write, &mut collector);
        assert!(matches!(res, Err(Error::Catalog(_))));

        let entry = KvEntry::new(TxnMetaKey::new(db_key(1), table_key(57), 11).encode(), vec![b'X']);
        let res = tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Write, &mut collector);
        assert!(matches!(res, Err(Error::Codec(_))));
    }

    #[test]
    fn test_merge_base_keeps_known_ids() {
        let mut tm = TableMappingManager::new();
        let base: DbReplaceMap = [(
            100,
            DbReplace::new("db", 200)
                .with_table(101, TableReplace::new("t1", 201).with_partitions([(102, 202)])),
        )]
        .into_iter()
        .collect();
        tm.merge_base_db_replace(base);

        let mut collector = MockMetaInfoCollector::default();
        let table = partitioned_table(101, "t1", &[(102, "p0"), (104, "p2")]);
        let entry = default_cf_entry(&db_key(100), &table_key(101), 5, table.to_json().unwrap());
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Default, &mut collector)
            .unwrap();
        let entry = write_cf_entry(&db_key(100), &table_key(101), 5, 6, WriteType::Put);
        tm.parse_meta_kv_and_update_id_mapping(&entry, ColumnFamily::Write, &mut collector)
            .unwrap();

        let mut alloc = SequentialIdAllocator::new(300);
        tm.replace_temporary_ids(&mut alloc).unwrap();
        let map = tm.into_db_replace_map();
        assert_eq!(map.table_id(100, 101), Some(201));
        assert_eq!(map.partition_id(100, 101, 102), Some(202));
        assert_eq!(map.partition_id(100, 101, 104), Some(300));
    }
}
