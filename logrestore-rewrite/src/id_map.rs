//! Translation of object identifiers from the backed up cluster to the
//! restored cluster.
//!
//! Entries only grow during one restore. A dropped table keeps its
//! mapping because delete ranges of the drop are built from it.
use crate::error::{Error, ObjectKind, Result};
use indexmap::IndexMap;
use indexmap::map::Entry;
use logrestore_catalog::{DownstreamID, PartitionID, SchemaID, TableID, UpstreamID};
use semistr::SemiStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReplace {
    pub name: SemiStr,
    pub table_id: DownstreamID,
    pub partition_map: IndexMap<PartitionID, DownstreamID>,
}

impl TableReplace {
    #[inline]
    pub fn new(name: &str, table_id: DownstreamID) -> Self {
        TableReplace {
            name: SemiStr::new(name),
            table_id,
            partition_map: IndexMap::new(),
        }
    }

    #[inline]
    pub fn with_partitions(
        mut self,
        partitions: impl IntoIterator<Item = (PartitionID, DownstreamID)>,
    ) -> Self {
        self.partition_map.extend(partitions);
        self
    }

    #[inline]
    pub fn partition_id(&self, partition_id: PartitionID) -> Option<DownstreamID> {
        self.partition_map.get(&partition_id).copied()
    }

    /// Downstream physical ids of this table.
    /// A table without partition mapping is its own physical table.
    #[inline]
    pub fn physical_ids(&self) -> Vec<DownstreamID> {
        if self.partition_map.is_empty() {
            return vec![self.table_id];
        }
        self.partition_map.values().copied().collect()
    }

    fn fill_gaps(&mut self, base: TableReplace) {
        if self.table_id == 0 {
            self.table_id = base.table_id;
        }
        for (up, down) in base.partition_map {
            self.partition_map.entry(up).or_insert(down);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbReplace {
    pub name: SemiStr,
    pub db_id: DownstreamID,
    pub table_map: IndexMap<TableID, TableReplace>,
}

impl DbReplace {
    #[inline]
    pub fn new(name: &str, db_id: DownstreamID) -> Self {
        DbReplace {
            name: SemiStr::new(name),
            db_id,
            table_map: IndexMap::new(),
        }
    }

    #[inline]
    pub fn with_table(mut self, table_id: TableID, table: TableReplace) -> Self {
        self.table_map.insert(table_id, table);
        self
    }

    fn fill_gaps(&mut self, base: DbReplace) {
        if self.db_id == 0 {
            self.db_id = base.db_id;
        }
        for (table_id, table) in base.table_map {
            match self.table_map.entry(table_id) {
                Entry::Occupied(mut occ) => occ.get_mut().fill_gaps(table),
                Entry::Vacant(vac) => {
                    vac.insert(table);
                }
            }
        }
    }
}

/// Upstream database id to its replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbReplaceMap(IndexMap<SchemaID, DbReplace>);

impl DbReplaceMap {
    #[inline]
    pub fn new() -> Self {
        DbReplaceMap(IndexMap::new())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&SchemaID, &DbReplace)> {
        self.0.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&SchemaID, &mut DbReplace)> {
        self.0.iter_mut()
    }

    #[inline]
    pub fn db(&self, db_id: SchemaID) -> Option<&DbReplace> {
        self.0.get(&db_id)
    }

    #[inline]
    pub fn db_mut(&mut self, db_id: SchemaID) -> Option<&mut DbReplace> {
        self.0.get_mut(&db_id)
    }

    /// Downstream id of the database. Zero means unknown.
    #[inline]
    pub fn db_id(&self, db_id: SchemaID) -> Option<DownstreamID> {
        self.db(db_id).map(|d| d.db_id).filter(|id| *id != 0)
    }

    #[inline]
    pub fn insert_db(&mut self, db_id: SchemaID, db: DbReplace) -> Option<DbReplace> {
        self.0.insert(db_id, db)
    }

    #[inline]
    pub fn table(&self, db_id: SchemaID, table_id: TableID) -> Option<&TableReplace> {
        self.db(db_id).and_then(|d| d.table_map.get(&table_id))
    }

    #[inline]
    pub fn table_mut(&mut self, db_id: SchemaID, table_id: TableID) -> Option<&mut TableReplace> {
        self.db_mut(db_id)
            .and_then(|d| d.table_map.get_mut(&table_id))
    }

    #[inline]
    pub fn table_id(&self, db_id: SchemaID, table_id: TableID) -> Option<DownstreamID> {
        self.table(db_id, table_id)
            .map(|t| t.table_id)
            .filter(|id| *id != 0)
    }

    /// Set table mapping under an existing database mapping.
    #[inline]
    pub fn insert_table(
        &mut self,
        db_id: SchemaID,
        table_id: TableID,
        table: TableReplace,
    ) -> Result<Option<TableReplace>> {
        let db = self
            .db_mut(db_id)
            .ok_or(Error::MappingNotFound(ObjectKind::Database, db_id))?;
        Ok(db.table_map.insert(table_id, table))
    }

    #[inline]
    pub fn partition_id(
        &self,
        db_id: SchemaID,
        table_id: TableID,
        partition_id: PartitionID,
    ) -> Option<DownstreamID> {
        self.table(db_id, table_id)
            .and_then(|t| t.partition_id(partition_id))
    }

    /// Set partition mapping under an existing table mapping.
    #[inline]
    pub fn insert_partition(
        &mut self,
        db_id: SchemaID,
        table_id: TableID,
        partition_id: PartitionID,
        downstream_id: DownstreamID,
    ) -> Result<Option<DownstreamID>> {
        if self.db(db_id).is_none() {
            return Err(Error::MappingNotFound(ObjectKind::Database, db_id));
        }
        let table = self
            .table_mut(db_id, table_id)
            .ok_or(Error::MappingNotFound(ObjectKind::Table, table_id))?;
        Ok(table.partition_map.insert(partition_id, downstream_id))
    }

    /// Merge a base mapping. Existing downstream ids are never
    /// overwritten, the base only fills gaps.
    pub fn merge(&mut self, base: DbReplaceMap) {
        for (db_id, db) in base.0 {
            match self.0.entry(db_id) {
                Entry::Occupied(mut occ) => occ.get_mut().fill_gaps(db),
                Entry::Vacant(vac) => {
                    vac.insert(db);
                }
            }
        }
    }
}

impl FromIterator<(SchemaID, DbReplace)> for DbReplaceMap {
    #[inline]
    fn from_iter<T: IntoIterator<Item = (SchemaID, DbReplace)>>(iter: T) -> Self {
        DbReplaceMap(iter.into_iter().collect())
    }
}

impl IntoIterator for DbReplaceMap {
    type Item = (SchemaID, DbReplace);
    type IntoIter = indexmap::map::IntoIter<SchemaID, DbReplace>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> DbReplaceMap {
        let t0 = TableReplace::new("t0", 81).with_partitions([(72, 82), (73, 83), (74, 84)]);
        let t1 = TableReplace::new("t1", 85);
        let db = DbReplace::new("db", 80).with_table(71, t0).with_table(75, t1);
        [(70, db)].into_iter().collect()
    }

    #[test]
    fn test_lookup() {
        let map = sample_map();
        assert_eq!(map.db_id(70), Some(80));
        assert_eq!(map.db_id(1), None);
        assert_eq!(map.table_id(70, 71), Some(81));
        assert_eq!(map.table_id(70, 76), None);
        assert_eq!(map.partition_id(70, 71, 73), Some(83));
        assert_eq!(map.partition_id(70, 75, 73), None);
        assert_eq!(map.table(70, 71).unwrap().physical_ids(), vec![82, 83, 84]);
        assert_eq!(map.table(70, 75).unwrap().physical_ids(), vec![85]);
    }

    #[test]
    fn test_insert() {
        let mut map = sample_map();
        assert!(matches!(
            map.insert_table(1, 2, TableReplace::new("t", 3)),
            Err(Error::MappingNotFound(ObjectKind::Database, 1))
        ));
        assert!(map.insert_table(70, 76, TableReplace::new("t2", 86)).unwrap().is_none());
        assert!(matches!(
            map.insert_partition(70, 77, 1, 2),
            Err(Error::MappingNotFound(ObjectKind::Table, 77))
        ));
        assert_eq!(map.insert_partition(70, 76, 90, 91).unwrap(), None);
        assert_eq!(map.partition_id(70, 76, 90), Some(91));
    }

    #[test]
    fn test_merge_fills_gaps() {
        let mut map = sample_map();
        let base_t0 = TableReplace::new("t0", 181).with_partitions([(72, 182), (79, 189)]);
        let base_db = DbReplace::new("db", 180)
            .with_table(71, base_t0)
            .with_table(76, TableReplace::new("t2", 186));
        let mut base: DbReplaceMap = [(70, base_db)].into_iter().collect();
        base.insert_db(90, DbReplace::new("db2", 190));
        map.merge(base);

        assert_eq!(map.db_id(70), Some(80));
        assert_eq!(map.db_id(90), Some(190));
        assert_eq!(map.table_id(70, 71), Some(81));
        assert_eq!(map.table_id(70, 76), Some(186));
        assert_eq!(map.partition_id(70, 71, 72), Some(82));
        assert_eq!(map.partition_id(70, 71, 79), Some(189));
    }
}
