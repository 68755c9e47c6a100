//! Typed arguments of finished jobs.
//!
//! Only arguments that identify physical data left behind by a job are
//! decoded. V1 jobs store them as positional arrays, V2 jobs as objects.
use crate::error::{Error, Result};
use crate::info::null_as_default;
use crate::job::{ActionType, JobVersion};
use crate::{IndexID, ObjID, PartitionID, TableID};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DropSchemaArgs {
    /// Tables and partitions dropped with the schema.
    #[serde(default, deserialize_with = "null_as_default")]
    pub all_dropped_table_ids: Vec<TableID>,
}

/// Arguments of drop table and truncate table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DropTableArgs {
    #[serde(default, deserialize_with = "null_as_default")]
    pub old_partition_ids: Vec<PartitionID>,
}

/// Arguments of jobs replacing some physical tables of a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TablePartitionArgs {
    #[serde(default, deserialize_with = "null_as_default")]
    pub old_physical_tbl_ids: Vec<ObjID>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddIndexArgs {
    pub index_ids: Vec<IndexID>,
    pub is_primary: bool,
    pub partition_ids: Vec<PartitionID>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropIndexArgs {
    pub index_ids: Vec<IndexID>,
    pub partition_ids: Vec<PartitionID>,
}

/// Indexes removed by drop column or modify column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IndexesOfColumnArgs {
    #[serde(default, deserialize_with = "null_as_default")]
    pub index_ids: Vec<IndexID>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub partition_ids: Vec<PartitionID>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishedArgs {
    DropSchema(DropSchemaArgs),
    DropTable(DropTableArgs),
    TablePartition(TablePartitionArgs),
    AddIndex(AddIndexArgs),
    DropIndex(DropIndexArgs),
    IndexesOfColumn(IndexesOfColumnArgs),
    /// Arguments live in sub-jobs.
    MultiSchemaChange,
    /// The job leaves no physical data behind.
    NoRanges,
}

#[derive(Debug, Default, Deserialize)]
struct IndexArgV2 {
    #[serde(default)]
    index_id: IndexID,
    #[serde(default)]
    is_pk: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ModifyIndexArgsV2 {
    #[serde(default, deserialize_with = "null_as_default")]
    index_args: Vec<IndexArgV2>,
    #[serde(default, deserialize_with = "null_as_default")]
    partition_ids: Vec<PartitionID>,
}

/// Decode arguments of a finished job of given type.
pub fn decode_finished_args(
    action: ActionType,
    version: JobVersion,
    raw: &Value,
) -> Result<FinishedArgs> {
    let args = match action {
        ActionType::DropSchema => FinishedArgs::DropSchema(match version {
            JobVersion::V1 => DropSchemaArgs {
                all_dropped_table_ids: V1Args::new(action, raw)?.ids(0)?,
            },
            JobVersion::V2 => decode_v2(action, raw)?,
        }),
        ActionType::DropTable | ActionType::TruncateTable => {
            FinishedArgs::DropTable(match version {
                // start key, old partition ids, placement rule ids.
                JobVersion::V1 => DropTableArgs {
                    old_partition_ids: V1Args::new(action, raw)?.ids(1)?,
                },
                JobVersion::V2 => decode_v2(action, raw)?,
            })
        }
        ActionType::DropTablePartition
        | ActionType::TruncateTablePartition
        | ActionType::ReorganizePartition
        | ActionType::RemovePartitioning
        | ActionType::AlterTablePartitioning => FinishedArgs::TablePartition(match version {
            JobVersion::V1 => TablePartitionArgs {
                old_physical_tbl_ids: V1Args::new(action, raw)?.ids(0)?,
            },
            JobVersion::V2 => decode_v2(action, raw)?,
        }),
        ActionType::AddIndex | ActionType::AddPrimaryKey | ActionType::AddVectorIndex => {
            let is_pk_action = action == ActionType::AddPrimaryKey;
            FinishedArgs::AddIndex(match version {
                // index id(s), if exists, partition ids.
                JobVersion::V1 => {
                    let args = V1Args::new(action, raw)?;
                    AddIndexArgs {
                        index_ids: args.ids(0)?,
                        is_primary: is_pk_action,
                        partition_ids: args.ids(2)?,
                    }
                }
                JobVersion::V2 => {
                    let args: ModifyIndexArgsV2 = decode_v2(action, raw)?;
                    AddIndexArgs {
                        is_primary: is_pk_action || args.index_args.iter().any(|a| a.is_pk),
                        index_ids: args.index_args.iter().map(|a| a.index_id).collect(),
                        partition_ids: args.partition_ids,
                    }
                }
            })
        }
        ActionType::DropIndex | ActionType::DropPrimaryKey => {
            FinishedArgs::DropIndex(match version {
                // index name(s), if exists, index id(s), partition ids.
                JobVersion::V1 => {
                    let args = V1Args::new(action, raw)?;
                    DropIndexArgs {
                        index_ids: args.ids(2)?,
                        partition_ids: args.ids(3)?,
                    }
                }
                JobVersion::V2 => {
                    let args: ModifyIndexArgsV2 = decode_v2(action, raw)?;
                    DropIndexArgs {
                        index_ids: args.index_args.iter().map(|a| a.index_id).collect(),
                        partition_ids: args.partition_ids,
                    }
                }
            })
        }
        ActionType::DropColumn => FinishedArgs::IndexesOfColumn(match version {
            // column name, if exists, index ids, partition ids.
            JobVersion::V1 => {
                let args = V1Args::new(action, raw)?;
                IndexesOfColumnArgs {
                    index_ids: args.ids(2)?,
                    partition_ids: args.ids(3)?,
                }
            }
            JobVersion::V2 => decode_v2(action, raw)?,
        }),
        ActionType::ModifyColumn => FinishedArgs::IndexesOfColumn(match version {
            JobVersion::V1 => {
                let args = V1Args::new(action, raw)?;
                IndexesOfColumnArgs {
                    index_ids: args.ids(0)?,
                    partition_ids: args.ids(1)?,
                }
            }
            JobVersion::V2 => decode_v2(action, raw)?,
        }),
        ActionType::MultiSchemaChange => FinishedArgs::MultiSchemaChange,
        ActionType::None
        | ActionType::CreateSchema
        | ActionType::CreateTable
        | ActionType::AddColumn
        | ActionType::AddForeignKey
        | ActionType::DropForeignKey
        | ActionType::RebaseAutoID
        | ActionType::RenameTable
        | ActionType::SetDefaultValue
        | ActionType::ShardRowID
        | ActionType::ModifyTableComment
        | ActionType::RenameIndex
        | ActionType::AddTablePartition
        | ActionType::CreateView
        | ActionType::ModifyTableCharsetAndCollate
        | ActionType::DropView
        | ActionType::RecoverTable
        | ActionType::ModifySchemaCharsetAndCollate
        | ActionType::LockTable
        | ActionType::UnlockTable
        | ActionType::RepairTable
        | ActionType::SetTiFlashReplica
        | ActionType::UpdateTiFlashReplicaStatus
        | ActionType::CreateSequence
        | ActionType::AlterSequence
        | ActionType::DropSequence
        | ActionType::AddColumns
        | ActionType::DropColumns
        | ActionType::ModifyTableAutoIDCache
        | ActionType::RebaseAutoRandomBase
        | ActionType::AlterIndexVisibility
        | ActionType::ExchangeTablePartition
        | ActionType::AddCheckConstraint
        | ActionType::DropCheckConstraint
        | ActionType::AlterCheckConstraint
        | ActionType::AlterTableAlterPartition
        | ActionType::RenameTables
        | ActionType::DropIndexes
        | ActionType::AlterTableAttributes
        | ActionType::AlterTablePartitionAttributes
        | ActionType::CreatePlacementPolicy
        | ActionType::AlterPlacementPolicy
        | ActionType::DropPlacementPolicy
        | ActionType::AlterTablePartitionPlacement
        | ActionType::ModifySchemaDefaultPlacement
        | ActionType::AlterTablePlacement
        | ActionType::AlterCacheTable
        | ActionType::AlterTableStatsOptions
        | ActionType::AlterNoCacheTable
        | ActionType::CreateTables
        | ActionType::FlashbackCluster
        | ActionType::RecoverSchema
        | ActionType::AlterTTLInfo
        | ActionType::AlterTTLRemove
        | ActionType::CreateResourceGroup
        | ActionType::AlterResourceGroup
        | ActionType::DropResourceGroup => FinishedArgs::NoRanges,
    };
    Ok(args)
}

#[inline]
fn invalid_args(action: ActionType, reason: impl Into<String>) -> Error {
    Error::InvalidJobArgs {
        action: action.name(),
        reason: reason.into(),
    }
}

#[inline]
fn decode_v2<'a, T: Deserialize<'a> + Default>(action: ActionType, raw: &'a Value) -> Result<T> {
    match raw {
        Value::Null => Ok(T::default()),
        Value::Object(_) => T::deserialize(raw).map_err(|e| invalid_args(action, e.to_string())),
        _ => Err(invalid_args(action, "expect object")),
    }
}

/// Positional arguments. Missing trailing arguments read as empty.
struct V1Args<'a> {
    action: ActionType,
    items: &'a [Value],
}

impl<'a> V1Args<'a> {
    #[inline]
    fn new(action: ActionType, raw: &'a Value) -> Result<Self> {
        let items = match raw {
            Value::Null => &[][..],
            Value::Array(items) => &items[..],
            _ => return Err(invalid_args(action, "expect array")),
        };
        Ok(V1Args { action, items })
    }

    /// Read a single id or a list of ids at given position.
    #[inline]
    fn ids(&self, idx: usize) -> Result<Vec<ObjID>> {
        let as_id = |v: &Value| {
            v.as_i64()
                .ok_or_else(|| invalid_args(self.action, format!("expect id at {idx}, got {v}")))
        };
        match self.items.get(idx) {
            None | Some(Value::Null) => Ok(vec![]),
            Some(Value::Array(vs)) => vs.iter().map(as_id).collect(),
            Some(v) => Ok(vec![as_id(v)?]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_v1_args() {
        let args = decode_finished_args(
            ActionType::AddIndex,
            JobVersion::V1,
            &json!([2, false, [72, 73, 74]]),
        )
        .unwrap();
        assert_eq!(
            args,
            FinishedArgs::AddIndex(AddIndexArgs {
                index_ids: vec![2],
                is_primary: false,
                partition_ids: vec![72, 73, 74],
            })
        );

        let args = decode_finished_args(
            ActionType::DropIndex,
            JobVersion::V1,
            &json!([{"O": "k1", "L": "k1"}, false, 2, []]),
        )
        .unwrap();
        assert_eq!(
            args,
            FinishedArgs::DropIndex(DropIndexArgs {
                index_ids: vec![2],
                partition_ids: vec![],
            })
        );

        let args = decode_finished_args(
            ActionType::DropColumn,
            JobVersion::V1,
            &json!(["", false, [2, 3], [72, 73, 74]]),
        )
        .unwrap();
        assert_eq!(
            args,
            FinishedArgs::IndexesOfColumn(IndexesOfColumnArgs {
                index_ids: vec![2, 3],
                partition_ids: vec![72, 73, 74],
            })
        );

        let args = decode_finished_args(
            ActionType::ModifyColumn,
            JobVersion::V1,
            &json!([[2, 3], []]),
        )
        .unwrap();
        assert_eq!(
            args,
            FinishedArgs::IndexesOfColumn(IndexesOfColumnArgs {
                index_ids: vec![2, 3],
                partition_ids: vec![],
            })
        );

        let args = decode_finished_args(
            ActionType::TruncateTable,
            JobVersion::V1,
            &json!(["dIAAAAAAAABH", [72, 73]]),
        )
        .unwrap();
        assert_eq!(
            args,
            FinishedArgs::DropTable(DropTableArgs {
                old_partition_ids: vec![72, 73],
            })
        );

        let args = decode_finished_args(
            ActionType::AddPrimaryKey,
            JobVersion::V1,
            &Value::Null,
        )
        .unwrap();
        assert_eq!(
            args,
            FinishedArgs::AddIndex(AddIndexArgs {
                index_ids: vec![],
                is_primary: true,
                partition_ids: vec![],
            })
        );
    }

    #[test]
    fn test_v2_args() {
        let args = decode_finished_args(
            ActionType::DropSchema,
            JobVersion::V2,
            &json!({"fk_check": true, "all_dropped_table_ids": [71, 72, 73, 74, 75]}),
        )
        .unwrap();
        assert_eq!(
            args,
            FinishedArgs::DropSchema(DropSchemaArgs {
                all_dropped_table_ids: vec![71, 72, 73, 74, 75],
            })
        );

        let args = decode_finished_args(
            ActionType::DropTable,
            JobVersion::V2,
            &json!({"identity": null, "old_partition_ids": null, "old_rule_ids": null}),
        )
        .unwrap();
        assert_eq!(args, FinishedArgs::DropTable(DropTableArgs::default()));

        let args = decode_finished_args(
            ActionType::ReorganizePartition,
            JobVersion::V2,
            &json!({"old_physical_tbl_ids": [73]}),
        )
        .unwrap();
        assert_eq!(
            args,
            FinishedArgs::TablePartition(TablePartitionArgs {
                old_physical_tbl_ids: vec![73],
            })
        );

        let args = decode_finished_args(
            ActionType::AddIndex,
            JobVersion::V2,
            &json!({
                "index_args": [{"index_id": 2, "is_pk": false}, {"index_id": 3, "is_pk": true}],
                "partition_ids": [72]
            }),
        )
        .unwrap();
        assert_eq!(
            args,
            FinishedArgs::AddIndex(AddIndexArgs {
                index_ids: vec![2, 3],
                is_primary: true,
                partition_ids: vec![72],
            })
        );
    }

    #[test]
    fn test_args_without_ranges() {
        for action in [
            ActionType::CreateTable,
            ActionType::ExchangeTablePartition,
            ActionType::RenameTables,
        ] {
            let args = decode_finished_args(action, JobVersion::V2, &json!({"x": 1})).unwrap();
            assert_eq!(args, FinishedArgs::NoRanges);
        }
        assert_eq!(
            decode_finished_args(ActionType::MultiSchemaChange, JobVersion::V1, &Value::Null)
                .unwrap(),
            FinishedArgs::MultiSchemaChange
        );
    }

    #[test]
    fn test_invalid_args() {
        let res = decode_finished_args(ActionType::DropTable, JobVersion::V1, &json!({"a": 1}));
        assert!(matches!(res, Err(Error::InvalidJobArgs { action: "DropTable", .. })));
        let res = decode_finished_args(ActionType::DropIndex, JobVersion::V1, &json!(["k", false, "x"]));
        assert!(matches!(res, Err(Error::InvalidJobArgs { .. })));
        let res = decode_finished_args(ActionType::DropSchema, JobVersion::V2, &json!([1]));
        assert!(matches!(res, Err(Error::InvalidJobArgs { .. })));
        let res = decode_finished_args(
            ActionType::DropSchema,
            JobVersion::V2,
            &json!({"all_dropped_table_ids": ["a"]}),
        );
        assert!(matches!(res, Err(Error::InvalidJobArgs { .. })));
    }
}
