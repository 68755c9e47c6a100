use crate::error::{Error, Result};
use crate::{SchemaID, TableID};
use serde::{Deserialize, Serialize};
use serde_json::Value;

macro_rules! action_types {
    ($($name:ident = $code:literal),* $(,)?) => {
        /// Type of a DDL job.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum ActionType {
            $($name = $code),*
        }

        impl ActionType {
            #[inline]
            pub fn name(self) -> &'static str {
                match self {
                    $(ActionType::$name => stringify!($name)),*
                }
            }
        }

        impl TryFrom<i32> for ActionType {
            type Error = Error;
            #[inline]
            fn try_from(code: i32) -> Result<Self> {
                match code {
                    $($code => Ok(ActionType::$name),)*
                    _ => Err(Error::UnsupportedJobType(code)),
                }
            }
        }
    };
}

action_types! {
    None = 0,
    CreateSchema = 1,
    DropSchema = 2,
    CreateTable = 3,
    DropTable = 4,
    AddColumn = 5,
    DropColumn = 6,
    AddIndex = 7,
    DropIndex = 8,
    AddForeignKey = 9,
    DropForeignKey = 10,
    TruncateTable = 11,
    ModifyColumn = 12,
    RebaseAutoID = 13,
    RenameTable = 14,
    SetDefaultValue = 15,
    ShardRowID = 16,
    ModifyTableComment = 17,
    RenameIndex = 18,
    AddTablePartition = 19,
    DropTablePartition = 20,
    CreateView = 21,
    ModifyTableCharsetAndCollate = 22,
    TruncateTablePartition = 23,
    DropView = 24,
    RecoverTable = 25,
    ModifySchemaCharsetAndCollate = 26,
    LockTable = 27,
    UnlockTable = 28,
    RepairTable = 29,
    SetTiFlashReplica = 30,
    UpdateTiFlashReplicaStatus = 31,
    AddPrimaryKey = 32,
    DropPrimaryKey = 33,
    CreateSequence = 34,
    AlterSequence = 35,
    DropSequence = 36,
    AddColumns = 37,
    DropColumns = 38,
    ModifyTableAutoIDCache = 39,
    RebaseAutoRandomBase = 40,
    AlterIndexVisibility = 41,
    ExchangeTablePartition = 42,
    AddCheckConstraint = 43,
    DropCheckConstraint = 44,
    AlterCheckConstraint = 45,
    AlterTableAlterPartition = 46,
    RenameTables = 47,
    DropIndexes = 48,
    AlterTableAttributes = 49,
    AlterTablePartitionAttributes = 50,
    CreatePlacementPolicy = 51,
    AlterPlacementPolicy = 52,
    DropPlacementPolicy = 53,
    AlterTablePartitionPlacement = 54,
    ModifySchemaDefaultPlacement = 55,
    AlterTablePlacement = 56,
    AlterCacheTable = 57,
    AlterTableStatsOptions = 58,
    AlterNoCacheTable = 59,
    CreateTables = 60,
    MultiSchemaChange = 61,
    FlashbackCluster = 62,
    RecoverSchema = 63,
    ReorganizePartition = 64,
    AlterTTLInfo = 65,
    AlterTTLRemove = 67,
    CreateResourceGroup = 68,
    AlterResourceGroup = 69,
    DropResourceGroup = 70,
    AlterTablePartitioning = 71,
    RemovePartitioning = 72,
    AddVectorIndex = 73,
}

/// Serialized as its numeric code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum JobState {
    #[default]
    None,
    Running,
    RollingBack,
    RollbackDone,
    Done,
    Cancelled,
    Synced,
    Cancelling,
    Queueing,
    Paused,
    Pausing,
}

impl TryFrom<i32> for JobState {
    type Error = Error;
    #[inline]
    fn try_from(code: i32) -> Result<Self> {
        let res = match code {
            0 => JobState::None,
            1 => JobState::Running,
            2 => JobState::RollingBack,
            3 => JobState::RollbackDone,
            4 => JobState::Done,
            5 => JobState::Cancelled,
            6 => JobState::Synced,
            7 => JobState::Cancelling,
            8 => JobState::Queueing,
            9 => JobState::Paused,
            10 => JobState::Pausing,
            _ => return Err(Error::UnknownJobState(code)),
        };
        Ok(res)
    }
}

impl From<JobState> for i32 {
    #[inline]
    fn from(state: JobState) -> i32 {
        match state {
            JobState::None => 0,
            JobState::Running => 1,
            JobState::RollingBack => 2,
            JobState::RollbackDone => 3,
            JobState::Done => 4,
            JobState::Cancelled => 5,
            JobState::Synced => 6,
            JobState::Cancelling => 7,
            JobState::Queueing => 8,
            JobState::Paused => 9,
            JobState::Pausing => 10,
        }
    }
}

/// Layout of job arguments.
///
/// V1 stores arguments as a positional JSON array, V2 as a JSON object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum JobVersion {
    #[default]
    V1,
    V2,
}

impl TryFrom<i64> for JobVersion {
    type Error = Error;
    #[inline]
    fn try_from(code: i64) -> Result<Self> {
        match code {
            // jobs written before versioning carry 0.
            0 | 1 => Ok(JobVersion::V1),
            2 => Ok(JobVersion::V2),
            _ => Err(Error::UnknownJobVersion(code)),
        }
    }
}

impl From<JobVersion> for i64 {
    #[inline]
    fn from(version: JobVersion) -> i64 {
        match version {
            JobVersion::V1 => 1,
            JobVersion::V2 => 2,
        }
    }
}

/// How an index build reorganizes data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ReorgType {
    #[default]
    None,
    Txn,
    /// Ingest sorted files directly into storage.
    Ingest,
    TxnMerge,
}

impl TryFrom<u8> for ReorgType {
    type Error = Error;
    #[inline]
    fn try_from(code: u8) -> Result<Self> {
        let res = match code {
            0 => ReorgType::None,
            1 => ReorgType::Txn,
            2 => ReorgType::Ingest,
            3 => ReorgType::TxnMerge,
            _ => return Err(Error::UnknownReorgType(code)),
        };
        Ok(res)
    }
}

impl From<ReorgType> for u8 {
    #[inline]
    fn from(tp: ReorgType) -> u8 {
        match tp {
            ReorgType::None => 0,
            ReorgType::Txn => 1,
            ReorgType::Ingest => 2,
            ReorgType::TxnMerge => 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReorgMeta {
    #[serde(default)]
    pub reorg_tp: ReorgType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubJob {
    #[serde(rename = "type")]
    pub tp: i32,
    #[serde(default)]
    pub raw_args: Value,
    #[serde(default)]
    pub state: JobState,
}

impl SubJob {
    /// Standalone job of the sub-job's type, sharing identity with
    /// its parent.
    #[inline]
    pub fn to_proxy_job(&self, parent: &Job) -> Job {
        Job {
            id: parent.id,
            tp: self.tp,
            schema_id: parent.schema_id,
            table_id: parent.table_id,
            state: self.state,
            version: parent.version,
            raw_args: self.raw_args.clone(),
            multi_schema_info: None,
            reorg_meta: parent.reorg_meta.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiSchemaInfo {
    #[serde(default)]
    pub sub_jobs: Vec<SubJob>,
}

/// A finished DDL job, as kept in the job history.
///
/// The type code is kept raw so that jobs of unknown type still decode
/// and can be reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    #[serde(rename = "type")]
    pub tp: i32,
    #[serde(default)]
    pub schema_id: SchemaID,
    #[serde(default)]
    pub table_id: TableID,
    #[serde(default)]
    pub state: JobState,
    #[serde(default)]
    pub version: JobVersion,
    #[serde(default)]
    pub raw_args: Value,
    #[serde(default)]
    pub multi_schema_info: Option<MultiSchemaInfo>,
    #[serde(default)]
    pub reorg_meta: Option<ReorgMeta>,
}

impl Job {
    #[inline]
    pub fn new(id: i64, action: ActionType, schema_id: SchemaID, table_id: TableID) -> Self {
        Job {
            id,
            tp: action as i32,
            schema_id,
            table_id,
            state: JobState::Synced,
            version: JobVersion::V1,
            raw_args: Value::Null,
            multi_schema_info: None,
            reorg_meta: None,
        }
    }

    #[inline]
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    #[inline]
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    #[inline]
    pub fn action_type(&self) -> Result<ActionType> {
        ActionType::try_from(self.tp)
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        matches!(self.state, JobState::Done | JobState::Synced)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state == JobState::Cancelled
    }

    #[inline]
    pub fn is_rollback_done(&self) -> bool {
        self.state == JobState::RollbackDone
    }

    #[inline]
    pub fn is_ingest(&self) -> bool {
        self.reorg_meta
            .as_ref()
            .is_some_and(|m| m.reorg_tp == ReorgType::Ingest)
    }

    #[inline]
    pub fn sub_jobs(&self) -> &[SubJob] {
        self.multi_schema_info
            .as_ref()
            .map(|m| &m.sub_jobs[..])
            .unwrap_or(&[])
    }
}
