//! JSON schema objects stored as meta values.
//!
//! Only members that carry identifiers or restore-sensitive state are
//! modelled. All other members are kept in `extra`. Encoding writes the
//! modelled members first, then the kept ones in their original order.
//! Absent optional members stay absent.
use crate::error::Result;
use crate::{PartitionID, SchemaID, TableID};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub type Extra = Map<String, Value>;

/// Treat explicit `null` as the default value.
pub(crate) fn null_as_default<'de, D, T>(de: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// Objects encoded as JSON in meta values.
pub trait JsonObject: Serialize + DeserializeOwned {
    #[inline]
    fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    #[inline]
    fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Case-insensitive name, keeps original and lower case form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CIStr {
    #[serde(rename = "O")]
    pub o: String,
    #[serde(rename = "L")]
    pub l: String,
}

impl CIStr {
    #[inline]
    pub fn new(s: &str) -> Self {
        CIStr {
            o: s.to_string(),
            l: s.to_lowercase(),
        }
    }
}

impl fmt::Display for CIStr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.o)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbInfo {
    pub id: SchemaID,
    #[serde(default)]
    pub db_name: CIStr,
    #[serde(flatten)]
    pub extra: Extra,
}

impl DbInfo {
    #[inline]
    pub fn new(id: SchemaID, name: &str) -> Self {
        DbInfo {
            id,
            db_name: CIStr::new(name),
            extra: Extra::new(),
        }
    }
}

impl JsonObject for DbInfo {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: TableID,
    #[serde(default)]
    pub name: CIStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_info: Option<TtlInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiflash_replica: Option<TiFlashReplicaInfo>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl TableInfo {
    #[inline]
    pub fn new(id: TableID, name: &str) -> Self {
        TableInfo {
            id,
            name: CIStr::new(name),
            partition: None,
            ttl_info: None,
            tiflash_replica: None,
            extra: Extra::new(),
        }
    }

    #[inline]
    pub fn is_partitioned(&self) -> bool {
        self.partition
            .as_ref()
            .is_some_and(|p| !p.definitions.is_empty())
    }

    /// Identifiers of all partitions, including the ones being added
    /// or dropped.
    #[inline]
    pub fn partition_ids(&self) -> impl Iterator<Item = PartitionID> + '_ {
        self.partition
            .iter()
            .flat_map(|p| p.all_definitions())
            .map(|d| d.id)
    }
}

impl JsonObject for TableInfo {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionInfo {
    #[serde(default)]
    pub enable: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub definitions: Vec<PartitionDefinition>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub adding_definitions: Vec<PartitionDefinition>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dropping_definitions: Vec<PartitionDefinition>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl PartitionInfo {
    #[inline]
    pub fn all_definitions(&self) -> impl Iterator<Item = &PartitionDefinition> {
        self.definitions
            .iter()
            .chain(&self.adding_definitions)
            .chain(&self.dropping_definitions)
    }

    #[inline]
    pub fn all_definitions_mut(&mut self) -> impl Iterator<Item = &mut PartitionDefinition> {
        self.definitions
            .iter_mut()
            .chain(&mut self.adding_definitions)
            .chain(&mut self.dropping_definitions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionDefinition {
    pub id: PartitionID,
    #[serde(default)]
    pub name: CIStr,
    #[serde(flatten)]
    pub extra: Extra,
}

impl PartitionDefinition {
    #[inline]
    pub fn new(id: PartitionID, name: &str) -> Self {
        PartitionDefinition {
            id,
            name: CIStr::new(name),
            extra: Extra::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtlInfo {
    #[serde(default)]
    pub column: CIStr,
    #[serde(default)]
    pub interval_expr: String,
    #[serde(default)]
    pub interval_time_unit: i32,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub job_interval: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TiFlashReplicaInfo {
    #[serde(rename = "Count", default)]
    pub count: u64,
    #[serde(
        rename = "LocationLabels",
        default,
        deserialize_with = "null_as_default"
    )]
    pub location_labels: Vec<String>,
    #[serde(rename = "Available", default)]
    pub available: bool,
    #[serde(
        rename = "AvailablePartitionIDs",
        default,
        deserialize_with = "null_as_default"
    )]
    pub available_partition_ids: Vec<PartitionID>,
    #[serde(flatten)]
    pub extra: Extra,
}
