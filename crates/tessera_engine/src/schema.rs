//! Table schemas and the runtime value model.
//!
//! Schemas are owned by the catalog and shared with the engine via `Arc`;
//! they are serde-serializable because the catalog persists them alongside
//! the rest of the cluster metadata.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::WriteError;

/// Column type system. No floats: values must be totally ordered so that
/// clustering tuples and set/map keys can live in ordered containers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int,
    Bigint,
    Text,
    Blob,
    Counter,
    List(Box<DataType>),
    Set(Box<DataType>),
    Map(Box<DataType>, Box<DataType>),
}

impl DataType {
    pub fn is_counter(&self) -> bool {
        matches!(self, DataType::Counter)
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            DataType::List(_) | DataType::Set(_) | DataType::Map(_, _)
        )
    }
}

/// A runtime column value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Boolean(bool),
    Int(i32),
    Bigint(i64),
    Text(String),
    Blob(Vec<u8>),
    List(Vec<Value>),
    Set(BTreeSet<Value>),
    Map(BTreeMap<Value, Value>),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Signed integer view used by counter deltas and list indexes.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(i64::from(*v)),
            Value::Bigint(v) => Some(*v),
            _ => None,
        }
    }
}

/// One clustering tuple; empty for tables without clustering columns.
pub type Clustering = Vec<Value>;

/// A partition key: one value per partition-key column, in schema order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey(pub Vec<Value>);

impl PartitionKey {
    /// Canonical byte encoding: big-endian length-prefixed components.
    ///
    /// Fails on non-scalar components and on keys whose encoded form is
    /// larger than the u16 wire limit.
    pub fn encode(&self) -> Result<Vec<u8>, WriteError> {
        let mut out = Vec::new();
        for value in &self.0 {
            let component = encode_key_component(value)?;
            out.extend_from_slice(&(component.len() as u32).to_be_bytes());
            out.extend_from_slice(&component);
        }
        if out.len() > usize::from(u16::MAX) {
            return Err(WriteError::KeyTooLarge);
        }
        Ok(out)
    }
}

fn encode_key_component(value: &Value) -> Result<Vec<u8>, WriteError> {
    match value {
        Value::Boolean(v) => Ok(vec![u8::from(*v)]),
        Value::Int(v) => Ok(v.to_be_bytes().to_vec()),
        Value::Bigint(v) => Ok(v.to_be_bytes().to_vec()),
        Value::Text(v) => Ok(v.as_bytes().to_vec()),
        Value::Blob(v) => Ok(v.clone()),
        Value::List(_) | Value::Set(_) | Value::Map(_) => {
            Err(WriteError::InvalidKeyComponent("collection".to_string()))
        }
    }
}

/// Where a column sits in the primary-key/row layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    PartitionKey,
    Clustering,
    Regular,
    Static,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Immutable table layout, owned by the external catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub keyspace: String,
    pub table: String,
    pub partition_key: Vec<ColumnSpec>,
    pub clustering: Vec<ColumnSpec>,
    pub regular: Vec<ColumnSpec>,
    pub statics: Vec<ColumnSpec>,
    /// Legacy dense layout without a row marker.
    pub compact: bool,
}

impl TableSchema {
    pub fn new(
        keyspace: impl Into<String>,
        table: impl Into<String>,
        partition_key: Vec<ColumnSpec>,
        clustering: Vec<ColumnSpec>,
        regular: Vec<ColumnSpec>,
        statics: Vec<ColumnSpec>,
    ) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            partition_key,
            clustering,
            regular,
            statics,
            compact: false,
        }
    }

    pub fn compact(mut self) -> Self {
        self.compact = true;
        self
    }

    pub fn column(&self, name: &str) -> Option<(&ColumnSpec, ColumnKind)> {
        let lookup = |specs: &'_ [ColumnSpec]| specs.iter().position(|c| c.name == name);
        if let Some(idx) = lookup(&self.partition_key) {
            return Some((&self.partition_key[idx], ColumnKind::PartitionKey));
        }
        if let Some(idx) = lookup(&self.clustering) {
            return Some((&self.clustering[idx], ColumnKind::Clustering));
        }
        if let Some(idx) = lookup(&self.regular) {
            return Some((&self.regular[idx], ColumnKind::Regular));
        }
        if let Some(idx) = lookup(&self.statics) {
            return Some((&self.statics[idx], ColumnKind::Static));
        }
        None
    }

    pub fn has_clustering(&self) -> bool {
        !self.clustering.is_empty()
    }

    /// Counter tables hold counters in every non-key column.
    pub fn is_counter_table(&self) -> bool {
        !self.regular.is_empty() && self.regular.iter().all(|c| c.data_type.is_counter())
    }

    /// Regular plus static column specs, in declaration order.
    pub fn value_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.regular.iter().chain(self.statics.iter())
    }
}
