//! Narrow interfaces to the engine's external collaborators.
//!
//! The engine is transport- and storage-agnostic; concrete implementations
//! can sit on gRPC, in-memory fakes, or an embedded store. Execution
//! errors returned by these traits propagate to the caller unchanged.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_paxos::{Ballot, ProposalOutcome};

use crate::consistency::ConsistencyLevel;
use crate::error::WriteError;
use crate::restriction::{ClusteringSelector, SliceBounds};
use crate::schema::{Clustering, PartitionKey, TableSchema, Value};
use crate::update::PartitionUpdate;

/// Row selection for boundary reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowSelector {
    Rows(Vec<Clustering>),
    Slice(SliceBounds),
    Static,
}

impl From<&ClusteringSelector> for RowSelector {
    fn from(selector: &ClusteringSelector) -> Self {
        match selector {
            ClusteringSelector::Tuples(tuples) => RowSelector::Rows(tuples.clone()),
            ClusteringSelector::Slice(bounds) => RowSelector::Slice(bounds.clone()),
            ClusteringSelector::Static => RowSelector::Static,
        }
    }
}

/// Current values of one row, as materialized by a boundary read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SnapshotRow {
    pub columns: BTreeMap<String, Value>,
}

impl SnapshotRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }
}

/// Materialized current state of one partition.
///
/// A partition with no matching rows is represented by the default
/// (empty) snapshot, never by an error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionSnapshot {
    pub static_row: Option<SnapshotRow>,
    pub rows: BTreeMap<Clustering, SnapshotRow>,
}

impl PartitionSnapshot {
    /// The single row a one-row read is expected to return.
    ///
    /// More than one row coming back for a single-row request is an
    /// engine/boundary bug, not a caller mistake.
    pub fn single_row(&self) -> Result<Option<&SnapshotRow>, WriteError> {
        if self.rows.len() > 1 {
            return Err(WriteError::MultiRowSnapshot);
        }
        Ok(self.rows.values().next())
    }
}

/// Schema catalog lookup.
pub trait SchemaProvider: Send + Sync {
    fn lookup(&self, keyspace: &str, table: &str) -> Result<Arc<TableSchema>, WriteError>;
}

/// The plain (non-conditional) replicated read/write path.
///
/// An empty `columns` slice selects every column.
#[async_trait]
pub trait ReplicationBoundary: Send + Sync {
    async fn apply(
        &self,
        updates: Vec<PartitionUpdate>,
        consistency: ConsistencyLevel,
    ) -> Result<(), WriteError>;

    async fn read(
        &self,
        key: &PartitionKey,
        selector: &RowSelector,
        columns: &[String],
        consistency: ConsistencyLevel,
    ) -> Result<PartitionSnapshot, WriteError>;
}

/// The consensus path used by conditional statements.
///
/// An empty `columns` slice selects every column.
#[async_trait]
pub trait ConsensusBoundary: Send + Sync {
    async fn linearizable_read(
        &self,
        key: &PartitionKey,
        selector: &RowSelector,
        columns: &[String],
        serial_consistency: ConsistencyLevel,
    ) -> Result<PartitionSnapshot, WriteError>;

    async fn propose(
        &self,
        ballot: Ballot,
        update: PartitionUpdate,
    ) -> Result<ProposalOutcome, WriteError>;
}

/// Optional derived-mutation augmentation (triggers).
///
/// Must be pure and must not change the target partition key.
pub trait TriggerHook: Send + Sync {
    fn augment(&self, update: PartitionUpdate) -> PartitionUpdate;
}
