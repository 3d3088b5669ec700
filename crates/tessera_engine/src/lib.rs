//! Write-statement execution engine for the Tessera partitioned row store.
//!
//! The engine turns prepared modification statements (insert/update/delete)
//! into per-partition mutations, and executes conditional statements
//! through a single-round consensus protocol that keeps them linearizable.
//! Parsing, authentication, transport, physical storage and the consensus
//! transport itself live behind the narrow interfaces in [`boundary`].

pub mod boundary;
pub mod condition;
pub mod consistency;
pub mod error;
pub mod executor;
pub mod operation;
pub mod options;
pub mod reconcile;
pub mod report;
pub mod restriction;
pub mod schema;
pub mod update;

pub use boundary::{
    ConsensusBoundary, PartitionSnapshot, ReplicationBoundary, RowSelector, SchemaProvider,
    SnapshotRow, TriggerHook,
};
pub use condition::{ColumnCondition, ConditionOp, Conditions};
pub use consistency::ConsistencyLevel;
pub use error::{ErrorKind, WriteError};
pub use executor::{
    ExecContext, ModificationStatement, StatementAttributes, StatementKind, WriteRuntimeConfig,
};
pub use operation::{Operation, OperationKind, Operations};
pub use options::StatementOptions;
pub use report::{ResultSet, APPLIED_COLUMN};
pub use restriction::{
    ClusteringSelector, KeyRestrictions, RangeBound, Restriction, SliceBound, SliceBounds, Term,
};
pub use schema::{
    Clustering, ColumnKind, ColumnSpec, DataType, PartitionKey, TableSchema, Value,
};
pub use update::{Cell, CellWrite, PartitionUpdate, RowUpdate, UpdateParams, UpdatesCollector};
