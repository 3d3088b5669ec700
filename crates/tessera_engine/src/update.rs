//! Per-partition mutation units.
//!
//! A [`PartitionUpdate`] carries mutations, not final values: appends,
//! counter deltas and the like are resolved by the storage layer against
//! whatever is already on disk. Only read-dependent operations are
//! concretized before they get here.

use std::collections::{BTreeMap, BTreeSet};

use crate::restriction::SliceBounds;
use crate::schema::{Clustering, PartitionKey, Value};

/// One column-level mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CellWrite {
    Tombstone,
    Value(Value),
    ListAppend(Vec<Value>),
    ListPrepend(Vec<Value>),
    SetAdd(BTreeSet<Value>),
    SetRemove(BTreeSet<Value>),
    MapPut(BTreeMap<Value, Value>),
    CounterDelta(i64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub write: CellWrite,
    pub timestamp: i64,
    pub ttl: Option<i32>,
}

/// Timestamp/TTL context for one statement execution.
#[derive(Clone, Copy, Debug)]
pub struct UpdateParams {
    pub timestamp: i64,
    pub ttl: Option<i32>,
}

/// Pending changes to a single row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowUpdate {
    /// Primary-key liveness marker written by inserts.
    pub liveness: Option<i64>,
    /// Row tombstone timestamp.
    pub deleted_at: Option<i64>,
    pub cells: BTreeMap<String, Cell>,
}

impl RowUpdate {
    pub fn is_empty(&self) -> bool {
        self.liveness.is_none() && self.deleted_at.is_none() && self.cells.is_empty()
    }

    pub fn mark_live(&mut self, params: &UpdateParams) {
        self.liveness = Some(params.timestamp);
    }

    pub fn delete(&mut self, params: &UpdateParams) {
        self.deleted_at = Some(params.timestamp);
    }

    /// Stores a cell write, merging with any write this statement already
    /// produced for the column. Mergeable delta pairs coalesce; anything
    /// else is last-write-wins within the statement.
    pub fn set_cell(&mut self, column: &str, write: CellWrite, params: &UpdateParams) {
        match self.cells.get_mut(column) {
            Some(existing) => {
                existing.write = merge_writes(std::mem::replace(&mut existing.write, CellWrite::Tombstone), write);
                existing.timestamp = params.timestamp;
                existing.ttl = params.ttl;
            }
            None => {
                self.cells.insert(
                    column.to_string(),
                    Cell {
                        write,
                        timestamp: params.timestamp,
                        ttl: params.ttl,
                    },
                );
            }
        }
    }
}

fn merge_writes(previous: CellWrite, next: CellWrite) -> CellWrite {
    match (previous, next) {
        (CellWrite::ListAppend(mut a), CellWrite::ListAppend(b)) => {
            a.extend(b);
            CellWrite::ListAppend(a)
        }
        (CellWrite::ListPrepend(a), CellWrite::ListPrepend(mut b)) => {
            // Later prepends land closer to the head.
            b.extend(a);
            CellWrite::ListPrepend(b)
        }
        (CellWrite::SetAdd(mut a), CellWrite::SetAdd(b)) => {
            a.extend(b);
            CellWrite::SetAdd(a)
        }
        (CellWrite::SetRemove(mut a), CellWrite::SetRemove(b)) => {
            a.extend(b);
            CellWrite::SetRemove(a)
        }
        (CellWrite::MapPut(mut a), CellWrite::MapPut(b)) => {
            a.extend(b);
            CellWrite::MapPut(a)
        }
        (CellWrite::CounterDelta(a), CellWrite::CounterDelta(b)) => {
            CellWrite::CounterDelta(a.saturating_add(b))
        }
        (_, next) => next,
    }
}

/// The mutation unit for one partition: every row change one statement
/// produced for one partition key. Immutable once handed to a boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionUpdate {
    pub key: PartitionKey,
    pub static_row: RowUpdate,
    pub rows: BTreeMap<Clustering, RowUpdate>,
    /// Range deletions, each tagged with its tombstone timestamp.
    pub range_deletes: Vec<(SliceBounds, i64)>,
}

impl PartitionUpdate {
    pub fn new(key: PartitionKey) -> Self {
        Self {
            key,
            static_row: RowUpdate::default(),
            rows: BTreeMap::new(),
            range_deletes: Vec::new(),
        }
    }

    pub fn row_mut(&mut self, clustering: Clustering) -> &mut RowUpdate {
        self.rows.entry(clustering).or_default()
    }

    pub fn add_range_delete(&mut self, bounds: SliceBounds, params: &UpdateParams) {
        self.range_deletes.push((bounds, params.timestamp));
    }

    pub fn is_empty(&self) -> bool {
        self.static_row.is_empty()
            && self.range_deletes.is_empty()
            && self.rows.values().all(RowUpdate::is_empty)
    }

    pub fn row_change_count(&self) -> usize {
        let rows = self.rows.values().filter(|r| !r.is_empty()).count();
        let statics = usize::from(!self.static_row.is_empty());
        rows + statics + self.range_deletes.len()
    }
}

/// Merges the mutations of one statement so that each target partition
/// leaves the engine as exactly one [`PartitionUpdate`].
#[derive(Debug, Default)]
pub struct UpdatesCollector {
    updates: BTreeMap<PartitionKey, PartitionUpdate>,
}

impl UpdatesCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition_update(&mut self, key: &PartitionKey) -> &mut PartitionUpdate {
        self.updates
            .entry(key.clone())
            .or_insert_with(|| PartitionUpdate::new(key.clone()))
    }

    /// Finished updates in key order, with no-op partitions dropped.
    pub fn into_updates(self) -> Vec<PartitionUpdate> {
        self.updates
            .into_values()
            .filter(|update| !update.is_empty())
            .collect()
    }
}
