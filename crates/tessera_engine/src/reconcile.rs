//! Pre-write reads for read-dependent operations (non-conditional path).
//!
//! Conditional statements never come through here: their consensus read
//! already covers the read-dependent columns.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::debug;

use crate::boundary::{PartitionSnapshot, ReplicationBoundary, RowSelector};
use crate::consistency::ConsistencyLevel;
use crate::error::WriteError;
use crate::restriction::ClusteringSelector;
use crate::schema::PartitionKey;

/// Fetches the current values of `columns` for every target partition.
///
/// The statement's write consistency level doubles as the read level and
/// must be valid for reads; this is checked before any read is issued.
/// Partitions with no existing rows come back as empty snapshots.
pub async fn fetch_required(
    replication: &Arc<dyn ReplicationBoundary>,
    keys: &[PartitionKey],
    selector: &ClusteringSelector,
    columns: &[String],
    consistency: ConsistencyLevel,
) -> Result<HashMap<PartitionKey, PartitionSnapshot>, WriteError> {
    consistency.validate_for_read()?;

    let row_selector = RowSelector::from(selector);
    debug!(
        partitions = keys.len(),
        columns = columns.len(),
        consistency = consistency.as_str(),
        "reading prior state for read-dependent operations"
    );

    let reads = keys
        .iter()
        .map(|key| replication.read(key, &row_selector, columns, consistency));
    let snapshots = try_join_all(reads).await?;

    Ok(keys.iter().cloned().zip(snapshots).collect())
}
