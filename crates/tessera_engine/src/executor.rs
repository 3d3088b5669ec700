//! Statement preparation and execution.
//!
//! A [`ModificationStatement`] is prepared once (validation and derived
//! column bookkeeping happen here, before any execution) and then executed
//! any number of times against per-invocation [`StatementOptions`]. The
//! engine performs no locking of its own: per-row mutual exclusion for
//! conditional writes belongs to the consensus boundary, and the only
//! suspension points are boundary calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tessera_paxos::{BallotGenerator, NodeId, ProposalOutcome};
use tracing::{debug, info_span, warn, Instrument};

use crate::boundary::{
    ConsensusBoundary, PartitionSnapshot, ReplicationBoundary, RowSelector, SchemaProvider,
    SnapshotRow, TriggerHook,
};
use crate::condition::Conditions;
use crate::consistency::ConsistencyLevel;
use crate::error::WriteError;
use crate::operation::{Operation, Operations};
use crate::options::StatementOptions;
use crate::reconcile;
use crate::report::{self, ResultSet};
use crate::restriction::{ClusteringSelector, KeyResolver, KeyRestrictions};
use crate::schema::{Clustering, ColumnKind, PartitionKey, TableSchema, Value};
use crate::update::{CellWrite, PartitionUpdate, UpdateParams, UpdatesCollector};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
        }
    }

    /// Inserts and updates write concrete rows, so the full clustering
    /// must be restricted.
    fn requires_full_clustering(self) -> bool {
        matches!(self, StatementKind::Insert | StatementKind::Update)
    }

    /// Only deletes may address contiguous row ranges.
    fn allows_clustering_slices(self) -> bool {
        matches!(self, StatementKind::Delete)
    }
}

/// Optional per-statement write attributes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatementAttributes {
    pub timestamp: Option<i64>,
    pub ttl: Option<i32>,
}

/// Operational limits for statement execution.
#[derive(Clone, Copy, Debug)]
pub struct WriteRuntimeConfig {
    /// End-to-end bound for one statement execution; zero disables it.
    pub statement_timeout: Duration,
    /// Upper bound on resolved target partitions per statement.
    pub max_statement_partitions: usize,
}

impl Default for WriteRuntimeConfig {
    fn default() -> Self {
        Self {
            statement_timeout: Duration::ZERO,
            max_statement_partitions: 1024,
        }
    }
}

/// Everything one statement execution needs, injected explicitly.
pub struct ExecContext {
    schemas: Arc<dyn SchemaProvider>,
    replication: Arc<dyn ReplicationBoundary>,
    consensus: Arc<dyn ConsensusBoundary>,
    triggers: Option<Arc<dyn TriggerHook>>,
    ballots: BallotGenerator,
    config: WriteRuntimeConfig,
}

impl ExecContext {
    pub fn new(
        node_id: NodeId,
        schemas: Arc<dyn SchemaProvider>,
        replication: Arc<dyn ReplicationBoundary>,
        consensus: Arc<dyn ConsensusBoundary>,
    ) -> Self {
        Self {
            schemas,
            replication,
            consensus,
            triggers: None,
            ballots: BallotGenerator::new(node_id),
            config: WriteRuntimeConfig::default(),
        }
    }

    pub fn with_triggers(mut self, hook: Arc<dyn TriggerHook>) -> Self {
        self.triggers = Some(hook);
        self
    }

    pub fn with_config(mut self, config: WriteRuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn schema(&self, keyspace: &str, table: &str) -> Result<Arc<TableSchema>, WriteError> {
        self.schemas.lookup(keyspace, table)
    }

    fn now_micros() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros()
            .min(i64::MAX as u128) as i64
    }
}

/// Prior row state available while building updates.
enum PriorState<'a> {
    /// No read was performed.
    Unread,
    /// Reconciler snapshots keyed by partition.
    Fetched(&'a HashMap<PartitionKey, PartitionSnapshot>),
    /// The single row a conditional statement read under consensus.
    Row(Option<&'a SnapshotRow>),
}

/// Target row of a conditional statement.
enum CasTarget {
    Row(Clustering),
    Static,
}

/// A prepared insert, update or delete.
#[derive(Debug)]
pub struct ModificationStatement {
    kind: StatementKind,
    schema: Arc<TableSchema>,
    restrictions: KeyRestrictions,
    operations: Operations,
    conditions: Conditions,
    attributes: StatementAttributes,
    updated_columns: Vec<String>,
    /// Columns the conditional read must cover: condition columns plus the
    /// columns of read-dependent operations. Empty means every column.
    condition_read_columns: Vec<String>,
    requires_read_columns: Vec<String>,
    applies_only_to_static: bool,
}

impl ModificationStatement {
    pub fn prepare(
        kind: StatementKind,
        schema: Arc<TableSchema>,
        restrictions: KeyRestrictions,
        operations: Vec<Operation>,
        conditions: Conditions,
        attributes: StatementAttributes,
    ) -> Result<Self, WriteError> {
        let operations = Operations::prepare(&schema, operations)?;
        let is_counter = schema.is_counter_table();

        if !conditions.is_empty() {
            if is_counter {
                return Err(WriteError::ConditionsOnCounter);
            }
            if attributes.timestamp.is_some() {
                return Err(WriteError::TimestampWithConditions);
            }
        }
        if is_counter {
            if attributes.timestamp.is_some() {
                return Err(WriteError::TimestampOnCounter);
            }
            if attributes.ttl.is_some() {
                return Err(WriteError::TtlOnCounter);
            }
        }

        let mut conditions_on_regular = false;
        let mut conditions_on_static = false;
        if let Conditions::Columns(columns) = &conditions {
            for condition in columns {
                let (_, column_kind) = schema
                    .column(&condition.column)
                    .ok_or_else(|| WriteError::UnknownColumn(condition.column.clone()))?;
                match column_kind {
                    ColumnKind::PartitionKey | ColumnKind::Clustering => {
                        return Err(WriteError::InvalidOperation {
                            column: condition.column.clone(),
                            detail: "primary key columns cannot have conditions".to_string(),
                        });
                    }
                    ColumnKind::Regular => conditions_on_regular = true,
                    ColumnKind::Static => conditions_on_static = true,
                }
            }
        }

        let updates_regular_rows =
            schema.clustering.is_empty() || restrictions.restricts_any_clustering(&schema);
        let mut updated_columns = operations.updated_columns();
        // Compact layouts have no row marker: a full-row write that names
        // no column still has to materialize the row, so every declared
        // column is implicitly included.
        if schema.compact && updated_columns.is_empty() && updates_regular_rows {
            updated_columns = schema.regular.iter().map(|c| c.name.clone()).collect();
        }

        let requires_read_columns = operations.requires_read_columns();
        let mut condition_read_columns = conditions.column_names().unwrap_or_default();
        for column in &requires_read_columns {
            if !condition_read_columns.contains(column) {
                condition_read_columns.push(column.clone());
            }
        }

        let applies_only_to_static = !operations.applies_to_regular_columns()
            && !conditions_on_regular
            && (operations.applies_to_static_columns() || conditions_on_static);

        Ok(Self {
            kind,
            schema,
            restrictions,
            operations,
            conditions,
            attributes,
            updated_columns,
            condition_read_columns,
            requires_read_columns,
            applies_only_to_static,
        })
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    pub fn requires_read(&self) -> bool {
        self.operations.requires_read()
    }

    pub fn updated_columns(&self) -> &[String] {
        &self.updated_columns
    }

    fn resolve_keys(
        &self,
        options: &StatementOptions,
    ) -> Result<(Vec<PartitionKey>, ClusteringSelector), WriteError> {
        let resolver = KeyResolver::new(&self.schema, &self.restrictions);
        let keys = resolver.partition_keys(options)?;
        let selector = resolver.clustering_selector(
            options,
            self.applies_only_to_static,
            self.kind.requires_full_clustering(),
            self.kind.allows_clustering_slices(),
        )?;
        Ok((keys, selector))
    }

    fn update_params(&self) -> UpdateParams {
        UpdateParams {
            timestamp: self
                .attributes
                .timestamp
                .unwrap_or_else(ExecContext::now_micros),
            ttl: self.attributes.ttl,
        }
    }

    /// Executes the statement. Validation failures surface before any
    /// boundary call; execution failures propagate unchanged.
    pub async fn execute(
        &self,
        ctx: &ExecContext,
        options: &StatementOptions,
    ) -> Result<ResultSet, WriteError> {
        let consistency = options.consistency()?;

        let span = info_span!(
            "tessera.statement",
            keyspace = %self.schema.keyspace,
            table = %self.schema.table,
            kind = self.kind.as_str(),
            conditional = self.has_conditions(),
        );
        let work = async {
            if self.has_conditions() {
                self.execute_with_conditions(ctx, options).await
            } else {
                self.execute_without_conditions(ctx, options, consistency)
                    .await
            }
        };

        if ctx.config.statement_timeout > Duration::ZERO {
            match tokio::time::timeout(ctx.config.statement_timeout, work.instrument(span)).await {
                Ok(result) => result,
                Err(_) => Err(WriteError::Timeout("statement")),
            }
        } else {
            work.instrument(span).await
        }
    }

    async fn execute_without_conditions(
        &self,
        ctx: &ExecContext,
        options: &StatementOptions,
        consistency: ConsistencyLevel,
    ) -> Result<ResultSet, WriteError> {
        if self.schema.is_counter_table() {
            consistency.validate_for_counter_write()?;
        } else {
            consistency.validate_for_write()?;
        }

        let (keys, selector) = self.resolve_keys(options)?;
        if keys.len() > ctx.config.max_statement_partitions {
            return Err(WriteError::TooManyPartitions {
                targeted: keys.len(),
                limit: ctx.config.max_statement_partitions,
            });
        }
        for key in &keys {
            key.encode()?;
        }

        let snapshots;
        let prior = if self.requires_read() {
            snapshots = reconcile::fetch_required(
                &ctx.replication,
                &keys,
                &selector,
                &self.requires_read_columns,
                consistency,
            )
            .await?;
            PriorState::Fetched(&snapshots)
        } else {
            PriorState::Unread
        };

        let params = self.update_params();
        let mut collector = UpdatesCollector::new();
        self.add_updates(&mut collector, &keys, &selector, &params, options, &prior)?;
        let updates = collector.into_updates();

        if updates.is_empty() {
            debug!("statement resolved to no mutations");
            return Ok(ResultSet::ack());
        }

        ctx.replication.apply(updates, consistency).await?;
        Ok(ResultSet::ack())
    }

    async fn execute_with_conditions(
        &self,
        ctx: &ExecContext,
        options: &StatementOptions,
    ) -> Result<ResultSet, WriteError> {
        // Resolving: a conditional statement addresses exactly one row.
        let (keys, selector) = self.resolve_keys(options)?;
        let [key] = keys.as_slice() else {
            return Err(WriteError::CasMultiRowUnsupported("the partition key"));
        };
        key.encode()?;
        let target = match &selector {
            ClusteringSelector::Static => CasTarget::Static,
            ClusteringSelector::Tuples(tuples) if tuples.len() == 1 => {
                CasTarget::Row(tuples[0].clone())
            }
            _ => return Err(WriteError::CasMultiRowUnsupported("clustering columns")),
        };
        let row_selector = match &target {
            CasTarget::Static => RowSelector::Static,
            CasTarget::Row(clustering) => RowSelector::Rows(vec![clustering.clone()]),
        };

        // Reading: the condition snapshot comes from a linearizable read,
        // which also serves read-dependent operations on this path.
        let serial = options.serial_consistency();
        debug!(state = "reading", serial = serial.as_str(), "cas read");
        let snapshot = ctx
            .consensus
            .linearizable_read(key, &row_selector, &self.condition_read_columns, serial)
            .await?;
        let current = Self::snapshot_row(&snapshot, &target)?;

        // Evaluating.
        if !self.conditions.applies_to(current, options)? {
            debug!(state = "rejected", "cas conditions did not hold");
            return Ok(report::cas_result_set(
                &self.schema,
                &self.conditions,
                false,
                current,
            ));
        }

        // Proposing.
        let params = self.update_params();
        let single = match &target {
            CasTarget::Static => ClusteringSelector::Static,
            CasTarget::Row(clustering) => ClusteringSelector::Tuples(vec![clustering.clone()]),
        };
        let mut collector = UpdatesCollector::new();
        self.add_updates(
            &mut collector,
            std::slice::from_ref(key),
            &single,
            &params,
            options,
            &PriorState::Row(current),
        )?;
        let update = collector
            .into_updates()
            .pop()
            .unwrap_or_else(|| PartitionUpdate::new(key.clone()));

        let update = match &ctx.triggers {
            Some(hook) => {
                let augmented = hook.augment(update);
                if augmented.key != *key {
                    return Err(WriteError::TriggerMovedPartition);
                }
                augmented
            }
            None => update,
        };

        let ballot = ctx.ballots.next();
        debug!(state = "proposing", ballot = ballot.counter, "cas proposal");
        match ctx.consensus.propose(ballot, update).await? {
            ProposalOutcome::Accepted => {
                debug!(state = "committed", "cas proposal applied");
                Ok(report::cas_result_set(
                    &self.schema,
                    &self.conditions,
                    true,
                    None,
                ))
            }
            ProposalOutcome::Superseded { promised } => {
                // The row may have changed under us; reread and report a
                // plain rejection so the caller can re-evaluate.
                warn!(
                    promised = promised.counter,
                    "cas proposal superseded; rereading current state"
                );
                let reread = ctx
                    .consensus
                    .linearizable_read(key, &row_selector, &self.condition_read_columns, serial)
                    .await?;
                let current = Self::snapshot_row(&reread, &target)?;
                Ok(report::cas_result_set(
                    &self.schema,
                    &self.conditions,
                    false,
                    current,
                ))
            }
        }
    }

    fn snapshot_row<'a>(
        snapshot: &'a PartitionSnapshot,
        target: &CasTarget,
    ) -> Result<Option<&'a SnapshotRow>, WriteError> {
        match target {
            CasTarget::Static => Ok(snapshot.static_row.as_ref()),
            CasTarget::Row(_) => snapshot.single_row(),
        }
    }

    /// Builds this statement's mutations into `collector`, one merged
    /// [`PartitionUpdate`] per target partition.
    fn add_updates(
        &self,
        collector: &mut UpdatesCollector,
        keys: &[PartitionKey],
        selector: &ClusteringSelector,
        params: &UpdateParams,
        options: &StatementOptions,
        prior: &PriorState<'_>,
    ) -> Result<(), WriteError> {
        match selector {
            ClusteringSelector::Slice(bounds) => {
                if bounds.is_empty() {
                    debug!("slice normalized to empty; skipping");
                    return Ok(());
                }
                for key in keys {
                    collector
                        .partition_update(key)
                        .add_range_delete(bounds.clone(), params);
                }
            }
            ClusteringSelector::Static => {
                for key in keys {
                    let update = collector.partition_update(key);
                    if self.kind == StatementKind::Delete && self.operations.is_empty() {
                        update.static_row.delete(params);
                        continue;
                    }
                    for operation in self.operations.statics() {
                        let value = self.prior_value(prior, key, None, operation)?;
                        operation.apply(&mut update.static_row, params, options, value)?;
                    }
                }
            }
            ClusteringSelector::Tuples(tuples) => {
                for key in keys {
                    let update = collector.partition_update(key);
                    for clustering in tuples {
                        self.apply_row(update, key, clustering, params, options, prior)?;
                    }
                    for operation in self.operations.statics() {
                        let value = self.prior_value(prior, key, None, operation)?;
                        operation.apply(&mut update.static_row, params, options, value)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn apply_row(
        &self,
        update: &mut PartitionUpdate,
        key: &PartitionKey,
        clustering: &Clustering,
        params: &UpdateParams,
        options: &StatementOptions,
        prior: &PriorState<'_>,
    ) -> Result<(), WriteError> {
        if self.kind == StatementKind::Delete && self.operations.regular().is_empty() {
            update.row_mut(clustering.clone()).delete(params);
            return Ok(());
        }

        // Resolve prior values before borrowing the row mutably.
        let mut prior_values = Vec::with_capacity(self.operations.regular().len());
        for operation in self.operations.regular() {
            prior_values.push(self.prior_value(prior, key, Some(clustering), operation)?);
        }

        let row = update.row_mut(clustering.clone());
        if self.kind == StatementKind::Insert && !self.schema.compact {
            row.mark_live(params);
        }
        for (operation, value) in self.operations.regular().iter().zip(prior_values) {
            operation.apply(row, params, options, value)?;
        }

        // Compact layouts materialize the row through its value column
        // when the statement names no column at all.
        if self.schema.compact && self.operations.is_empty() {
            if let Some(column) = self.updated_columns.first() {
                row.set_cell(column, CellWrite::Value(Value::Blob(Vec::new())), params);
            }
        }
        Ok(())
    }

    fn prior_value<'a>(
        &self,
        prior: &'a PriorState<'_>,
        key: &PartitionKey,
        clustering: Option<&Clustering>,
        operation: &Operation,
    ) -> Result<Option<&'a Value>, WriteError> {
        if !operation.requires_read() {
            return Ok(None);
        }
        match prior {
            PriorState::Unread => Err(WriteError::OperationRequiresRead(operation.column.clone())),
            PriorState::Row(row) => Ok(row.and_then(|r| r.get(&operation.column))),
            PriorState::Fetched(snapshots) => {
                let row = snapshots.get(key).and_then(|snapshot| match clustering {
                    Some(clustering) => snapshot.rows.get(clustering),
                    None => snapshot.static_row.as_ref(),
                });
                Ok(row.and_then(|r| r.get(&operation.column)))
            }
        }
    }
}
