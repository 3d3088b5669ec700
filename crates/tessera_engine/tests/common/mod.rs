//! Shared in-memory boundary fakes for integration tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use tessera_engine::{
    CellWrite, Clustering, ConsensusBoundary, ConsistencyLevel, ExecContext, PartitionKey,
    PartitionSnapshot, PartitionUpdate, ReplicationBoundary, RowSelector, RowUpdate,
    SchemaProvider, SnapshotRow, TableSchema, Value, WriteError,
};
use tessera_paxos::{Ballot, PaxosRegister, ProposalOutcome};

static INIT_TRACING: Once = Once::new();

/// Installs a test subscriber so `RUST_LOG`-filtered engine traces show
/// up in failing test output.
fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

type StoredRow = BTreeMap<String, Value>;

#[derive(Default)]
struct PartitionState {
    static_row: StoredRow,
    rows: BTreeMap<Clustering, StoredRow>,
}

#[derive(Default)]
struct TableState {
    partitions: BTreeMap<PartitionKey, PartitionState>,
}

/// In-memory cluster standing in for both the replication and the
/// consensus boundaries, with call counters so tests can assert that
/// validation failures never reach the network.
pub struct InMemoryCluster {
    state: Mutex<TableState>,
    register: PaxosRegister<u64>,
    applied_batches: Mutex<Vec<Vec<PartitionUpdate>>>,
    reads: AtomicUsize,
    serial_reads: AtomicUsize,
    proposals: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TableState::default()),
            register: PaxosRegister::new(),
            applied_batches: Mutex::new(Vec::new()),
            reads: AtomicUsize::new(0),
            serial_reads: AtomicUsize::new(0),
            proposals: AtomicUsize::new(0),
            delay: Mutex::new(None),
        }
    }

    /// Artificial latency injected into every boundary call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Pre-promises a ballot for `key`, forcing later proposals from the
    /// engine to come back superseded.
    pub fn promise_ballot(&self, key: &PartitionKey, counter: u64) {
        let encoded = key.encode().expect("encodable key");
        self.register.propose(
            &encoded,
            Ballot {
                counter,
                node_id: u64::MAX,
            },
            0,
        );
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn serial_read_count(&self) -> usize {
        self.serial_reads.load(Ordering::SeqCst)
    }

    pub fn proposal_count(&self) -> usize {
        self.proposals.load(Ordering::SeqCst)
    }

    pub fn applied_batches(&self) -> Vec<Vec<PartitionUpdate>> {
        self.applied_batches.lock().unwrap().clone()
    }

    /// Seeds one row directly into the backing state.
    pub fn seed_row(&self, key: PartitionKey, clustering: Clustering, values: &[(&str, Value)]) {
        let mut state = self.state.lock().unwrap();
        let row = state
            .partitions
            .entry(key)
            .or_default()
            .rows
            .entry(clustering)
            .or_default();
        for (column, value) in values {
            row.insert((*column).to_string(), value.clone());
        }
    }

    pub fn stored_value(
        &self,
        key: &PartitionKey,
        clustering: &Clustering,
        column: &str,
    ) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state
            .partitions
            .get(key)
            .and_then(|p| p.rows.get(clustering))
            .and_then(|row| row.get(column))
            .cloned()
    }

    pub fn static_value(&self, key: &PartitionKey, column: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state
            .partitions
            .get(key)
            .and_then(|p| p.static_row.get(column))
            .cloned()
    }

    pub fn row_exists(&self, key: &PartitionKey, clustering: &Clustering) -> bool {
        let state = self.state.lock().unwrap();
        state
            .partitions
            .get(key)
            .is_some_and(|p| p.rows.contains_key(clustering))
    }

    pub fn row_count(&self, key: &PartitionKey) -> usize {
        let state = self.state.lock().unwrap();
        state.partitions.get(key).map_or(0, |p| p.rows.len())
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn snapshot(&self, key: &PartitionKey, selector: &RowSelector, columns: &[String]) -> PartitionSnapshot {
        let state = self.state.lock().unwrap();
        let mut snapshot = PartitionSnapshot::default();
        let Some(partition) = state.partitions.get(key) else {
            return snapshot;
        };

        let project = |row: &StoredRow| {
            let mut out = SnapshotRow::default();
            for (column, value) in row {
                if columns.is_empty() || columns.iter().any(|c| c == column) {
                    out.columns.insert(column.clone(), value.clone());
                }
            }
            out
        };

        match selector {
            RowSelector::Static => {
                if !partition.static_row.is_empty() {
                    snapshot.static_row = Some(project(&partition.static_row));
                }
            }
            RowSelector::Rows(clusterings) => {
                for clustering in clusterings {
                    if let Some(row) = partition.rows.get(clustering) {
                        snapshot.rows.insert(clustering.clone(), project(row));
                    }
                }
            }
            RowSelector::Slice(bounds) => {
                for (clustering, row) in &partition.rows {
                    if bounds.contains(clustering) {
                        snapshot.rows.insert(clustering.clone(), project(row));
                    }
                }
            }
        }
        snapshot
    }

    fn apply_update(state: &mut TableState, update: &PartitionUpdate) {
        let partition = state.partitions.entry(update.key.clone()).or_default();

        for (bounds, _) in &update.range_deletes {
            partition.rows.retain(|clustering, _| !bounds.contains(clustering));
        }

        if update.static_row.deleted_at.is_some() {
            partition.static_row.clear();
        } else {
            apply_row_cells(&mut partition.static_row, &update.static_row);
        }

        for (clustering, row_update) in &update.rows {
            if row_update.deleted_at.is_some() {
                partition.rows.remove(clustering);
                continue;
            }
            let row = partition.rows.entry(clustering.clone()).or_default();
            apply_row_cells(row, row_update);
        }
    }
}

fn apply_row_cells(row: &mut StoredRow, update: &RowUpdate) {
    for (column, cell) in &update.cells {
        match &cell.write {
            CellWrite::Tombstone => {
                row.remove(column);
            }
            CellWrite::Value(value) => {
                row.insert(column.clone(), value.clone());
            }
            CellWrite::ListAppend(items) => {
                let entry = row
                    .entry(column.clone())
                    .or_insert_with(|| Value::List(Vec::new()));
                if let Value::List(list) = entry {
                    list.extend(items.iter().cloned());
                }
            }
            CellWrite::ListPrepend(items) => {
                let entry = row
                    .entry(column.clone())
                    .or_insert_with(|| Value::List(Vec::new()));
                if let Value::List(list) = entry {
                    let mut next = items.clone();
                    next.extend(list.iter().cloned());
                    *list = next;
                }
            }
            CellWrite::SetAdd(items) => {
                let entry = row
                    .entry(column.clone())
                    .or_insert_with(|| Value::Set(BTreeSet::new()));
                if let Value::Set(set) = entry {
                    set.extend(items.iter().cloned());
                }
            }
            CellWrite::SetRemove(items) => {
                if let Some(Value::Set(set)) = row.get_mut(column) {
                    for item in items {
                        set.remove(item);
                    }
                }
            }
            CellWrite::MapPut(entries) => {
                let entry = row
                    .entry(column.clone())
                    .or_insert_with(|| Value::Map(BTreeMap::new()));
                if let Value::Map(map) = entry {
                    map.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            CellWrite::CounterDelta(delta) => {
                let entry = row.entry(column.clone()).or_insert(Value::Bigint(0));
                if let Value::Bigint(total) = entry {
                    *total = total.saturating_add(*delta);
                }
            }
        }
    }
}

#[async_trait]
impl ReplicationBoundary for InMemoryCluster {
    async fn apply(
        &self,
        updates: Vec<PartitionUpdate>,
        _consistency: ConsistencyLevel,
    ) -> Result<(), WriteError> {
        self.pause().await;
        self.applied_batches.lock().unwrap().push(updates.clone());
        let mut state = self.state.lock().unwrap();
        for update in &updates {
            Self::apply_update(&mut state, update);
        }
        Ok(())
    }

    async fn read(
        &self,
        key: &PartitionKey,
        selector: &RowSelector,
        columns: &[String],
        _consistency: ConsistencyLevel,
    ) -> Result<PartitionSnapshot, WriteError> {
        self.pause().await;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot(key, selector, columns))
    }
}

#[async_trait]
impl ConsensusBoundary for InMemoryCluster {
    async fn linearizable_read(
        &self,
        key: &PartitionKey,
        selector: &RowSelector,
        columns: &[String],
        _serial_consistency: ConsistencyLevel,
    ) -> Result<PartitionSnapshot, WriteError> {
        self.pause().await;
        self.serial_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot(key, selector, columns))
    }

    async fn propose(
        &self,
        ballot: Ballot,
        update: PartitionUpdate,
    ) -> Result<ProposalOutcome, WriteError> {
        self.pause().await;
        self.proposals.fetch_add(1, Ordering::SeqCst);
        let encoded = update.key.encode()?;
        match self.register.propose(&encoded, ballot, ballot.counter) {
            ProposalOutcome::Accepted => {
                let mut state = self.state.lock().unwrap();
                Self::apply_update(&mut state, &update);
                Ok(ProposalOutcome::Accepted)
            }
            superseded => Ok(superseded),
        }
    }
}

/// Fixed schema catalog.
pub struct FixedCatalog {
    tables: HashMap<(String, String), Arc<TableSchema>>,
}

impl FixedCatalog {
    pub fn single(schema: Arc<TableSchema>) -> Self {
        let mut tables = HashMap::new();
        tables.insert((schema.keyspace.clone(), schema.table.clone()), schema);
        Self { tables }
    }
}

impl SchemaProvider for FixedCatalog {
    fn lookup(&self, keyspace: &str, table: &str) -> Result<Arc<TableSchema>, WriteError> {
        self.tables
            .get(&(keyspace.to_string(), table.to_string()))
            .cloned()
            .ok_or_else(|| WriteError::UnknownTable {
                keyspace: keyspace.to_string(),
                table: table.to_string(),
            })
    }
}

/// Builds a context wired to a fresh in-memory cluster.
pub fn test_context(schema: Arc<TableSchema>) -> (Arc<InMemoryCluster>, ExecContext) {
    init_tracing();
    let cluster = Arc::new(InMemoryCluster::new());
    let catalog = Arc::new(FixedCatalog::single(schema));
    let ctx = ExecContext::new(1, catalog, cluster.clone(), cluster.clone());
    (cluster, ctx)
}
