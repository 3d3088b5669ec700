//! Result formatting for statement outcomes.

use crate::boundary::SnapshotRow;
use crate::condition::Conditions;
use crate::schema::{ColumnSpec, DataType, TableSchema, Value};

/// Name of the boolean outcome column of conditional statements.
pub const APPLIED_COLUMN: &str = "[applied]";

/// Ordered result columns plus value rows, consumed by the statement
/// result serializer. Nulls are `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Vec<Option<Value>>>,
}

impl ResultSet {
    /// Plain acknowledgement with no result columns.
    pub fn ack() -> Self {
        Self::default()
    }

    pub fn is_ack(&self) -> bool {
        self.columns.is_empty() && self.rows.is_empty()
    }
}

/// Builds the single-row result of a conditional statement.
///
/// Column 0 is always `[applied]`. On rejection, the row the conditions
/// were evaluated against is appended as evidence: the explicitly named
/// condition columns in statement order, or every value column when the
/// statement used an existence sentinel.
pub fn cas_result_set(
    schema: &TableSchema,
    conditions: &Conditions,
    applied: bool,
    evidence: Option<&SnapshotRow>,
) -> ResultSet {
    let mut columns = vec![ColumnSpec::new(APPLIED_COLUMN, DataType::Boolean)];
    let mut row = vec![Some(Value::Boolean(applied))];

    if !applied {
        let evidence_columns: Vec<ColumnSpec> = match conditions.column_names() {
            Some(names) => names
                .iter()
                .filter_map(|name| schema.column(name).map(|(spec, _)| spec.clone()))
                .collect(),
            None => schema.value_columns().cloned().collect(),
        };
        for spec in evidence_columns {
            row.push(evidence.and_then(|r| r.get(&spec.name)).cloned());
            columns.push(spec);
        }
    }

    ResultSet {
        columns,
        rows: vec![row],
    }
}
