//! Typed per-column mutations and the per-statement operation set.
//!
//! Operations are a closed set of variants rather than an open hierarchy;
//! each declares whether it needs the column's prior value. Delta-style
//! operations (appends, set/map edits, counter increments) never read:
//! the storage layer resolves them against the stored state. The list
//! index/removal forms rewrite the whole list, so they must be given the
//! prior value by the reconciler or the conditional read.

use crate::error::WriteError;
use crate::options::StatementOptions;
use crate::restriction::Term;
use crate::schema::{ColumnKind, DataType, TableSchema, Value};
use crate::update::{CellWrite, RowUpdate, UpdateParams};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Assign(Term),
    ListAppend(Term),
    ListPrepend(Term),
    ListRemoveByValue(Term),
    ListSetByIndex { index: Term, value: Term },
    ListDiscardByIndex(Term),
    MapPut { key: Term, value: Term },
    SetAdd(Term),
    SetRemove(Term),
    CounterIncrement(Term),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    pub column: String,
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(column: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            column: column.into(),
            kind,
        }
    }

    /// True when the result depends on the currently stored value.
    pub fn requires_read(&self) -> bool {
        matches!(
            self.kind,
            OperationKind::ListRemoveByValue(_)
                | OperationKind::ListSetByIndex { .. }
                | OperationKind::ListDiscardByIndex(_)
        )
    }

    fn invalid(&self, detail: impl Into<String>) -> WriteError {
        WriteError::InvalidOperation {
            column: self.column.clone(),
            detail: detail.into(),
        }
    }

    fn expect_list(&self, value: Value) -> Result<Vec<Value>, WriteError> {
        match value {
            Value::List(items) => Ok(items),
            _ => Err(self.invalid("expected a list value")),
        }
    }

    fn expect_set(
        &self,
        value: Value,
    ) -> Result<std::collections::BTreeSet<Value>, WriteError> {
        match value {
            Value::Set(items) => Ok(items),
            _ => Err(self.invalid("expected a set value")),
        }
    }

    fn expect_index(&self, value: &Value) -> Result<usize, WriteError> {
        let index = value
            .as_i64()
            .ok_or_else(|| self.invalid("list index must be an integer"))?;
        usize::try_from(index).map_err(|_| self.invalid("list index must not be negative"))
    }

    fn prior_list(prior: Option<&Value>) -> Vec<Value> {
        match prior {
            Some(Value::List(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Writes this operation into `row`.
    ///
    /// `prior` is the column's current value, supplied only when
    /// [`Operation::requires_read`] is true and a snapshot was fetched;
    /// the caller is responsible for refusing to apply read-dependent
    /// operations without a snapshot.
    pub fn apply(
        &self,
        row: &mut RowUpdate,
        params: &UpdateParams,
        options: &StatementOptions,
        prior: Option<&Value>,
    ) -> Result<(), WriteError> {
        match &self.kind {
            OperationKind::Assign(term) => {
                let value = term.bind(options)?;
                row.set_cell(&self.column, CellWrite::Value(value), params);
            }
            OperationKind::ListAppend(term) => {
                let items = self.expect_list(term.bind(options)?)?;
                row.set_cell(&self.column, CellWrite::ListAppend(items), params);
            }
            OperationKind::ListPrepend(term) => {
                let items = self.expect_list(term.bind(options)?)?;
                row.set_cell(&self.column, CellWrite::ListPrepend(items), params);
            }
            OperationKind::ListRemoveByValue(term) => {
                let to_remove = self.expect_list(term.bind(options)?)?;
                let current = Self::prior_list(prior);
                if current.is_empty() {
                    return Ok(());
                }
                let remaining: Vec<Value> = current
                    .into_iter()
                    .filter(|item| !to_remove.contains(item))
                    .collect();
                row.set_cell(&self.column, CellWrite::Value(Value::List(remaining)), params);
            }
            OperationKind::ListSetByIndex { index, value } => {
                let idx = self.expect_index(&index.bind(options)?)?;
                let mut current = Self::prior_list(prior);
                if idx >= current.len() {
                    return Err(self.invalid(format!(
                        "list index {idx} out of bounds for length {}",
                        current.len()
                    )));
                }
                current[idx] = value.bind(options)?;
                row.set_cell(&self.column, CellWrite::Value(Value::List(current)), params);
            }
            OperationKind::ListDiscardByIndex(index) => {
                let idx = self.expect_index(&index.bind(options)?)?;
                let mut current = Self::prior_list(prior);
                if idx >= current.len() {
                    return Err(self.invalid(format!(
                        "list index {idx} out of bounds for length {}",
                        current.len()
                    )));
                }
                current.remove(idx);
                row.set_cell(&self.column, CellWrite::Value(Value::List(current)), params);
            }
            OperationKind::MapPut { key, value } => {
                let mut entries = std::collections::BTreeMap::new();
                entries.insert(key.bind(options)?, value.bind(options)?);
                row.set_cell(&self.column, CellWrite::MapPut(entries), params);
            }
            OperationKind::SetAdd(term) => {
                let items = self.expect_set(term.bind(options)?)?;
                row.set_cell(&self.column, CellWrite::SetAdd(items), params);
            }
            OperationKind::SetRemove(term) => {
                let items = self.expect_set(term.bind(options)?)?;
                row.set_cell(&self.column, CellWrite::SetRemove(items), params);
            }
            OperationKind::CounterIncrement(term) => {
                let delta = term
                    .bind(options)?
                    .as_i64()
                    .ok_or_else(|| self.invalid("counter delta must be an integer"))?;
                row.set_cell(&self.column, CellWrite::CounterDelta(delta), params);
            }
        }
        Ok(())
    }
}

/// The ordered operation set of one prepared statement, split by the kind
/// of column each operation touches.
#[derive(Clone, Debug, Default)]
pub struct Operations {
    regular: Vec<Operation>,
    statics: Vec<Operation>,
}

impl Operations {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validates operations against the schema and splits them by column
    /// kind. Primary key columns cannot be assigned; counter columns only
    /// accept increments, and increments only apply to counter columns.
    pub fn prepare(schema: &TableSchema, operations: Vec<Operation>) -> Result<Self, WriteError> {
        let mut regular = Vec::new();
        let mut statics = Vec::new();

        for operation in operations {
            let (spec, kind) = schema
                .column(&operation.column)
                .ok_or_else(|| WriteError::UnknownColumn(operation.column.clone()))?;

            match kind {
                ColumnKind::PartitionKey | ColumnKind::Clustering => {
                    return Err(WriteError::InvalidOperation {
                        column: operation.column.clone(),
                        detail: "primary key columns cannot be assigned".to_string(),
                    });
                }
                ColumnKind::Regular | ColumnKind::Static => {}
            }

            let is_increment = matches!(operation.kind, OperationKind::CounterIncrement(_));
            if spec.data_type.is_counter() != is_increment {
                let detail = if is_increment {
                    "counter increments only apply to counter columns"
                } else {
                    "counter columns only support increments"
                };
                return Err(WriteError::InvalidOperation {
                    column: operation.column.clone(),
                    detail: detail.to_string(),
                });
            }
            Self::check_column_type(&operation, &spec.data_type)?;

            match kind {
                ColumnKind::Static => statics.push(operation),
                _ => regular.push(operation),
            }
        }

        Ok(Self { regular, statics })
    }

    fn check_column_type(operation: &Operation, data_type: &DataType) -> Result<(), WriteError> {
        let ok = match operation.kind {
            OperationKind::ListAppend(_)
            | OperationKind::ListPrepend(_)
            | OperationKind::ListRemoveByValue(_)
            | OperationKind::ListSetByIndex { .. }
            | OperationKind::ListDiscardByIndex(_) => matches!(data_type, DataType::List(_)),
            OperationKind::MapPut { .. } => matches!(data_type, DataType::Map(_, _)),
            OperationKind::SetAdd(_) | OperationKind::SetRemove(_) => {
                matches!(data_type, DataType::Set(_))
            }
            OperationKind::Assign(_) | OperationKind::CounterIncrement(_) => true,
        };
        if ok {
            Ok(())
        } else {
            Err(WriteError::InvalidOperation {
                column: operation.column.clone(),
                detail: "operation does not match the column type".to_string(),
            })
        }
    }

    pub fn regular(&self) -> &[Operation] {
        &self.regular
    }

    pub fn statics(&self) -> &[Operation] {
        &self.statics
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.regular.iter().chain(self.statics.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.regular.is_empty() && self.statics.is_empty()
    }

    pub fn applies_to_regular_columns(&self) -> bool {
        !self.regular.is_empty()
    }

    pub fn applies_to_static_columns(&self) -> bool {
        !self.statics.is_empty()
    }

    /// True when any operation needs the column's prior value.
    pub fn requires_read(&self) -> bool {
        self.iter().any(Operation::requires_read)
    }

    pub fn updated_columns(&self) -> Vec<String> {
        let mut columns = Vec::new();
        for operation in self.iter() {
            if !columns.contains(&operation.column) {
                columns.push(operation.column.clone());
            }
        }
        columns
    }

    pub fn requires_read_columns(&self) -> Vec<String> {
        let mut columns = Vec::new();
        for operation in self.iter().filter(|op| op.requires_read()) {
            if !columns.contains(&operation.column) {
                columns.push(operation.column.clone());
            }
        }
        columns
    }
}
