//! Statement conditions and their evaluation against a consensus read.

use std::cmp::Ordering;

use crate::boundary::SnapshotRow;
use crate::error::WriteError;
use crate::options::StatementOptions;
use crate::restriction::Term;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnCondition {
    pub column: String,
    pub op: ConditionOp,
    pub expected: Term,
}

impl ColumnCondition {
    pub fn new(column: impl Into<String>, op: ConditionOp, expected: Term) -> Self {
        Self {
            column: column.into(),
            op,
            expected,
        }
    }

    /// Evaluates this condition against the current row; a missing row or
    /// missing column counts as null.
    fn holds(&self, row: Option<&SnapshotRow>, options: &StatementOptions) -> Result<bool, WriteError> {
        let expected = self.expected.bind(options)?;
        let stored = row.and_then(|r| r.get(&self.column));
        Ok(match self.op {
            ConditionOp::Eq => stored == Some(&expected),
            ConditionOp::Ne => stored != Some(&expected),
            // Ordered comparisons never hold against null.
            ConditionOp::Lt => matches!(stored.map(|v| v.cmp(&expected)), Some(Ordering::Less)),
            ConditionOp::Le => {
                matches!(stored.map(|v| v.cmp(&expected)), Some(Ordering::Less | Ordering::Equal))
            }
            ConditionOp::Gt => matches!(stored.map(|v| v.cmp(&expected)), Some(Ordering::Greater)),
            ConditionOp::Ge => matches!(
                stored.map(|v| v.cmp(&expected)),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        })
    }
}

/// The three mutually exclusive condition forms a statement can carry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Conditions {
    /// Unconditional statement.
    None,
    /// IF EXISTS.
    Exists,
    /// IF NOT EXISTS.
    NotExists,
    /// Ordered column conditions; never empty.
    Columns(Vec<ColumnCondition>),
}

impl Conditions {
    pub fn is_empty(&self) -> bool {
        matches!(self, Conditions::None)
    }

    /// Explicitly named condition columns in statement order, or `None`
    /// for the existence sentinels (whose evidence is every column).
    pub fn column_names(&self) -> Option<Vec<String>> {
        match self {
            Conditions::Columns(conditions) => {
                let mut names = Vec::new();
                for condition in conditions {
                    if !names.contains(&condition.column) {
                        names.push(condition.column.clone());
                    }
                }
                Some(names)
            }
            _ => None,
        }
    }

    /// Whether the conditions hold against the current row state.
    pub fn applies_to(
        &self,
        row: Option<&SnapshotRow>,
        options: &StatementOptions,
    ) -> Result<bool, WriteError> {
        match self {
            Conditions::None => Ok(true),
            Conditions::Exists => Ok(row.is_some()),
            Conditions::NotExists => Ok(row.is_none()),
            Conditions::Columns(conditions) => {
                for condition in conditions {
                    if !condition.holds(row, options)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}
