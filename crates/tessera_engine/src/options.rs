//! Per-execution statement options: bound values and consistency choices.

use crate::consistency::ConsistencyLevel;
use crate::error::WriteError;
use crate::schema::Value;

/// Values supplied at execution time for one invocation of a prepared
/// statement.
#[derive(Clone, Debug, Default)]
pub struct StatementOptions {
    consistency: Option<ConsistencyLevel>,
    serial_consistency: Option<ConsistencyLevel>,
    bound: Vec<Value>,
}

impl StatementOptions {
    pub fn new(consistency: ConsistencyLevel) -> Self {
        Self {
            consistency: Some(consistency),
            serial_consistency: None,
            bound: Vec::new(),
        }
    }

    /// Options carrying no consistency level at all; executing with these
    /// fails validation.
    pub fn unset() -> Self {
        Self::default()
    }

    pub fn with_bound(mut self, values: Vec<Value>) -> Self {
        self.bound = values;
        self
    }

    pub fn with_serial_consistency(mut self, level: ConsistencyLevel) -> Self {
        self.serial_consistency = Some(level);
        self
    }

    pub fn consistency(&self) -> Result<ConsistencyLevel, WriteError> {
        self.consistency.ok_or(WriteError::EmptyConsistencyLevel)
    }

    pub fn serial_consistency(&self) -> ConsistencyLevel {
        self.serial_consistency.unwrap_or(ConsistencyLevel::Serial)
    }

    pub fn bound_value(&self, marker: usize) -> Result<&Value, WriteError> {
        self.bound.get(marker).ok_or(WriteError::UnboundMarker(marker))
    }
}
