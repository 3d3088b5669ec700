//! Error taxonomy for statement execution.
//!
//! Errors fall into three classes with different caller contracts:
//! validation errors are caller mistakes and never retried, execution
//! errors come from the replication/consensus boundary and may be retried
//! by the caller, and invariant violations indicate an engine bug.
//! Callers branch on [`WriteError::kind`], never on message text.

use thiserror::Error;

use crate::consistency::ConsistencyLevel;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Execution,
    Invariant,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WriteError {
    // -- validation -------------------------------------------------------
    #[error("missing mandatory primary key part {0}")]
    MissingKeyComponent(String),
    #[error("missing clustering key part {missing} since {set} is restricted")]
    MissingClusteringComponent { missing: String, set: String },
    #[error("slice and explicit clustering restrictions cannot be combined")]
    MixedClusteringForm,
    #[error("multiple restrictions found for primary key part {0}")]
    DuplicateKeyRestriction(String),
    #[error("multi-valued restriction on partition key part {0}: only the last component may carry one")]
    MultiValuedKeyComponent(String),
    #[error("invalid operator for primary key part {0}")]
    InvalidKeyOperator(String),
    #[error("multi-valued restrictions on {0} are not supported with conditional statements")]
    CasMultiRowUnsupported(&'static str),
    #[error("conditional updates are not supported on counter tables")]
    ConditionsOnCounter,
    #[error("custom timestamps are not supported with conditional statements")]
    TimestampWithConditions,
    #[error("custom timestamps are not supported on counter tables")]
    TimestampOnCounter,
    #[error("time-to-live is not supported on counter tables")]
    TtlOnCounter,
    #[error("write consistency {0} requires a read but is not supported for reads")]
    UnsupportedConsistencyForRead(ConsistencyLevel),
    #[error("consistency {0} is not supported for writes")]
    UnsupportedConsistencyForWrite(ConsistencyLevel),
    #[error("consistency {0} is not supported for counter writes")]
    UnsupportedConsistencyForCounterWrite(ConsistencyLevel),
    #[error("no consistency level supplied")]
    EmptyConsistencyLevel,
    #[error("unknown table {keyspace}.{table}")]
    UnknownTable { keyspace: String, table: String },
    #[error("unknown column {0}")]
    UnknownColumn(String),
    #[error("invalid operation on column {column}: {detail}")]
    InvalidOperation { column: String, detail: String },
    #[error("partition key component is not usable as a key value: {0}")]
    InvalidKeyComponent(String),
    #[error("partition key exceeds the maximum encoded size")]
    KeyTooLarge,
    #[error("statement targets {targeted} partitions, above the configured limit of {limit}")]
    TooManyPartitions { targeted: usize, limit: usize },
    #[error("no value bound for statement marker {0}")]
    UnboundMarker(usize),

    // -- execution --------------------------------------------------------
    #[error("replicas unavailable: {0}")]
    Unavailable(String),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("consistency level cannot be satisfied: {0}")]
    ConsistencyUnsatisfiable(String),

    // -- invariant --------------------------------------------------------
    #[error("conditional read returned more than one row for a single-row request")]
    MultiRowSnapshot,
    #[error("operation on column {0} requires the prior value but no snapshot was supplied")]
    OperationRequiresRead(String),
    #[error("trigger hook changed the target partition key")]
    TriggerMovedPartition,
}

impl WriteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WriteError::MissingKeyComponent(_)
            | WriteError::MissingClusteringComponent { .. }
            | WriteError::MixedClusteringForm
            | WriteError::DuplicateKeyRestriction(_)
            | WriteError::MultiValuedKeyComponent(_)
            | WriteError::InvalidKeyOperator(_)
            | WriteError::CasMultiRowUnsupported(_)
            | WriteError::ConditionsOnCounter
            | WriteError::TimestampWithConditions
            | WriteError::TimestampOnCounter
            | WriteError::TtlOnCounter
            | WriteError::UnsupportedConsistencyForRead(_)
            | WriteError::UnsupportedConsistencyForWrite(_)
            | WriteError::UnsupportedConsistencyForCounterWrite(_)
            | WriteError::EmptyConsistencyLevel
            | WriteError::UnknownTable { .. }
            | WriteError::UnknownColumn(_)
            | WriteError::InvalidOperation { .. }
            | WriteError::InvalidKeyComponent(_)
            | WriteError::KeyTooLarge
            | WriteError::TooManyPartitions { .. }
            | WriteError::UnboundMarker(_) => ErrorKind::Validation,

            WriteError::Unavailable(_)
            | WriteError::Timeout(_)
            | WriteError::ConsistencyUnsatisfiable(_) => ErrorKind::Execution,

            WriteError::MultiRowSnapshot
            | WriteError::OperationRequiresRead(_)
            | WriteError::TriggerMovedPartition => ErrorKind::Invariant,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}
