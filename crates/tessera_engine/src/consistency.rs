//! Consistency levels and their read/write validity rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::WriteError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    LocalOne,
    Serial,
    LocalSerial,
}

impl ConsistencyLevel {
    pub fn is_serial(self) -> bool {
        matches!(self, ConsistencyLevel::Serial | ConsistencyLevel::LocalSerial)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConsistencyLevel::Any => "ANY",
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
            ConsistencyLevel::LocalQuorum => "LOCAL_QUORUM",
            ConsistencyLevel::EachQuorum => "EACH_QUORUM",
            ConsistencyLevel::LocalOne => "LOCAL_ONE",
            ConsistencyLevel::Serial => "SERIAL",
            ConsistencyLevel::LocalSerial => "LOCAL_SERIAL",
        }
    }

    /// Serial levels are only reachable through conditional statements.
    pub fn validate_for_write(self) -> Result<(), WriteError> {
        if self.is_serial() {
            return Err(WriteError::UnsupportedConsistencyForWrite(self));
        }
        Ok(())
    }

    pub fn validate_for_counter_write(self) -> Result<(), WriteError> {
        if self.is_serial() || self == ConsistencyLevel::Any {
            return Err(WriteError::UnsupportedConsistencyForCounterWrite(self));
        }
        Ok(())
    }

    /// ANY acknowledges hinted handoff only and EACH_QUORUM has no read
    /// path, so neither can back a read.
    pub fn validate_for_read(self) -> Result<(), WriteError> {
        if matches!(self, ConsistencyLevel::Any | ConsistencyLevel::EachQuorum) {
            return Err(WriteError::UnsupportedConsistencyForRead(self));
        }
        Ok(())
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
