//! Stable ID newtypes for instrumentation entities.
//!
//! All IDs are distinct newtype wrappers, providing type safety so that
//! a `StatementId` cannot be accidentally used where a `FunctionId` is
//! expected. Statement, function, and instrumentation ids are seeded
//! from persisted counters and stay unique across translation units.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One per emitted runtime call, monotonically increasing across TUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentationId(pub u32);

/// One per simplified-CFG statement, monotonically increasing across TUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StatementId(pub u32);

/// One per instrumented function definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// A symbolic input variable, assigned by the runtime library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub u32);

/// The statement id of the successor block chosen at a branch, widened
/// to `i64` to leave room for the two non-branch sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchId(pub i64);

impl BranchId {
    /// Sentinel marking a call event rather than a branch.
    pub const CALL: BranchId = BranchId(-1);
    /// Sentinel marking a return event rather than a branch.
    pub const RETURN: BranchId = BranchId(-2);

    /// Returns `true` for the two non-branch sentinels.
    pub fn is_sentinel(&self) -> bool {
        self.0 < 0
    }
}

impl From<StatementId> for BranchId {
    fn from(sid: StatementId) -> Self {
        BranchId(i64::from(sid.0))
    }
}

// Display implementations -- just print the inner value.

impl fmt::Display for InstrumentationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
