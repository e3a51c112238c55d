//! Pass error types covering all instrumentation failure modes.

use symbex_core::CoreError;

/// Errors that abort the instrumentation pass. Non-fatal conditions
/// (missing counter files, unopenable append files) are logged and do
/// not surface here.
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    /// A `goto` names a label that does not exist in its function.
    #[error("unresolved label '{label}' in function '{function}'")]
    UnresolvedLabel { function: String, label: String },

    /// A statement block that must have a first statement is empty.
    #[error("empty block in function '{function}'")]
    EmptyBlock { function: String },

    /// A C type with no runtime code reached an emission site.
    #[error("type mapping error: {0}")]
    TypeMapping(#[from] CoreError),

    /// Counter persistence failed; identifiers would stop being unique.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
