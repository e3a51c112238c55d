//! Core error types.
//!
//! Uses `thiserror` for structured, matchable error variants shared by
//! the instrumentation pass and the expression algebra.

use thiserror::Error;

use crate::ast::CType;

/// Errors produced by the core data model.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// A C type with no runtime type code reached a position that
    /// requires one. Callers must gate on `CType::is_symbolic` first.
    #[error("no runtime type code for '{ty}'")]
    NotSymbolic { ty: CType },

    /// An out-of-range type code on the wire.
    #[error("unknown type code {code}")]
    UnknownTypeCode { code: u8 },

    /// An out-of-range operator code on the wire.
    #[error("unknown operator code {code}")]
    UnknownOpCode { code: u8 },
}
