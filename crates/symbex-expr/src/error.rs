//! Errors for the expression wire format.

use thiserror::Error;

/// A failed parse. Any short read aborts the parse; the caller
/// discards the containing structure. Partially-built subtrees are
/// dropped when the error propagates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The input ended before a field could be read in full.
    #[error("short read: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// An unknown expression tag byte.
    #[error("unknown expression tag {tag}")]
    UnknownTag { tag: u8 },

    /// An operator or type code outside its enum's range.
    #[error("unknown code {code} in {context}")]
    UnknownCode { context: &'static str, code: u8 },

    /// Input bytes left over after a complete top-level expression.
    #[error("{0} trailing bytes after expression")]
    TrailingBytes(usize),
}
