//! Memory-region descriptors for deref expressions.

use symbex_core::TypeCode;

/// Describes the memory region a symbolic dereference read through:
/// where it starts, how many bytes it spans, and the element type code.
/// Deref nodes nest one of these together with a snapshot of the
/// region's concrete bytes at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymObject {
    pub start: u64,
    pub size: u64,
    pub element: TypeCode,
}

impl SymObject {
    pub fn new(start: u64, size: u64, element: TypeCode) -> Self {
        SymObject {
            start,
            size,
            element,
        }
    }
}
