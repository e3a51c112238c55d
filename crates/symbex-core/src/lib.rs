//! Core data model for the symbex instrumentation front end.
//!
//! This crate defines everything the instrumentation pass and the
//! runtime-side expression algebra share:
//!
//! - [`id`] -- newtyped identifiers (instrumentation, statement,
//!   function, variable, branch ids)
//! - [`types`] -- the closed set of machine type codes with size and
//!   signed-range tables
//! - [`ops`] -- operator enums and their wire codes
//! - [`ast`] -- the typed C AST delivered by the external front end
//! - [`runtime`] -- the modeled runtime-call ABI the pass emits
//! - [`error`] -- structured core errors

pub mod ast;
pub mod error;
pub mod id;
pub mod ops;
pub mod runtime;
pub mod types;

pub use error::CoreError;
pub use id::{BranchId, FunctionId, InstrumentationId, StatementId, VarId};
pub use types::TypeCode;
