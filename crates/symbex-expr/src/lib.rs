//! Symbolic expression algebra for the concolic runtime.
//!
//! An immutable expression tree over bit-vector computations, built by
//! the runtime library while the subject program executes. Every node
//! carries the concrete witness value observed during the run alongside
//! its symbolic shape.
//!
//! - [`expr`] -- the tree, factories, endian-aware concat/extract
//! - [`object`] -- memory-region descriptors carried by deref nodes
//! - [`wire`] -- the self-describing binary serialization
//! - [`linear`] -- the affine fast path `c0 + sum(ci * vi)`
//! - [`bitblast`] -- lowering to a bit-vector term for an SMT solver
//!
//! The algebra is single-threaded by contract: expressions are built by
//! one executor thread during trace collection, so there are no locks
//! and no atomics here.

pub mod bitblast;
pub mod error;
pub mod expr;
pub mod linear;
pub mod object;
pub mod wire;

pub use bitblast::{BvBuilder, BvContext, BvTerm};
pub use error::WireError;
pub use expr::{Endian, SymExpr};
pub use linear::LinearExpr;
pub use object::SymObject;
