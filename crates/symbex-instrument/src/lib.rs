//! The source instrumentation pass.
//!
//! Rewrites a typed C translation unit so that every symbolic
//! computation is mirrored by a call against the runtime's symbolic
//! operand stack, while recording branch pairs and per-function control
//! flow for the search strategy.
//!
//! # Modules
//!
//! - [`error`] -- error types for all pass failure modes
//! - [`counters`] -- disk-backed counters for cross-TU unique ids
//! - [`recorder`] -- the `branches`/`cfg`/`cfg_func_map` writers
//! - [`simplify`] -- splits complex memory references into temporaries
//! - [`oneret`] -- the single-return transform
//! - [`normalize`] -- branch normalization and short-circuit lowering
//! - [`cfg`] -- statement numbering and successor computation
//! - [`visitor`] -- the stack-machine emission visitor
//! - [`driver`] -- the fixed-order pass pipeline

pub mod cfg;
pub mod counters;
pub mod driver;
pub mod error;
pub mod normalize;
pub mod oneret;
pub mod recorder;
pub mod simplify;
pub mod visitor;

pub use driver::{instrument_translation_unit, InstrumentOptions, InstrumentReport};
pub use error::InstrumentError;
