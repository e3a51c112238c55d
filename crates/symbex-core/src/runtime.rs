//! The modeled runtime-call ABI.
//!
//! The instrumentation visitor inserts these as statements; a later
//! printing stage renders them as C calls against the runtime library.
//! Names, argument types, and argument order are contracts with the
//! runtime; every call carries its instrumentation id first. Address
//! and witness arguments are carried as source expressions, cloned from
//! the code being instrumented, because the runtime observes their
//! values during the actual program run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::Expr;
use crate::id::{BranchId, FunctionId, InstrumentationId};
use crate::ops::{BinaryOp, CompareOp, PointerOp, UnaryOp};
use crate::types::TypeCode;

/// The operator argument of an `Apply2` call: a binary bit-vector
/// operator or a comparison predicate, sharing one code space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Apply2Op {
    Binary(BinaryOp),
    Compare(CompareOp),
}

impl Apply2Op {
    pub fn code(self) -> u8 {
        match self {
            Apply2Op::Binary(op) => op.code(),
            Apply2Op::Compare(op) => op.code(),
        }
    }
}

/// One emitted runtime call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuntimeCall {
    Init {
        id: InstrumentationId,
    },
    RegGlobal {
        id: InstrumentationId,
        addr: Expr,
        size: u64,
    },
    /// Push the value at a concrete address (or a constant, with no
    /// address) onto the symbolic stack.
    Load {
        id: InstrumentationId,
        addr: Option<Expr>,
        ty: TypeCode,
        val: Expr,
    },
    /// Push an aggregate blob of the given size.
    LoadAggr {
        id: InstrumentationId,
        addr: Expr,
        ty: TypeCode,
        size: u64,
    },
    /// Pop a symbolic address, push the value read through it.
    Deref {
        id: InstrumentationId,
        addr: Expr,
        ty: TypeCode,
        val: Expr,
    },
    /// Pop one value and bind it to a concrete address.
    Store {
        id: InstrumentationId,
        addr: Expr,
    },
    /// Pop an address and a value; bind through the symbolic address.
    Write {
        id: InstrumentationId,
        addr: Expr,
    },
    ClearStack {
        id: InstrumentationId,
    },
    Apply1 {
        id: InstrumentationId,
        op: UnaryOp,
        ty: TypeCode,
        val: Expr,
    },
    Apply2 {
        id: InstrumentationId,
        op: Apply2Op,
        ty: TypeCode,
        val: Expr,
    },
    PtrApply2 {
        id: InstrumentationId,
        op: PointerOp,
        elem_size: u64,
        val: Expr,
    },
    Branch {
        id: InstrumentationId,
        bid: BranchId,
        taken: bool,
    },
    Call {
        id: InstrumentationId,
        fid: FunctionId,
    },
    Return {
        id: InstrumentationId,
    },
    HandleReturn {
        id: InstrumentationId,
        ty: TypeCode,
        val: Expr,
    },
}

impl RuntimeCall {
    /// The per-call instrumentation id (always the first argument).
    pub fn id(&self) -> InstrumentationId {
        match self {
            RuntimeCall::Init { id }
            | RuntimeCall::RegGlobal { id, .. }
            | RuntimeCall::Load { id, .. }
            | RuntimeCall::LoadAggr { id, .. }
            | RuntimeCall::Deref { id, .. }
            | RuntimeCall::Store { id, .. }
            | RuntimeCall::Write { id, .. }
            | RuntimeCall::ClearStack { id }
            | RuntimeCall::Apply1 { id, .. }
            | RuntimeCall::Apply2 { id, .. }
            | RuntimeCall::PtrApply2 { id, .. }
            | RuntimeCall::Branch { id, .. }
            | RuntimeCall::Call { id, .. }
            | RuntimeCall::Return { id }
            | RuntimeCall::HandleReturn { id, .. } => *id,
        }
    }

    /// The linker-level symbol this call resolves to.
    pub fn symbol(&self) -> &'static str {
        match self {
            RuntimeCall::Init { .. } => "__CrestInit",
            RuntimeCall::RegGlobal { .. } => "__CrestRegGlobal",
            RuntimeCall::Load { .. } => "__CrestLoad",
            RuntimeCall::LoadAggr { .. } => "__CrestLoadAggr",
            RuntimeCall::Deref { .. } => "__CrestDeref",
            RuntimeCall::Store { .. } => "__CrestStore",
            RuntimeCall::Write { .. } => "__CrestWrite",
            RuntimeCall::ClearStack { .. } => "__CrestClearStack",
            RuntimeCall::Apply1 { .. } => "__CrestApply1",
            RuntimeCall::Apply2 { .. } => "__CrestApply2",
            RuntimeCall::PtrApply2 { .. } => "__CrestPtrApply2",
            RuntimeCall::Branch { .. } => "__CrestBranch",
            RuntimeCall::Call { .. } => "__CrestCall",
            RuntimeCall::Return { .. } => "__CrestReturn",
            RuntimeCall::HandleReturn { .. } => "__CrestHandleReturn",
        }
    }
}

/// Runtime helpers are themselves marked skip and never instrumented.
pub fn is_runtime_symbol(name: &str) -> bool {
    name.starts_with("__Crest")
}

impl fmt::Display for RuntimeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.symbol())?;
        match self {
            RuntimeCall::Init { id } | RuntimeCall::ClearStack { id } | RuntimeCall::Return { id } => {
                write!(f, "{id}")?
            }
            RuntimeCall::RegGlobal { id, addr, size } => write!(f, "{id}, {addr}, {size}")?,
            RuntimeCall::Load { id, addr, ty, val } => match addr {
                Some(addr) => write!(f, "{id}, {addr}, {}, {val}", ty.code())?,
                None => write!(f, "{id}, 0, {}, {val}", ty.code())?,
            },
            RuntimeCall::LoadAggr { id, addr, ty, size } => {
                write!(f, "{id}, {addr}, {}, {size}", ty.code())?
            }
            RuntimeCall::Deref { id, addr, ty, val } => {
                write!(f, "{id}, {addr}, {}, {val}", ty.code())?
            }
            RuntimeCall::Store { id, addr } | RuntimeCall::Write { id, addr } => {
                write!(f, "{id}, {addr}")?
            }
            RuntimeCall::Apply1 { id, op, ty, val } => {
                write!(f, "{id}, {}, {}, {val}", op.code(), ty.code())?
            }
            RuntimeCall::Apply2 { id, op, ty, val } => {
                write!(f, "{id}, {}, {}, {val}", op.code(), ty.code())?
            }
            RuntimeCall::PtrApply2 {
                id,
                op,
                elem_size,
                val,
            } => write!(f, "{id}, {}, {elem_size}, {val}", op.code())?,
            RuntimeCall::Branch { id, bid, taken } => {
                write!(f, "{id}, {bid}, {}", u8::from(*taken))?
            }
            RuntimeCall::Call { id, fid } => write!(f, "{id}, {fid}")?,
            RuntimeCall::HandleReturn { id, ty, val } => {
                write!(f, "{id}, {}, {val}", ty.code())?
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CType, Lvalue, Variable};

    #[test]
    fn symbols_match_the_runtime_library() {
        let id = InstrumentationId(1);
        assert_eq!(RuntimeCall::Init { id }.symbol(), "__CrestInit");
        assert_eq!(
            RuntimeCall::Branch {
                id,
                bid: BranchId(7),
                taken: true
            }
            .symbol(),
            "__CrestBranch"
        );
    }

    #[test]
    fn runtime_symbols_are_skipped() {
        assert!(is_runtime_symbol("__CrestLoad"));
        assert!(is_runtime_symbol("__CrestClearStack"));
        assert!(!is_runtime_symbol("main"));
        assert!(!is_runtime_symbol("crest"));
    }

    #[test]
    fn display_renders_constant_load() {
        let call = RuntimeCall::Load {
            id: InstrumentationId(4),
            addr: None,
            ty: TypeCode::I32,
            val: Expr::int(3),
        };
        assert_eq!(format!("{call}"), "__CrestLoad(4, 0, 6, 3)");
    }

    #[test]
    fn display_renders_variable_load() {
        let x = Variable::local("x", CType::Int);
        let call = RuntimeCall::Load {
            id: InstrumentationId(9),
            addr: Some(Expr::AddrOf(Lvalue::var(x.clone()))),
            ty: TypeCode::I32,
            val: Expr::var(x),
        };
        assert_eq!(format!("{call}"), "__CrestLoad(9, &x, 6, x)");
    }

    #[test]
    fn display_renders_branch_flag_as_bit() {
        let call = RuntimeCall::Branch {
            id: InstrumentationId(2),
            bid: BranchId(11),
            taken: false,
        };
        assert_eq!(format!("{call}"), "__CrestBranch(2, 11, 0)");
    }

    #[test]
    fn apply2_op_code_spans_both_spaces() {
        assert_eq!(Apply2Op::Binary(BinaryOp::Add).code(), 0);
        assert_eq!(Apply2Op::Compare(CompareOp::SLt).code(), 34);
    }

    #[test]
    fn id_accessor_covers_every_variant() {
        let id = InstrumentationId(77);
        let calls = [
            RuntimeCall::Init { id },
            RuntimeCall::ClearStack { id },
            RuntimeCall::Return { id },
            RuntimeCall::Call {
                id,
                fid: FunctionId(1),
            },
            RuntimeCall::Store {
                id,
                addr: Expr::int(0),
            },
        ];
        for call in calls {
            assert_eq!(call.id(), id);
        }
    }

    #[test]
    fn serde_roundtrip() {
        let call = RuntimeCall::Apply2 {
            id: InstrumentationId(3),
            op: Apply2Op::Compare(CompareOp::Lt),
            ty: TypeCode::I32,
            val: Expr::int(1),
        };
        let json = serde_json::to_string(&call).unwrap();
        let back: RuntimeCall = serde_json::from_str(&json).unwrap();
        assert_eq!(call, back);
    }
}
