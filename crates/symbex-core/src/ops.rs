//! Operator enums shared by the instrumenter and the expression algebra.
//!
//! Four disjoint enums occupy a single global wire-code space so that
//! every `Apply1`/`Apply2`/`PtrApply2` call and every serialized
//! expression node names its operator with one `u8`. The codes are part
//! of the runtime ABI and the expression wire format; they must not be
//! renumbered. Two are pinned by contract: unknown source operators are
//! emitted as `CONCRETE` (18), and the cast the instrumenter emits is
//! `UNSIGNED_CAST` (22).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Binary bit-vector operators.
///
/// `CONCAT` and `EXTRACT` only appear in expression trees built by the
/// runtime (byte concatenation and byte slicing); the instrumenter never
/// emits them. `CONCRETE` marks an operation whose symbolic shape was
/// discarded; the runtime sees only the concrete result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BinaryOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    SDiv = 4,
    Mod = 5,
    SMod = 6,
    Shl = 7,
    Shr = 8,
    SShr = 9,
    BitAnd = 10,
    BitOr = 11,
    BitXor = 12,
    Concrete = 18,
    Concat = 24,
    Extract = 25,
}

/// Pointer arithmetic operators, routed through `PtrApply2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PointerOp {
    AddPI = 13,
    SAddPI = 14,
    SubPI = 15,
    SSubPI = 16,
    SubPP = 17,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum UnaryOp {
    Negate = 19,
    LogicalNot = 20,
    BitwiseNot = 21,
    UnsignedCast = 22,
    SignedCast = 23,
}

/// Comparison predicates. Unsigned and signed orderings are distinct
/// operators; equality is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompareOp {
    Eq = 26,
    Neq = 27,
    Gt = 28,
    Le = 29,
    Lt = 30,
    Ge = 31,
    SGt = 32,
    SLe = 33,
    SLt = 34,
    SGe = 35,
}

impl BinaryOp {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Select the signed variant for operators where signedness matters.
    pub fn with_signedness(self, signed: bool) -> Self {
        if !signed {
            return self;
        }
        match self {
            BinaryOp::Div => BinaryOp::SDiv,
            BinaryOp::Mod => BinaryOp::SMod,
            BinaryOp::Shr => BinaryOp::SShr,
            other => other,
        }
    }
}

impl PointerOp {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn with_signedness(self, signed: bool) -> Self {
        if !signed {
            return self;
        }
        match self {
            PointerOp::AddPI => PointerOp::SAddPI,
            PointerOp::SubPI => PointerOp::SSubPI,
            other => other,
        }
    }
}

impl UnaryOp {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl CompareOp {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// The complementary predicate: exactly one of `{op, negate(op)}`
    /// holds for any pair of operands.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Neq,
            CompareOp::Neq => CompareOp::Eq,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::SGt => CompareOp::SLe,
            CompareOp::SLe => CompareOp::SGt,
            CompareOp::SLt => CompareOp::SGe,
            CompareOp::SGe => CompareOp::SLt,
        }
    }

    pub fn with_signedness(self, signed: bool) -> Self {
        if !signed {
            return self;
        }
        match self {
            CompareOp::Gt => CompareOp::SGt,
            CompareOp::Le => CompareOp::SLe,
            CompareOp::Lt => CompareOp::SLt,
            CompareOp::Ge => CompareOp::SGe,
            other => other,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            CompareOp::SGt | CompareOp::SLe | CompareOp::SLt | CompareOp::SGe
        )
    }
}

impl TryFrom<u8> for BinaryOp {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, CoreError> {
        Ok(match code {
            0 => BinaryOp::Add,
            1 => BinaryOp::Sub,
            2 => BinaryOp::Mul,
            3 => BinaryOp::Div,
            4 => BinaryOp::SDiv,
            5 => BinaryOp::Mod,
            6 => BinaryOp::SMod,
            7 => BinaryOp::Shl,
            8 => BinaryOp::Shr,
            9 => BinaryOp::SShr,
            10 => BinaryOp::BitAnd,
            11 => BinaryOp::BitOr,
            12 => BinaryOp::BitXor,
            18 => BinaryOp::Concrete,
            24 => BinaryOp::Concat,
            25 => BinaryOp::Extract,
            other => return Err(CoreError::UnknownOpCode { code: other }),
        })
    }
}

impl TryFrom<u8> for PointerOp {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, CoreError> {
        Ok(match code {
            13 => PointerOp::AddPI,
            14 => PointerOp::SAddPI,
            15 => PointerOp::SubPI,
            16 => PointerOp::SSubPI,
            17 => PointerOp::SubPP,
            other => return Err(CoreError::UnknownOpCode { code: other }),
        })
    }
}

impl TryFrom<u8> for UnaryOp {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, CoreError> {
        Ok(match code {
            19 => UnaryOp::Negate,
            20 => UnaryOp::LogicalNot,
            21 => UnaryOp::BitwiseNot,
            22 => UnaryOp::UnsignedCast,
            23 => UnaryOp::SignedCast,
            other => return Err(CoreError::UnknownOpCode { code: other }),
        })
    }
}

impl TryFrom<u8> for CompareOp {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, CoreError> {
        Ok(match code {
            26 => CompareOp::Eq,
            27 => CompareOp::Neq,
            28 => CompareOp::Gt,
            29 => CompareOp::Le,
            30 => CompareOp::Lt,
            31 => CompareOp::Ge,
            32 => CompareOp::SGt,
            33 => CompareOp::SLe,
            34 => CompareOp::SLt,
            35 => CompareOp::SGe,
            other => return Err(CoreError::UnknownOpCode { code: other }),
        })
    }
}
