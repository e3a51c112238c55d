//! Lowering symbolic expressions to bit-vector terms.
//!
//! The constraint solver is an external collaborator; [`BvContext`] is
//! the seam. An implementation backs each method with its solver's
//! term constructors. The [`BvBuilder`]/[`BvTerm`] pair is a reference
//! implementation that builds a plain term tree with width tracking,
//! used by the tests and usable as a staging representation.

use thiserror::Error;

use symbex_core::ops::{BinaryOp, CompareOp, UnaryOp};
use symbex_core::VarId;

use crate::expr::{Endian, SymExpr};
use crate::object::SymObject;

/// A tree that cannot be lowered. Extract nodes carry their index as a
/// concrete right operand; anything else there is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlastError {
    #[error("extract node without a concrete byte index")]
    MalformedExtract,
}

/// Bit-vector term constructors, implemented by the solver binding.
///
/// Widths are in bits. `compare` must yield an 8-bit term holding 0 or
/// 1 (comparison nodes are one byte wide in the expression tree).
/// Casts arrive through `unary` with the target width; the
/// implementation extends or truncates by comparing it with the
/// argument's width, sign-extending for `SignedCast`.
pub trait BvContext {
    type Term;

    fn constant(&mut self, bits: u32, value: u128) -> Self::Term;
    fn variable(&mut self, var: VarId, bits: u32) -> Self::Term;
    fn unary(&mut self, op: UnaryOp, bits: u32, arg: Self::Term) -> Self::Term;
    fn binary(&mut self, op: BinaryOp, bits: u32, lhs: Self::Term, rhs: Self::Term)
        -> Self::Term;
    fn compare(&mut self, op: CompareOp, lhs: Self::Term, rhs: Self::Term) -> Self::Term;
    fn extract(&mut self, hi: u32, lo: u32, arg: Self::Term) -> Self::Term;
    fn concat(&mut self, hi: Self::Term, lo: Self::Term) -> Self::Term;
    /// A read through a possibly-symbolic address. The solver binding
    /// decides how to model the memory relation; the reference builder
    /// falls back to the concrete witness.
    fn deref(&mut self, object: &SymObject, addr: Self::Term, bits: u32, witness: u128)
        -> Self::Term;
}

fn mask_to(bits: u32, value: u128) -> u128 {
    if bits >= 128 {
        value
    } else {
        value & ((1u128 << bits) - 1)
    }
}

impl SymExpr {
    /// Lower this expression to a bit-vector term.
    ///
    /// `endian` must match the ordering the tree was built with; it
    /// orients CONCAT operands and scales EXTRACT byte indices into bit
    /// ranges. Signed operator variants map to the signed solver
    /// primitive; a CONCRETE binary node lowers to its witness constant
    /// (symbolic ancestry was already discarded there).
    pub fn bit_blast<C: BvContext>(
        &self,
        ctx: &mut C,
        endian: Endian,
    ) -> Result<C::Term, BlastError> {
        let bits = (self.size() * 8) as u32;
        match self {
            SymExpr::Concrete { value, .. } => {
                Ok(ctx.constant(bits, mask_to(bits, *value as u64 as u128)))
            }
            SymExpr::Basic { var, .. } => Ok(ctx.variable(*var, bits)),
            SymExpr::Unary { op, child, .. } => {
                let arg = child.bit_blast(ctx, endian)?;
                Ok(ctx.unary(*op, bits, arg))
            }
            SymExpr::Binary {
                op: BinaryOp::Concrete,
                value,
                ..
            } => Ok(ctx.constant(bits, mask_to(bits, *value as u64 as u128))),
            SymExpr::Binary {
                op: BinaryOp::Concat,
                left,
                right,
                ..
            } => {
                let first = left.bit_blast(ctx, endian)?;
                let second = right.bit_blast(ctx, endian)?;
                // The first memory chunk is the high-order operand on
                // big-endian and the low-order one on little-endian.
                Ok(match endian {
                    Endian::Big => ctx.concat(first, second),
                    Endian::Little => ctx.concat(second, first),
                })
            }
            SymExpr::Binary {
                op: BinaryOp::Extract,
                left,
                right,
                size,
                ..
            } => {
                let at = match &**right {
                    SymExpr::Concrete { value, .. } => *value as u64,
                    _ => return Err(BlastError::MalformedExtract),
                };
                let src_size = left.size();
                let arg = left.bit_blast(ctx, endian)?;
                let low_byte = match endian {
                    Endian::Little => at,
                    Endian::Big => src_size
                        .checked_sub(at + size)
                        .ok_or(BlastError::MalformedExtract)?,
                };
                let lo = (low_byte * 8) as u32;
                let hi = lo + bits - 1;
                Ok(ctx.extract(hi, lo, arg))
            }
            SymExpr::Binary {
                op, left, right, ..
            } => {
                let lhs = left.bit_blast(ctx, endian)?;
                let rhs = right.bit_blast(ctx, endian)?;
                Ok(ctx.binary(*op, bits, lhs, rhs))
            }
            SymExpr::Compare {
                op, left, right, ..
            } => {
                let lhs = left.bit_blast(ctx, endian)?;
                let rhs = right.bit_blast(ctx, endian)?;
                Ok(ctx.compare(*op, lhs, rhs))
            }
            SymExpr::Deref {
                object,
                addr,
                value,
                ..
            } => {
                let addr_term = addr.bit_blast(ctx, endian)?;
                Ok(ctx.deref(object, addr_term, bits, mask_to(bits, *value as u64 as u128)))
            }
        }
    }
}

/// A plain bit-vector term tree with width tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BvTerm {
    Const {
        bits: u32,
        value: u128,
    },
    Var {
        bits: u32,
        var: VarId,
    },
    Unary {
        bits: u32,
        op: UnaryOp,
        arg: Box<BvTerm>,
    },
    Binary {
        bits: u32,
        op: BinaryOp,
        lhs: Box<BvTerm>,
        rhs: Box<BvTerm>,
    },
    Compare {
        op: CompareOp,
        lhs: Box<BvTerm>,
        rhs: Box<BvTerm>,
    },
    Extract {
        hi: u32,
        lo: u32,
        arg: Box<BvTerm>,
    },
    Concat {
        hi: Box<BvTerm>,
        lo: Box<BvTerm>,
    },
}

impl BvTerm {
    /// Width of this term in bits.
    pub fn bits(&self) -> u32 {
        match self {
            BvTerm::Const { bits, .. }
            | BvTerm::Var { bits, .. }
            | BvTerm::Unary { bits, .. }
            | BvTerm::Binary { bits, .. } => *bits,
            BvTerm::Compare { .. } => 8,
            BvTerm::Extract { hi, lo, .. } => hi - lo + 1,
            BvTerm::Concat { hi, lo } => hi.bits() + lo.bits(),
        }
    }
}

/// The reference [`BvContext`]: builds [`BvTerm`] trees.
#[derive(Debug, Default)]
pub struct BvBuilder;

impl BvContext for BvBuilder {
    type Term = BvTerm;

    fn constant(&mut self, bits: u32, value: u128) -> BvTerm {
        BvTerm::Const {
            bits,
            value: mask_to(bits, value),
        }
    }

    fn variable(&mut self, var: VarId, bits: u32) -> BvTerm {
        BvTerm::Var { bits, var }
    }

    fn unary(&mut self, op: UnaryOp, bits: u32, arg: BvTerm) -> BvTerm {
        BvTerm::Unary {
            bits,
            op,
            arg: Box::new(arg),
        }
    }

    fn binary(&mut self, op: BinaryOp, bits: u32, lhs: BvTerm, rhs: BvTerm) -> BvTerm {
        BvTerm::Binary {
            bits,
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    fn compare(&mut self, op: CompareOp, lhs: BvTerm, rhs: BvTerm) -> BvTerm {
        BvTerm::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    fn extract(&mut self, hi: u32, lo: u32, arg: BvTerm) -> BvTerm {
        BvTerm::Extract {
            hi,
            lo,
            arg: Box::new(arg),
        }
    }

    fn concat(&mut self, hi: BvTerm, lo: BvTerm) -> BvTerm {
        BvTerm::Concat {
            hi: Box::new(hi),
            lo: Box::new(lo),
        }
    }

    fn deref(&mut self, _object: &SymObject, _addr: BvTerm, bits: u32, witness: u128) -> BvTerm {
        BvTerm::Const {
            bits,
            value: witness,
        }
    }
}
