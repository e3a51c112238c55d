//! The stack-machine emission visitor.
//!
//! Compiles C expressions and statements into the exact sequence of
//! runtime calls that reproduces evaluation on the symbolic operand
//! stack. Emission order is stack order: every emitted call either
//! pushes one value, folds the top of the stack, or pops everything
//! with a side effect. For a binary operator the left operand's trace
//! fully precedes the right operand's, matching C sequence-point order
//! after normalization.
//!
//! Emitted calls are inserted *before* the statement they mirror, so
//! witness arguments observe pre-statement state; branch calls are
//! prepended inside the chosen block.

use indexmap::IndexMap;

use symbex_core::ast::{
    CBinaryOp, CType, CUnaryOp, Expr, FunctionDef, Lvalue, LvalueHost, Offset, Stmt, StmtKind,
};
use symbex_core::ops::{BinaryOp, CompareOp, PointerOp, UnaryOp};
use symbex_core::runtime::{is_runtime_symbol, Apply2Op, RuntimeCall};
use symbex_core::types::{to_type_code, TypeCode};
use symbex_core::{FunctionId, InstrumentationId, StatementId};

use crate::cfg::first_sid_of;
use crate::counters::Counters;
use crate::error::InstrumentError;

/// What one function's instrumentation produced.
#[derive(Debug)]
pub struct FunctionInstrumentation {
    pub fid: FunctionId,
    /// One `(true_successor, false_successor)` pair per `if`.
    pub branch_pairs: Vec<(StatementId, StatementId)>,
    pub calls_emitted: u32,
}

pub struct Visitor<'a> {
    counters: &'a mut Counters,
    skip: &'a IndexMap<String, bool>,
    fname: String,
    pairs: Vec<(StatementId, StatementId)>,
    emitted: u32,
}

impl<'a> Visitor<'a> {
    pub fn new(counters: &'a mut Counters, skip: &'a IndexMap<String, bool>) -> Self {
        Visitor {
            counters,
            skip,
            fname: String::new(),
            pairs: Vec::new(),
            emitted: 0,
        }
    }

    /// Instrument one non-skip function in place.
    pub fn instrument_function(
        &mut self,
        f: &mut FunctionDef,
    ) -> Result<FunctionInstrumentation, InstrumentError> {
        self.pairs.clear();
        self.emitted = 0;
        self.fname = f.name.clone();

        let fid = self.counters.next_fun();
        let body = std::mem::take(&mut f.body);
        let mut out = Vec::with_capacity(body.len());

        // Function entry: announce the call, then pop the arguments the
        // caller pushed, binding them to parameters in reverse
        // declaration order. Variadic functions cannot know their
        // argument count and leave the stack to ClearStack at the call.
        self.emit(&mut out, |id| RuntimeCall::Call { id, fid });
        if !f.is_variadic {
            for param in f.params.iter().rev() {
                if param.ty.is_symbolic() {
                    let lv = Lvalue::var(param.clone());
                    self.emit(&mut out, |id| RuntimeCall::Store {
                        id,
                        addr: Expr::AddrOf(lv),
                    });
                }
            }
        }

        self.instrument_block(body, &mut out)?;
        f.body = out;

        Ok(FunctionInstrumentation {
            fid,
            branch_pairs: std::mem::take(&mut self.pairs),
            calls_emitted: self.emitted,
        })
    }

    fn emit(&mut self, out: &mut Vec<Stmt>, build: impl FnOnce(InstrumentationId) -> RuntimeCall) {
        let id = self.counters.next_id();
        self.emitted += 1;
        out.push(Stmt::new(StmtKind::Instr(build(id))));
    }

    fn instrument_block(
        &mut self,
        stmts: Vec<Stmt>,
        out: &mut Vec<Stmt>,
    ) -> Result<(), InstrumentError> {
        for stmt in stmts {
            self.instrument_stmt(stmt, out)?;
        }
        Ok(())
    }

    fn instrument_stmt(&mut self, stmt: Stmt, out: &mut Vec<Stmt>) -> Result<(), InstrumentError> {
        let sid = stmt.sid;
        match stmt.kind {
            StmtKind::Assign { lv, rhs } => {
                if lv.ty().is_symbolic() && rhs.ty().is_symbolic() {
                    if lv.addr_is_symbolic() {
                        self.emit_addr(&lv, out)?;
                        self.emit_expr(&rhs, out)?;
                        let addr = Expr::AddrOf(lv.clone());
                        self.emit(out, |id| RuntimeCall::Write { id, addr });
                    } else {
                        self.emit_expr(&rhs, out)?;
                        let addr = Expr::AddrOf(lv.clone());
                        self.emit(out, |id| RuntimeCall::Store { id, addr });
                    }
                }
                out.push(Stmt {
                    sid,
                    kind: StmtKind::Assign { lv, rhs },
                });
            }
            StmtKind::Call { ret, callee, args } => {
                if self.is_skip(&callee) {
                    out.push(Stmt {
                        sid,
                        kind: StmtKind::Call { ret, callee, args },
                    });
                    return Ok(());
                }
                for arg in &args {
                    if arg.ty().is_symbolic() {
                        self.emit_expr(arg, out)?;
                    }
                }
                out.push(Stmt {
                    sid,
                    kind: StmtKind::Call {
                        ret: ret.clone(),
                        callee,
                        args,
                    },
                });
                match ret {
                    Some(lv) if lv.ty().is_symbolic() => {
                        let ty = to_type_code(&lv.ty())?;
                        let val = Expr::Read(lv.clone());
                        self.emit(out, |id| RuntimeCall::HandleReturn { id, ty, val });
                        let addr = Expr::AddrOf(lv);
                        self.emit(out, |id| RuntimeCall::Store { id, addr });
                    }
                    _ => self.emit(out, |id| RuntimeCall::ClearStack { id }),
                }
            }
            StmtKind::If {
                cond,
                then_blk,
                else_blk,
            } => {
                let sid_t = first_sid_of(&then_blk, &self.fname)?;
                let sid_e = first_sid_of(&else_blk, &self.fname)?;
                self.pairs.push((sid_t, sid_e));

                self.emit_expr(&cond, out)?;

                let mut new_then = Vec::with_capacity(then_blk.len() + 1);
                self.emit(&mut new_then, |id| RuntimeCall::Branch {
                    id,
                    bid: sid_t.into(),
                    taken: true,
                });
                self.instrument_block(then_blk, &mut new_then)?;

                let mut new_else = Vec::with_capacity(else_blk.len() + 1);
                self.emit(&mut new_else, |id| RuntimeCall::Branch {
                    id,
                    bid: sid_e.into(),
                    taken: false,
                });
                self.instrument_block(else_blk, &mut new_else)?;

                out.push(Stmt {
                    sid,
                    kind: StmtKind::If {
                        cond,
                        then_blk: new_then,
                        else_blk: new_else,
                    },
                });
            }
            StmtKind::Return(e) => {
                if let Some(e) = &e {
                    if e.ty().is_symbolic() {
                        self.emit_expr(e, out)?;
                    }
                }
                self.emit(out, |id| RuntimeCall::Return { id });
                out.push(Stmt {
                    sid,
                    kind: StmtKind::Return(e),
                });
            }
            kind @ (StmtKind::Skip
            | StmtKind::Goto(_)
            | StmtKind::Label(_)
            | StmtKind::Instr(_)) => out.push(Stmt { sid, kind }),
        }
        Ok(())
    }

    fn is_skip(&self, callee: &str) -> bool {
        is_runtime_symbol(callee) || self.skip.get(callee).copied().unwrap_or(false)
    }

    /// Emit the trace that pushes the value of `e` onto the symbolic
    /// stack. The caller has checked that `e` has a symbolic type.
    fn emit_expr(&mut self, e: &Expr, out: &mut Vec<Stmt>) -> Result<(), InstrumentError> {
        match e {
            Expr::Const { ty, .. } | Expr::SizeOf { ty, .. } => {
                let ty = to_type_code(ty)?;
                let val = e.clone();
                self.emit(out, |id| RuntimeCall::Load {
                    id,
                    addr: None,
                    ty,
                    val,
                });
            }
            Expr::Read(lv) => {
                let lv_ty = lv.ty();
                if lv_ty.is_aggregate() {
                    let size = lv_ty.size_of();
                    let addr = Expr::AddrOf(lv.clone());
                    self.emit(out, |id| RuntimeCall::LoadAggr {
                        id,
                        addr,
                        ty: TypeCode::Aggregate,
                        size,
                    });
                } else if lv.addr_is_symbolic() {
                    self.emit_addr(lv, out)?;
                    let ty = to_type_code(&lv_ty)?;
                    let addr = Expr::AddrOf(lv.clone());
                    let val = e.clone();
                    self.emit(out, |id| RuntimeCall::Deref { id, addr, ty, val });
                } else {
                    let ty = to_type_code(&lv_ty)?;
                    let addr = Some(Expr::AddrOf(lv.clone()));
                    let val = e.clone();
                    self.emit(out, |id| RuntimeCall::Load { id, addr, ty, val });
                }
            }
            Expr::AddrOf(lv) | Expr::StartOf(lv) => self.emit_addr(lv, out)?,
            Expr::Unary { op, ty, arg } => {
                if !arg.ty().is_symbolic() {
                    return self.fallback_load(e, out);
                }
                self.emit_expr(arg, out)?;
                let op = match op {
                    CUnaryOp::Neg => UnaryOp::Negate,
                    CUnaryOp::BitNot => UnaryOp::BitwiseNot,
                    CUnaryOp::LogicNot => UnaryOp::LogicalNot,
                };
                let ty = to_type_code(ty)?;
                let val = e.clone();
                self.emit(out, |id| RuntimeCall::Apply1 { id, op, ty, val });
            }
            Expr::Cast { ty, arg } => {
                if !arg.ty().is_symbolic() {
                    return self.fallback_load(e, out);
                }
                self.emit_expr(arg, out)?;
                let ty = to_type_code(ty)?;
                let val = e.clone();
                self.emit(out, |id| RuntimeCall::Apply1 {
                    id,
                    op: UnaryOp::UnsignedCast,
                    ty,
                    val,
                });
            }
            Expr::Binary { op, ty, lhs, rhs } => {
                if !lhs.ty().is_symbolic() || !rhs.ty().is_symbolic() {
                    return self.fallback_load(e, out);
                }
                if op.is_pointer_op() {
                    self.emit_expr(lhs, out)?;
                    self.emit_expr(rhs, out)?;
                    let elem_size = pointer_element_size(lhs, e);
                    let op = match op {
                        CBinaryOp::PtrAdd => {
                            PointerOp::AddPI.with_signedness(rhs.ty().is_signed())
                        }
                        CBinaryOp::PtrSub => {
                            PointerOp::SubPI.with_signedness(rhs.ty().is_signed())
                        }
                        _ => PointerOp::SubPP,
                    };
                    let val = e.clone();
                    self.emit(out, |id| RuntimeCall::PtrApply2 {
                        id,
                        op,
                        elem_size,
                        val,
                    });
                } else {
                    self.emit_expr(lhs, out)?;
                    self.emit_expr(rhs, out)?;
                    let apply_op = binary_apply_op(*op, &lhs.ty(), ty);
                    let ty = to_type_code(ty)?;
                    let val = e.clone();
                    self.emit(out, |id| RuntimeCall::Apply2 {
                        id,
                        op: apply_op,
                        ty,
                        val,
                    });
                }
            }
        }
        Ok(())
    }

    /// An expression whose sub-structure cannot be traced is loaded as
    /// a constant: the runtime sees only the concrete value and
    /// symbolic ancestry stops here.
    fn fallback_load(&mut self, e: &Expr, out: &mut Vec<Stmt>) -> Result<(), InstrumentError> {
        let ty = to_type_code(&e.ty())?;
        let val = e.clone();
        self.emit(out, |id| RuntimeCall::Load {
            id,
            addr: None,
            ty,
            val,
        });
        Ok(())
    }

    /// Emit the trace that pushes the address of `lv`, peeling the
    /// outermost offset:
    ///
    /// - bare variable: load its (concrete) address
    /// - memory host: the pointer expression's own trace
    /// - index: prefix address, index value, pointer add scaled by the
    ///   element size
    /// - field: prefix address, constant byte offset, pointer add with
    ///   element size 1
    fn emit_addr(&mut self, lv: &Lvalue, out: &mut Vec<Stmt>) -> Result<(), InstrumentError> {
        if let Some((last, prefix)) = lv.offsets.split_last() {
            let prefix_lv = Lvalue {
                host: lv.host.clone(),
                offsets: prefix.iter().cloned().collect(),
            };
            match last {
                Offset::Index { index, elem_ty } => {
                    self.emit_addr(&prefix_lv, out)?;
                    self.emit_expr(index, out)?;
                    let elem_size = elem_ty.size_of();
                    let val = Expr::AddrOf(lv.clone());
                    self.emit(out, |id| RuntimeCall::PtrApply2 {
                        id,
                        op: PointerOp::AddPI,
                        elem_size,
                        val,
                    });
                }
                Offset::Field { byte_offset, .. } => {
                    self.emit_addr(&prefix_lv, out)?;
                    let offset_val = Expr::Const {
                        ty: CType::ULong,
                        value: *byte_offset as i64,
                    };
                    self.emit(out, |id| RuntimeCall::Load {
                        id,
                        addr: None,
                        ty: TypeCode::U64,
                        val: offset_val,
                    });
                    let val = Expr::AddrOf(lv.clone());
                    self.emit(out, |id| RuntimeCall::PtrApply2 {
                        id,
                        op: PointerOp::AddPI,
                        elem_size: 1,
                        val,
                    });
                }
            }
        } else {
            match &lv.host {
                LvalueHost::Var(_) => {
                    let val = Expr::AddrOf(lv.clone());
                    self.emit(out, |id| RuntimeCall::Load {
                        id,
                        addr: None,
                        ty: TypeCode::U64,
                        val,
                    });
                }
                LvalueHost::Mem(e) => self.emit_expr(e, out)?,
            }
        }
        Ok(())
    }
}

/// Element size for pointer arithmetic: the pointee of the pointer
/// operand, falling back to the result type's pointee.
fn pointer_element_size(lhs: &Expr, whole: &Expr) -> u64 {
    let lhs_ty = lhs.ty();
    if let Some(elem) = lhs_ty.pointee() {
        return elem.size_of();
    }
    let whole_ty = whole.ty();
    if let Some(elem) = whole_ty.pointee() {
        return elem.size_of();
    }
    1
}

/// Map a source binary operator to the runtime code, selecting signed
/// variants from the operand type. Operators with no runtime shape
/// (residual short-circuit forms) emit CONCRETE: the runtime folds the
/// operands and forgets the symbolic op.
fn binary_apply_op(op: CBinaryOp, operand_ty: &CType, _result_ty: &CType) -> Apply2Op {
    let signed = operand_ty.is_signed();
    match op {
        CBinaryOp::Add => Apply2Op::Binary(BinaryOp::Add),
        CBinaryOp::Sub => Apply2Op::Binary(BinaryOp::Sub),
        CBinaryOp::Mul => Apply2Op::Binary(BinaryOp::Mul),
        CBinaryOp::Div => Apply2Op::Binary(BinaryOp::Div.with_signedness(signed)),
        CBinaryOp::Rem => Apply2Op::Binary(BinaryOp::Mod.with_signedness(signed)),
        CBinaryOp::Shl => Apply2Op::Binary(BinaryOp::Shl),
        CBinaryOp::Shr => Apply2Op::Binary(BinaryOp::Shr.with_signedness(signed)),
        CBinaryOp::BitAnd => Apply2Op::Binary(BinaryOp::BitAnd),
        CBinaryOp::BitOr => Apply2Op::Binary(BinaryOp::BitOr),
        CBinaryOp::BitXor => Apply2Op::Binary(BinaryOp::BitXor),
        CBinaryOp::Lt => Apply2Op::Compare(CompareOp::Lt.with_signedness(signed)),
        CBinaryOp::Gt => Apply2Op::Compare(CompareOp::Gt.with_signedness(signed)),
        CBinaryOp::Le => Apply2Op::Compare(CompareOp::Le.with_signedness(signed)),
        CBinaryOp::Ge => Apply2Op::Compare(CompareOp::Ge.with_signedness(signed)),
        CBinaryOp::Eq => Apply2Op::Compare(CompareOp::Eq),
        CBinaryOp::Ne => Apply2Op::Compare(CompareOp::Neq),
        CBinaryOp::LogicAnd | CBinaryOp::LogicOr => Apply2Op::Binary(BinaryOp::Concrete),
        // Pointer ops never reach here.
        CBinaryOp::PtrAdd | CBinaryOp::PtrSub | CBinaryOp::PtrDiff => {
            Apply2Op::Binary(BinaryOp::Concrete)
        }
    }
}
