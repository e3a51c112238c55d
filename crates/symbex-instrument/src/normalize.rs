//! Branch normalization.
//!
//! After this pass every `if` satisfies the shape the visitor and the
//! branch recorder rely on:
//!
//! - both blocks are non-empty, so each successor has a first
//!   statement id to brand and record;
//! - the condition is a comparison predicate: outer logical negations
//!   are stripped while toggling a polarity flag, an innermost
//!   comparison is emitted negated-iff-polarity, and anything else is
//!   wrapped as `(e != 0)` or `(e == 0)`. Casts are never stripped; a
//!   down-cast can turn a nonzero value into zero.
//! - short-circuit `&&`/`||` are gone, lowered into nested ifs that
//!   assign a fresh flag temporary.

use symbex_core::ast::{
    CBinaryOp, CType, CUnaryOp, Expr, FunctionDef, Lvalue, Stmt, StmtKind, TranslationUnit,
    Variable,
};

pub fn normalize_all(tu: &mut TranslationUnit) {
    for f in &mut tu.functions {
        if !f.skip {
            normalize(f);
        }
    }
}

pub fn normalize(f: &mut FunctionDef) {
    let mut fresh = FreshFlags::default();
    let body = std::mem::take(&mut f.body);
    f.body = normalize_block(body, &mut fresh);
    f.locals.append(&mut fresh.temps);
}

#[derive(Default)]
struct FreshFlags {
    counter: u32,
    temps: Vec<Variable>,
}

impl FreshFlags {
    fn fresh(&mut self) -> Variable {
        let var = Variable::local(format!("__sc{}", self.counter), CType::Int);
        self.counter += 1;
        self.temps.push(var.clone());
        var
    }
}

fn normalize_block(stmts: Vec<Stmt>, fresh: &mut FreshFlags) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match stmt.kind {
            StmtKind::If {
                cond,
                then_blk,
                else_blk,
            } => {
                let then_blk = normalize_block(then_blk, fresh);
                let else_blk = normalize_block(else_blk, fresh);
                normalize_if(cond, then_blk, else_blk, fresh, &mut out);
            }
            kind => out.push(Stmt { sid: stmt.sid, kind }),
        }
    }
    out
}

fn normalize_if(
    cond: Expr,
    mut then_blk: Vec<Stmt>,
    mut else_blk: Vec<Stmt>,
    fresh: &mut FreshFlags,
    out: &mut Vec<Stmt>,
) {
    let cond = lower_short_circuit(cond, fresh, out);
    let cond = predicate_form(cond);
    if then_blk.is_empty() {
        then_blk.push(Stmt::skip());
    }
    if else_blk.is_empty() {
        else_blk.push(Stmt::skip());
    }
    out.push(Stmt::new(StmtKind::If {
        cond,
        then_blk,
        else_blk,
    }));
}

/// Replace `&&`/`||` reachable through the condition's logical
/// structure with flag temporaries computed by nested ifs, preserving
/// short-circuit evaluation order.
fn lower_short_circuit(e: Expr, fresh: &mut FreshFlags, out: &mut Vec<Stmt>) -> Expr {
    match e {
        Expr::Binary {
            op: op @ (CBinaryOp::LogicAnd | CBinaryOp::LogicOr),
            lhs,
            rhs,
            ..
        } => {
            let lhs = lower_short_circuit(*lhs, fresh, out);
            let flag = fresh.fresh();

            // The rhs only evaluates on the short-circuit-surviving
            // path, so its own lowering nests inside that branch.
            let mut rhs_blk = Vec::new();
            let rhs = lower_short_circuit(*rhs, fresh, &mut rhs_blk);
            rhs_blk.push(Stmt::new(StmtKind::Assign {
                lv: Lvalue::var(flag.clone()),
                rhs: as_flag_value(rhs),
            }));

            let const_blk = |value: i64| {
                vec![Stmt::new(StmtKind::Assign {
                    lv: Lvalue::var(flag.clone()),
                    rhs: Expr::int(value),
                })]
            };
            let (then_blk, else_blk) = match op {
                CBinaryOp::LogicAnd => (rhs_blk, const_blk(0)),
                _ => (const_blk(1), rhs_blk),
            };
            normalize_if(lhs, then_blk, else_blk, fresh, out);
            Expr::var(flag)
        }
        Expr::Unary {
            op: CUnaryOp::LogicNot,
            ty,
            arg,
        } => {
            let arg = lower_short_circuit(*arg, fresh, out);
            Expr::Unary {
                op: CUnaryOp::LogicNot,
                ty,
                arg: Box::new(arg),
            }
        }
        other => other,
    }
}

/// A value expression for a lowered flag assignment: comparisons stand
/// as their own 0/1 value, everything else is tested against zero.
fn as_flag_value(e: Expr) -> Expr {
    match &e {
        Expr::Binary { op, .. } if op.is_comparison() => e,
        _ => wrap_zero_test(e, false),
    }
}

/// Rewrite a condition into predicate form.
fn predicate_form(e: Expr) -> Expr {
    let mut polarity = false;
    let mut inner = e;
    while let Expr::Unary {
        op: CUnaryOp::LogicNot,
        arg,
        ..
    } = inner
    {
        polarity = !polarity;
        inner = *arg;
    }

    match inner {
        Expr::Binary { op, ty, lhs, rhs } if op.is_comparison() => {
            let op = if polarity {
                // negate_comparison covers every comparison operator
                op.negate_comparison().unwrap_or(op)
            } else {
                op
            };
            Expr::Binary { op, ty, lhs, rhs }
        }
        other => wrap_zero_test(other, polarity),
    }
}

/// `(e != 0)`, or `(e == 0)` when the polarity is flipped.
fn wrap_zero_test(e: Expr, flipped: bool) -> Expr {
    let zero = Expr::Const {
        ty: e.ty(),
        value: 0,
    };
    Expr::Binary {
        op: if flipped { CBinaryOp::Eq } else { CBinaryOp::Ne },
        ty: CType::Int,
        lhs: Box::new(e),
        rhs: Box::new(zero),
    }
}
