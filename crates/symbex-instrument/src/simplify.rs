//! Memory-reference simplification.
//!
//! Splits complex lvalues so that every memory dereference goes through
//! a pointer expression that itself reads only plain variables. A
//! nested read like `**p` or `*(q[i])` is hoisted into a fresh pointer
//! temporary:
//!
//! ```text
//! **p = 0;        =>      __mem0 = *p; *__mem0 = 0;
//! ```
//!
//! This keeps the address-computation recursion in the visitor shallow:
//! after this pass an lvalue contains at most one memory step whose
//! pointer expression is simple.

use symbex_core::ast::{
    CType, Expr, Lvalue, LvalueHost, Offset, Stmt, StmtKind, TranslationUnit, Variable,
};

/// Run the simplification over every function in the unit.
pub fn simplify_memory_refs(tu: &mut TranslationUnit) {
    for f in &mut tu.functions {
        if f.skip {
            continue;
        }
        let mut fresh = FreshTemps::default();
        let body = std::mem::take(&mut f.body);
        f.body = simplify_block(body, &mut fresh);
        f.locals.append(&mut fresh.temps);
    }
}

#[derive(Default)]
struct FreshTemps {
    counter: u32,
    temps: Vec<Variable>,
}

impl FreshTemps {
    fn fresh(&mut self, ty: CType) -> Variable {
        let var = Variable::local(format!("__mem{}", self.counter), ty);
        self.counter += 1;
        self.temps.push(var.clone());
        var
    }
}

fn simplify_block(stmts: Vec<Stmt>, fresh: &mut FreshTemps) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        simplify_stmt(stmt, fresh, &mut out);
    }
    out
}

fn simplify_stmt(mut stmt: Stmt, fresh: &mut FreshTemps, out: &mut Vec<Stmt>) {
    let mut prelude = Vec::new();
    match &mut stmt.kind {
        StmtKind::Assign { lv, rhs } => {
            simplify_lvalue(lv, fresh, &mut prelude);
            simplify_expr(rhs, fresh, &mut prelude);
        }
        StmtKind::Call { ret, args, .. } => {
            if let Some(lv) = ret {
                simplify_lvalue(lv, fresh, &mut prelude);
            }
            for arg in args {
                simplify_expr(arg, fresh, &mut prelude);
            }
        }
        StmtKind::If {
            cond,
            then_blk,
            else_blk,
        } => {
            simplify_expr(cond, fresh, &mut prelude);
            let then_body = std::mem::take(then_blk);
            let else_body = std::mem::take(else_blk);
            *then_blk = simplify_block(then_body, fresh);
            *else_blk = simplify_block(else_body, fresh);
        }
        StmtKind::Return(Some(e)) => simplify_expr(e, fresh, &mut prelude),
        StmtKind::Return(None)
        | StmtKind::Skip
        | StmtKind::Goto(_)
        | StmtKind::Label(_)
        | StmtKind::Instr(_) => {}
    }
    out.append(&mut prelude);
    out.push(stmt);
}

fn simplify_expr(e: &mut Expr, fresh: &mut FreshTemps, prelude: &mut Vec<Stmt>) {
    match e {
        Expr::Read(lv) | Expr::AddrOf(lv) | Expr::StartOf(lv) => {
            simplify_lvalue(lv, fresh, prelude)
        }
        Expr::Unary { arg, .. } | Expr::Cast { arg, .. } => simplify_expr(arg, fresh, prelude),
        Expr::Binary { lhs, rhs, .. } => {
            simplify_expr(lhs, fresh, prelude);
            simplify_expr(rhs, fresh, prelude);
        }
        Expr::Const { .. } | Expr::SizeOf { .. } => {}
    }
}

fn simplify_lvalue(lv: &mut Lvalue, fresh: &mut FreshTemps, prelude: &mut Vec<Stmt>) {
    if let LvalueHost::Mem(addr) = &mut lv.host {
        simplify_expr(addr, fresh, prelude);
        if expr_reads_through_memory(addr) {
            let tmp = fresh.fresh(addr.ty());
            prelude.push(Stmt::new(StmtKind::Assign {
                lv: Lvalue::var(tmp.clone()),
                rhs: (**addr).clone(),
            }));
            **addr = Expr::var(tmp);
        }
    }
    for off in &mut lv.offsets {
        if let Offset::Index { index, .. } = off {
            simplify_expr(index, fresh, prelude);
        }
    }
}

/// Whether evaluating the expression reads an lvalue that is itself
/// more than a plain variable (a memory host or any offset chain).
fn expr_reads_through_memory(e: &Expr) -> bool {
    match e {
        Expr::Read(lv) => {
            matches!(lv.host, LvalueHost::Mem(_)) || !lv.offsets.is_empty()
        }
        Expr::Unary { arg, .. } | Expr::Cast { arg, .. } => expr_reads_through_memory(arg),
        Expr::Binary { lhs, rhs, .. } => {
            expr_reads_through_memory(lhs) || expr_reads_through_memory(rhs)
        }
        Expr::Const { .. } | Expr::SizeOf { .. } | Expr::AddrOf(_) | Expr::StartOf(_) => false,
    }
}
