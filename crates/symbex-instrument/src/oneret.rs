//! The single-return transform.
//!
//! Rewrites every function to exactly one trailing `return`: each
//! early `return e` becomes an assignment to a fresh `__retval`
//! temporary followed by a `goto` to a fresh exit label. Functions
//! already in that shape are left untouched. The reserved names
//! `__retval` and `__exit` must not be used by front-end input.

use symbex_core::ast::{
    CType, Expr, FunctionDef, Lvalue, Stmt, StmtKind, TranslationUnit, Variable,
};

const RETVAL: &str = "__retval";
const EXIT_LABEL: &str = "__exit";

pub fn single_return_all(tu: &mut TranslationUnit) {
    for f in &mut tu.functions {
        if !f.skip {
            single_return(f);
        }
    }
}

/// Rewrite one function to the single-trailing-return shape.
pub fn single_return(f: &mut FunctionDef) {
    let returns = count_returns(&f.body);
    let tail_return = matches!(
        f.body.last().map(|s| &s.kind),
        Some(StmtKind::Return(_))
    );
    if returns == 1 && tail_return {
        return;
    }

    let retval = if f.ret_ty == CType::Void {
        None
    } else {
        Some(Variable::local(RETVAL, f.ret_ty.clone()))
    };

    let body = std::mem::take(&mut f.body);
    f.body = rewrite_block(body, &retval);
    f.body.push(Stmt::new(StmtKind::Label(EXIT_LABEL.into())));
    f.body.push(Stmt::new(StmtKind::Return(
        retval.clone().map(|v| Expr::var(v)),
    )));
    if let Some(v) = retval {
        f.locals.push(v);
    }
}

fn count_returns(stmts: &[Stmt]) -> usize {
    stmts
        .iter()
        .map(|s| match &s.kind {
            StmtKind::Return(_) => 1,
            StmtKind::If {
                then_blk, else_blk, ..
            } => count_returns(then_blk) + count_returns(else_blk),
            _ => 0,
        })
        .sum()
}

fn rewrite_block(stmts: Vec<Stmt>, retval: &Option<Variable>) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for mut stmt in stmts {
        match stmt.kind {
            StmtKind::Return(e) => {
                if let (Some(v), Some(e)) = (retval, e) {
                    out.push(Stmt::new(StmtKind::Assign {
                        lv: Lvalue::var(v.clone()),
                        rhs: e,
                    }));
                }
                out.push(Stmt::new(StmtKind::Goto(EXIT_LABEL.into())));
            }
            StmtKind::If {
                cond,
                then_blk,
                else_blk,
            } => {
                stmt.kind = StmtKind::If {
                    cond,
                    then_blk: rewrite_block(then_blk, retval),
                    else_blk: rewrite_block(else_blk, retval),
                };
                out.push(stmt);
            }
            _ => out.push(stmt),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ret(e: Option<Expr>) -> Stmt {
        Stmt::new(StmtKind::Return(e))
    }

    #[test]
    fn single_tail_return_is_untouched() {
        let mut f = FunctionDef::new("f", CType::Int);
        f.body = vec![ret(Some(Expr::int(0)))];
        let before = f.clone();
        single_return(&mut f);
        assert_eq!(f, before);
    }

    #[test]
    fn early_returns_are_rerouted() {
        let mut f = FunctionDef::new("f", CType::Int);
        f.body = vec![
            Stmt::new(StmtKind::If {
                cond: Expr::int(1),
                then_blk: vec![ret(Some(Expr::int(1)))],
                else_blk: vec![],
            }),
            ret(Some(Expr::int(2))),
        ];
        single_return(&mut f);

        // __retval local added, body ends with label + single return.
        assert_eq!(f.locals.last().unwrap().name, "__retval");
        let n = f.body.len();
        assert!(matches!(&f.body[n - 2].kind, StmtKind::Label(l) if l == "__exit"));
        assert!(matches!(&f.body[n - 1].kind, StmtKind::Return(Some(_))));
        assert_eq!(count_returns(&f.body), 1);

        // The early return became assign + goto inside the branch.
        match &f.body[0].kind {
            StmtKind::If { then_blk, .. } => {
                assert!(matches!(&then_blk[0].kind, StmtKind::Assign { .. }));
                assert!(matches!(&then_blk[1].kind, StmtKind::Goto(l) if l == "__exit"));
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn void_functions_get_bare_exit() {
        let mut f = FunctionDef::new("f", CType::Void);
        f.body = vec![
            Stmt::new(StmtKind::If {
                cond: Expr::int(1),
                then_blk: vec![ret(None)],
                else_blk: vec![],
            }),
            ret(None),
        ];
        single_return(&mut f);

        assert!(f.locals.is_empty());
        assert!(matches!(
            &f.body.last().unwrap().kind,
            StmtKind::Return(None)
        ));
        assert_eq!(count_returns(&f.body), 1);
    }
}
