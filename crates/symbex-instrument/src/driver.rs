//! The pass driver: fixed sub-pass order, counter lifecycle, record
//! flushing. The order is load-bearing; reordering breaks either the
//! shape invariants the visitor relies on or the id uniqueness
//! contract.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use symbex_core::ast::{CType, Expr, FunctionDef, Lvalue, Stmt, StmtKind, TranslationUnit};
use symbex_core::runtime::RuntimeCall;
use symbex_core::StatementId;

use crate::cfg;
use crate::counters::{Counters, CounterStore};
use crate::error::InstrumentError;
use crate::normalize;
use crate::oneret;
use crate::recorder::Recorder;
use crate::simplify;
use crate::visitor::Visitor;

/// Name of the synthesized per-unit initializer function.
pub const INIT_FUNCTION: &str = "__symbex_init";

/// Options controlling one pass invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentOptions {
    /// Directory holding the counter files and the append-only
    /// `branches`/`cfg`/`cfg_func_map` records. Shared across the
    /// translation units of one build; invocations must be serialized.
    pub state_dir: PathBuf,

    /// Extra function names to treat as skip, in addition to source
    /// annotations and the runtime's own helpers.
    pub extra_skip: Vec<String>,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        InstrumentOptions {
            state_dir: PathBuf::from("./symbex-state/"),
            extra_skip: Vec::new(),
        }
    }
}

/// Summary of a successful pass over one translation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentReport {
    pub functions: u32,
    pub statements: u32,
    pub branch_pairs: u32,
    pub calls_emitted: u32,
}

/// Run the full pass over one translation unit.
pub fn instrument_translation_unit(
    tu: &mut TranslationUnit,
    options: &InstrumentOptions,
) -> Result<InstrumentReport, InstrumentError> {
    // 1-4: shape transforms.
    simplify::simplify_memory_refs(tu);
    cfg::prepare_all(tu)?;
    oneret::single_return_all(tu);
    normalize::normalize_all(tu);

    // 5-6: reset ids, then seed counters from disk.
    cfg::clear(tu);
    let store = CounterStore::new(&options.state_dir);
    let mut counters = store.load();
    let stmt_base = counters.stmt;
    debug!(
        id = counters.id,
        stmt = counters.stmt,
        fun = counters.fun,
        "counters loaded"
    );

    // 7: recompute the CFG with globally unique statement ids.
    for f in tu.functions.iter_mut().filter(|f| !f.skip) {
        cfg::number(f, &mut counters);
    }
    let defined = first_sids(tu)?;

    // 8: record per-statement successors and the function entry map.
    let mut recorder = Recorder::new(&options.state_dir);
    for f in tu.functions.iter().filter(|f| !f.skip) {
        let fcfg = cfg::compute(f, &defined)?;
        if !f.is_static {
            recorder.record_func_entry(&f.name, fcfg.first_sid);
        }
        for line in fcfg.lines {
            recorder.record_cfg_line(line);
        }
    }
    recorder.flush_cfg();

    // 9: the emission visitor.
    let mut skip = tu.skip_map();
    for name in &options.extra_skip {
        skip.insert(name.clone(), true);
    }

    let mut functions = 0;
    let mut branch_pairs = 0;
    let mut calls_emitted = 0;
    {
        let mut visitor = Visitor::new(&mut counters, &skip);
        for f in tu.functions.iter_mut().filter(|f| !f.skip) {
            let result = visitor.instrument_function(f)?;
            debug!(
                function = %f.name,
                fid = %result.fid,
                pairs = result.branch_pairs.len(),
                calls = result.calls_emitted,
                "function instrumented"
            );
            functions += 1;
            branch_pairs += result.branch_pairs.len() as u32;
            calls_emitted += result.calls_emitted;
            recorder.record_function_branches(result.fid, result.branch_pairs);
        }
    }

    // 10: the per-unit initializer.
    calls_emitted += add_global_initializer(tu, &mut counters);

    // 11: persist counters, then flush the discovered branch pairs.
    store.save(&counters)?;
    recorder.flush_branches();

    Ok(InstrumentReport {
        functions,
        statements: counters.stmt - stmt_base,
        branch_pairs,
        calls_emitted,
    })
}

/// First statement id of every non-skip definition, for resolving call
/// targets within the unit.
fn first_sids(tu: &TranslationUnit) -> Result<HashMap<String, StatementId>, InstrumentError> {
    let mut map = HashMap::new();
    for f in tu.functions.iter().filter(|f| !f.skip) {
        map.insert(f.name.clone(), cfg::first_sid_of(&f.body, &f.name)?);
    }
    Ok(map)
}

/// Synthesize the initializer that announces the runtime and registers
/// every externally-visible sized global. Marked skip and static so it
/// is never itself instrumented and never collides across units.
fn add_global_initializer(tu: &mut TranslationUnit, counters: &mut Counters) -> u32 {
    let mut body = Vec::new();
    let mut emitted = 0;

    let id = counters.next_id();
    body.push(Stmt::new(StmtKind::Instr(RuntimeCall::Init { id })));
    emitted += 1;

    for g in tu.globals.iter().filter(|g| g.is_registerable()) {
        let id = counters.next_id();
        body.push(Stmt::new(StmtKind::Instr(RuntimeCall::RegGlobal {
            id,
            addr: Expr::AddrOf(Lvalue::var(g.var.clone())),
            size: g.var.ty.size_of(),
        })));
        emitted += 1;
    }
    body.push(Stmt::new(StmtKind::Return(None)));

    let mut init = FunctionDef::new(INIT_FUNCTION, CType::Void);
    init.is_static = true;
    init.skip = true;
    init.body = body;
    tu.functions.push(init);

    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use symbex_core::ast::{CBinaryOp, GlobalVar, Variable};

    fn sample_tu() -> TranslationUnit {
        let a = Variable::local("a", CType::Int);
        let b = Variable::local("b", CType::Int);
        let mut f = FunctionDef::new("main", CType::Int);
        f.params.push(a.clone());
        f.locals.push(b.clone());
        f.body = vec![
            Stmt::new(StmtKind::If {
                cond: Expr::Binary {
                    op: CBinaryOp::Lt,
                    ty: CType::Int,
                    lhs: Box::new(Expr::var(a)),
                    rhs: Box::new(Expr::int(10)),
                },
                then_blk: vec![Stmt::new(StmtKind::Assign {
                    lv: Lvalue::var(b.clone()),
                    rhs: Expr::int(1),
                })],
                else_blk: vec![Stmt::new(StmtKind::Assign {
                    lv: Lvalue::var(b),
                    rhs: Expr::int(2),
                })],
            }),
            Stmt::new(StmtKind::Return(Some(Expr::int(0)))),
        ];

        TranslationUnit {
            functions: vec![f],
            decls: vec![],
            globals: vec![GlobalVar {
                var: Variable::global("table", CType::Array(Box::new(CType::Int), 16)),
            }],
        }
    }

    #[test]
    fn full_pass_produces_state_files() {
        let dir = tempfile::tempdir().unwrap();
        let options = InstrumentOptions {
            state_dir: dir.path().to_path_buf(),
            extra_skip: vec![],
        };
        let mut tu = sample_tu();
        let report = instrument_translation_unit(&mut tu, &options).unwrap();

        assert_eq!(report.functions, 1);
        assert_eq!(report.branch_pairs, 1);
        assert!(report.calls_emitted > 0);
        assert!(report.statements > 0);

        for file in ["idcount", "stmtcount", "funcount", "branches", "cfg", "cfg_func_map"] {
            assert!(dir.path().join(file).exists(), "{file} missing");
        }
    }

    #[test]
    fn initializer_registers_globals() {
        let dir = tempfile::tempdir().unwrap();
        let options = InstrumentOptions {
            state_dir: dir.path().to_path_buf(),
            extra_skip: vec![],
        };
        let mut tu = sample_tu();
        instrument_translation_unit(&mut tu, &options).unwrap();

        let init = tu
            .functions
            .iter()
            .find(|f| f.name == INIT_FUNCTION)
            .expect("initializer present");
        assert!(init.skip && init.is_static);
        assert!(matches!(
            init.body[0].kind,
            StmtKind::Instr(RuntimeCall::Init { .. })
        ));
        assert!(matches!(
            &init.body[1].kind,
            StmtKind::Instr(RuntimeCall::RegGlobal { size: 64, .. })
        ));
    }

    #[test]
    fn static_globals_are_not_registered() {
        let dir = tempfile::tempdir().unwrap();
        let options = InstrumentOptions {
            state_dir: dir.path().to_path_buf(),
            extra_skip: vec![],
        };
        let mut tu = sample_tu();
        tu.globals[0].var.is_static = true;
        instrument_translation_unit(&mut tu, &options).unwrap();

        let init = tu.functions.iter().find(|f| f.name == INIT_FUNCTION).unwrap();
        // Init call + return only.
        assert_eq!(init.body.len(), 2);
    }

    #[test]
    fn extra_skip_names_are_honored() {
        let dir = tempfile::tempdir().unwrap();
        let options = InstrumentOptions {
            state_dir: dir.path().to_path_buf(),
            extra_skip: vec!["probe".into()],
        };
        let mut f = FunctionDef::new("main", CType::Int);
        f.body = vec![
            Stmt::new(StmtKind::Call {
                ret: None,
                callee: "probe".into(),
                args: vec![Expr::int(1)],
            }),
            Stmt::new(StmtKind::Return(Some(Expr::int(0)))),
        ];
        let mut tu = TranslationUnit {
            functions: vec![f],
            decls: vec![],
            globals: vec![],
        };
        instrument_translation_unit(&mut tu, &options).unwrap();

        let main = &tu.functions[0];
        let has_clear = main.body.iter().any(|s| {
            matches!(s.kind, StmtKind::Instr(RuntimeCall::ClearStack { .. }))
        });
        assert!(!has_clear, "skip call must not clear the stack");
    }

    #[test]
    fn options_serde_roundtrip() {
        let options = InstrumentOptions {
            state_dir: PathBuf::from("/tmp/state"),
            extra_skip: vec!["a".into(), "b".into()],
        };
        let json = serde_json::to_string(&options).unwrap();
        let back: InstrumentOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.state_dir, options.state_dir);
        assert_eq!(back.extra_skip, options.extra_skip);
    }
}
