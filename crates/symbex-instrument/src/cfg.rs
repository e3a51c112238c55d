//! Statement numbering and control-flow computation.
//!
//! Statement ids come from the persisted counter, so they stay unique
//! across translation units. Numbering walks statements in source
//! order; successor computation then produces one [`CfgLine`] per
//! statement plus a petgraph view used by consumers that want to walk
//! the graph.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use smallvec::{smallvec, SmallVec};

use symbex_core::ast::{FunctionDef, Stmt, StmtKind, TranslationUnit};
use symbex_core::StatementId;

use crate::counters::Counters;
use crate::error::InstrumentError;
use crate::recorder::{CallTarget, CfgLine};

/// Validate a function for CFG construction: every `goto` target must
/// resolve, and control must not fall off the end (an implicit
/// `return` is appended when it could).
pub fn prepare(f: &mut FunctionDef) -> Result<(), InstrumentError> {
    let needs_return = !matches!(
        f.body.last().map(|s| &s.kind),
        Some(StmtKind::Return(_) | StmtKind::Goto(_))
    );
    if needs_return {
        f.body.push(Stmt::new(StmtKind::Return(None)));
    }

    let mut labels = HashSet::new();
    collect_labels(&f.body, &mut labels);
    check_gotos(&f.body, &labels, &f.name)
}

pub fn prepare_all(tu: &mut TranslationUnit) -> Result<(), InstrumentError> {
    for f in &mut tu.functions {
        if !f.skip {
            prepare(f)?;
        }
    }
    Ok(())
}

/// Drop any previously assigned statement ids (driver step 5).
pub fn clear(tu: &mut TranslationUnit) {
    fn clear_block(stmts: &mut [Stmt]) {
        for s in stmts {
            s.sid = None;
            if let StmtKind::If {
                then_blk, else_blk, ..
            } = &mut s.kind
            {
                clear_block(then_blk);
                clear_block(else_blk);
            }
        }
    }
    for f in &mut tu.functions {
        clear_block(&mut f.body);
    }
}

/// Assign fresh statement ids in source order.
pub fn number(f: &mut FunctionDef, counters: &mut Counters) {
    fn number_block(stmts: &mut [Stmt], counters: &mut Counters) {
        for s in stmts {
            s.sid = Some(counters.next_stmt());
            if let StmtKind::If {
                then_blk, else_blk, ..
            } = &mut s.kind
            {
                number_block(then_blk, counters);
                number_block(else_blk, counters);
            }
        }
    }
    number_block(&mut f.body, counters);
}

/// The computed control flow of one function.
#[derive(Debug)]
pub struct FunctionCfg {
    pub first_sid: StatementId,
    pub lines: Vec<CfgLine>,
    pub graph: DiGraph<StatementId, ()>,
}

/// Compute successors and call sites for a numbered function.
/// `defined` maps the names of functions defined in this unit to their
/// first statement id; other callees stay named for later stitching.
pub fn compute(
    f: &FunctionDef,
    defined: &HashMap<String, StatementId>,
) -> Result<FunctionCfg, InstrumentError> {
    let first_sid = first_sid_of(&f.body, &f.name)?;

    let mut labels = HashMap::new();
    collect_label_sids(&f.body, &mut labels);

    let mut lines = Vec::new();
    walk(&f.body, None, &labels, defined, &f.name, &mut lines)?;

    let mut graph = DiGraph::new();
    let mut nodes: HashMap<StatementId, NodeIndex> = HashMap::new();
    for line in &lines {
        nodes.insert(line.sid, graph.add_node(line.sid));
    }
    for line in &lines {
        for succ in &line.succs {
            if let (Some(&a), Some(&b)) = (nodes.get(&line.sid), nodes.get(succ)) {
                graph.add_edge(a, b, ());
            }
        }
    }

    Ok(FunctionCfg {
        first_sid,
        lines,
        graph,
    })
}

/// The statement id branding a block: its first statement's.
pub fn first_sid_of(block: &[Stmt], function: &str) -> Result<StatementId, InstrumentError> {
    block
        .first()
        .and_then(|s| s.sid)
        .ok_or_else(|| InstrumentError::EmptyBlock {
            function: function.to_string(),
        })
}

fn collect_labels(stmts: &[Stmt], labels: &mut HashSet<String>) {
    for s in stmts {
        match &s.kind {
            StmtKind::Label(name) => {
                labels.insert(name.clone());
            }
            StmtKind::If {
                then_blk, else_blk, ..
            } => {
                collect_labels(then_blk, labels);
                collect_labels(else_blk, labels);
            }
            _ => {}
        }
    }
}

fn check_gotos(
    stmts: &[Stmt],
    labels: &HashSet<String>,
    function: &str,
) -> Result<(), InstrumentError> {
    for s in stmts {
        match &s.kind {
            StmtKind::Goto(label) => {
                if !labels.contains(label) {
                    return Err(InstrumentError::UnresolvedLabel {
                        function: function.to_string(),
                        label: label.clone(),
                    });
                }
            }
            StmtKind::If {
                then_blk, else_blk, ..
            } => {
                check_gotos(then_blk, labels, function)?;
                check_gotos(else_blk, labels, function)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn collect_label_sids(stmts: &[Stmt], labels: &mut HashMap<String, StatementId>) {
    for s in stmts {
        match &s.kind {
            StmtKind::Label(name) => {
                if let Some(sid) = s.sid {
                    labels.insert(name.clone(), sid);
                }
            }
            StmtKind::If {
                then_blk, else_blk, ..
            } => {
                collect_label_sids(then_blk, labels);
                collect_label_sids(else_blk, labels);
            }
            _ => {}
        }
    }
}

fn walk(
    stmts: &[Stmt],
    follow: Option<StatementId>,
    labels: &HashMap<String, StatementId>,
    defined: &HashMap<String, StatementId>,
    function: &str,
    lines: &mut Vec<CfgLine>,
) -> Result<(), InstrumentError> {
    for (i, stmt) in stmts.iter().enumerate() {
        let sid = stmt.sid.ok_or_else(|| InstrumentError::EmptyBlock {
            function: function.to_string(),
        })?;
        let next = stmts
            .get(i + 1)
            .and_then(|s| s.sid)
            .or(follow);

        let mut calls = Vec::new();
        let succs: SmallVec<[StatementId; 2]> = match &stmt.kind {
            StmtKind::Return(_) => smallvec![],
            StmtKind::Goto(label) => {
                let target =
                    labels
                        .get(label)
                        .copied()
                        .ok_or_else(|| InstrumentError::UnresolvedLabel {
                            function: function.to_string(),
                            label: label.clone(),
                        })?;
                smallvec![target]
            }
            StmtKind::If {
                then_blk, else_blk, ..
            } => {
                let t = first_sid_of(then_blk, function)?;
                let e = first_sid_of(else_blk, function)?;
                lines.push(CfgLine {
                    sid,
                    succs: smallvec![t, e],
                    calls: Vec::new(),
                });
                walk(then_blk, next, labels, defined, function, lines)?;
                walk(else_blk, next, labels, defined, function, lines)?;
                continue;
            }
            StmtKind::Call { callee, .. } => {
                calls.push(match defined.get(callee) {
                    Some(first) => CallTarget::Sid(*first),
                    None => CallTarget::Named(callee.clone()),
                });
                next.into_iter().collect()
            }
            _ => next.into_iter().collect(),
        };

        lines.push(CfgLine { sid, succs, calls });
    }
    Ok(())
}
