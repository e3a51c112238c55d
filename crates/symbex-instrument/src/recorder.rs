//! The branch-pair and CFG recorders.
//!
//! Three append-only text files accumulate state across translation
//! units; a later stitching phase joins them into the whole-program
//! view. Line formats are external contracts:
//!
//! - `branches`: per function, a header `<fid> <n>` followed by `n`
//!   sorted lines `<true_sid> <false_sid>`
//! - `cfg_func_map`: `<name> <first_sid>` per non-static definition
//! - `cfg`: `<sid> <succ>*` with call targets appended as the callee's
//!   first sid when defined in this unit, or its name for later
//!   resolution
//!
//! Failing to open an output file is non-fatal: the pass continues with
//! a diagnostic, matching the tolerance for partial CFG state.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use smallvec::SmallVec;
use tracing::warn;

use symbex_core::{FunctionId, StatementId};

pub const BRANCHES_FILE: &str = "branches";
pub const CFG_FILE: &str = "cfg";
pub const CFG_FUNC_MAP_FILE: &str = "cfg_func_map";

/// A call site inside a statement: resolved to the callee's first
/// statement id when the callee is defined in this unit, or left as a
/// name for the stitching phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    Sid(StatementId),
    Named(String),
}

/// One `cfg` line: a statement, its successors, and its call sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgLine {
    pub sid: StatementId,
    pub succs: SmallVec<[StatementId; 2]>,
    pub calls: Vec<CallTarget>,
}

/// Accumulates records during one pass and flushes them append-only.
#[derive(Debug, Default)]
pub struct Recorder {
    dir: PathBuf,
    branches: Vec<(FunctionId, Vec<(StatementId, StatementId)>)>,
    func_map: Vec<(String, StatementId)>,
    cfg_lines: Vec<CfgLine>,
}

impl Recorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Recorder {
            dir: dir.into(),
            ..Recorder::default()
        }
    }

    /// Record the branch pairs discovered in one function. Pairs are
    /// sorted before emission so output is stable across runs.
    pub fn record_function_branches(
        &mut self,
        fid: FunctionId,
        mut pairs: Vec<(StatementId, StatementId)>,
    ) {
        pairs.sort();
        self.branches.push((fid, pairs));
    }

    pub fn record_func_entry(&mut self, name: &str, first_sid: StatementId) {
        self.func_map.push((name.to_string(), first_sid));
    }

    pub fn record_cfg_line(&mut self, line: CfgLine) {
        self.cfg_lines.push(line);
    }

    pub fn branch_pair_count(&self) -> usize {
        self.branches.iter().map(|(_, pairs)| pairs.len()).sum()
    }

    fn append(&self, file: &str, content: &str) {
        if let Err(err) = std::fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), %err, "cannot create record directory");
            return;
        }
        let path = self.dir.join(file);
        let opened = OpenOptions::new().create(true).append(true).open(&path);
        match opened {
            Ok(mut f) => {
                if let Err(err) = f.write_all(content.as_bytes()) {
                    warn!(file = %path.display(), %err, "short write to record file");
                }
            }
            Err(err) => {
                warn!(file = %path.display(), %err, "cannot open record file, skipping");
            }
        }
    }

    /// Flush `cfg` and `cfg_func_map` (driver step 8).
    pub fn flush_cfg(&mut self) {
        let mut cfg = String::new();
        for line in &self.cfg_lines {
            write!(cfg, "{}", line.sid).unwrap();
            for succ in &line.succs {
                write!(cfg, " {succ}").unwrap();
            }
            for call in &line.calls {
                match call {
                    CallTarget::Sid(sid) => write!(cfg, " {sid}").unwrap(),
                    CallTarget::Named(name) => write!(cfg, " {name}").unwrap(),
                }
            }
            cfg.push('\n');
        }
        if !cfg.is_empty() {
            self.append(CFG_FILE, &cfg);
        }
        self.cfg_lines.clear();

        let mut map = String::new();
        for (name, sid) in &self.func_map {
            writeln!(map, "{name} {sid}").unwrap();
        }
        if !map.is_empty() {
            self.append(CFG_FUNC_MAP_FILE, &map);
        }
        self.func_map.clear();
    }

    /// Flush `branches` (driver step 11).
    pub fn flush_branches(&mut self) {
        let mut out = String::new();
        for (fid, pairs) in &self.branches {
            writeln!(out, "{fid} {}", pairs.len()).unwrap();
            for (t, f) in pairs {
                writeln!(out, "{t} {f}").unwrap();
            }
        }
        if !out.is_empty() {
            self.append(BRANCHES_FILE, &out);
        }
        self.branches.clear();
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use std::fs;

    #[test]
    fn branches_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = Recorder::new(dir.path());
        rec.record_function_branches(
            FunctionId(1),
            vec![(StatementId(9), StatementId(12)), (StatementId(3), StatementId(5))],
        );
        rec.flush_branches();

        let text = fs::read_to_string(dir.path().join("branches")).unwrap();
        // Header then pairs, sorted.
        assert_eq!(text, "1 2\n3 5\n9 12\n");
    }

    #[test]
    fn cfg_line_format_with_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = Recorder::new(dir.path());
        rec.record_cfg_line(CfgLine {
            sid: StatementId(4),
            succs: smallvec![StatementId(5), StatementId(7)],
            calls: vec![
                CallTarget::Sid(StatementId(20)),
                CallTarget::Named("atoi".into()),
            ],
        });
        rec.record_cfg_line(CfgLine {
            sid: StatementId(5),
            succs: smallvec![],
            calls: vec![],
        });
        rec.flush_cfg();

        let text = fs::read_to_string(dir.path().join("cfg")).unwrap();
        assert_eq!(text, "4 5 7 20 atoi\n5\n");
    }

    #[test]
    fn func_map_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = Recorder::new(dir.path());
        rec.record_func_entry("main", StatementId(1));
        rec.record_func_entry("helper", StatementId(14));
        rec.flush_cfg();

        let text = fs::read_to_string(dir.path().join("cfg_func_map")).unwrap();
        assert_eq!(text, "main 1\nhelper 14\n");
    }

    #[test]
    fn flushes_append_across_invocations() {
        let dir = tempfile::tempdir().unwrap();

        let mut first = Recorder::new(dir.path());
        first.record_function_branches(FunctionId(1), vec![(StatementId(2), StatementId(3))]);
        first.flush_branches();

        let mut second = Recorder::new(dir.path());
        second.record_function_branches(FunctionId(2), vec![(StatementId(8), StatementId(9))]);
        second.flush_branches();

        let text = fs::read_to_string(dir.path().join("branches")).unwrap();
        assert_eq!(text, "1 1\n2 3\n2 1\n8 9\n");
    }

    #[test]
    fn unopenable_output_is_tolerated() {
        // A directory where the file should be makes open fail.
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("branches")).unwrap();
        let mut rec = Recorder::new(dir.path());
        rec.record_function_branches(FunctionId(1), vec![(StatementId(1), StatementId(2))]);
        // Must not panic or error.
        rec.flush_branches();
    }
}
