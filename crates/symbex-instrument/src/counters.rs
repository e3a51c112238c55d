//! Disk-backed counters for cross-translation-unit unique ids.
//!
//! Three files (`idcount`, `stmtcount`, `funcount`), each a single
//! ASCII decimal followed by a newline, holding the last value handed
//! out. A missing or unreadable file reads as zero (first invocation);
//! a failed write is fatal because identifiers would stop being unique
//! across subsequent invocations. Counters are never rolled back: a
//! crash mid-pass leaves them advanced, which only burns ids.
//!
//! The enclosing build system must serialize invocations sharing a
//! state directory; the files are read-then-written without locking.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use symbex_core::{FunctionId, InstrumentationId, StatementId};

use crate::error::InstrumentError;

const ID_COUNT: &str = "idcount";
const STMT_COUNT: &str = "stmtcount";
const FUN_COUNT: &str = "funcount";

/// The in-memory counters, advanced by allocation during one pass.
/// Each holds the last id handed out; allocation pre-increments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub id: u32,
    pub stmt: u32,
    pub fun: u32,
}

impl Counters {
    pub fn next_id(&mut self) -> InstrumentationId {
        self.id += 1;
        InstrumentationId(self.id)
    }

    pub fn next_stmt(&mut self) -> StatementId {
        self.stmt += 1;
        StatementId(self.stmt)
    }

    pub fn next_fun(&mut self) -> FunctionId {
        self.fun += 1;
        FunctionId(self.fun)
    }
}

/// Reads and writes the counter files in a state directory.
#[derive(Debug, Clone)]
pub struct CounterStore {
    dir: PathBuf,
}

impl CounterStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CounterStore { dir: dir.into() }
    }

    fn read_one(&self, name: &str) -> u32 {
        let path = self.dir.join(name);
        match fs::read_to_string(&path) {
            Ok(text) => match text.trim().parse() {
                Ok(value) => value,
                Err(_) => {
                    warn!(file = %path.display(), "unparsable counter, starting from 0");
                    0
                }
            },
            Err(err) => {
                warn!(file = %path.display(), %err, "counter unreadable, starting from 0");
                0
            }
        }
    }

    fn write_one(&self, name: &str, value: u32) -> Result<(), InstrumentError> {
        fs::write(self.dir.join(name), format!("{value}\n"))?;
        Ok(())
    }

    /// Load all three counters. Missing files read as zero.
    pub fn load(&self) -> Counters {
        Counters {
            id: self.read_one(ID_COUNT),
            stmt: self.read_one(STMT_COUNT),
            fun: self.read_one(FUN_COUNT),
        }
    }

    /// Persist all three counters, overwriting previous values.
    pub fn save(&self, counters: &Counters) -> Result<(), InstrumentError> {
        fs::create_dir_all(&self.dir)?;
        self.write_one(ID_COUNT, counters.id)?;
        self.write_one(STMT_COUNT, counters.stmt)?;
        self.write_one(FUN_COUNT, counters.fun)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_read_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = CounterStore::new(dir.path());
        assert_eq!(store.load(), Counters::default());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CounterStore::new(dir.path());
        let counters = Counters {
            id: 17,
            stmt: 5,
            fun: 2,
        };
        store.save(&counters).unwrap();
        assert_eq!(store.load(), counters);
    }

    #[test]
    fn files_are_ascii_decimal_with_newline() {
        let dir = tempfile::tempdir().unwrap();
        let store = CounterStore::new(dir.path());
        store
            .save(&Counters {
                id: 42,
                stmt: 0,
                fun: 7,
            })
            .unwrap();
        let text = fs::read_to_string(dir.path().join("idcount")).unwrap();
        assert_eq!(text, "42\n");
    }

    #[test]
    fn garbage_content_reads_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stmtcount"), "not a number\n").unwrap();
        let store = CounterStore::new(dir.path());
        assert_eq!(store.load().stmt, 0);
    }

    #[test]
    fn allocation_pre_increments() {
        let mut counters = Counters {
            id: 9,
            stmt: 0,
            fun: 0,
        };
        assert_eq!(counters.next_id(), InstrumentationId(10));
        assert_eq!(counters.next_id(), InstrumentationId(11));
        assert_eq!(counters.next_stmt(), StatementId(1));
        assert_eq!(counters.next_fun(), FunctionId(1));
        assert_eq!(counters.id, 11);
    }
}
