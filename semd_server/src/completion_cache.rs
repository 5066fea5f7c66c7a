//! Cache of the last backend completion list.
//!
//! A list fetched at some start column stays valid while the user keeps
//! typing the same identifier: same file, same line, same start column, and
//! the new query extends the cached one. Incomplete lists are never reused.

use parking_lot::Mutex;
use semd_core::types::CompletionItem;
use std::path::{Path, PathBuf};

/// A candidate plus the text it is filtered on.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub filter_text: String,
    pub item: CompletionItem,
}

struct Entry {
    filepath: PathBuf,
    line_num: usize,
    start_column: usize,
    query: String,
    candidates: Vec<Candidate>,
}

#[derive(Default)]
pub struct CompletionCache {
    entry: Mutex<Option<Entry>>,
}

impl CompletionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached superset if it can serve `query`.
    pub fn lookup(
        &self,
        filepath: &Path,
        line_num: usize,
        start_column: usize,
        query: &str,
    ) -> Option<Vec<Candidate>> {
        let guard = self.entry.lock();
        let entry = guard.as_ref()?;
        let valid = entry.filepath == filepath
            && entry.line_num == line_num
            && entry.start_column == start_column
            && query.starts_with(&entry.query);
        valid.then(|| entry.candidates.clone())
    }

    /// Replaces the cached list. An incomplete list just clears the cache.
    pub fn store(
        &self,
        filepath: &Path,
        line_num: usize,
        start_column: usize,
        query: &str,
        candidates: Vec<Candidate>,
        is_incomplete: bool,
    ) {
        let mut guard = self.entry.lock();
        if is_incomplete {
            *guard = None;
            return;
        }
        *guard = Some(Entry {
            filepath: filepath.to_path_buf(),
            line_num,
            start_column,
            query: query.to_string(),
            candidates,
        });
    }

    /// Drops the entry if it belongs to `filepath`.
    pub fn invalidate_file(&self, filepath: &Path) {
        let mut guard = self.entry.lock();
        if guard.as_ref().is_some_and(|e| e.filepath == filepath) {
            *guard = None;
        }
    }

    pub fn clear(&self) {
        *self.entry.lock() = None;
    }
}
