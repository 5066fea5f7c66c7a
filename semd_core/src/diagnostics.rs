//! Latest-diagnostics store.

use crate::error::{Error, Result};
use crate::types::{Diagnostic, DiagnosticKind, Location, Range};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Text of the synthetic entry appended when the cap truncates a set.
pub const MAX_DIAGNOSTICS_EXCEEDED: &str = "Maximum number of diagnostics exceeded.";

/// Per-file diagnostics, replaced wholesale on every publish.
pub struct DiagnosticsStore {
    by_file: Mutex<Option<HashMap<PathBuf, Vec<Diagnostic>>>>,
    max_to_display: usize,
}

impl DiagnosticsStore {
    /// `max_to_display` of 0 disables the cap.
    pub fn new(max_to_display: usize) -> Self {
        Self {
            by_file: Mutex::new(None),
            max_to_display,
        }
    }

    /// Replaces the set for `path` and returns what editors should see.
    pub fn publish(&self, path: &Path, mut diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
        diagnostics.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then(a.location.line_num.cmp(&b.location.line_num))
                .then(a.location.column_num.cmp(&b.location.column_num))
        });
        let delivered = cap(path, diagnostics.clone(), self.max_to_display);
        self.by_file
            .lock()
            .get_or_insert_with(HashMap::new)
            .insert(canonical_path(path), diagnostics);
        delivered
    }

    /// Capped view of the current set for `path`.
    pub fn get(&self, path: &Path) -> Result<Vec<Diagnostic>> {
        let guard = self.by_file.lock();
        let files = guard.as_ref().ok_or(Error::DiagnosticsNotReady)?;
        let diagnostics = files.get(&canonical_path(path)).cloned().unwrap_or_default();
        Ok(cap(path, diagnostics, self.max_to_display))
    }

    /// Message for the diagnostic nearest to a cursor position.
    pub fn detailed(&self, path: &Path, line: usize, column: usize) -> Result<String> {
        let guard = self.by_file.lock();
        let files = guard.as_ref().ok_or(Error::DiagnosticsNotReady)?;
        let diagnostics = match files.get(&canonical_path(path)) {
            Some(d) if !d.is_empty() => d,
            _ => return Ok("No diagnostics for current file.".to_string()),
        };

        let mut best: Option<(usize, &Diagnostic)> = None;
        for diagnostic in diagnostics {
            let extent = &diagnostic.location_extent;
            if !extent.on_line(line) {
                continue;
            }
            let distance = extent.distance_to(line, column);
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, diagnostic));
            }
            if distance == 0 {
                break;
            }
        }

        Ok(match best {
            Some((_, diagnostic)) => match &diagnostic.code {
                Some(code) => format!("{} [{}]", diagnostic.text, code),
                None => diagnostic.text.clone(),
            },
            None => "No diagnostics for current line.".to_string(),
        })
    }

    /// True once any file has received a publish.
    pub fn is_ready(&self) -> bool {
        self.by_file.lock().is_some()
    }

    /// Forgets everything; the store reports not-ready again.
    pub fn clear(&self) {
        *self.by_file.lock() = None;
    }
}

/// Store key for `path`. Files that do not exist keep their raw path.
pub fn canonical_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn cap(path: &Path, mut diagnostics: Vec<Diagnostic>, max: usize) -> Vec<Diagnostic> {
    if max == 0 || diagnostics.len() <= max {
        return diagnostics;
    }
    diagnostics.truncate(max);
    let location = Location::new(1, 1, path);
    diagnostics.push(Diagnostic::new(
        Range::point(location),
        DiagnosticKind::Error,
        MAX_DIAGNOSTICS_EXCEEDED,
    ));
    diagnostics
}
