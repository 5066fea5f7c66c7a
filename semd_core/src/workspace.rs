//! Project root detection.
//!
//! A [`WorkspaceResolver`] walks from a file's directory towards the
//! filesystem root looking for marker files. Markers carry a rank: the
//! nearest directory holding a [`MarkerRank::Lock`] marker wins outright,
//! otherwise the manifest policy decides between manifest directories.
//! When several markers sit in the same directory, the one listed first
//! in the profile is reported.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Priority of a marker file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MarkerRank {
    /// Ordinary project file (e.g. `Cargo.toml`).
    Manifest,
    /// Lock-style file that pins the real root (e.g. `Cargo.lock`).
    Lock,
}

/// A marker file name and its rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub name: String,
    pub rank: MarkerRank,
}

impl Marker {
    pub fn lock(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rank: MarkerRank::Lock,
        }
    }

    pub fn manifest(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rank: MarkerRank::Manifest,
        }
    }
}

/// Which manifest directory wins when no lock marker exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestPolicy {
    /// Closest to the queried file.
    Nearest,
    /// Outermost on the path (Rust workspaces nest `Cargo.toml`).
    Furthest,
}

/// A resolved project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub root: PathBuf,
    /// Marker that selected the root; `None` for the non-strict fallback.
    pub marker: Option<String>,
}

/// Language-specific resolution rules.
#[derive(Debug, Clone)]
pub struct MarkerProfile {
    pub markers: Vec<Marker>,
    pub policy: ManifestPolicy,
}

impl MarkerProfile {
    pub fn new(markers: Vec<Marker>, policy: ManifestPolicy) -> Self {
        Self { markers, policy }
    }

    pub fn rust() -> Self {
        Self::new(
            vec![Marker::lock("Cargo.lock"), Marker::manifest("Cargo.toml")],
            ManifestPolicy::Furthest,
        )
    }

    pub fn go() -> Self {
        Self::new(
            vec![Marker::lock("go.work"), Marker::manifest("go.mod")],
            ManifestPolicy::Nearest,
        )
    }

    pub fn c_family() -> Self {
        Self::new(
            vec![
                Marker::lock("compile_commands.json"),
                Marker::manifest(".clangd"),
                Marker::manifest("compile_flags.txt"),
            ],
            ManifestPolicy::Nearest,
        )
    }

    /// Profile from user-configured root file names, all manifest rank.
    pub fn generic<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names.into_iter().map(Marker::manifest).collect(),
            ManifestPolicy::Nearest,
        )
    }
}

/// Resolves and memoizes project roots.
pub struct WorkspaceResolver {
    profile: MarkerProfile,
    strict: bool,
    cache: Mutex<HashMap<PathBuf, Option<Workspace>>>,
}

impl WorkspaceResolver {
    /// Creates a resolver. In strict mode a walk that finds no marker
    /// yields `None`; otherwise it yields the file's own directory.
    pub fn new(profile: MarkerProfile, strict: bool) -> Self {
        Self {
            profile,
            strict,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn profile(&self) -> &MarkerProfile {
        &self.profile
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Resolves the workspace for `path`, consulting the cache first.
    pub fn resolve(&self, path: &Path) -> Option<Workspace> {
        if let Some(hit) = self.cache.lock().get(path) {
            return hit.clone();
        }
        let resolved = self.scan(path);
        log::debug!("Workspace for {}: {:?}", path.display(), resolved);
        self.cache.lock().insert(path.to_path_buf(), resolved.clone());
        resolved
    }

    /// Drops every cached answer.
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }

    fn scan(&self, path: &Path) -> Option<Workspace> {
        let start = if path.is_dir() {
            path
        } else {
            path.parent()?
        };

        let mut manifest: Option<Workspace> = None;
        for dir in start.ancestors() {
            let Some(found) = self.best_marker_in(dir) else {
                continue;
            };
            match found.rank {
                MarkerRank::Lock => {
                    return Some(Workspace {
                        root: dir.to_path_buf(),
                        marker: Some(found.name.clone()),
                    });
                }
                MarkerRank::Manifest => {
                    let keep_nearest =
                        self.profile.policy == ManifestPolicy::Nearest && manifest.is_some();
                    if !keep_nearest {
                        manifest = Some(Workspace {
                            root: dir.to_path_buf(),
                            marker: Some(found.name.clone()),
                        });
                    }
                }
            }
        }

        if manifest.is_some() || self.strict {
            return manifest;
        }
        Some(Workspace {
            root: start.to_path_buf(),
            marker: None,
        })
    }

    /// Highest-ranked marker present in `dir`; list order breaks ties.
    fn best_marker_in(&self, dir: &Path) -> Option<&Marker> {
        let mut best: Option<&Marker> = None;
        for marker in &self.profile.markers {
            if !dir.join(&marker.name).is_file() {
                continue;
            }
            if best.map_or(true, |b| marker.rank > b.rank) {
                best = Some(marker);
            }
        }
        best
    }
}
