//! Artifact reset: best-effort removal of previous native build output.
//!
//! Every start deletes whatever the last build produced so the next build
//! cannot pick up stale extensions. Removal failures are reported, never
//! raised: the artifacts are regenerable and a quirky filesystem must not
//! stop the container from booting.

use std::collections::BTreeSet;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use tracing::{debug, warn};

/// A removal that did not succeed.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResetFailure {
    /// Path or pattern involved.
    pub target: String,

    pub reason: String,
}

/// Outcome of a reset pass.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ResetReport {
    /// Paths that were deleted.
    pub removed: Vec<PathBuf>,

    /// Suppressed failures.
    pub failures: Vec<ResetFailure>,
}

impl ResetReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Glob patterns naming build output beneath a root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    root: PathBuf,
    patterns: Vec<String>,
}

impl ArtifactSet {
    pub fn new(root: impl Into<PathBuf>, patterns: Vec<String>) -> Self {
        Self {
            root: root.into(),
            patterns,
        }
    }

    /// Remove every matching path. See [`reset_artifacts`].
    pub fn reset(&self) -> ResetReport {
        reset_artifacts(&self.root, &self.patterns)
    }

    /// Paths currently matching any pattern, sorted and deduplicated.
    pub fn matches(&self) -> Vec<PathBuf> {
        let mut failures = Vec::new();
        collect_matches(&self.root, &self.patterns, &mut failures)
            .into_iter()
            .collect()
    }

    /// Matching paths last modified before `since`.
    ///
    /// After a successful build this should be empty; anything listed
    /// survived from an earlier run.
    pub fn stale_since(&self, since: SystemTime) -> Vec<PathBuf> {
        self.matches()
            .into_iter()
            .filter(|path| match std::fs::symlink_metadata(path).and_then(|m| m.modified()) {
                Ok(modified) => modified < since,
                Err(_) => false,
            })
            .collect()
    }
}

/// Reject a pattern that could match outside the directory it is joined to.
///
/// Absolute patterns replace the root on join and `..` climbs out of it.
pub fn check_pattern(pattern: &str) -> std::result::Result<(), &'static str> {
    let path = Path::new(pattern);
    if path.is_absolute() || path.has_root() {
        return Err("pattern must be relative to the working directory");
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err("pattern must not contain '..'");
    }
    Ok(())
}

/// Remove all paths under `root` matching `patterns`.
///
/// Directories are removed recursively, symlinks are unlinked and never
/// followed. Missing targets are not failures. Every other problem,
/// including an invalid pattern or one reaching outside `root`, is
/// recorded in the report.
pub fn reset_artifacts(root: &Path, patterns: &[String]) -> ResetReport {
    let mut report = ResetReport::default();

    for path in collect_matches(root, patterns, &mut report.failures) {
        match remove_path(&path) {
            Ok(true) => {
                debug!(path = %path.display(), "Removed artifact");
                report.removed.push(path);
            }
            Ok(false) => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not remove artifact");
                report.failures.push(ResetFailure {
                    target: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    report
}

fn collect_matches(
    root: &Path,
    patterns: &[String],
    failures: &mut Vec<ResetFailure>,
) -> BTreeSet<PathBuf> {
    let mut matched = BTreeSet::new();

    let Some(root_str) = root.to_str() else {
        warn!(root = %root.display(), "Working directory is not valid UTF-8; skipping reset");
        failures.push(ResetFailure {
            target: root.display().to_string(),
            reason: "path is not valid UTF-8".to_string(),
        });
        return matched;
    };
    let escaped_root = glob::Pattern::escape(root_str);

    for pattern in patterns {
        if let Err(reason) = check_pattern(pattern) {
            warn!(pattern = %pattern, reason, "Skipping artifact pattern outside working directory");
            failures.push(ResetFailure {
                target: pattern.clone(),
                reason: reason.to_string(),
            });
            continue;
        }

        let full = Path::new(&escaped_root).join(pattern);
        let full = full.to_string_lossy();

        let entries = match glob::glob(&full) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid artifact pattern");
                failures.push(ResetFailure {
                    target: pattern.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        for entry in entries {
            match entry {
                Ok(path) => {
                    matched.insert(path);
                }
                Err(e) => {
                    warn!(path = %e.path().display(), error = %e.error(), "Unreadable artifact path");
                    failures.push(ResetFailure {
                        target: e.path().display().to_string(),
                        reason: e.error().to_string(),
                    });
                }
            }
        }
    }

    matched
}

/// Remove a single path. Returns `Ok(false)` if it was already gone.
fn remove_path(path: &Path) -> io::Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
