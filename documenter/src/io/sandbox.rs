//! Path sandbox confining every tool read and write to the configured roots.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use thiserror::Error;

/// Why a path was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxViolation {
    #[error("path is empty")]
    Empty,
    #[error("path contains a NUL byte")]
    ContainsNul,
    #[error("cannot resolve {path}: {reason}")]
    Unresolvable { path: String, reason: String },
    #[error("path {path} escapes the filesystem root")]
    EscapesFilesystemRoot { path: String },
    #[error("path {path} is outside the allowed roots")]
    OutsideRoots { path: String },
    #[error("path {path} is reserved and cannot be accessed by tools")]
    Denied { path: String },
}

/// Canonical allow-list of directories tools may touch.
///
/// Denied entries carve files or directories (the config file, the run logs) out
/// of the roots.
#[derive(Debug, Clone)]
pub struct Sandbox {
    roots: Vec<PathBuf>,
    denied: Vec<PathBuf>,
    home: PathBuf,
}

impl Sandbox {
    /// Build a sandbox from existing root directories.
    ///
    /// The first root is the base for relative paths.
    pub fn new(roots: impl IntoIterator<Item = PathBuf>, home: impl Into<PathBuf>) -> Result<Self> {
        let mut canonical = Vec::new();
        for root in roots {
            let resolved = root
                .canonicalize()
                .with_context(|| format!("canonicalize sandbox root {}", root.display()))?;
            if !canonical.contains(&resolved) {
                canonical.push(resolved);
            }
        }
        if canonical.is_empty() {
            return Err(anyhow!("sandbox requires at least one root"));
        }
        Ok(Self {
            roots: canonical,
            denied: Vec::new(),
            home: home.into(),
        })
    }

    /// Refuse `paths` and everything below them even when inside a root.
    ///
    /// Entries need not exist yet; their existing prefix is canonicalized the same
    /// way tool paths are.
    pub fn with_denied(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        for path in paths {
            let raw = path.display().to_string();
            let absolute = if path.is_absolute() {
                path
            } else {
                self.base().join(path)
            };
            let resolved = resolve(&absolute, &raw).unwrap_or(absolute);
            if !self.denied.contains(&resolved) {
                self.denied.push(resolved);
            }
        }
        self
    }

    pub fn denied(&self) -> &[PathBuf] {
        &self.denied
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn base(&self) -> &Path {
        &self.roots[0]
    }

    /// Resolve `raw` to an absolute path inside one of the roots.
    ///
    /// The path need not exist. Symlinks in the existing prefix are followed before the
    /// containment check, and `..` in the remaining tail is applied to the canonical prefix.
    pub fn validate(&self, raw: &str) -> Result<PathBuf, SandboxViolation> {
        if raw.is_empty() {
            return Err(SandboxViolation::Empty);
        }
        if raw.contains('\0') {
            return Err(SandboxViolation::ContainsNul);
        }

        let expanded = self.expand_home(raw);
        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            self.base().join(expanded)
        };

        let resolved = resolve(&absolute, raw)?;

        if !self.roots.iter().any(|root| resolved.starts_with(root)) {
            return Err(SandboxViolation::OutsideRoots {
                path: raw.to_string(),
            });
        }
        if self.denied.iter().any(|denied| resolved.starts_with(denied)) {
            return Err(SandboxViolation::Denied {
                path: raw.to_string(),
            });
        }
        Ok(resolved)
    }

    fn expand_home(&self, raw: &str) -> PathBuf {
        if raw == "~" {
            return self.home.clone();
        }
        match raw.strip_prefix("~/") {
            Some(rest) => self.home.join(rest),
            None => PathBuf::from(raw),
        }
    }
}

/// Canonicalize the existing prefix of `absolute` and apply the remaining tail to it.
fn resolve(absolute: &Path, raw: &str) -> Result<PathBuf, SandboxViolation> {
    let (ancestor, tail) = split_existing_prefix(absolute);
    let mut resolved = ancestor
        .canonicalize()
        .map_err(|err| SandboxViolation::Unresolvable {
            path: raw.to_string(),
            reason: err.to_string(),
        })?;

    for component in tail.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(SandboxViolation::EscapesFilesystemRoot {
                        path: raw.to_string(),
                    });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SandboxViolation::Unresolvable {
                    path: raw.to_string(),
                    reason: "unexpected root in relative tail".to_string(),
                });
            }
        }
    }
    Ok(resolved)
}

/// Split `path` into its longest existing ancestor and the remaining tail.
///
/// Existence is checked with `symlink_metadata`, so a dangling symlink counts as existing and
/// later fails canonicalization.
fn split_existing_prefix(path: &Path) -> (PathBuf, PathBuf) {
    let mut ancestor = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if ancestor.symlink_metadata().is_ok() {
            break;
        }
        match (ancestor.file_name(), ancestor.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name.to_os_string());
                ancestor = parent.to_path_buf();
            }
            _ => {
                // `..` or `.` components sit at the end; step past them lexically.
                if let Some(last) = ancestor.components().next_back()
                    && matches!(last, Component::ParentDir | Component::CurDir)
                    && let Some(parent) = ancestor.parent()
                {
                    tail.push(last.as_os_str().to_os_string());
                    ancestor = parent.to_path_buf();
                    continue;
                }
                break;
            }
        }
    }
    let tail: PathBuf = tail.iter().rev().collect();
    (ancestor, tail)
}
