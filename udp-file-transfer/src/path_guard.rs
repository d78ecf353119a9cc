//! Confinement of client-supplied paths to the server root.
//!
//! Every path that arrives over the wire is relative to the configured root
//! directory.  [`PathGuard::resolve`] joins it to the root *lexically* (no
//! filesystem access needed, so missing targets can be checked too) and
//! refuses anything that would land outside:
//!
//! - absolute paths and drive prefixes (`/etc/passwd`, `C:\x`),
//! - `..` segments that climb above the root.
//!
//! The canonical form of the target (or, for a target that does not exist
//! yet, of its nearest existing ancestor) is checked as well, so a symlink
//! inside the root cannot point the server at a file outside it.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Why a path was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path '{0}' is absolute")]
    Absolute(String),
    #[error("path '{0}' escapes the root")]
    Escapes(String),
    #[error("path '{0}' names the root itself")]
    IsRoot(String),
}

/// Resolves relative paths against a fixed root directory.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `relative` under the root.
    ///
    /// Accepts the root itself (an empty or `.` path); use
    /// [`resolve_strict`](Self::resolve_strict) where the root is not a
    /// valid target.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, PathError> {
        let mut resolved = self.root.clone();
        let mut depth = 0usize;

        for component in Path::new(relative).components() {
            match component {
                Component::Prefix(_) | Component::RootDir => {
                    return Err(PathError::Absolute(relative.to_string()));
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if depth == 0 {
                        return Err(PathError::Escapes(relative.to_string()));
                    }
                    resolved.pop();
                    depth -= 1;
                }
                Component::Normal(segment) => {
                    resolved.push(segment);
                    depth += 1;
                }
            }
        }

        if !self.still_inside_after_links(&resolved) {
            return Err(PathError::Escapes(relative.to_string()));
        }
        Ok(resolved)
    }

    /// Like [`resolve`](Self::resolve) but also refuses the root itself.
    ///
    /// Used for uploads and deletions: the server never overwrites or
    /// removes its own root directory.
    pub fn resolve_strict(&self, relative: &str) -> Result<PathBuf, PathError> {
        let resolved = self.resolve(relative)?;
        if resolved == self.root {
            return Err(PathError::IsRoot(relative.to_string()));
        }
        Ok(resolved)
    }

    /// Symlink check against the canonical root.
    ///
    /// A missing target is judged by its nearest existing ancestor, since
    /// that is the directory the server would create it through.  A dangling
    /// link on the way is refused outright: creating through it would land
    /// wherever it points.
    fn still_inside_after_links(&self, resolved: &Path) -> bool {
        let Ok(root) = self.root.canonicalize() else {
            // No root on disk yet: nothing to follow.
            return true;
        };
        for candidate in resolved.ancestors() {
            match candidate.canonicalize() {
                Ok(real) => return real.starts_with(&root),
                Err(_) if candidate.symlink_metadata().is_ok() => return false,
                Err(_) => {}
            }
        }
        false
    }
}
