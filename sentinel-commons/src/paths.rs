use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// Errors produced while confining a requested path to a sandbox root.
#[derive(Debug, Error)]
pub enum PathGuardError {
    #[error("path must not be empty")]
    Empty,

    #[error("absolute path '{path}' is not allowed; use a path relative to the sandbox root")]
    Absolute { path: String },

    #[error("path '{path}' escapes the sandbox root")]
    Escape { path: String },

    #[error("failed to resolve '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PathGuardError {
    /// True for every rejection that stems from the containment rules rather
    /// than from an unexpected filesystem failure.
    pub fn is_containment_violation(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }

    fn empty() -> Self {
        warn!(target: "sentinel.security", "rejected empty path");
        Self::Empty
    }

    fn absolute(path: &str) -> Self {
        warn!(
            target: "sentinel.security",
            requested = path,
            "rejected absolute path"
        );
        Self::Absolute {
            path: path.to_owned(),
        }
    }

    fn escape(path: &str) -> Self {
        warn!(
            target: "sentinel.security",
            requested = path,
            "rejected path that resolves outside the sandbox root"
        );
        Self::Escape {
            path: path.to_owned(),
        }
    }
}

/// Normalize a path by resolving `.` and `..` components lexically.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Return a canonical absolute path for `requested` that is guaranteed to
/// reside inside `root`.
///
/// Symlinks and `..` segments are resolved component by component against
/// the filesystem before containment is checked, so a link inside the sandbox
/// that points elsewhere is rejected even though its textual path looks
/// harmless. Components that do not exist yet (targets of a create or write)
/// are appended lexically; they cannot be links, so `..` among them is
/// resolved by popping.
pub fn resolve(root: &Path, requested: &str) -> Result<PathBuf, PathGuardError> {
    if requested.trim().is_empty() {
        return Err(PathGuardError::empty());
    }

    let requested_path = Path::new(requested);
    if requested_path.has_root()
        || requested_path.is_absolute()
        || requested.starts_with(['/', '\\'])
    {
        return Err(PathGuardError::absolute(requested));
    }

    let canonical_root = dunce::canonicalize(root).map_err(|source| PathGuardError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let mut current = canonical_root.clone();
    // Number of trailing components in `current` that do not exist on disk.
    let mut missing_depth = 0usize;

    for component in requested_path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if missing_depth > 0 {
                    missing_depth -= 1;
                    current.pop();
                    continue;
                }
                if current == canonical_root {
                    return Err(PathGuardError::escape(requested));
                }
                current.pop();
            }
            Component::Normal(part) => {
                current.push(part);
                if missing_depth > 0 {
                    missing_depth += 1;
                    continue;
                }

                match std::fs::symlink_metadata(&current) {
                    Ok(_) => {
                        current = follow_existing(&current, &canonical_root, requested)?;
                    }
                    Err(error)
                        if matches!(
                            error.kind(),
                            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                        ) =>
                    {
                        missing_depth = 1;
                    }
                    Err(source) => {
                        return Err(PathGuardError::Io {
                            path: current,
                            source,
                        });
                    }
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathGuardError::absolute(requested));
            }
        }
    }

    if !current.starts_with(&canonical_root) {
        return Err(PathGuardError::escape(requested));
    }

    Ok(current)
}

fn follow_existing(
    candidate: &Path,
    canonical_root: &Path,
    requested: &str,
) -> Result<PathBuf, PathGuardError> {
    match dunce::canonicalize(candidate) {
        Ok(canonical) if canonical.starts_with(canonical_root) => Ok(canonical),
        Ok(_) => Err(PathGuardError::escape(requested)),
        // A dangling link: its target cannot be verified, so it is never followed.
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            Err(PathGuardError::escape(requested))
        }
        Err(source) => Err(PathGuardError::Io {
            path: candidate.to_path_buf(),
            source,
        }),
    }
}

/// Render `path` relative to `root` using `/` separators.
///
/// Paths outside `root` are rendered as-is; callers only pass paths produced
/// by [`resolve`].
pub fn to_posix_relative(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    join_posix(relative)
}

fn join_posix(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a file path reported by an external tool into the same
/// sandbox-relative POSIX form that [`to_posix_relative`] produces.
///
/// Scanners report files as `/main.tf`, `./main.tf`, `modules\\vpc\\main.tf`
/// or an absolute path below the sandbox; all of these collapse to
/// `main.tf` / `modules/vpc/main.tf`.
pub fn normalize_report_path(root: &Path, reported: &str) -> String {
    let unified = reported.trim().replace('\\', "/");
    let path = Path::new(&unified);

    let relative = if path.is_absolute() {
        strip_root(root, path).unwrap_or_else(|| {
            path.components()
                .filter(|component| matches!(component, Component::Normal(_)))
                .collect()
        })
    } else {
        path.to_path_buf()
    };

    join_posix(&normalize_path(&relative))
}

fn strip_root(root: &Path, path: &Path) -> Option<PathBuf> {
    if let Ok(stripped) = path.strip_prefix(root) {
        return Some(stripped.to_path_buf());
    }
    let canonical_root = dunce::canonicalize(root).ok()?;
    path.strip_prefix(&canonical_root)
        .ok()
        .map(Path::to_path_buf)
}

/// Compare two sandbox-relative paths after lexical normalization, ignoring
/// ASCII case so that `Main.tf` and `./main.tf` refer to the same target.
pub fn paths_match(left: &str, right: &str) -> bool {
    let left = join_posix(&normalize_path(Path::new(&left.replace('\\', "/"))));
    let right = join_posix(&normalize_path(Path::new(&right.replace('\\', "/"))));
    !left.is_empty() && left.eq_ignore_ascii_case(&right)
}

/// Implemented by anything that owns a sandbox root and wants the shared
/// containment helpers.
pub trait SandboxPaths: Send + Sync {
    /// Canonical absolute path of the sandbox root.
    fn sandbox_root(&self) -> &Path;

    /// Resolve a relative path inside the sandbox.
    fn resolve_within(&self, requested: &str) -> Result<PathBuf, PathGuardError> {
        resolve(self.sandbox_root(), requested)
    }

    /// Render an absolute path inside the sandbox as a relative POSIX path.
    fn display_relative(&self, absolute: &Path) -> String {
        to_posix_relative(self.sandbox_root(), absolute)
    }

    /// True when `path` is lexically inside the sandbox root. A `..`
    /// anywhere below the root counts as outside.
    fn contains(&self, path: &Path) -> bool {
        path.strip_prefix(self.sandbox_root()).is_ok_and(|rest| {
            rest.components()
                .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
        })
    }
}
