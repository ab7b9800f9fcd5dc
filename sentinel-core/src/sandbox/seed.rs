use std::fs;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, SentinelError};

/// Directory names never copied into a sandbox.
const SKIPPED_DIRS: [&str; 4] = [".git", ".sentinel", ".venv", "node_modules"];

/// Copy regular files and directories from `source` into `destination`.
/// Symlinks are skipped so nothing outside `source` can be pulled in.
pub(crate) fn copy_tree(source: &Path, destination: &Path) -> Result<usize> {
    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIPPED_DIRS.contains(&name)))
        });

    let mut copied = 0usize;
    for entry in walker {
        let entry = entry
            .map_err(|error| SentinelError::io("walk seed source", source, error.into()))?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = destination.join(relative);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            debug!(target: "sentinel.sandbox", path = %relative.display(), "skipping symlink while seeding");
        } else if file_type.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|source| SentinelError::io("create directory", &target, source))?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)
                .map_err(|source| SentinelError::io("copy file", &target, source))?;
            copied += 1;
        }
    }
    Ok(copied)
}
