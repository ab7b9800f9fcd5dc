use std::fs::File;
use std::io::Read;
use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::utils::TEMP_FILE_PREFIX;

/// Frameworks a caller may name explicitly.
pub const FRAMEWORK_ALLOWLIST: [&str; 7] = [
    "terraform",
    "cloudformation",
    "kubernetes",
    "helm",
    "arm",
    "dockerfile",
    "secrets",
];

const YAML_SAMPLE_FILES: usize = 5;
const YAML_SAMPLE_BYTES: u64 = 4000;

pub fn normalize_framework_hint(hint: &str) -> Option<&'static str> {
    let hint = hint.trim().to_ascii_lowercase();
    FRAMEWORK_ALLOWLIST
        .iter()
        .find(|framework| **framework == hint)
        .copied()
}

fn files(root: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file()
                && !entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(TEMP_FILE_PREFIX)
        })
}

/// True when any file below `root` ends with one of `extensions`.
pub fn has_matching_file(root: &Path, extensions: &[&str]) -> bool {
    files(root).any(|entry| {
        let name = entry.file_name().to_string_lossy();
        extensions.iter().any(|extension| name.ends_with(extension))
    })
}

fn is_helm_chart(root: &Path) -> bool {
    if root.join("Chart.yaml").is_file() {
        return true;
    }
    std::fs::read_dir(root.join("charts"))
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .any(|entry| entry.path().join("Chart.yaml").is_file())
        })
        .unwrap_or(false)
}

fn head(path: &Path) -> Option<String> {
    let mut buffer = Vec::new();
    File::open(path)
        .ok()?
        .take(YAML_SAMPLE_BYTES)
        .read_to_end(&mut buffer)
        .ok()?;
    Some(String::from_utf8_lossy(&buffer).into_owned())
}

/// Best-effort framework detection from sandbox contents. Returns an empty
/// list when nothing recognizable is present.
pub fn detect_frameworks(root: &Path) -> Vec<String> {
    if has_matching_file(root, &[".tf"]) {
        return vec!["terraform".to_string()];
    }
    if is_helm_chart(root) {
        return vec!["helm".to_string()];
    }

    let yaml_files = files(root)
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.ends_with(".yaml") || name.ends_with(".yml")
        })
        .take(YAML_SAMPLE_FILES);
    for entry in yaml_files {
        let Some(content) = head(entry.path()) else {
            continue;
        };
        if content.contains("apiVersion:") && content.contains("kind:") {
            return vec!["kubernetes".to_string()];
        }
        if content.contains("AWSTemplateFormatVersion") || content.contains("\nResources:") {
            return vec!["cloudformation".to_string()];
        }
    }
    Vec::new()
}
