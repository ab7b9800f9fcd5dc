//! Structured file edits with derived diffs.
//!
//! An operation moves through `ValidatedPatch` and `AppliedPatch` before
//! it becomes a [`PatchResult`]; each stage is only reachable from the one
//! before it. The file is only touched when a validated patch is applied,
//! through the store's atomic write, so a rejected operation leaves it
//! unchanged.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SentinelError};
use crate::utils::diff::{DEFAULT_CONTEXT_LINES, DiffLine, compute_diff_lines, count_changes};
use crate::workspace::FileStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    CreateFile,
    UpdateFile,
    DeleteFile,
}

impl PatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateFile => "create_file",
            Self::UpdateFile => "update_file",
            Self::DeleteFile => "delete_file",
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            Self::CreateFile => "Created",
            Self::UpdateFile => "Updated",
            Self::DeleteFile => "Deleted",
        }
    }
}

impl fmt::Display for PatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatchKind {
    type Err = SentinelError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create_file" | "create" => Ok(Self::CreateFile),
            "update_file" | "update" => Ok(Self::UpdateFile),
            "delete_file" | "delete" => Ok(Self::DeleteFile),
            other => Err(SentinelError::InvalidArguments(format!(
                "unknown operation type '{other}'; expected create_file, update_file or delete_file"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub kind: PatchKind,
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl PatchOperation {
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: PatchKind::CreateFile,
            path: path.into(),
            content: Some(content.into()),
        }
    }

    pub fn update(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: PatchKind::UpdateFile,
            path: path.into(),
            content: Some(content.into()),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            kind: PatchKind::DeleteFile,
            path: path.into(),
            content: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchResult {
    pub message: String,
    pub operation_type: PatchKind,
    pub file_path: String,
    pub diff_lines: Vec<DiffLine>,
    pub old_content: String,
    pub new_content: String,
    pub additions: usize,
    pub deletions: usize,
}

/// An operation whose preconditions hold. Nothing on disk has changed yet.
#[derive(Debug)]
struct ValidatedPatch<'a> {
    operation: &'a PatchOperation,
    file_path: String,
    content: Option<&'a str>,
    exists: bool,
}

/// A patch whose write or removal has happened; only the diff is left.
#[derive(Debug)]
struct AppliedPatch<'a> {
    operation: &'a PatchOperation,
    file_path: String,
    old_content: String,
    new_content: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PatchEngine {
    context_lines: Option<usize>,
}

impl Default for PatchEngine {
    fn default() -> Self {
        Self::new(Some(DEFAULT_CONTEXT_LINES))
    }
}

impl PatchEngine {
    /// `None` disables hunk collapsing.
    pub fn new(context_lines: Option<usize>) -> Self {
        Self { context_lines }
    }

    pub async fn apply(&self, store: &FileStore, operation: PatchOperation) -> Result<PatchResult> {
        let result = self.run(store, &operation).await;
        if let Err(error) = &result {
            debug!(
                target: "sentinel.patch",
                kind = %operation.kind,
                path = %operation.path,
                %error,
                "patch rejected"
            );
        }
        result
    }

    async fn run(&self, store: &FileStore, operation: &PatchOperation) -> Result<PatchResult> {
        let validated = ValidatedPatch::check(store, operation).await?;
        let applied = validated.apply(store).await?;
        Ok(applied.finish(self.context_lines))
    }
}

impl<'a> ValidatedPatch<'a> {
    async fn check(store: &FileStore, operation: &'a PatchOperation) -> Result<Self> {
        let path = operation.path.as_str();
        let file_path = store.display(&store.resolve(path)?);
        let exists = store.exists(path).await?;
        if exists && !store.is_file(path).await? {
            return Err(SentinelError::NotAFile(path.to_string()));
        }

        let content = match (operation.kind, &operation.content, exists) {
            (PatchKind::CreateFile, _, true) => {
                return Err(SentinelError::PreconditionFailed(format!(
                    "cannot create '{path}': file already exists; use update_file"
                )));
            }
            (PatchKind::UpdateFile | PatchKind::DeleteFile, _, false) => {
                return Err(SentinelError::PreconditionFailed(format!(
                    "cannot {} '{path}': file does not exist",
                    if operation.kind == PatchKind::UpdateFile {
                        "update"
                    } else {
                        "delete"
                    }
                )));
            }
            (PatchKind::CreateFile | PatchKind::UpdateFile, None, _) => {
                return Err(SentinelError::InvalidArguments(format!(
                    "{} requires 'content'",
                    operation.kind
                )));
            }
            (_, content, _) => content.as_deref(),
        };
        debug!(target: "sentinel.patch", kind = %operation.kind, path, "patch validated");

        Ok(Self {
            operation,
            file_path,
            content,
            exists,
        })
    }

    async fn apply(self, store: &FileStore) -> Result<AppliedPatch<'a>> {
        let path = self.operation.path.as_str();
        let old_content = if self.exists {
            store.read(path).await?
        } else {
            String::new()
        };

        let new_content = match self.operation.kind {
            PatchKind::DeleteFile => {
                store.remove(path).await?;
                String::new()
            }
            PatchKind::CreateFile | PatchKind::UpdateFile => {
                let content = self.content.unwrap_or_default().to_string();
                store.write(path, &content).await?;
                content
            }
        };
        debug!(target: "sentinel.patch", path, "patch written");

        Ok(AppliedPatch {
            operation: self.operation,
            file_path: self.file_path,
            old_content,
            new_content,
        })
    }
}

impl AppliedPatch<'_> {
    fn finish(self, context_lines: Option<usize>) -> PatchResult {
        let diff_lines = compute_diff_lines(&self.old_content, &self.new_content, context_lines);
        let (additions, deletions) = count_changes(&diff_lines);
        let kind = self.operation.kind;
        let message = format!(
            "{} {} (+{additions} -{deletions})",
            kind.past_tense(),
            self.file_path
        );
        info!(target: "sentinel.patch", %kind, path = %self.file_path, additions, deletions, "patch applied");

        PatchResult {
            message,
            operation_type: kind,
            file_path: self.file_path,
            diff_lines,
            old_content: self.old_content,
            new_content: self.new_content,
            additions,
            deletions,
        }
    }
}
