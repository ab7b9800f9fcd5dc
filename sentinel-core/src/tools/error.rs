use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::SentinelError;

/// Failure payload returned by [`super::ToolRegistry::execute_tool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionError {
    pub tool_name: String,
    pub error_type: String,
    pub message: String,
    pub is_recoverable: bool,
    pub recovery_suggestions: Vec<Cow<'static, str>>,
}

impl ToolExecutionError {
    pub fn from_error(tool_name: &str, error: &SentinelError) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            error_type: error.kind().to_string(),
            message: error.to_string(),
            is_recoverable: error.is_recoverable(),
            recovery_suggestions: recovery_suggestions(error),
        }
    }

    pub fn to_json_value(&self) -> Value {
        json!({
            "success": false,
            "error": {
                "tool_name": self.tool_name,
                "error_type": self.error_type,
                "message": self.message,
                "is_recoverable": self.is_recoverable,
                "recovery_suggestions": self.recovery_suggestions,
            }
        })
    }
}

fn recovery_suggestions(error: &SentinelError) -> Vec<Cow<'static, str>> {
    match error {
        SentinelError::PathEscape { .. } => vec![Cow::Borrowed(
            "Use a relative path that stays inside the workspace",
        )],
        SentinelError::UnknownSession(_) => vec![Cow::Borrowed(
            "Start a new session; the previous one has ended or expired",
        )],
        SentinelError::NotFound(_) => vec![
            Cow::Borrowed("Verify the path with list_files"),
            Cow::Borrowed("Use create_file to add a new file"),
        ],
        SentinelError::NotAFile(_) => vec![Cow::Borrowed("Target a file inside the directory")],
        SentinelError::PreconditionFailed(_) => vec![
            Cow::Borrowed("Use update_file for files that already exist"),
            Cow::Borrowed("Use create_file for files that do not exist yet"),
        ],
        SentinelError::InvalidArguments(_) => vec![Cow::Borrowed(
            "Check parameter names and types against the tool schema",
        )],
        SentinelError::UnknownTool(_) => vec![Cow::Borrowed(
            "Use one of apply_patch, scan_iac, list_files, read_file, write_file",
        )],
        SentinelError::Io { .. } => Vec::new(),
    }
}
