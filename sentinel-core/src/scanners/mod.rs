//! IaC security scanners and the orchestrator that runs them.
//!
//! Each external tool is a [`Scanner`]: it knows how to find its executable,
//! which arguments to pass, which exit codes mean "ran fine", and how to turn
//! its native JSON into [`Finding`]s. The [`ScannerOrchestrator`] owns the
//! shared flow (discovery, execution, filtering, ordering), so adding a tool
//! means adding one `Scanner` implementation.

pub mod checkov;
mod discovery;
mod framework;
mod orchestrator;
pub mod tflint;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use discovery::{
    DiscoveryChain, ExplicitOverride, LocateStrategy, Located, PythonModule, SearchPath, VirtualEnv,
};
pub use framework::{FRAMEWORK_ALLOWLIST, detect_frameworks, has_matching_file, normalize_framework_hint};
pub use orchestrator::ScannerOrchestrator;

/// Ordered most to least severe; `Ord` sorts critical first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "info" => Ok(Self::Info),
            _ => Err(()),
        }
    }
}

/// One normalized scanner result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub source: String,
    pub rule_id: String,
    pub severity: Severity,
    /// Sandbox-relative POSIX path.
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Finding {
    fn identity(&self) -> (&str, &str, &str, Option<u32>) {
        (&self.source, &self.rule_id, &self.file, self.line)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub findings: Vec<Finding>,
    pub warnings: Vec<String>,
    pub unavailable_scanners: Vec<String>,
    pub notes: Vec<String>,
    pub frameworks: Vec<String>,
}

/// Per-scanner trouble. Never fatal to a scan; rendered into the report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScannerIssue {
    #[error("{scanner} is not installed or could not be located")]
    Unavailable { scanner: String },

    #[error("{scanner} timed out after {seconds}s")]
    Timeout { scanner: String, seconds: u64 },

    #[error("{scanner} produced unreadable output: {detail}")]
    OutputMalformed { scanner: String, detail: String },

    #[error("{scanner} failed ({status}): {stderr}")]
    ExecutionFailed {
        scanner: String,
        status: String,
        stderr: String,
    },
}

impl ScannerIssue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "ScannerUnavailable",
            Self::Timeout { .. } => "ScannerTimeout",
            Self::OutputMalformed { .. } => "ScannerOutputMalformed",
            Self::ExecutionFailed { .. } => "ScannerExecutionFailed",
        }
    }

    /// `<kind>: <message>`, the form placed in report warnings.
    pub fn render(&self) -> String {
        format!("{}: {self}", self.kind())
    }
}

/// Which part of the sandbox a scanner looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPolicy {
    /// Always scans the entire sandbox root; results are filtered afterwards.
    WholeWorkspace,
    /// Runs only when the sandbox holds a file ending in one of `extensions`.
    FormatSpecific { extensions: &'static [&'static str] },
}

/// What a scanner needs to build its command line.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'a> {
    pub root: &'a Path,
    pub frameworks: &'a [String],
}

pub trait Scanner: Send + Sync {
    fn name(&self) -> &'static str;

    fn policy(&self) -> ScanPolicy;

    /// Strategies used to locate the executable.
    fn discovery(&self) -> &DiscoveryChain;

    /// Effective timeout (configured or built-in).
    fn timeout(&self) -> Duration;

    /// Whether the scanner should run for the selected frameworks. An empty
    /// selection means no restriction.
    fn applies_to(&self, _frameworks: &[String]) -> bool {
        true
    }

    fn build_args(&self, context: &ScanContext<'_>) -> Vec<String>;

    /// Paths the command will read, checked against the sandbox before it
    /// runs.
    fn touched_paths(&self, context: &ScanContext<'_>) -> Vec<PathBuf> {
        vec![context.root.to_path_buf()]
    }

    fn accepts_exit_code(&self, code: i32) -> bool;

    /// Parse native output. File paths are returned as reported; the
    /// orchestrator normalizes them against the sandbox root.
    fn parse_output(&self, stdout: &str) -> Result<Vec<Finding>, ScannerIssue>;
}
