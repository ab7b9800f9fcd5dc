use std::path::Path;
use std::sync::Arc;

use hashbrown::HashSet;
use sentinel_commons::{SandboxPaths, normalize_report_path, paths_match};
use sentinel_config::SentinelConfig;
use sentinel_exec::{CommandExecutor, CommandInvocation, CommandPolicy, SandboxGuardPolicy};
use tracing::{debug, info, warn};

use super::checkov::CheckovScanner;
use super::framework::{detect_frameworks, has_matching_file, normalize_framework_hint};
use super::tflint::TflintScanner;
use super::{Finding, ScanContext, ScanPolicy, ScanReport, Scanner, ScannerIssue};
use crate::error::{Result, SentinelError};
use crate::sandbox::SandboxRoot;

/// Outcome of running one scanner.
enum ScannerRun {
    Findings(Vec<Finding>),
    Skipped(String),
    Failed(ScannerIssue),
}

/// Runs every registered scanner against a sandbox and merges their output.
pub struct ScannerOrchestrator {
    scanners: Vec<Arc<dyn Scanner>>,
    executor: Arc<dyn CommandExecutor>,
}

impl ScannerOrchestrator {
    pub fn new(scanners: Vec<Arc<dyn Scanner>>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { scanners, executor }
    }

    /// Checkov and TFLint, minus any disabled in `config`.
    pub fn from_config(config: &SentinelConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        let mut scanners: Vec<Arc<dyn Scanner>> = Vec::new();

        let checkov = config.scanner(super::checkov::NAME);
        if checkov.enabled {
            scanners.push(Arc::new(CheckovScanner::from_config(
                &checkov,
                &config.discovery,
                executor.clone(),
            )));
        }
        let tflint = config.scanner(super::tflint::NAME);
        if tflint.enabled {
            scanners.push(Arc::new(TflintScanner::from_config(
                &tflint,
                &config.discovery,
                executor.clone(),
            )));
        }

        Self::new(scanners, executor)
    }

    pub fn scanner_names(&self) -> Vec<&'static str> {
        self.scanners.iter().map(|scanner| scanner.name()).collect()
    }

    /// Scan the sandbox. When `target` is set, findings are limited to that
    /// file (or directory). Scanner problems land in the report; only
    /// containment and sandbox I/O failures are errors.
    pub async fn scan(
        &self,
        root: &SandboxRoot,
        target: Option<&str>,
        framework_hint: Option<&str>,
    ) -> Result<ScanReport> {
        let root_path = root.path();
        if !root_path.is_dir() {
            return Err(SentinelError::io(
                "read sandbox",
                root_path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }

        let target = match target.map(str::trim).filter(|target| !target.is_empty()) {
            Some(requested) => {
                let resolved = root.resolve_within(requested)?;
                let relative = root.display_relative(&resolved);
                if !resolved.exists() {
                    return Err(SentinelError::NotFound(requested.to_string()));
                }
                Some((relative, resolved.is_dir(), resolved))
            }
            None => None,
        };

        let mut report = ScanReport::default();
        let frameworks = self.select_frameworks(root_path, framework_hint, &mut report);
        report.frameworks = frameworks;

        for scanner in &self.scanners {
            let target_path = target.as_ref().map(|(_, _, resolved)| resolved.as_path());
            match self
                .run_scanner(scanner.as_ref(), root, &report.frameworks, target_path)
                .await
            {
                ScannerRun::Findings(findings) => {
                    let findings = collapse_duplicates(findings, root_path);
                    report.findings.extend(findings);
                }
                ScannerRun::Skipped(note) => report.notes.push(note),
                ScannerRun::Failed(ScannerIssue::Unavailable { scanner }) => {
                    report
                        .notes
                        .push(format!("{scanner} is not installed; its checks were skipped"));
                    report.unavailable_scanners.push(scanner);
                }
                ScannerRun::Failed(issue) => {
                    warn!(target: "sentinel.scan", scanner = scanner.name(), kind = issue.kind(), %issue, "scanner failed");
                    report.warnings.push(issue.render());
                }
            }
        }

        if let Some((relative, is_dir, _)) = &target
            && !relative.is_empty()
        {
            report
                .findings
                .retain(|finding| targets(relative, *is_dir, &finding.file));
        }
        report.findings.sort_by_key(|finding| finding.severity);

        info!(
            target: "sentinel.scan",
            findings = report.findings.len(),
            warnings = report.warnings.len(),
            unavailable = report.unavailable_scanners.len(),
            "scan finished"
        );
        Ok(report)
    }

    fn select_frameworks(
        &self,
        root: &Path,
        hint: Option<&str>,
        report: &mut ScanReport,
    ) -> Vec<String> {
        let hint = hint.map(str::trim).filter(|hint| !hint.is_empty());
        if let Some(hint) = hint {
            if let Some(framework) = normalize_framework_hint(hint) {
                return vec![framework.to_string()];
            }
            report.warnings.push(format!(
                "Unrecognized framework hint '{hint}'; falling back to detection"
            ));
        }

        let detected = detect_frameworks(root);
        if !detected.is_empty() {
            report
                .notes
                .push(format!("Detected frameworks: {}", detected.join(", ")));
        }
        detected
    }

    async fn run_scanner(
        &self,
        scanner: &dyn Scanner,
        root: &SandboxRoot,
        frameworks: &[String],
        target: Option<&Path>,
    ) -> ScannerRun {
        let name = scanner.name();
        if !scanner.applies_to(frameworks) {
            return ScannerRun::Skipped(format!(
                "Skipped {name}: not applicable to {}",
                frameworks.join(", ")
            ));
        }
        if let ScanPolicy::FormatSpecific { extensions } = scanner.policy()
            && !has_matching_file(root.path(), extensions)
        {
            return ScannerRun::Skipped(format!(
                "Skipped {name}: no {} files in the sandbox",
                extensions.join(" or ")
            ));
        }

        let Some(located) = scanner.discovery().locate().await else {
            return ScannerRun::Failed(ScannerIssue::Unavailable {
                scanner: name.to_string(),
            });
        };

        let context = ScanContext {
            root: root.path(),
            frameworks,
        };
        let mut touched = scanner.touched_paths(&context);
        touched.extend(target.map(Path::to_path_buf));
        let invocation = CommandInvocation::new(located.program, root.path())
            .with_args(located.prefix_args)
            .with_args(scanner.build_args(&context))
            .with_paths(touched)
            .with_timeout(scanner.timeout());

        let policy = SandboxGuardPolicy::new(Arc::new(root.clone()));
        if let Err(error) = policy.check(&invocation) {
            warn!(target: "sentinel.security", scanner = name, %error, "refused scanner invocation");
            return ScannerRun::Failed(ScannerIssue::ExecutionFailed {
                scanner: name.to_string(),
                status: "refused".to_string(),
                stderr: error.to_string(),
            });
        }

        let output = match self.executor.execute(&invocation).await {
            Ok(output) => output,
            Err(error) => {
                return ScannerRun::Failed(ScannerIssue::ExecutionFailed {
                    scanner: name.to_string(),
                    status: "spawn".to_string(),
                    stderr: format!("{error:#}"),
                });
            }
        };
        debug!(
            target: "sentinel.scan",
            scanner = name,
            code = ?output.status.code(),
            duration_ms = output.duration.as_millis() as u64,
            truncated = output.truncated,
            "scanner exited"
        );

        if output.timed_out {
            return ScannerRun::Failed(ScannerIssue::Timeout {
                scanner: name.to_string(),
                seconds: scanner.timeout().as_secs(),
            });
        }

        let accepted = output
            .status
            .code()
            .is_some_and(|code| scanner.accepts_exit_code(code));
        match scanner.parse_output(&output.stdout) {
            Ok(findings) if accepted || !findings.is_empty() => ScannerRun::Findings(findings),
            Err(issue) if accepted => ScannerRun::Failed(issue),
            _ => ScannerRun::Failed(ScannerIssue::ExecutionFailed {
                scanner: name.to_string(),
                status: output
                    .status
                    .code()
                    .map_or_else(|| "terminated".to_string(), |code| format!("exit {code}")),
                stderr: excerpt(&output.stderr),
            }),
        }
    }
}

/// Normalize file paths and drop exact repeats within one scanner's output.
fn collapse_duplicates(findings: Vec<Finding>, root: &Path) -> Vec<Finding> {
    let mut seen = HashSet::new();
    findings
        .into_iter()
        .map(|mut finding| {
            finding.file = normalize_report_path(root, &finding.file);
            finding
        })
        .filter(|finding| {
            let (source, rule, file, line) = finding.identity();
            seen.insert((source.to_string(), rule.to_string(), file.to_string(), line))
        })
        .collect()
}

fn targets(target: &str, is_dir: bool, file: &str) -> bool {
    if is_dir {
        let prefix = format!("{target}/");
        file.len() > prefix.len()
            && file
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(&prefix))
    } else {
        paths_match(target, file)
    }
}

fn excerpt(stderr: &str) -> String {
    const LIMIT: usize = 200;
    let trimmed = stderr.trim();
    match trimmed.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}…", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
