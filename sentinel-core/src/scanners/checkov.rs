//! Checkov, the policy-as-code scanner covering most IaC frameworks.

use std::sync::Arc;
use std::time::Duration;

use sentinel_config::{DiscoveryConfig, ScannerConfig};
use sentinel_exec::CommandExecutor;
use serde_json::Value;

use super::{DiscoveryChain, Finding, ScanContext, ScanPolicy, Scanner, ScannerIssue, Severity};

pub const NAME: &str = "checkov";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const SECRETS_FRAMEWORK: &str = "secrets";

/// Severities for well-known checks, used when Checkov reports none (runs
/// without a platform API key leave `severity` null).
const KNOWN_SEVERITIES: &[(&str, Severity)] = &[
    // Security groups open to the world.
    ("CKV_AWS_24", Severity::High),
    ("CKV_AWS_25", Severity::High),
    ("CKV_AWS_260", Severity::High),
    ("CKV_AWS_277", Severity::High),
    // Hardcoded credentials.
    ("CKV_AWS_41", Severity::Critical),
    ("CKV_AWS_46", Severity::Critical),
    ("CKV_AZURE_45", Severity::Critical),
    // Public buckets.
    ("CKV_AWS_20", Severity::High),
    ("CKV_AWS_57", Severity::High),
];

/// Secrets-framework checks (plaintext passwords, keys, tokens).
const CRITICAL_PREFIXES: &[&str] = &["CKV_SECRET_"];

fn severity_for(check_id: &str, reported: Option<&str>) -> Severity {
    if let Some(severity) = reported.and_then(|value| value.parse().ok()) {
        return severity;
    }
    if CRITICAL_PREFIXES
        .iter()
        .any(|prefix| check_id.starts_with(prefix))
    {
        return Severity::Critical;
    }
    KNOWN_SEVERITIES
        .iter()
        .find(|(id, _)| *id == check_id)
        .map(|(_, severity)| *severity)
        .unwrap_or(Severity::Info)
}

pub struct CheckovScanner {
    discovery: DiscoveryChain,
    timeout: Duration,
}

impl CheckovScanner {
    pub fn new(discovery: DiscoveryChain, timeout: Duration) -> Self {
        Self { discovery, timeout }
    }

    pub fn from_config(
        config: &ScannerConfig,
        discovery: &DiscoveryConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let chain = DiscoveryChain::standard(
            NAME,
            Some("checkov"),
            config.binary.as_deref(),
            discovery,
            executor,
        );
        Self::new(chain, config.timeout_or(DEFAULT_TIMEOUT))
    }
}

impl Scanner for CheckovScanner {
    fn name(&self) -> &'static str {
        NAME
    }

    fn policy(&self) -> ScanPolicy {
        ScanPolicy::WholeWorkspace
    }

    fn discovery(&self) -> &DiscoveryChain {
        &self.discovery
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build_args(&self, context: &ScanContext<'_>) -> Vec<String> {
        let mut args: Vec<String> = ["--output", "json", "--compact", "--quiet"]
            .into_iter()
            .map(String::from)
            .collect();
        if !context.frameworks.is_empty() {
            // A `--framework` restriction turns off every framework not named,
            // including the plaintext secrets pass.
            args.push("--framework".into());
            args.extend(context.frameworks.iter().cloned());
            if !context.frameworks.iter().any(|framework| framework == SECRETS_FRAMEWORK) {
                args.push(SECRETS_FRAMEWORK.into());
            }
        }
        args.push("--directory".into());
        args.push(context.root.display().to_string());
        args
    }

    fn accepts_exit_code(&self, code: i32) -> bool {
        matches!(code, 0 | 1)
    }

    fn parse_output(&self, stdout: &str) -> Result<Vec<Finding>, ScannerIssue> {
        parse_report(stdout)
    }
}

fn malformed(detail: impl Into<String>) -> ScannerIssue {
    ScannerIssue::OutputMalformed {
        scanner: NAME.to_string(),
        detail: detail.into(),
    }
}

/// Parse Checkov's JSON report: either one framework object or a list of
/// them. An empty report (no IaC files found) yields no findings.
pub(crate) fn parse_report(stdout: &str) -> Result<Vec<Finding>, ScannerIssue> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let payload: Value =
        serde_json::from_str(trimmed).map_err(|error| malformed(error.to_string()))?;

    let reports = match &payload {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        Value::Object(_) => vec![&payload],
        _ => return Err(malformed("expected a JSON object or array")),
    };

    let mut findings = Vec::new();
    for report in reports {
        let Some(failed) = report
            .pointer("/results/failed_checks")
            .and_then(Value::as_array)
        else {
            continue;
        };
        findings.extend(failed.iter().filter_map(finding_from_check));
    }
    Ok(findings)
}

fn finding_from_check(check: &Value) -> Option<Finding> {
    let check = check.as_object()?;
    let text = |key: &str| check.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());

    let check_id = text("check_id").unwrap_or("unknown");
    let check_name = text("check_name").or_else(|| text("check"));
    let file = text("file_path").unwrap_or_default();
    let line = check
        .get("file_line_range")
        .and_then(Value::as_array)
        .and_then(|range| range.first())
        .and_then(Value::as_u64)
        .and_then(|line| u32::try_from(line).ok())
        .filter(|line| *line > 0);

    Some(Finding {
        source: NAME.to_string(),
        rule_id: check_id.to_string(),
        severity: severity_for(check_id, text("severity")),
        file: file.trim_start_matches('/').to_string(),
        line,
        message: check_name.unwrap_or(check_id).to_string(),
        title: Some(format!("{check_id}: {}", check_name.unwrap_or("Unknown check"))),
        recommendation: Some(
            text("guideline")
                .map(str::to_string)
                .unwrap_or_else(|| format!("See the Checkov documentation for {check_id}")),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    const REPORT: &str = r#"[
      {
        "check_type": "terraform",
        "results": {
          "failed_checks": [
            {
              "check_id": "CKV_AWS_24",
              "check_name": "Ensure no security groups allow ingress from 0.0.0.0:0 to port 22",
              "file_path": "/main.tf",
              "file_line_range": [12, 20],
              "guideline": "https://docs.prismacloud.io/en/policy/ssh",
              "severity": null
            },
            {
              "check_id": "CKV_AWS_18",
              "check_name": "Ensure the S3 bucket has access logging enabled",
              "file_path": "/modules/s3/bucket.tf",
              "file_line_range": [1, 4],
              "severity": "LOW"
            }
          ]
        }
      },
      {
        "check_type": "secrets",
        "results": {
          "failed_checks": [
            {
              "check_id": "CKV_SECRET_6",
              "check_name": "Base64 High Entropy String",
              "file_path": "/main.tf",
              "file_line_range": [3, 3],
              "severity": null
            }
          ]
        }
      }
    ]"#;

    #[test]
    fn parses_framework_list() {
        let findings = parse_report(REPORT).unwrap();
        assert_eq!(findings.len(), 3);

        let ssh = &findings[0];
        assert_eq!(ssh.rule_id, "CKV_AWS_24");
        assert_eq!(ssh.severity, Severity::High);
        assert_eq!(ssh.file, "main.tf");
        assert_eq!(ssh.line, Some(12));
        assert_eq!(
            ssh.recommendation.as_deref(),
            Some("https://docs.prismacloud.io/en/policy/ssh")
        );
        assert!(ssh.title.as_deref().unwrap().starts_with("CKV_AWS_24: "));

        assert_eq!(findings[1].severity, Severity::Low);
        assert_eq!(findings[1].file, "modules/s3/bucket.tf");
        assert_eq!(findings[2].severity, Severity::Critical);
    }

    #[test]
    fn single_object_and_empty_reports() {
        let single = r#"{"check_type": "terraform", "results": {"failed_checks": []}}"#;
        assert!(parse_report(single).unwrap().is_empty());
        assert!(parse_report("").unwrap().is_empty());

        let summary_only = r#"{"passed": 0, "failed": 0, "skipped": 0}"#;
        assert!(parse_report(summary_only).unwrap().is_empty());
    }

    #[test]
    fn malformed_output_is_reported() {
        let error = parse_report("Traceback (most recent call last):").unwrap_err();
        assert_eq!(error.kind(), "ScannerOutputMalformed");
        assert!(parse_report("42").is_err());
    }

    #[test]
    fn unknown_checks_without_severity_are_info() {
        assert_eq!(severity_for("CKV_AWS_999", None), Severity::Info);
        assert_eq!(severity_for("CKV_AWS_999", Some("MEDIUM")), Severity::Medium);
        assert_eq!(severity_for("CKV_AWS_24", Some("bogus")), Severity::High);
    }

    #[test]
    fn args_include_frameworks_and_directory() {
        let scanner = CheckovScanner::new(DiscoveryChain::new(NAME, Vec::new()), DEFAULT_TIMEOUT);
        let frameworks = vec!["terraform".to_string()];
        let args = scanner.build_args(&ScanContext {
            root: Path::new("/sandbox/abc"),
            frameworks: &frameworks,
        });
        assert_eq!(
            args,
            vec![
                "--output",
                "json",
                "--compact",
                "--quiet",
                "--framework",
                "terraform",
                "secrets",
                "--directory",
                "/sandbox/abc"
            ]
        );
        assert!(scanner.accepts_exit_code(1));
        assert!(!scanner.accepts_exit_code(2));
    }

    #[test]
    fn secrets_framework_is_not_repeated() {
        let scanner = CheckovScanner::new(DiscoveryChain::new(NAME, Vec::new()), DEFAULT_TIMEOUT);
        let frameworks = vec!["kubernetes".to_string(), "secrets".to_string()];
        let args = scanner.build_args(&ScanContext {
            root: Path::new("/sandbox/abc"),
            frameworks: &frameworks,
        });
        assert_eq!(
            args.iter().filter(|arg| arg.as_str() == "secrets").count(),
            1
        );

        let args = scanner.build_args(&ScanContext {
            root: Path::new("/sandbox/abc"),
            frameworks: &[],
        });
        assert!(!args.iter().any(|arg| arg == "--framework"));
    }
}
