//! TFLint, the Terraform linter. Runs only against sandboxes with Terraform
//! sources.

use std::sync::Arc;
use std::time::Duration;

use sentinel_config::{DiscoveryConfig, ScannerConfig};
use sentinel_exec::CommandExecutor;
use serde_json::Value;

use super::{DiscoveryChain, Finding, ScanContext, ScanPolicy, Scanner, ScannerIssue, Severity};

pub const NAME: &str = "tflint";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);
pub const EXTENSIONS: &[&str] = &[".tf", ".tf.json"];

/// Rule id given to HCL parse errors reported under `errors[]`.
pub const PARSE_ERROR_RULE: &str = "tflint.error";

fn severity_for(value: Option<&str>) -> Severity {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("error") => Severity::High,
        Some("warning") => Severity::Medium,
        Some("notice") => Severity::Low,
        _ => Severity::Info,
    }
}

pub struct TflintScanner {
    discovery: DiscoveryChain,
    timeout: Duration,
}

impl TflintScanner {
    pub fn new(discovery: DiscoveryChain, timeout: Duration) -> Self {
        Self { discovery, timeout }
    }

    pub fn from_config(
        config: &ScannerConfig,
        discovery: &DiscoveryConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let chain =
            DiscoveryChain::standard(NAME, None, config.binary.as_deref(), discovery, executor);
        Self::new(chain, config.timeout_or(DEFAULT_TIMEOUT))
    }
}

impl Scanner for TflintScanner {
    fn name(&self) -> &'static str {
        NAME
    }

    fn policy(&self) -> ScanPolicy {
        ScanPolicy::FormatSpecific {
            extensions: EXTENSIONS,
        }
    }

    fn discovery(&self) -> &DiscoveryChain {
        &self.discovery
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn applies_to(&self, frameworks: &[String]) -> bool {
        frameworks.is_empty() || frameworks.iter().any(|framework| framework == "terraform")
    }

    fn build_args(&self, _context: &ScanContext<'_>) -> Vec<String> {
        // Without `--recursive` TFLint only inspects the working directory
        // itself and misses modules in subdirectories.
        ["--recursive", "--format", "json"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn accepts_exit_code(&self, code: i32) -> bool {
        matches!(code, 0 | 2)
    }

    fn parse_output(&self, stdout: &str) -> Result<Vec<Finding>, ScannerIssue> {
        parse_report(stdout)
    }
}

fn location(entry: &Value) -> (String, Option<u32>) {
    let file = entry
        .pointer("/range/filename")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let line = entry
        .pointer("/range/start/line")
        .and_then(Value::as_u64)
        .and_then(|line| u32::try_from(line).ok())
        .filter(|line| *line > 0);
    (file, line)
}

fn text<'a>(entry: &'a Value, pointer: &str) -> Option<&'a str> {
    entry
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

pub(crate) fn parse_report(stdout: &str) -> Result<Vec<Finding>, ScannerIssue> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let payload: Value =
        serde_json::from_str(trimmed).map_err(|error| ScannerIssue::OutputMalformed {
            scanner: NAME.to_string(),
            detail: error.to_string(),
        })?;
    if !payload.is_object() {
        return Err(ScannerIssue::OutputMalformed {
            scanner: NAME.to_string(),
            detail: "expected a JSON object".to_string(),
        });
    }

    let entries = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };

    let mut findings = Vec::new();
    for error in entries("errors") {
        let (file, line) = location(&error);
        let message = text(&error, "/message").unwrap_or("TFLint reported an error");
        findings.push(Finding {
            source: NAME.to_string(),
            rule_id: PARSE_ERROR_RULE.to_string(),
            severity: Severity::High,
            file,
            line,
            message: message.to_string(),
            title: Some(text(&error, "/summary").unwrap_or("tflint error").to_string()),
            recommendation: Some("Fix the Terraform syntax so scanners can run.".to_string()),
        });
    }

    for issue in entries("issues") {
        let (file, line) = location(&issue);
        let rule = text(&issue, "/rule/name").unwrap_or("unknown_rule");
        let severity = text(&issue, "/rule/severity").or_else(|| text(&issue, "/severity"));
        findings.push(Finding {
            source: NAME.to_string(),
            rule_id: rule.to_string(),
            severity: severity_for(severity),
            file,
            line,
            message: text(&issue, "/message").unwrap_or(rule).to_string(),
            title: Some(format!("tflint: {rule}")),
            recommendation: text(&issue, "/rule/link").map(str::to_string),
        });
    }
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test]
    fn parses_issues_and_errors() {
        let report = r#"{
          "issues": [
            {
              "rule": {
                "name": "terraform_required_providers",
                "severity": "warning",
                "link": "https://github.com/terraform-linters/tflint-ruleset-terraform/blob/main/docs/rules/terraform_required_providers.md"
              },
              "message": "Missing version constraint for provider \"aws\"",
              "range": {"filename": "main.tf", "start": {"line": 1, "column": 1}}
            },
            {
              "rule": {"name": "aws_instance_invalid_type", "severity": "error"},
              "message": "\"t9.nano\" is an invalid value",
              "range": {"filename": "modules/ec2/main.tf", "start": {"line": 7}}
            }
          ],
          "errors": [
            {
              "summary": "Unclosed configuration block",
              "message": "There is no closing brace for this block",
              "range": {"filename": "broken.tf", "start": {"line": 3}}
            }
          ]
        }"#;

        let findings = parse_report(report).unwrap();
        assert_eq!(findings.len(), 3);

        assert_eq!(findings[0].rule_id, PARSE_ERROR_RULE);
        assert_eq!(findings[0].file, "broken.tf");
        assert_eq!(findings[0].line, Some(3));

        assert_eq!(findings[1].rule_id, "terraform_required_providers");
        assert_eq!(findings[1].severity, Severity::Medium);
        assert!(findings[1].recommendation.is_some());

        assert_eq!(findings[2].severity, Severity::High);
        assert_eq!(findings[2].file, "modules/ec2/main.tf");
        assert_eq!(findings[2].recommendation, None);
    }

    #[test]
    fn severity_mapping() {
        assert_eq!(severity_for(Some("ERROR")), Severity::High);
        assert_eq!(severity_for(Some("notice")), Severity::Low);
        assert_eq!(severity_for(Some("other")), Severity::Info);
        assert_eq!(severity_for(None), Severity::Info);
    }

    #[test]
    fn rejects_non_json_output() {
        assert!(parse_report("Failed to load configurations").is_err());
        assert!(parse_report("[]").is_err());
        assert!(parse_report(r#"{"issues": [], "errors": []}"#).unwrap().is_empty());
    }

    #[test]
    fn runs_only_for_terraform_selections() {
        let scanner = TflintScanner::new(DiscoveryChain::new(NAME, Vec::new()), DEFAULT_TIMEOUT);
        assert!(scanner.applies_to(&[]));
        assert!(scanner.applies_to(&["terraform".to_string()]));
        assert!(!scanner.applies_to(&["kubernetes".to_string()]));
        assert!(scanner.accepts_exit_code(2));
        assert!(!scanner.accepts_exit_code(1));
    }

    #[test]
    fn args_walk_module_subdirectories() {
        let scanner = TflintScanner::new(DiscoveryChain::new(NAME, Vec::new()), DEFAULT_TIMEOUT);
        let frameworks = vec!["terraform".to_string()];
        let args = scanner.build_args(&ScanContext {
            root: Path::new("/sandbox/abc"),
            frameworks: &frameworks,
        });
        assert_eq!(args, vec!["--recursive", "--format", "json"]);
    }
}
