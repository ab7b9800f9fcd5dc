mod support;

use serde_json::json;
use sentinel_core::{ScanReport, Severity};
use tempfile::TempDir;

const VULNERABLE_TF: &str = r#"resource "aws_db_instance" "main" {
  engine   = "postgres"
  username = "admin"
  password = "SuperSecret123!"
}

resource "aws_security_group" "ssh" {
  ingress {
    from_port   = 22
    to_port     = 22
    protocol    = "tcp"
    cidr_blocks = ["0.0.0.0/0"]
  }
}
"#;

async fn scan(
    registry: &sentinel_core::ToolRegistry,
    files: &[(&str, &str)],
    args: serde_json::Value,
) -> serde_json::Value {
    let session = registry.start_session().unwrap();
    for (path, content) in files {
        registry.write_file(&session.id, path, content).await.unwrap();
    }
    registry.execute_tool(&session.id, "scan_iac", args).await
}

#[tokio::test]
async fn missing_scanners_are_listed_without_failing() {
    let base = TempDir::new().unwrap();
    let empty_path = TempDir::new().unwrap();
    let registry = support::registry(&support::isolated_config(base.path(), empty_path.path()));

    let result = scan(
        &registry,
        &[("main.tf", VULNERABLE_TF)],
        json!({"path": "main.tf"}),
    )
    .await;

    assert_eq!(result["success"], true);
    assert_eq!(result["findings"], json!([]));
    assert_eq!(result["unavailable_scanners"], json!(["checkov", "tflint"]));
    assert_eq!(result["frameworks"], json!(["terraform"]));
}

#[tokio::test]
async fn escaping_target_is_an_error() {
    let base = TempDir::new().unwrap();
    let empty_path = TempDir::new().unwrap();
    let registry = support::registry(&support::isolated_config(base.path(), empty_path.path()));

    let result = scan(&registry, &[], json!({"file_path": "../../etc/passwd"})).await;
    assert_eq!(result["success"], false);
    assert_eq!(result["error"]["error_type"], "PathEscape");
}

#[cfg(unix)]
mod fake_scanners {
    use super::*;
    use serial_test::serial;

    const TERRAFORM_RESULTS: &str = r#"{
    "check_type": "terraform",
    "results": {
      "failed_checks": [
        {
          "check_id": "CKV_AWS_24",
          "check_name": "Ensure no security groups allow ingress from 0.0.0.0:0 to port 22",
          "file_path": "/main.tf",
          "file_line_range": [7, 14],
          "guideline": "https://docs.prismacloud.io/en/enterprise-edition/policy-reference/aws-policies/aws-networking-policies/networking-1-port-security",
          "severity": null
        },
        {
          "check_id": "CKV_AWS_16",
          "check_name": "Ensure all data stored in the RDS is securely encrypted at rest",
          "file_path": "/main.tf",
          "file_line_range": [1, 5],
          "severity": null
        },
        {
          "check_id": "CKV_AWS_20",
          "check_name": "S3 Bucket has an ACL defined which allows public READ access.",
          "file_path": "/storage.tf",
          "file_line_range": [1, 4],
          "severity": "HIGH"
        }
      ]
    }
  }"#;

    const SECRETS_RESULTS: &str = r#"{
    "check_type": "secrets",
    "results": {
      "failed_checks": [
        {
          "check_id": "CKV_SECRET_80",
          "check_name": "Generic Password",
          "file_path": "/main.tf",
          "file_line_range": [4, 5],
          "severity": null
        }
      ]
    }
  }"#;

    /// Behaves like Checkov: a `--framework` list without `secrets` skips the
    /// secrets pass.
    fn checkov_script(terraform: &str, secrets: &str) -> String {
        format!(
            r#"with_secrets=1
case " $* " in
  *" --framework "*)
    case " $* " in
      *" secrets "*) ;;
      *) with_secrets=0 ;;
    esac
    ;;
esac
if [ "$with_secrets" = 1 ]; then
cat <<'JSON'
[{terraform}, {secrets}]
JSON
else
cat <<'JSON'
[{terraform}]
JSON
fi
exit 1
"#
        )
    }

    /// Records its arguments next to itself and reports nothing.
    const RECORDING_CHECKOV: &str = r#"printf '%s\n' "$@" > "$(dirname "$0")/checkov-args.txt"
echo '[]'
"#;

    /// Records its arguments; only reports the nested module when asked to
    /// walk subdirectories.
    const RECORDING_TFLINT: &str = r#"printf '%s\n' "$@" > "$(dirname "$0")/tflint-args.txt"
case " $* " in
  *" --recursive "*)
    echo '{"issues":[{"rule":{"name":"terraform_unused_declarations","severity":"warning"},"message":"variable unused is declared but not used","range":{"filename":"modules/vpc/main.tf","start":{"line":1}}}],"errors":[]}'
    exit 2
    ;;
esac
echo '{"issues":[],"errors":[]}'
"#;

    #[tokio::test]
    #[serial]
    async fn password_and_open_ssh_are_high_or_critical() {
        let base = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        support::fake_tool(
            bin.path(),
            "checkov",
            &checkov_script(TERRAFORM_RESULTS, SECRETS_RESULTS),
        );
        let registry = support::registry(&support::isolated_config(base.path(), bin.path()));

        let result = scan(
            &registry,
            &[("main.tf", VULNERABLE_TF), ("storage.tf", "")],
            json!({"path": "main.tf", "framework": "terraform"}),
        )
        .await;
        assert_eq!(result["success"], true, "{result}");

        let report: ScanReport = serde_json::from_value(result.clone()).unwrap();
        assert!(report.findings.iter().all(|finding| finding.file == "main.tf"));
        assert_eq!(report.unavailable_scanners, vec!["tflint"]);
        assert_eq!(report.frameworks, vec!["terraform"]);

        let severity_of = |rule: &str| {
            report
                .findings
                .iter()
                .find(|finding| finding.rule_id == rule)
                .map(|finding| finding.severity)
        };
        assert_eq!(severity_of("CKV_SECRET_80"), Some(Severity::Critical));
        assert_eq!(severity_of("CKV_AWS_24"), Some(Severity::High));
        assert_eq!(severity_of("CKV_AWS_16"), Some(Severity::Info));
        assert_eq!(severity_of("CKV_AWS_20"), None);

        let ordered: Vec<Severity> = report.findings.iter().map(|f| f.severity).collect();
        assert_eq!(
            ordered,
            vec![Severity::Critical, Severity::High, Severity::Info]
        );
    }

    #[tokio::test]
    #[serial]
    async fn scanner_receives_sandbox_directory() {
        let base = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        let record = bin.path().join("args.txt");
        support::fake_tool(
            bin.path(),
            "checkov",
            &format!(
                "printf '%s\\n' \"$(pwd -P)\" \"$@\" > '{}'\necho '[]'\n",
                record.display()
            ),
        );
        let registry = support::registry(&support::isolated_config(base.path(), bin.path()));
        let session = registry.start_session().unwrap();
        registry
            .write_file(&session.id, "deploy.yaml", "apiVersion: v1\nkind: Pod\n")
            .await
            .unwrap();

        let report = registry.scan_iac(&session.id, None, None).await.unwrap();
        assert!(report.findings.is_empty());
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert!(report.notes.iter().any(|note| note.contains("kubernetes")));
        assert!(report.unavailable_scanners.is_empty());

        let recorded = std::fs::read_to_string(&record).unwrap();
        let lines: Vec<&str> = recorded.lines().collect();
        let root = session.root.path().display().to_string();
        assert_eq!(lines[0], root);
        assert_eq!(
            &lines[1..],
            &[
                "--output",
                "json",
                "--compact",
                "--quiet",
                "--framework",
                "kubernetes",
                "secrets",
                "--directory",
                root.as_str()
            ]
        );
    }

    #[tokio::test]
    #[serial]
    async fn terraform_only_in_subdirectory_is_detected_and_linted() {
        let base = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        support::fake_tool(bin.path(), "checkov", RECORDING_CHECKOV);
        support::fake_tool(bin.path(), "tflint", RECORDING_TFLINT);
        let registry = support::registry(&support::isolated_config(base.path(), bin.path()));

        let result = scan(
            &registry,
            &[("modules/vpc/main.tf", "variable \"unused\" {}\n")],
            json!({"path": "modules"}),
        )
        .await;
        assert_eq!(result["success"], true, "{result}");
        let report: ScanReport = serde_json::from_value(result).unwrap();

        assert_eq!(report.frameworks, vec!["terraform"]);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].source, "tflint");
        assert_eq!(report.findings[0].file, "modules/vpc/main.tf");

        let checkov_args = std::fs::read_to_string(bin.path().join("checkov-args.txt")).unwrap();
        let checkov_args: Vec<&str> = checkov_args.lines().collect();
        assert!(
            checkov_args
                .windows(4)
                .any(|window| window == ["--framework", "terraform", "secrets", "--directory"]),
            "{checkov_args:?}"
        );

        let tflint_args = std::fs::read_to_string(bin.path().join("tflint-args.txt")).unwrap();
        assert_eq!(
            tflint_args.lines().collect::<Vec<_>>(),
            vec!["--recursive", "--format", "json"]
        );
    }

    #[tokio::test]
    #[serial]
    async fn timeout_becomes_warning() {
        let base = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        support::fake_tool(bin.path(), "checkov", "exec sleep 30\n");
        let config = support::with_timeout(
            support::isolated_config(base.path(), bin.path()),
            "checkov",
            1,
        );
        let registry = support::registry(&config);

        let result = scan(&registry, &[("main.tf", VULNERABLE_TF)], json!({})).await;
        assert_eq!(result["success"], true);
        assert_eq!(result["findings"], json!([]));
        let warnings = result["warnings"].as_array().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].as_str().unwrap().starts_with("ScannerTimeout"));
    }

    #[tokio::test]
    #[serial]
    async fn malformed_output_becomes_warning() {
        let base = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        support::fake_tool(bin.path(), "checkov", "echo 'checkov crashed'\nexit 0\n");
        support::fake_tool(
            bin.path(),
            "tflint",
            r#"echo '{"issues":[{"rule":{"name":"terraform_required_version","severity":"warning"},"message":"missing required_version","range":{"filename":"main.tf","start":{"line":1}}}],"errors":[]}'
exit 2
"#,
        );
        let registry = support::registry(&support::isolated_config(base.path(), bin.path()));

        let result = scan(&registry, &[("main.tf", VULNERABLE_TF)], json!({})).await;
        let report: ScanReport = serde_json::from_value(result).unwrap();

        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("ScannerOutputMalformed"));
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].source, "tflint");
        assert_eq!(report.findings[0].severity, Severity::Medium);
    }
}

/// Requires real `checkov` on `PATH`.
#[tokio::test]
#[ignore]
async fn real_checkov_flags_vulnerable_terraform() {
    let base = TempDir::new().unwrap();
    let mut config = sentinel_config::SentinelConfig::default();
    config.sandbox.base_dir = base.path().to_path_buf();
    let registry = support::registry(&config);

    let result = scan(
        &registry,
        &[("main.tf", VULNERABLE_TF)],
        json!({"path": "main.tf"}),
    )
    .await;
    let report: ScanReport = serde_json::from_value(result).unwrap();

    assert!(!report.unavailable_scanners.contains(&"checkov".to_string()));
    let checkov: Vec<_> = report
        .findings
        .iter()
        .filter(|finding| finding.source == "checkov" && finding.file == "main.tf")
        .collect();
    assert!(
        checkov
            .iter()
            .any(|finding| finding.rule_id.starts_with("CKV_SECRET_")
                && finding.severity == Severity::Critical),
        "hardcoded password not reported: {checkov:?}"
    );
    assert!(
        checkov.iter().any(|finding| ["CKV_AWS_24", "CKV_AWS_260"]
            .contains(&finding.rule_id.as_str())
            && finding.severity == Severity::High),
        "open SSH ingress not reported: {checkov:?}"
    );
}
