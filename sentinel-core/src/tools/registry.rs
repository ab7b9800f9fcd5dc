use std::sync::Arc;

use sentinel_config::SentinelConfig;
use sentinel_exec::{CommandExecutor, ProcessCommandExecutor};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::error::ToolExecutionError;
use super::names;
use crate::error::{Result, SentinelError};
use crate::patch::{PatchEngine, PatchKind, PatchOperation, PatchResult};
use crate::sandbox::{SandboxManager, Session};
use crate::scanners::{ScanReport, ScannerOrchestrator};
use crate::workspace::{FileNode, FileStore};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApplyPatchArgs {
    #[serde(rename = "type", alias = "kind", alias = "operation_type")]
    kind: String,
    path: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScanArgs {
    #[serde(default, alias = "file_path")]
    path: Option<String>,
    #[serde(default, alias = "iac_format")]
    framework: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|error| SentinelError::InvalidArguments(error.to_string()))
}

/// Merge `{"success": true}` into a serialized tool result.
fn success(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            map.insert("success".to_string(), Value::Bool(true));
            Value::Object(map)
        }
        other => json!({ "success": true, "result": other }),
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|error| {
        SentinelError::io("serialize tool result", "", std::io::Error::other(error))
    })
}

/// Dispatches tool calls to the sandbox of the calling session.
///
/// Each call holds the session's operation lock for its whole duration, so
/// calls within one session run one at a time while different sessions
/// proceed in parallel.
pub struct ToolRegistry {
    sandboxes: Arc<SandboxManager>,
    patches: PatchEngine,
    scanners: ScannerOrchestrator,
}

impl ToolRegistry {
    pub fn new(
        sandboxes: Arc<SandboxManager>,
        patches: PatchEngine,
        scanners: ScannerOrchestrator,
    ) -> Self {
        Self {
            sandboxes,
            patches,
            scanners,
        }
    }

    /// Registry wired to real subprocesses.
    pub fn from_config(config: &SentinelConfig) -> Result<Self> {
        let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessCommandExecutor::new());
        Self::from_config_with_executor(config, executor)
    }

    pub fn from_config_with_executor(
        config: &SentinelConfig,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        let sandboxes = Arc::new(SandboxManager::from_config(&config.sandbox)?);
        Ok(Self::new(
            sandboxes,
            PatchEngine::new(config.diff.context()),
            ScannerOrchestrator::from_config(config, executor),
        ))
    }

    pub fn sandboxes(&self) -> &Arc<SandboxManager> {
        &self.sandboxes
    }

    pub fn start_session(&self) -> Result<Session> {
        self.sandboxes.create()
    }

    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        if let Ok(handle) = self.sandboxes.session(session_id) {
            let _guard = handle.lock().await;
            return self.sandboxes.destroy(session_id);
        }
        self.sandboxes.destroy(session_id)
    }

    /// Run a tool by name. Always returns a JSON value; failures are the
    /// structured error payload.
    pub async fn execute_tool(&self, session_id: &str, name: &str, args: Value) -> Value {
        debug!(target: "sentinel.sandbox", session = %session_id, tool = name, "tool call");
        match self.dispatch(session_id, name, args).await {
            Ok(value) => success(value),
            Err(error) => {
                debug!(target: "sentinel.sandbox", tool = name, kind = error.kind(), %error, "tool call failed");
                ToolExecutionError::from_error(name, &error).to_json_value()
            }
        }
    }

    async fn dispatch(&self, session_id: &str, name: &str, args: Value) -> Result<Value> {
        match name {
            names::APPLY_PATCH => {
                let args: ApplyPatchArgs = parse_args(args)?;
                let operation = PatchOperation {
                    kind: args.kind.parse::<PatchKind>()?,
                    path: args.path,
                    content: args.content,
                };
                to_value(&self.apply_patch(session_id, operation).await?)
            }
            names::SCAN_IAC => {
                let args: ScanArgs = parse_args(args)?;
                let report = self
                    .scan_iac(session_id, args.path.as_deref(), args.framework.as_deref())
                    .await?;
                to_value(&report)
            }
            names::LIST_FILES => {
                let files = self.list_files(session_id).await?;
                Ok(json!({ "files": to_value(&files)? }))
            }
            names::READ_FILE => {
                let args: ReadArgs = parse_args(args)?;
                let content = self.read_file(session_id, &args.path).await?;
                Ok(json!({ "path": args.path, "content": content }))
            }
            names::WRITE_FILE => {
                let args: WriteArgs = parse_args(args)?;
                let bytes_written = self.write_file(session_id, &args.path, &args.content).await?;
                Ok(json!({ "path": args.path, "bytes_written": bytes_written }))
            }
            other => Err(SentinelError::UnknownTool(other.to_string())),
        }
    }

    pub async fn apply_patch(
        &self,
        session_id: &str,
        operation: PatchOperation,
    ) -> Result<PatchResult> {
        let handle = self.sandboxes.session(session_id)?;
        let _guard = handle.lock().await;
        let store = FileStore::new(handle.root().clone());
        self.patches.apply(&store, operation).await
    }

    pub async fn scan_iac(
        &self,
        session_id: &str,
        target: Option<&str>,
        framework_hint: Option<&str>,
    ) -> Result<ScanReport> {
        let handle = self.sandboxes.session(session_id)?;
        let _guard = handle.lock().await;
        self.scanners
            .scan(handle.root(), target, framework_hint)
            .await
    }

    pub async fn list_files(&self, session_id: &str) -> Result<Vec<FileNode>> {
        let handle = self.sandboxes.session(session_id)?;
        let _guard = handle.lock().await;
        FileStore::new(handle.root().clone()).list().await
    }

    pub async fn read_file(&self, session_id: &str, path: &str) -> Result<String> {
        let handle = self.sandboxes.session(session_id)?;
        let _guard = handle.lock().await;
        FileStore::new(handle.root().clone()).read(path).await
    }

    pub async fn write_file(&self, session_id: &str, path: &str, content: &str) -> Result<usize> {
        let handle = self.sandboxes.session(session_id)?;
        let _guard = handle.lock().await;
        FileStore::new(handle.root().clone())
            .write(path, content)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_exec::{CommandInvocation, CommandOutput};
    use std::time::Duration;
    use tempfile::TempDir;

    struct NoProcesses;

    #[async_trait::async_trait]
    impl CommandExecutor for NoProcesses {
        async fn execute(&self, invocation: &CommandInvocation) -> anyhow::Result<CommandOutput> {
            anyhow::bail!("unexpected process {}", invocation.display())
        }
    }

    fn registry(dir: &TempDir) -> ToolRegistry {
        let manager = SandboxManager::new(dir.path(), Duration::from_secs(3600)).unwrap();
        ToolRegistry::new(
            Arc::new(manager),
            PatchEngine::default(),
            ScannerOrchestrator::new(Vec::new(), Arc::new(NoProcesses)),
        )
    }

    #[tokio::test]
    async fn write_read_and_list_round_trip_through_json() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let session = registry.start_session().unwrap();

        let written = registry
            .execute_tool(
                &session.id,
                names::WRITE_FILE,
                json!({"path": "main.tf", "content": "bucket {}\n"}),
            )
            .await;
        assert_eq!(written["success"], true);
        assert_eq!(written["bytes_written"], 10);

        let read = registry
            .execute_tool(&session.id, names::READ_FILE, json!({"path": "main.tf"}))
            .await;
        assert_eq!(read["content"], "bucket {}\n");

        let listed = registry
            .execute_tool(&session.id, names::LIST_FILES, Value::Null)
            .await;
        assert_eq!(listed["files"][0]["path"], "main.tf");
    }

    #[tokio::test]
    async fn apply_patch_accepts_type_or_kind() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let session = registry.start_session().unwrap();

        let created = registry
            .execute_tool(
                &session.id,
                names::APPLY_PATCH,
                json!({"type": "create_file", "path": "main.tf", "content": "a\n"}),
            )
            .await;
        assert_eq!(created["success"], true);
        assert_eq!(created["operation_type"], "create_file");
        assert_eq!(created["diff_lines"][0]["type"], "hunk");

        let deleted = registry
            .execute_tool(
                &session.id,
                names::APPLY_PATCH,
                json!({"kind": "delete_file", "path": "main.tf"}),
            )
            .await;
        assert_eq!(deleted["success"], true);
        assert_eq!(deleted["deletions"], 1);
    }

    #[tokio::test]
    async fn failures_are_structured_payloads() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let session = registry.start_session().unwrap();

        let unknown = registry
            .execute_tool(&session.id, "rm_rf", json!({}))
            .await;
        assert_eq!(unknown["error"]["error_type"], "UnknownTool");

        let bad_args = registry
            .execute_tool(&session.id, names::READ_FILE, json!({"file": "main.tf"}))
            .await;
        assert_eq!(bad_args["error"]["error_type"], "InvalidArguments");

        let escape = registry
            .execute_tool(&session.id, names::READ_FILE, json!({"path": "../../etc/passwd"}))
            .await;
        assert_eq!(escape["success"], false);
        assert_eq!(escape["error"]["error_type"], "PathEscape");
        assert_eq!(escape["error"]["is_recoverable"], false);

        let no_session = registry
            .execute_tool("0123456789abcdef0123456789abcdef", names::LIST_FILES, json!({}))
            .await;
        assert_eq!(no_session["error"]["error_type"], "UnknownSession");
    }

    #[tokio::test]
    async fn ended_sessions_are_unknown() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let session = registry.start_session().unwrap();
        registry.end_session(&session.id).await.unwrap();

        assert!(!session.root.path().exists());
        assert!(matches!(
            registry.list_files(&session.id).await,
            Err(SentinelError::UnknownSession(_))
        ));
    }
}
