use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Upper bound on captured bytes per stream.
pub const DEFAULT_CAPTURE_LIMIT: usize = 8 * 1024 * 1024;

/// Describes a program that will be executed by a [`CommandExecutor`].
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub touched_paths: Vec<PathBuf>,
    pub timeout: Option<Duration>,
    pub capture_limit: usize,
}

impl CommandInvocation {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            touched_paths: Vec::new(),
            timeout: None,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.touched_paths = paths;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Program and arguments rendered for log lines.
    pub fn display(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

/// Describes the exit status of a command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    success: bool,
    code: Option<i32>,
}

impl CommandStatus {
    pub fn new(success: bool, code: Option<i32>) -> Self {
        Self { success, code }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// Exit code, or `None` when the process was terminated by a signal.
    pub fn code(&self) -> Option<i32> {
        self.code
    }
}

impl From<std::process::ExitStatus> for CommandStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            success: status.success(),
            code: status.code(),
        }
    }
}

/// Output produced by the executor for a command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub truncated: bool,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self::with_code(0, stdout)
    }

    pub fn with_code(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::new(code == 0, Some(code)),
            stdout: stdout.into(),
            stderr: String::new(),
            timed_out: false,
            truncated: false,
            duration: Duration::ZERO,
        }
    }

    pub fn timed_out(duration: Duration) -> Self {
        Self {
            status: CommandStatus::new(false, None),
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
            truncated: false,
            duration,
        }
    }
}

/// Trait implemented by concrete command execution strategies.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, invocation: &CommandInvocation) -> Result<CommandOutput>;
}

/// Runs programs directly (no shell) through [`tokio::process`].
///
/// The timeout covers both the child's exit and the draining of its output
/// pipes. When it elapses the child is killed and output collected up to that
/// point is discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl ProcessCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ProcessCommandExecutor {
    async fn execute(&self, invocation: &CommandInvocation) -> Result<CommandOutput> {
        if invocation.program.as_os_str().is_empty() {
            bail!("program cannot be empty");
        }

        let start = Instant::now();
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            target: "sentinel.scan",
            command = %invocation.display(),
            cwd = %invocation.working_dir.display(),
            "spawning process"
        );

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", invocation.display()))?;

        let limit = invocation.capture_limit;
        let stdout_reader = child.stdout.take();
        let stderr_reader = child.stderr.take();
        // The deadline covers draining both pipes: a background grandchild can
        // keep them open after the direct child has exited.
        let collect = async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                read_bounded(stdout_reader, limit),
                read_bounded(stderr_reader, limit),
            );
            let status = status
                .with_context(|| format!("failed to wait for '{}'", invocation.display()))?;
            Ok::<_, anyhow::Error>((status, stdout?, stderr?))
        };

        let collected = match invocation.timeout {
            Some(timeout) => tokio::time::timeout(timeout, collect).await.ok(),
            None => Some(collect.await),
        };

        let Some(collected) = collected else {
            warn!(
                target: "sentinel.scan",
                command = %invocation.display(),
                timeout_ms = invocation.timeout.map(|t| t.as_millis() as u64),
                "process exceeded its timeout; killing"
            );
            if let Err(error) = child.kill().await {
                debug!(target: "sentinel.scan", %error, "kill after timeout failed");
            }
            return Ok(CommandOutput::timed_out(start.elapsed()));
        };
        let (status, (stdout, stdout_truncated), (stderr, stderr_truncated)) = collected?;

        Ok(CommandOutput {
            status: CommandStatus::from(status),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            timed_out: false,
            truncated: stdout_truncated || stderr_truncated,
            duration: start.elapsed(),
        })
    }
}

/// Drain `reader` to EOF, keeping at most `limit` bytes so the child never
/// blocks on a full pipe.
async fn read_bounded<R>(reader: Option<R>, limit: usize) -> Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };

    let mut output = Vec::new();
    let mut truncated = false;
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader
            .read(&mut buffer)
            .await
            .context("failed to read process output")?;
        if read == 0 {
            break;
        }
        let remaining = limit.saturating_sub(output.len());
        if remaining < read {
            truncated = true;
        }
        output.extend_from_slice(&buffer[..read.min(remaining)]);
    }
    Ok((output, truncated))
}
