//! # Sentinel
//!
//! Sentinel gives a security-fixing agent a disposable place to work. Each
//! session owns a sandboxed directory; every path the agent names is checked
//! against that directory before it touches the filesystem, file rewrites go
//! through a patch engine that reports line-level diffs, and Checkov / TFLint
//! are run against the sandbox and their reports normalized into one finding
//! list.
//!
//! ## Crates
//!
//! - `sentinel-commons`: path containment and POSIX display helpers.
//! - `sentinel-exec`: subprocess execution with timeouts and a sandbox policy.
//! - `sentinel-config`: layered `sentinel.toml` + environment configuration.
//! - `sentinel-core`: sandbox manager, file store, patch engine, scanner
//!   orchestration and the JSON tool surface.
//!
//! ## Quickstart
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! let (config, registry) = sentinel::bootstrap(std::path::Path::new("."))?;
//! sentinel::initialize_tracing(&config.logging)?;
//!
//! let session = registry.start_session()?;
//! let result = registry
//!     .execute_tool(
//!         &session.id,
//!         "write_file",
//!         serde_json::json!({"path": "main.tf", "content": "terraform {}\n"}),
//!     )
//!     .await;
//! assert_eq!(result["success"], true);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

pub use sentinel_commons;
pub use sentinel_config;
pub use sentinel_core;

pub use sentinel_config::{ConfigManager, LoggingConfig, SentinelConfig};
pub use sentinel_core::{
    Finding, PatchKind, PatchOperation, PatchResult, ScanReport, SentinelError, Session,
    Severity, ToolExecutionError, ToolRegistry,
};

/// Install a `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `config.level` is used. Calling this
/// more than once leaves the first subscriber in place.
pub fn initialize_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.level.trim())
            .with_context(|| format!("Invalid logging level '{}'", config.level))?,
    };

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(err) = init_result {
        tracing::warn!(error = %err, "tracing already initialized; skipping setup");
    }

    Ok(())
}

/// Load configuration for `workspace` and build a tool registry from it.
pub fn bootstrap(workspace: &Path) -> Result<(SentinelConfig, ToolRegistry)> {
    let config = ConfigManager::load_with(workspace, &|key| std::env::var(key).ok())
        .with_context(|| format!("Failed to load configuration for {}", workspace.display()))?
        .into_config();
    let registry = ToolRegistry::from_config(&config)
        .context("Failed to initialize the sandbox manager")?;
    Ok((config, registry))
}
