//! # sentinel-core
//!
//! Per-session sandboxed workspaces for infrastructure-as-code remediation.
//!
//! A host starts a session, seeds or writes files into its sandbox, applies
//! structured patches (receiving a line diff for each), and runs external
//! IaC scanners whose findings come back normalized and ordered by severity.
//! All of it is reachable as JSON tools through [`ToolRegistry`].
//!
//! ## Modules
//!
//! - [`sandbox`]: session lifecycle and sandbox directories.
//! - [`workspace`]: file operations confined to one sandbox.
//! - [`patch`]: create/update/delete operations with derived diffs.
//! - [`scanners`]: scanner discovery, execution, and normalization.
//! - [`tools`]: the JSON tool surface.
//!
//! ```rust,ignore
//! use sentinel_config::ConfigManager;
//! use sentinel_core::ToolRegistry;
//! use serde_json::json;
//!
//! let config = ConfigManager::load()?.into_config();
//! let registry = ToolRegistry::from_config(&config)?;
//! let session = registry.start_session()?;
//! let result = registry
//!     .execute_tool(&session.id, "scan_iac", json!({ "path": "main.tf" }))
//!     .await;
//! ```

pub mod error;
pub mod patch;
pub mod sandbox;
pub mod scanners;
pub mod tools;
pub mod utils;
pub mod workspace;

pub use error::{Result, SentinelError};
pub use patch::{PatchEngine, PatchKind, PatchOperation, PatchResult};
pub use sandbox::{SandboxManager, SandboxRoot, Session, SessionHandle};
pub use scanners::{Finding, ScanReport, Scanner, ScannerIssue, ScannerOrchestrator, Severity};
pub use tools::{ToolExecutionError, ToolRegistry};
pub use utils::{DiffLine, DiffLineKind};
pub use workspace::{FileNode, FileStore};
