//! Subprocess execution used by the scanner orchestrator. The crate exposes a
//! trait-based executor so hosts and tests can swap the process strategy
//! while the orchestrator keeps a single code path for timeouts, exit codes,
//! and output capture.

pub mod executor;
pub mod policy;

pub use executor::{
    CommandExecutor, CommandInvocation, CommandOutput, CommandStatus, DEFAULT_CAPTURE_LIMIT,
    ProcessCommandExecutor,
};
pub use policy::{CommandPolicy, SandboxGuardPolicy};
