//! Per-session sandbox directories.

mod manager;
mod seed;
mod session;

pub use manager::SandboxManager;
pub use session::{SandboxRoot, Session, SessionHandle, is_valid_session_id};
