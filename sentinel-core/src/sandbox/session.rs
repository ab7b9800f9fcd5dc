use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sentinel_commons::SandboxPaths;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

/// Canonical absolute directory owned by exactly one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxRoot {
    path: PathBuf,
}

impl SandboxRoot {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SandboxPaths for SandboxRoot {
    fn sandbox_root(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub root: SandboxRoot,
}

/// Bookkeeping written next to each sandbox directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SessionMetadata {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// A live session plus the lock that serializes its tool calls.
#[derive(Debug)]
pub struct SessionHandle {
    session: Session,
    operation_lock: Mutex<()>,
}

impl SessionHandle {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            session,
            operation_lock: Mutex::new(()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn id(&self) -> &str {
        &self.session.id
    }

    pub fn root(&self) -> &SandboxRoot {
        &self.session.root
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.session.created_at
    }

    /// Wait until no other operation runs against this session.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.operation_lock.lock().await
    }

    /// The operation lock, or `None` while another operation holds it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.operation_lock.try_lock().ok()
    }
}

/// Session ids are 32 lowercase hex characters (a simple-format UUID).
pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == 32 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_session_ids() {
        let id = uuid::Uuid::new_v4().simple().to_string();
        assert!(is_valid_session_id(&id));
        assert!(!is_valid_session_id("../../etc"));
        assert!(!is_valid_session_id(&id.to_uppercase()));
        assert!(!is_valid_session_id(""));
    }
}
