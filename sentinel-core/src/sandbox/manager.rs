use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use hashbrown::HashMap;
use parking_lot::RwLock;
use sentinel_config::SandboxConfig;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::seed::copy_tree;
use super::session::{SandboxRoot, Session, SessionHandle, SessionMetadata, is_valid_session_id};
use crate::error::{Result, SentinelError};
use crate::utils::write_atomic;

const METADATA_SUFFIX: &str = ".session.json";

/// Owns the mapping from session id to sandbox directory.
///
/// Each sandbox is `<base_dir>/<id>`; its metadata sidecar is
/// `<base_dir>/<id>.session.json`, outside the sandbox itself.
#[derive(Debug)]
pub struct SandboxManager {
    base_dir: PathBuf,
    retention: Duration,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SandboxManager {
    pub fn new(base_dir: impl AsRef<Path>, retention: Duration) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        fs::create_dir_all(base_dir)
            .map_err(|source| SentinelError::io("create sandbox base", base_dir, source))?;
        let base_dir = dunce::canonicalize(base_dir)
            .map_err(|source| SentinelError::io("canonicalize sandbox base", base_dir, source))?;

        debug!(target: "sentinel.sandbox", base_dir = %base_dir.display(), "sandbox manager ready");
        Ok(Self {
            base_dir,
            retention,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn from_config(config: &SandboxConfig) -> Result<Self> {
        Self::new(&config.base_dir, config.retention())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Allocate a fresh, empty sandbox for a new session.
    pub fn create(&self) -> Result<Session> {
        let id = Uuid::new_v4().simple().to_string();
        let dir = self.base_dir.join(&id);
        fs::create_dir(&dir).map_err(|source| SentinelError::io("create sandbox", &dir, source))?;
        let root = dunce::canonicalize(&dir)
            .map_err(|source| SentinelError::io("canonicalize sandbox", &dir, source))?;

        let session = Session {
            id: id.clone(),
            created_at: Utc::now(),
            root: SandboxRoot::new(root),
        };
        self.write_metadata(&session)?;
        self.sessions
            .write()
            .insert(id.clone(), Arc::new(SessionHandle::new(session.clone())));

        info!(target: "sentinel.sandbox", session = %id, root = %session.root.path().display(), "session created");
        Ok(session)
    }

    pub fn root_for(&self, id: &str) -> Result<SandboxRoot> {
        Ok(self.session(id)?.root().clone())
    }

    pub fn session(&self, id: &str) -> Result<Arc<SessionHandle>> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SentinelError::UnknownSession(id.to_string()))
    }

    /// Ids of live sessions, sorted.
    pub fn sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Remove a session's sandbox and metadata. Already-removed sandboxes and
    /// unregistered ids are not errors.
    pub fn destroy(&self, id: &str) -> Result<()> {
        if !is_valid_session_id(id) {
            return Err(SentinelError::UnknownSession(id.to_string()));
        }

        if self.sessions.write().remove(id).is_none() {
            debug!(target: "sentinel.sandbox", session = %id, "destroy for unregistered session");
        }
        self.remove_from_disk(id)?;
        info!(target: "sentinel.sandbox", session = %id, "session destroyed");
        Ok(())
    }

    /// Remove every sandbox older than the retention window, including ones
    /// left on disk by earlier processes. Live sessions with an operation in
    /// flight are left for a later sweep. Returns the removed ids, sorted.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let retention = TimeDelta::from_std(self.retention).unwrap_or(TimeDelta::MAX);
        let is_expired = |created_at: DateTime<Utc>| now.signed_duration_since(created_at) > retention;

        let live: Vec<Arc<SessionHandle>> = self
            .sessions
            .read()
            .values()
            .filter(|handle| is_expired(handle.created_at()))
            .cloned()
            .collect();

        let mut removed = Vec::new();
        for handle in live {
            let Some(_guard) = handle.try_lock() else {
                debug!(target: "sentinel.sandbox", session = %handle.id(), "expired session busy; sweep skipped it");
                continue;
            };
            self.destroy(handle.id())?;
            removed.push(handle.id().to_string());
        }

        for id in self.orphaned_ids()? {
            if let Some(created_at) = self.disk_created_at(&id)
                && is_expired(created_at)
            {
                self.destroy(&id)?;
                removed.push(id);
            }
        }

        removed.sort_unstable();
        if !removed.is_empty() {
            info!(target: "sentinel.sandbox", removed = removed.len(), "swept expired sandboxes");
        }
        Ok(removed)
    }

    /// Copy a directory tree into a session's sandbox, waiting for any
    /// in-flight operation on that session. Returns the number of files
    /// copied.
    pub async fn seed_from(&self, id: &str, source: &Path) -> Result<usize> {
        let handle = self.session(id)?;
        if !source.is_dir() {
            return Err(SentinelError::InvalidArguments(format!(
                "seed source '{}' is not a directory",
                source.display()
            )));
        }
        let _guard = handle.lock().await;
        let copied = copy_tree(source, handle.root().path())?;
        info!(target: "sentinel.sandbox", session = %id, files = copied, "seeded sandbox");
        Ok(copied)
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.base_dir.join(format!("{id}{METADATA_SUFFIX}"))
    }

    fn write_metadata(&self, session: &Session) -> Result<()> {
        let metadata = SessionMetadata {
            id: session.id.clone(),
            created_at: session.created_at,
        };
        let path = self.metadata_path(&session.id);
        let bytes = serde_json::to_vec_pretty(&metadata)
            .map_err(|error| SentinelError::io("encode session metadata", &path, error.into()))?;
        write_atomic(&path, &bytes)
            .map_err(|source| SentinelError::io("write session metadata", &path, source))
    }

    fn remove_from_disk(&self, id: &str) -> Result<()> {
        let dir = self.base_dir.join(id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                warn!(target: "sentinel.sandbox", session = %id, "sandbox directory already absent");
            }
            Err(source) => return Err(SentinelError::io("remove sandbox", dir, source)),
        }

        let metadata = self.metadata_path(id);
        match fs::remove_file(&metadata) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SentinelError::io("remove session metadata", metadata, source)),
        }
    }

    /// Session-shaped entries under the base directory that no live session
    /// owns.
    fn orphaned_ids(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.base_dir)
            .map_err(|source| SentinelError::io("read sandbox base", &self.base_dir, source))?;
        let live = self.sessions.read();

        let mut ids = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let id = name.strip_suffix(METADATA_SUFFIX).unwrap_or(&name);
            if is_valid_session_id(id) && !live.contains_key(id) {
                ids.push(id.to_string());
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn disk_created_at(&self, id: &str) -> Option<DateTime<Utc>> {
        let from_metadata = fs::read(self.metadata_path(id))
            .ok()
            .and_then(|bytes| serde_json::from_slice::<SessionMetadata>(&bytes).ok())
            .map(|metadata| metadata.created_at);

        from_metadata.or_else(|| {
            let modified = fs::metadata(self.base_dir.join(id)).ok()?.modified().ok()?;
            Some(DateTime::<Utc>::from(modified))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> SandboxManager {
        SandboxManager::new(dir.path().join("sandboxes"), Duration::from_secs(3600)).unwrap()
    }

    #[test]
    fn create_allocates_empty_sandbox_with_metadata() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        let session = manager.create().unwrap();

        assert!(is_valid_session_id(&session.id));
        assert!(session.root.path().is_dir());
        assert_eq!(fs::read_dir(session.root.path()).unwrap().count(), 0);
        assert!(manager.metadata_path(&session.id).is_file());
        assert_eq!(manager.root_for(&session.id).unwrap(), session.root);
        assert_eq!(manager.sessions(), vec![session.id.clone()]);
    }

    #[test]
    fn sessions_get_distinct_roots() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let first = manager.create().unwrap();
        let second = manager.create().unwrap();
        assert_ne!(first.id, second.id);
        assert_ne!(first.root, second.root);
    }

    #[test]
    fn unknown_session_is_reported() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let missing = Uuid::new_v4().simple().to_string();
        assert!(matches!(
            manager.root_for(&missing),
            Err(SentinelError::UnknownSession(_))
        ));
    }

    #[test]
    fn destroy_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let session = manager.create().unwrap();

        manager.destroy(&session.id).unwrap();
        assert!(!session.root.path().exists());
        assert!(!manager.metadata_path(&session.id).exists());
        assert!(manager.root_for(&session.id).is_err());

        manager.destroy(&session.id).unwrap();
    }

    #[test]
    fn destroy_rejects_malformed_ids() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        assert!(matches!(
            manager.destroy("../outside"),
            Err(SentinelError::UnknownSession(_))
        ));
    }

    #[test]
    fn sweep_removes_expired_and_orphaned_sandboxes() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let live = manager.create().unwrap();

        let orphan = Uuid::new_v4().simple().to_string();
        fs::create_dir(manager.base_dir().join(&orphan)).unwrap();
        let stale = SessionMetadata {
            id: orphan.clone(),
            created_at: Utc::now() - TimeDelta::hours(5),
        };
        fs::write(
            manager.metadata_path(&orphan),
            serde_json::to_vec(&stale).unwrap(),
        )
        .unwrap();

        let removed = manager.sweep_expired(Utc::now()).unwrap();
        assert_eq!(removed, vec![orphan.clone()]);
        assert!(!manager.base_dir().join(&orphan).exists());
        assert!(live.root.path().exists());

        let later = Utc::now() + TimeDelta::hours(2);
        let removed = manager.sweep_expired(later).unwrap();
        assert_eq!(removed, vec![live.id.clone()]);
        assert!(manager.sessions().is_empty());
    }

    #[tokio::test]
    async fn sweep_skips_sessions_with_an_operation_in_flight() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let busy = manager.create().unwrap();
        let idle = manager.create().unwrap();
        let later = Utc::now() + TimeDelta::hours(2);

        let handle = manager.session(&busy.id).unwrap();
        let guard = handle.lock().await;
        let removed = manager.sweep_expired(later).unwrap();
        assert_eq!(removed, vec![idle.id.clone()]);
        assert!(busy.root.path().is_dir());
        assert_eq!(manager.sessions(), vec![busy.id.clone()]);

        drop(guard);
        let removed = manager.sweep_expired(later).unwrap();
        assert_eq!(removed, vec![busy.id.clone()]);
        assert!(!busy.root.path().exists());
    }

    #[tokio::test]
    async fn seeding_waits_for_the_session_lock() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(manager(&dir));
        let session = manager.create().unwrap();
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("main.tf"), "terraform {}\n").unwrap();

        let handle = manager.session(&session.id).unwrap();
        let guard = handle.lock().await;
        let seeding = tokio::spawn({
            let manager = Arc::clone(&manager);
            let id = session.id.clone();
            let source = source.path().to_path_buf();
            async move { manager.seed_from(&id, &source).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!seeding.is_finished());
        assert!(!session.root.path().join("main.tf").exists());

        drop(guard);
        assert_eq!(seeding.await.unwrap().unwrap(), 1);
        assert!(session.root.path().join("main.tf").is_file());
    }
}
