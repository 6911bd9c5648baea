//! skillgate-store — durable checkpoint storage.
//!
//! `FileCheckpointStore` keeps one JSON document per assessment under a root
//! directory, so a suspended assessment survives process restarts. Resume
//! leases are lock files, which makes them visible across processes sharing
//! the directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use skillgate_core::checkpoint::{CheckpointStore, ResumeLease};
use skillgate_core::error::CheckpointError;
use skillgate_core::model::AssessmentState;

/// Lock files older than this are assumed to belong to a crashed process.
pub const DEFAULT_STALE_LEASE_AFTER: Duration = Duration::from_secs(30 * 60);

const STATE_EXTENSION: &str = "json";
const LOCK_EXTENSION: &str = "lock";

/// File-backed checkpoint store.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
    stale_after: Duration,
}

impl FileCheckpointStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            stale_after: DEFAULT_STALE_LEASE_AFTER,
        })
    }

    /// Age after which an abandoned lease may be taken over.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ids of all stored assessments.
    pub async fn list(&self) -> Result<Vec<Uuid>, CheckpointError> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STATE_EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn state_path(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{id}.{STATE_EXTENSION}"))
    }

    fn lock_path(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{id}.{LOCK_EXTENSION}"))
    }

    /// Unique sibling a lock is moved to before it is inspected or removed.
    fn aside_path(&self, id: Uuid) -> PathBuf {
        self.root
            .join(format!(".{id}.{}.{LOCK_EXTENSION}", Uuid::new_v4().simple()))
    }

    async fn create_lock(&self, path: &Path, owner: Uuid) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        let content = serde_json::json!({
            "owner": owner,
            "pid": std::process::id(),
            "acquired_at": chrono::Utc::now(),
        });
        file.write_all(content.to_string().as_bytes()).await?;
        file.flush().await
    }

    async fn is_stale(&self, path: &Path) -> bool {
        let Ok(metadata) = fs::metadata(path).await else {
            return false;
        };
        metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age >= self.stale_after)
    }

    /// Replace a stale lock with one held by `owner`.
    ///
    /// The stale lock is renamed aside rather than deleted in place, so of
    /// several callers racing for the same stale lock at most one wins, and a
    /// fresh lock written by the winner is never removed by the others.
    async fn take_over(&self, id: Uuid, path: &Path, owner: Uuid) -> Result<(), CheckpointError> {
        let observed = read_owner(path).await;
        if !self.is_stale(path).await {
            return Err(CheckpointError::Conflict(id));
        }

        let aside = self.aside_path(id);
        match fs::rename(path, &aside).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(CheckpointError::Conflict(id)),
            Err(e) => return Err(e.into()),
        }
        if read_owner(&aside).await != observed {
            // Someone else replaced the stale lock first; hand theirs back
            restore_lock(&aside, path);
            return Err(CheckpointError::Conflict(id));
        }
        if let Err(e) = fs::remove_file(&aside).await {
            tracing::warn!(path = %aside.display(), "failed to remove stale resume lease: {e}");
        }

        tracing::warn!(assessment = %id, "took over stale resume lease");
        self.create_lock(path, owner).await.map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                CheckpointError::Conflict(id)
            } else {
                e.into()
            }
        })
    }
}

fn lock_owner(content: &[u8]) -> Option<Uuid> {
    serde_json::from_slice::<serde_json::Value>(content)
        .ok()?
        .get("owner")?
        .as_str()
        .and_then(|owner| Uuid::parse_str(owner).ok())
}

async fn read_owner(path: &Path) -> Option<Uuid> {
    fs::read(path).await.ok().and_then(|content| lock_owner(&content))
}

/// Put a lock moved aside back in place, unless a new one already exists.
fn restore_lock(aside: &Path, path: &Path) {
    if let Err(e) = std::fs::hard_link(aside, path) {
        tracing::warn!(path = %path.display(), "failed to restore resume lease: {e}");
    }
    let _ = std::fs::remove_file(aside);
}

/// Remove the lock at `path` only while it still names `owner`.
///
/// Runs synchronously from `Drop`: the lock is a single small file and the
/// next `acquire` must observe the release.
fn release_lock(path: &Path, aside: &Path, owner: Uuid) {
    match std::fs::read(path) {
        Ok(content) if lock_owner(&content) == Some(owner) => {}
        Ok(_) => {
            tracing::warn!(path = %path.display(), "resume lease was taken over, leaving it to the new owner");
            return;
        }
        Err(e) if e.kind() == ErrorKind::NotFound => return,
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to release resume lease: {e}");
            return;
        }
    }

    if let Err(e) = std::fs::rename(path, aside) {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), "failed to release resume lease: {e}");
        }
        return;
    }
    let moved = std::fs::read(aside).ok().and_then(|content| lock_owner(&content));
    if moved == Some(owner) {
        if let Err(e) = std::fs::remove_file(aside) {
            tracing::warn!(path = %aside.display(), "failed to release resume lease: {e}");
        }
    } else {
        restore_lock(aside, path);
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, id: Uuid, state: &AssessmentState) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(state)?;
        let path = self.state_path(id);
        let tmp = self
            .root
            .join(format!(".{id}.{}.tmp", Uuid::new_v4().simple()));

        fs::write(&tmp, json).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tracing::debug!(assessment = %id, revision = state.revision, "checkpoint saved");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<AssessmentState>, CheckpointError> {
        let content = match fs::read(self.state_path(id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state = serde_json::from_slice(&content).map_err(|e| CheckpointError::Corrupt {
            id,
            reason: e.to_string(),
        })?;
        Ok(Some(state))
    }

    async fn acquire(&self, id: Uuid) -> Result<ResumeLease, CheckpointError> {
        let path = self.lock_path(id);
        let owner = Uuid::new_v4();

        if let Err(e) = self.create_lock(&path, owner).await {
            if e.kind() != ErrorKind::AlreadyExists {
                return Err(e.into());
            }
            self.take_over(id, &path, owner).await?;
        }

        let aside = self.aside_path(id);
        Ok(ResumeLease::new(id, move || release_lock(&path, &aside, owner)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillgate_core::model::{CandidateContext, JobDescription, Level, ResumeProfile};
    use tempfile::tempdir;

    fn state() -> AssessmentState {
        AssessmentState::new(
            CandidateContext {
                candidate_id: "cand-1".into(),
                resume: ResumeProfile::default(),
            },
            JobDescription {
                required_skills: vec!["Python".into(), "SQL".into()],
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).await.unwrap();
        let mut state = state();
        state.unlock(Level::Intermediate).unwrap();

        store.save(state.id, &state).await.unwrap();
        let loaded = store.load(state.id).await.unwrap();
        assert_eq!(loaded, Some(state));
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let state = state();
        {
            let store = FileCheckpointStore::open(dir.path()).await.unwrap();
            store.save(state.id, &state).await.unwrap();
        }

        let reopened = FileCheckpointStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.load(state.id).await.unwrap(), Some(state.clone()));
        assert_eq!(reopened.list().await.unwrap(), vec![state.id]);
    }

    #[tokio::test]
    async fn missing_state_is_none() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path().join("nested")).await.unwrap();
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overwrite_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).await.unwrap();
        let mut state = state();
        for revision in 1..=3 {
            state.revision = revision;
            store.save(state.id, &state).await.unwrap();
        }

        assert_eq!(store.load(state.id).await.unwrap().unwrap().revision, 3);
        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files, vec![format!("{}.json", state.id)]);
    }

    #[tokio::test]
    async fn corrupt_checkpoint_is_reported() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).await.unwrap();
        let id = Uuid::new_v4();
        std::fs::write(dir.path().join(format!("{id}.json")), "{ not json").unwrap();

        assert!(matches!(
            store.load(id).await,
            Err(CheckpointError::Corrupt { id: got, .. }) if got == id
        ));
    }

    #[tokio::test]
    async fn lease_is_exclusive_and_released_on_drop() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).await.unwrap();
        let id = Uuid::new_v4();

        let lease = store.acquire(id).await.unwrap();
        assert!(dir.path().join(format!("{id}.lock")).exists());

        // A second store on the same directory stands in for another process
        let other = FileCheckpointStore::open(dir.path()).await.unwrap();
        assert!(matches!(
            other.acquire(id).await,
            Err(CheckpointError::Conflict(got)) if got == id
        ));

        drop(lease);
        assert!(!dir.path().join(format!("{id}.lock")).exists());
        assert!(other.acquire(id).await.is_ok());
    }

    #[tokio::test]
    async fn stale_lease_is_taken_over() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path())
            .await
            .unwrap()
            .with_stale_after(Duration::ZERO);
        let id = Uuid::new_v4();

        let abandoned = store.acquire(id).await.unwrap();
        std::mem::forget(abandoned);

        let lease = store.acquire(id).await.unwrap();
        assert_eq!(lease.id(), id);
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        files.sort();
        files
    }

    #[tokio::test]
    async fn superseded_lease_leaves_the_new_owner_in_place() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path())
            .await
            .unwrap()
            .with_stale_after(Duration::from_millis(100));
        let id = Uuid::new_v4();

        let slow = store.acquire(id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        let taker = store.acquire(id).await.unwrap();

        // The slow holder finishing must not free the taker's lease
        drop(slow);
        assert_eq!(files_in(dir.path()), vec![format!("{id}.lock")]);
        assert!(matches!(
            store.acquire(id).await,
            Err(CheckpointError::Conflict(got)) if got == id
        ));

        drop(taker);
        assert!(files_in(dir.path()).is_empty());
        assert!(store.acquire(id).await.is_ok());
    }

    #[tokio::test]
    async fn racing_takeovers_of_a_stale_lease_have_one_winner() {
        let dir = tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path())
            .await
            .unwrap()
            .with_stale_after(Duration::from_millis(100));
        let other = store.clone();
        let id = Uuid::new_v4();

        std::mem::forget(store.acquire(id).await.unwrap());
        tokio::time::sleep(Duration::from_millis(250)).await;

        let (first, second) = tokio::join!(store.acquire(id), other.acquire(id));
        let winners = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert_eq!(files_in(dir.path()), vec![format!("{id}.lock")]);
    }
}
