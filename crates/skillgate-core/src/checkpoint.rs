//! Checkpoint storage for suspended assessments.
//!
//! The engine writes the full `AssessmentState` whenever it changes and
//! reads it back on resume. A resume lease serializes resumes of the same
//! assessment; resumes of different assessments never contend.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::CheckpointError;
use crate::model::AssessmentState;

/// Durable map from assessment id to its latest state.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store `state` as the latest checkpoint for `id`.
    async fn save(&self, id: Uuid, state: &AssessmentState) -> Result<(), CheckpointError>;

    /// Latest checkpoint for `id`, or `None` if there is none.
    async fn load(&self, id: Uuid) -> Result<Option<AssessmentState>, CheckpointError>;

    /// Take the exclusive resume lease for `id`.
    ///
    /// Fails with `CheckpointError::Conflict` while another lease for the same
    /// id is alive. The lease is released when dropped.
    async fn acquire(&self, id: Uuid) -> Result<ResumeLease, CheckpointError>;
}

/// Exclusive right to resume one assessment. Released on drop.
pub struct ResumeLease {
    id: Uuid,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ResumeLease {
    pub fn new(id: Uuid, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for ResumeLease {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            tracing::trace!(id = %self.id, "resume lease released");
        }
    }
}

impl fmt::Debug for ResumeLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeLease").field("id", &self.id).finish()
    }
}

/// In-process checkpoint store. State is lost when the process exits.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    states: RwLock<HashMap<Uuid, AssessmentState>>,
    leases: Arc<Mutex<HashSet<Uuid>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored assessments.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, id: Uuid, state: &AssessmentState) -> Result<(), CheckpointError> {
        let mut states = self.states.write().await;
        states.insert(id, state.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<AssessmentState>, CheckpointError> {
        let states = self.states.read().await;
        Ok(states.get(&id).cloned())
    }

    async fn acquire(&self, id: Uuid) -> Result<ResumeLease, CheckpointError> {
        let inserted = self
            .leases
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id);
        if !inserted {
            return Err(CheckpointError::Conflict(id));
        }

        let leases = Arc::clone(&self.leases);
        Ok(ResumeLease::new(id, move || {
            leases
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&id);
        }))
    }
}
