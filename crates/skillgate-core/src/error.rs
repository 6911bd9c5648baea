//! Error types for the assessment engine and its collaborators.
//!
//! `ProviderError` lives here (rather than in `skillgate-providers`) so the
//! generation unit can downcast provider failures and classify them for retry
//! decisions without string matching.

use thiserror::Error;
use uuid::Uuid;

use crate::model::{Level, LevelStatus};

/// Errors that can occur when interacting with a text-generation provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Failures of the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Another resume of the same assessment currently holds the lease.
    #[error("assessment {0} is locked by another resume")]
    Conflict(Uuid),

    /// A stored checkpoint could not be interpreted.
    #[error("checkpoint for {id} is corrupt: {reason}")]
    Corrupt { id: Uuid, reason: String },

    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by the assessment engine.
///
/// Generation and validation failures are only raised after the local retry
/// budget is spent. State-consistency errors (`StateNotFound`,
/// `LevelMismatch`, `AlreadyCompleted`, `ConcurrentResumeConflict`) are never
/// retried by the engine.
#[derive(Debug, Error)]
pub enum AssessmentError {
    /// Generation returned unparsable output (or the provider kept failing)
    /// until the retry budget ran out.
    #[error("assessment could not be generated for skill {skill} at {level} after {attempts} attempt(s): {reason}")]
    GenerationFailure {
        skill: String,
        level: Level,
        attempts: u32,
        reason: String,
    },

    /// Generation returned parsable but schema-invalid output until the retry
    /// budget ran out.
    #[error("generated questions for skill {skill} at {level} failed validation after {attempts} attempt(s): {reason}")]
    ValidationFailure {
        skill: String,
        level: Level,
        attempts: u32,
        reason: String,
    },

    #[error("assessment {0} not found")]
    StateNotFound(Uuid),

    /// Answers were submitted for a level other than the one awaiting them.
    #[error("answers submitted for {submitted} but the assessment is at {current}")]
    LevelMismatch { current: Level, submitted: Level },

    #[error("assessment {0} is already completed")]
    AlreadyCompleted(Uuid),

    /// A second resume overlapped one already in progress.
    #[error("assessment {0} is already being resumed")]
    ConcurrentResumeConflict(Uuid),

    /// The current level is not in a state that accepts answers.
    #[error("{level} is not awaiting answers (status: {status})")]
    LevelNotReady { level: Level, status: LevelStatus },

    #[error("answer references unknown question id {0}")]
    UnknownQuestion(String),

    #[error("invalid level transition for {level}: {from} -> {to}")]
    InvalidTransition {
        level: Level,
        from: LevelStatus,
        to: LevelStatus,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Checkpoint(CheckpointError),
}

impl AssessmentError {
    /// The skill a generation or validation failure refers to.
    pub fn skill(&self) -> Option<&str> {
        match self {
            AssessmentError::GenerationFailure { skill, .. }
            | AssessmentError::ValidationFailure { skill, .. } => Some(skill),
            _ => None,
        }
    }

    /// Returns `true` if the caller can recover by re-fetching state and
    /// resubmitting.
    pub fn is_recoverable_by_caller(&self) -> bool {
        matches!(
            self,
            AssessmentError::LevelMismatch { .. } | AssessmentError::ConcurrentResumeConflict(_)
        )
    }
}

impl From<CheckpointError> for AssessmentError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::Conflict(id) => AssessmentError::ConcurrentResumeConflict(id),
            other => AssessmentError::Checkpoint(other),
        }
    }
}
