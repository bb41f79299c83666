use thiserror::Error;

use crate::types::TimeMs;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Clip not found: {0}")]
    ClipNotFound(String),

    #[error("Transition not found: {0}")]
    TransitionNotFound(String),

    #[error("Audio track not found: {0}")]
    AudioTrackNotFound(String),

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Transition too short: {duration} is below the minimum of {minimum}")]
    TransitionTooShort { duration: TimeMs, minimum: TimeMs },

    #[error("Sequence has no clips")]
    EmptySequence,

    #[error("Invalid clip {clip_id}: {reason}")]
    InvalidClip { clip_id: String, reason: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Sequence invariant violated: {0}")]
    InvariantViolated(String),
}

impl CoreError {
    /// True for errors caused by an id that does not exist in the project.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::ClipNotFound(_)
                | CoreError::TransitionNotFound(_)
                | CoreError::AudioTrackNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
