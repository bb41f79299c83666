use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("cannot render frame at {time_ms} ms: {reason}")]
    RenderFailed { time_ms: i64, reason: String },

    #[error("playback failed: {0}")]
    PlaybackFailed(String),

    #[error("clip not found: {0}")]
    ClipNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PreviewError>;
