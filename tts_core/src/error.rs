use thiserror::Error;

/// Errors raised inside the synthesis pipeline.
///
/// None of these cross the coordinator boundary: [`crate::RequestCoordinator`]
/// logs them and turns them into "no audio for this request".
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Synthesis timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Synthesis backend failed: {0}")]
    Backend(String),

    #[error("Synthesis failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<TtsError> },

    #[error("No audio track found in synthesized data")]
    NoAudioTrack,

    #[error("Audio decode failed: {0}")]
    Decode(String),

    #[error("Audio resampling failed: {0}")]
    Resample(String),

    #[error("Audio sink failed: {0}")]
    Sink(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl TtsError {
    /// True for failures of the backend call itself. Only these are retried.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, TtsError::Timeout { .. } | TtsError::Backend(_))
    }
}

impl From<symphonia::core::errors::Error> for TtsError {
    fn from(e: symphonia::core::errors::Error) -> Self {
        TtsError::Decode(e.to_string())
    }
}

pub type TtsResult<T> = Result<T, TtsError>;
