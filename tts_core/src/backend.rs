//! Synthesis backend capability.
//!
//! The backend is opaque: given text and the enabled voice profiles it
//! eventually hands back compressed audio bytes through a one-shot callback.
//! One instance is shared by every request and is not safe for concurrent
//! synthesis; the coordinator serializes access.

use std::sync::Arc;

use crate::error::TtsResult;

/// Receives the compressed audio (or `None` on failure). Called at most once.
pub type SynthesisCallback = Box<dyn FnOnce(Option<Vec<u8>>) + Send + 'static>;

pub trait SynthesisBackend: Send + Sync {
    /// Push the enabled voice profiles (JSON array) to the backend.
    fn configure(&self, profiles_json: &str) -> TtsResult<()>;

    /// Start synthesizing `text`, reporting through `on_result`.
    ///
    /// Must not block: long-running work belongs on a spawned task or thread.
    /// Returning `Err` means the call failed synchronously and `on_result`
    /// will never fire.
    fn synthesize(&self, text: &str, on_result: SynthesisCallback) -> TtsResult<()>;

    /// Abandon an in-flight synthesis, if the backend supports it.
    fn cancel(&self) {}

    /// Free native resources. Called once when the coordinator shuts down.
    fn release(&self) {}
}

/// Creates the backend handle on first use.
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> TtsResult<Arc<dyn SynthesisBackend>>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> TtsResult<Arc<dyn SynthesisBackend>> + Send + Sync,
{
    fn create(&self) -> TtsResult<Arc<dyn SynthesisBackend>> {
        self()
    }
}
