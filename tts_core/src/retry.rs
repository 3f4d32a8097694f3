//! Timeout and bounded retry around the opaque backend call.
//!
//! Each attempt bridges the backend's result callback into a one-shot
//! channel and races it against the per-attempt timeout. A backend that
//! fails synchronously, or drops the callback without answering, resolves
//! the attempt immediately instead of waiting out the timeout.

use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::backend::SynthesisBackend;
use crate::error::{TtsError, TtsResult};
use crate::settings::AppSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Wait `backoff_step * attempt` between attempts.
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_step: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            timeout: settings.request_timeout(),
            max_attempts: settings.max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoundedRetryClient {
    policy: RetryPolicy,
}

impl BoundedRetryClient {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Fetch compressed audio for `text`, retrying backend failures.
    /// `label` is the shortened text used in log lines.
    ///
    /// Fails with [`TtsError::Exhausted`] once every attempt has failed.
    /// Errors that are not backend failures are returned at once.
    pub async fn fetch(
        &self,
        backend: &dyn SynthesisBackend,
        text: &str,
        label: &str,
    ) -> TtsResult<Vec<u8>> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.attempt(backend, text).await {
                Ok(audio) => {
                    if attempt > 1 {
                        info!(attempt, text = %label, "Synthesis succeeded after retry");
                    }
                    return Ok(audio);
                }
                Err(e) if !e.is_backend_failure() => return Err(e),
                Err(e) => {
                    if let TtsError::Timeout { timeout_ms } = &e {
                        backend.cancel();
                        warn!(attempt, timeout_ms = *timeout_ms, text = %label, "Synthesis attempt timed out");
                    } else {
                        warn!(attempt, error = %e, text = %label, "Synthesis attempt failed");
                    }
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.backoff(attempt)).await;
                    }
                }
            }
        }

        let last = last_error.unwrap_or_else(|| TtsError::Backend("no attempt was made".into()));
        error!(attempts, error = %last, text = %label, "Synthesis failed after all attempts");
        Err(TtsError::Exhausted {
            attempts,
            last: Box::new(last),
        })
    }

    async fn attempt(&self, backend: &dyn SynthesisBackend, text: &str) -> TtsResult<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        backend.synthesize(
            text,
            Box::new(move |audio| {
                // The receiver is gone once the attempt timed out.
                let _ = tx.send(audio);
            }),
        )?;

        match tokio::time::timeout(self.policy.timeout, rx).await {
            Err(_) => Err(TtsError::Timeout {
                timeout_ms: u64::try_from(self.policy.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Err(_)) => Err(TtsError::Backend(
                "backend dropped the result callback without answering".into(),
            )),
            Ok(Ok(None)) => Err(TtsError::Backend("backend returned no audio".into())),
            Ok(Ok(Some(audio))) if audio.is_empty() => {
                Err(TtsError::Backend("backend returned empty audio".into()))
            }
            Ok(Ok(Some(audio))) => Ok(audio),
        }
    }
}
