//! Look-ahead request coordinator.
//!
//! Every inbound call hands back the audio of the *previous* request while
//! the current one is synthesized in the background, so a caller reading a
//! document sequentially never waits on the backend. Privileged callers, and
//! deployments configured for fresh audio, instead wait for their own
//! synthesis and hear exactly what they asked for.
//!
//! Synthesis is single-flight: a semaphore with one permit stands in for the
//! "synthesizing" flag. The permit is acquired before a request is accepted
//! and moved into the background task, so it is released when the task
//! finishes, fails or is aborted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendFactory, SynthesisBackend};
use crate::caller::{classify, CallerClass, PackageResolver};
use crate::conform::conform;
use crate::error::{TtsError, TtsResult};
use crate::request::{SynthesisRequest, SynthesisResult};
use crate::retry::{BoundedRetryClient, RetryPolicy};
use crate::settings::{profiles_json, SettingsSource, VoiceProfile};
use crate::sink::{deliver, AudioSink, PcmFormat};
use crate::status::StatusNotifier;
use crate::text::{ellipsize_middle, DISPLAY_LEN};
use crate::transcoder::AudioTranscoder;

pub const NO_PROFILE_DETAIL: &str = "No enabled voice profile";

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Format announced to every sink; decoded audio is conformed to it.
    pub output_format: PcmFormat,
    pub display_len: usize,
    pub playing_title: String,
    pub backoff_step: Duration,
    /// Container hint for the transcoder, e.g. `"mp3"`.
    pub audio_extension: Option<String>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            output_format: PcmFormat::default(),
            display_len: DISPLAY_LEN,
            playing_title: "Playing".to_string(),
            backoff_step: RetryPolicy::default().backoff_step,
            audio_extension: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Blank text; the sink only saw `done`.
    Blank,
    /// No voice profile enabled; the sink saw `error`.
    NoProfiles,
    /// The sink saw `start`, any audio, then `done`.
    Completed,
    /// The coordinator shut down mid-call; the sink saw `error`.
    Cancelled,
}

/// What one `handle` call did, for the host's metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleReport {
    pub caller: CallerClass,
    pub cached_bytes: usize,
    pub fresh_bytes: usize,
    pub outcome: Outcome,
}

impl HandleReport {
    fn new(caller: CallerClass, outcome: Outcome) -> Self {
        Self {
            caller,
            cached_bytes: 0,
            fresh_bytes: 0,
            outcome,
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.cached_bytes + self.fresh_bytes
    }
}

#[derive(Default)]
struct Slots {
    current: Option<Arc<SynthesisRequest>>,
    last: Option<Arc<SynthesisRequest>>,
}

struct BackendSlot {
    backend: Arc<dyn SynthesisBackend>,
    /// Profiles JSON the backend was last configured with.
    configured: String,
}

struct Shared {
    settings: Arc<dyn SettingsSource>,
    factory: Arc<dyn BackendFactory>,
    resolver: Arc<dyn PackageResolver>,
    status: Arc<dyn StatusNotifier>,
    options: CoordinatorOptions,
    transcoder: AudioTranscoder,
    /// Serializes whole `handle` calls so deliveries never interleave.
    turn: tokio::sync::Mutex<()>,
    /// Single-flight gate; one permit.
    gate: Arc<Semaphore>,
    slots: Mutex<Slots>,
    backend: Mutex<Option<BackendSlot>>,
    task: Mutex<Option<AbortHandle>>,
    shutdown: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the synthesis backend and the current/last request slots.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RequestCoordinator {
    shared: Arc<Shared>,
}

impl RequestCoordinator {
    pub fn new(
        settings: Arc<dyn SettingsSource>,
        factory: Arc<dyn BackendFactory>,
        resolver: Arc<dyn PackageResolver>,
        status: Arc<dyn StatusNotifier>,
        options: CoordinatorOptions,
    ) -> Self {
        let transcoder = match &options.audio_extension {
            Some(ext) => AudioTranscoder::with_extension(ext.clone()),
            None => AudioTranscoder::new(),
        };
        Self {
            shared: Arc::new(Shared {
                settings,
                factory,
                resolver,
                status,
                options,
                transcoder,
                turn: tokio::sync::Mutex::new(()),
                gate: Arc::new(Semaphore::new(1)),
                slots: Mutex::new(Slots::default()),
                backend: Mutex::new(None),
                task: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn output_format(&self) -> PcmFormat {
        self.shared.options.output_format
    }

    /// Serve one inbound call.
    ///
    /// Never fails: every synthesis, decode or sink problem is logged and
    /// turned into "no audio". For non-blank text the sink receives exactly
    /// one of `done` or `error`.
    pub async fn handle(
        &self,
        text: &str,
        caller_uid: Option<u32>,
        sink: &mut dyn AudioSink,
    ) -> HandleReport {
        let shared = &self.shared;
        let caller = classify(caller_uid, shared.resolver.as_ref());
        let text = text.trim();

        if text.is_empty() {
            debug!(source = %caller, "Skipping blank text");
            signal_done(sink).await;
            return HandleReport::new(caller, Outcome::Blank);
        }

        let short = ellipsize_middle(text, shared.options.display_len);
        info!(source = %caller, text = %short, "Received synthesis request");

        let profiles = shared.settings.enabled_profiles();
        if profiles.is_empty() {
            warn!(source = %caller, text = %short, "No enabled voice profile");
            shared.status.update_status("", NO_PROFILE_DETAIL);
            signal_error(sink).await;
            return HandleReport::new(caller, Outcome::NoProfiles);
        }

        let mut report = HandleReport::new(caller.clone(), Outcome::Completed);
        match self.run(text, caller, profiles, sink, &mut report).await {
            Ok(()) => signal_done(sink).await,
            Err(e) => {
                debug!(error = %e, text = %short, "Request abandoned");
                report.outcome = Outcome::Cancelled;
                signal_error(sink).await;
            }
        }
        report
    }

    async fn run(
        &self,
        text: &str,
        caller: CallerClass,
        profiles: Vec<VoiceProfile>,
        sink: &mut dyn AudioSink,
        report: &mut HandleReport,
    ) -> TtsResult<()> {
        let shared = &self.shared;
        let cancel = &shared.shutdown;

        let _turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TtsError::Cancelled),
            turn = shared.turn.lock() => turn,
        };

        // Wait out any synthesis still in flight.
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TtsError::Cancelled),
            permit = shared.gate.clone().acquire_owned() => permit.map_err(|_| TtsError::Cancelled)?,
        };

        let settings = shared.settings.app_settings();
        let fresh_only = caller.is_privileged() || settings.always_fresh();

        let request = Arc::new(SynthesisRequest::new(caller, text, shared.options.display_len));
        let previous = {
            let mut slots = lock(&shared.slots);
            slots.last = slots.current.replace(Arc::clone(&request));
            slots.last.take()
        };

        if let Err(e) = sink.start(shared.options.output_format).await {
            error!(error = %e, text = %request.short_text, "Failed to start sink");
        }

        match previous {
            Some(previous) if fresh_only => {
                if previous.audio().is_some() {
                    debug!(source = %request.source, text = %previous.short_text, "Discarding look-ahead audio");
                }
            }
            Some(previous) => {
                if let Some(audio) = previous.audio() {
                    shared
                        .status
                        .update_status(&shared.options.playing_title, &previous.short_text);
                    report.cached_bytes = deliver(sink, audio).await;
                    debug!(
                        source = %request.source,
                        text = %previous.short_text,
                        bytes = report.cached_bytes,
                        "Delivered look-ahead audio"
                    );
                }
            }
            None => {}
        }

        let client = BoundedRetryClient::new(RetryPolicy {
            backoff_step: shared.options.backoff_step,
            ..RetryPolicy::from_settings(&settings)
        });
        // Spawn under the task lock so `shutdown` always sees the handle.
        let mut task = {
            let mut slot = lock(&shared.task);
            if cancel.is_cancelled() {
                return Err(TtsError::Cancelled);
            }
            let task = tokio::spawn(synthesize(
                Arc::clone(shared),
                Arc::clone(&request),
                profiles,
                client,
                permit,
            ));
            *slot = Some(task.abort_handle());
            task
        };

        if !fresh_only {
            return Ok(());
        }

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                task.abort();
                return Err(TtsError::Cancelled);
            }
            joined = &mut task => joined,
        };
        if let Err(e) = joined {
            if e.is_panic() {
                error!(text = %request.short_text, "Synthesis task panicked");
            }
        }

        if let Some(audio) = request.audio() {
            shared
                .status
                .update_status(&shared.options.playing_title, &request.short_text);
            report.fresh_bytes = deliver(sink, audio).await;
        }

        // Delivered already; must not come back as look-ahead audio.
        let mut slots = lock(&shared.slots);
        if slots
            .current
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &request))
        {
            slots.current = None;
        }
        Ok(())
    }

    /// Drop the current and cached requests.
    ///
    /// A synthesis still in flight finishes, but its audio is never delivered.
    pub fn stop(&self) {
        let mut slots = lock(&self.shared.slots);
        let dropped = usize::from(slots.current.take().is_some()) + usize::from(slots.last.take().is_some());
        info!(dropped, "Playback stopped");
    }

    /// Tear down: unblock waiting callers, abort the background task and
    /// release the backend. Later calls to `handle` end with `sink.error()`.
    pub fn shutdown(&self) {
        let shared = &self.shared;
        if shared.shutdown.is_cancelled() {
            return;
        }
        shared.shutdown.cancel();
        shared.gate.close();

        if let Some(task) = lock(&shared.task).take() {
            task.abort();
        }
        {
            let mut slots = lock(&shared.slots);
            slots.current = None;
            slots.last = None;
        }
        if let Some(slot) = lock(&shared.backend).take() {
            slot.backend.cancel();
            slot.backend.release();
        }
        info!("Request coordinator shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// True while a synthesis holds the single-flight gate.
    pub fn is_synthesizing(&self) -> bool {
        !self.shared.gate.is_closed() && self.shared.gate.available_permits() == 0
    }

    /// Wait until no synthesis is in flight.
    pub async fn wait_until_idle(&self) -> TtsResult<()> {
        let shared = &self.shared;
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => Err(TtsError::Cancelled),
            permit = shared.gate.acquire() => permit.map(drop).map_err(|_| TtsError::Cancelled),
        }
    }
}

impl Shared {
    /// Lazily create the backend, reconfiguring it when the enabled
    /// profile set changed since the last request.
    fn backend(&self, profiles: &[VoiceProfile]) -> TtsResult<Arc<dyn SynthesisBackend>> {
        if self.shutdown.is_cancelled() {
            return Err(TtsError::Cancelled);
        }
        let json = profiles_json(profiles)?;
        let mut slot = lock(&self.backend);

        if let Some(existing) = slot.as_mut() {
            if existing.configured != json {
                existing.backend.configure(&json)?;
                existing.configured = json;
                info!(profiles = profiles.len(), "Reconfigured synthesis backend");
            }
            return Ok(Arc::clone(&existing.backend));
        }

        let backend = self.factory.create()?;
        backend.configure(&json)?;
        info!(profiles = profiles.len(), "Created synthesis backend");
        *slot = Some(BackendSlot {
            backend: Arc::clone(&backend),
            configured: json,
        });
        Ok(backend)
    }

    async fn produce(
        &self,
        request: &SynthesisRequest,
        profiles: &[VoiceProfile],
        client: &BoundedRetryClient,
    ) -> TtsResult<Vec<u8>> {
        let backend = self.backend(profiles)?;
        let compressed = client.fetch(backend.as_ref(), &request.text, &request.short_text).await?;
        debug!(bytes = compressed.len(), text = %request.short_text, "Received compressed audio");

        let transcoder = self.transcoder.clone();
        let decoded = tokio::task::spawn_blocking(move || transcoder.decode(&compressed))
            .await
            .map_err(|e| TtsError::Decode(e.to_string()))??;
        conform(decoded, &self.options.output_format)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let slot = self
            .backend
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(slot) = slot {
            slot.backend.release();
        }
    }
}

/// Background half of a request. Holding `_permit` marks synthesis in flight.
async fn synthesize(
    shared: Arc<Shared>,
    request: Arc<SynthesisRequest>,
    profiles: Vec<VoiceProfile>,
    client: BoundedRetryClient,
    _permit: OwnedSemaphorePermit,
) {
    let started = Instant::now();
    let result = match shared.produce(&request, &profiles, &client).await {
        Ok(pcm) => {
            info!(
                source = %request.source,
                text = %request.short_text,
                bytes = pcm.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Synthesis complete"
            );
            SynthesisResult::ready(pcm, shared.options.output_format.sample_rate, started.elapsed())
        }
        Err(e) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &e {
                // Already reported once by the retry client.
                TtsError::Exhausted { .. } => {
                    debug!(source = %request.source, text = %request.short_text, elapsed_ms, "No audio produced")
                }
                TtsError::Cancelled => debug!(text = %request.short_text, "Synthesis cancelled"),
                _ => error!(
                    source = %request.source,
                    text = %request.short_text,
                    elapsed_ms,
                    error = %e,
                    "Synthesis failed"
                ),
            }
            SynthesisResult::failed(started.elapsed())
        }
    };
    request.complete(result);
}

async fn signal_done(sink: &mut dyn AudioSink) {
    if let Err(e) = sink.done().await {
        error!(error = %e, "Failed to signal done to sink");
    }
}

async fn signal_error(sink: &mut dyn AudioSink) {
    if let Err(e) = sink.error().await {
        error!(error = %e, "Failed to signal error to sink");
    }
}
