//! Test doubles shared by the coordinator tests.

#![allow(dead_code)]

use std::fmt::{self, Write as _};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use tts_core::{
    AppSettings, AudioSink, BackendFactory, CollectingSink, PcmFormat, SettingsStore, SinkEvent,
    SinkStatus, StatusNotifier, SynthesisBackend, SynthesisCallback, TtsError, TtsResult,
    VoiceProfile,
};

pub type Timeline = Arc<Mutex<Vec<String>>>;

pub const FIXTURE_FRAMES: usize = 2_400;

/// Constant sample value identifying the audio synthesized for `text`.
pub fn marker(text: &str) -> i16 {
    (text.bytes().map(u32::from).sum::<u32>() % 20_000) as i16 + 1
}

/// 24 kHz mono WAV whose samples all equal `marker(text)`.
pub fn wav_for(text: &str) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 24_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..FIXTURE_FRAMES {
            writer.write_sample(marker(text)).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

pub fn samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

pub fn profile(id: u32, enabled: bool) -> VoiceProfile {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": format!("voice-{id}"),
        "voice": { "name": "zh-CN-XiaoxiaoNeural" },
        "enabled": enabled,
    }))
    .unwrap()
}

pub fn settings(enabled: bool, app: AppSettings) -> Arc<SettingsStore> {
    Arc::new(SettingsStore::new(vec![profile(0, enabled)], app))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Answer with `wav_for(text)` after the latency.
    Answer,
    /// Fail synchronously.
    Raise,
    /// Keep the callback forever.
    Hang,
    /// Answer with bytes no decoder understands.
    Garbage,
}

pub struct StubBackend {
    mode: Mode,
    latency: Duration,
    timeline: Timeline,
    pub calls: Mutex<Vec<String>>,
    pub configured: Mutex<Vec<String>>,
    held: Mutex<Vec<SynthesisCallback>>,
    in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
    pub completed: Arc<AtomicUsize>,
    pub cancels: AtomicUsize,
    pub releases: AtomicUsize,
}

impl StubBackend {
    pub fn new(mode: Mode, latency: Duration, timeline: Timeline) -> Arc<Self> {
        Arc::new(Self {
            mode,
            latency,
            timeline,
            calls: Mutex::new(Vec::new()),
            configured: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
            cancels: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl SynthesisBackend for StubBackend {
    fn configure(&self, profiles_json: &str) -> TtsResult<()> {
        self.configured.lock().unwrap().push(profiles_json.to_string());
        Ok(())
    }

    fn synthesize(&self, text: &str, on_result: SynthesisCallback) -> TtsResult<()> {
        self.timeline.lock().unwrap().push(format!("synthesize:{text}"));
        self.calls.lock().unwrap().push(text.to_string());

        let audio = match self.mode {
            Mode::Raise => return Err(TtsError::Backend("engine unavailable".into())),
            Mode::Hang => {
                self.held.lock().unwrap().push(on_result);
                return Ok(());
            }
            Mode::Answer => wav_for(text),
            Mode::Garbage => vec![0x13; 512],
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = self.latency;
        let in_flight = Arc::clone(&self.in_flight);
        let completed = Arc::clone(&self.completed);
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            completed.fetch_add(1, Ordering::SeqCst);
            on_result(Some(audio));
        });
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct StubFactory {
    backend: Arc<StubBackend>,
    pub created: AtomicUsize,
}

impl StubFactory {
    pub fn new(backend: Arc<StubBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            created: AtomicUsize::new(0),
        })
    }
}

impl BackendFactory for StubFactory {
    fn create(&self) -> TtsResult<Arc<dyn SynthesisBackend>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.backend.clone())
    }
}

#[derive(Default)]
pub struct RecordingStatus {
    pub updates: Mutex<Vec<(String, String)>>,
}

impl StatusNotifier for RecordingStatus {
    fn update_status(&self, title: &str, detail: &str) {
        self.updates
            .lock()
            .unwrap()
            .push((title.to_string(), detail.to_string()));
    }
}

/// Collecting sink that also marks each write on the shared timeline.
pub struct RecordingSink {
    pub inner: CollectingSink,
    timeline: Timeline,
}

impl RecordingSink {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            inner: CollectingSink::default(),
            timeline,
        }
    }

    pub fn done_count(&self) -> usize {
        self.inner
            .events
            .iter()
            .filter(|e| **e == SinkEvent::Done)
            .count()
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn start(&mut self, format: PcmFormat) -> TtsResult<()> {
        self.inner.start(format).await
    }

    fn max_buffer_size(&self) -> usize {
        self.inner.max_buffer_size()
    }

    async fn write(&mut self, chunk: &[u8]) -> TtsResult<SinkStatus> {
        self.timeline.lock().unwrap().push("write".to_string());
        self.inner.write(chunk).await
    }

    async fn done(&mut self) -> TtsResult<()> {
        self.inner.done().await
    }

    async fn error(&mut self) -> TtsResult<()> {
        self.inner.error().await
    }
}

/// Captures every ERROR event as `field=value` text.
#[derive(Clone, Default)]
pub struct ErrorLog {
    pub lines: Arc<Mutex<Vec<String>>>,
}

impl ErrorLog {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

struct FieldWriter<'a>(&'a mut String);

impl Visit for FieldWriter<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let _ = write!(self.0, "{}={:?} ", field.name(), value);
    }
}

impl<S: Subscriber> Layer<S> for ErrorLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            let mut line = String::new();
            event.record(&mut FieldWriter(&mut line));
            self.lines.lock().unwrap().push(line);
        }
    }
}
