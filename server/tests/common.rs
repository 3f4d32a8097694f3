//! Common utilities for integration tests

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tts_core::{
    AppSettings, SettingsStore, SynthesisBackend, SynthesisCallback, TtsError, TtsResult,
    VoiceProfile,
};
use tts_server::config::ServerConfig;
use tts_server::{build_router, AppState};

pub const FRAMES: usize = 2_400;

/// 24 kHz mono WAV standing in for the remote service's compressed audio.
pub fn wav_fixture() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 24_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..FRAMES {
            writer.write_sample((i % 100) as i16 * 50).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Answers every request with `wav_fixture()` after a short delay, or fails.
pub struct MockBackend {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            calls: AtomicUsize::new(0),
        })
    }
}

impl SynthesisBackend for MockBackend {
    fn configure(&self, _profiles_json: &str) -> TtsResult<()> {
        Ok(())
    }

    fn synthesize(&self, _text: &str, on_result: SynthesisCallback) -> TtsResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TtsError::Backend("mock failure".into()));
        }
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            on_result(Some(wav_fixture()));
        });
        Ok(())
    }
}

pub fn profiles(enabled: bool) -> Vec<VoiceProfile> {
    serde_json::from_value(serde_json::json!([{
        "id": 0,
        "name": "Narrator",
        "voice": { "name": "zh-CN-XiaoxiaoNeural" },
        "enabled": enabled
    }]))
    .unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub backend: Arc<MockBackend>,
}

/// Create a test app instance around the real router
pub fn create_test_app(enabled: bool, fail: bool) -> TestApp {
    let backend = MockBackend::new(fail);
    let settings = Arc::new(SettingsStore::new(profiles(enabled), AppSettings::default()));
    let factory_backend = backend.clone();
    let factory = Arc::new(move || -> TtsResult<Arc<dyn SynthesisBackend>> { Ok(factory_backend.clone()) });

    let config = ServerConfig {
        caller_packages: "10123=com.example.reader".parse().unwrap(),
        ..ServerConfig::default()
    };
    let state = AppState::new(config, settings, factory);
    let router = build_router(state.clone()).expect("router");
    TestApp {
        router,
        state,
        backend,
    }
}
