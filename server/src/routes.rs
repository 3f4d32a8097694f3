use std::sync::atomic::Ordering;
use std::sync::OnceLock;
use std::time::Instant;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tts_core::{encode_wav_base64, CollectingSink, Outcome, SettingsSource, VoiceProfile};

use crate::error::ApiError;
use crate::metrics::{MetricsResponse, SystemMetrics};
use crate::status::StatusLine;
use crate::validation::validate_speak_request;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakRequest {
    pub text: String,
    #[serde(default)]
    pub caller_uid: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakResponse {
    pub caller: String,
    pub sample_rate: u32,
    pub cached_bytes: usize,
    pub fresh_bytes: usize,
    pub duration_ms: u64,
    /// WAV of everything delivered by this call; absent when nothing was.
    pub audio_base64: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: StatusLine,
    pub synthesizing: bool,
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn speak(
    State(state): State<AppState>,
    Json(req): Json<SpeakRequest>,
) -> Result<Json<SpeakResponse>, ApiError> {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    validate_speak_request(&req.text)?;

    let started = Instant::now();
    let mut sink = CollectingSink::new(state.config.sink_chunk_bytes);
    let report = state.coordinator.handle(&req.text, req.caller_uid, &mut sink).await;
    state
        .metrics
        .record(&report, started.elapsed().as_millis() as u64);

    match report.outcome {
        Outcome::NoProfiles => {
            return Err(ApiError::Unavailable(tts_core::NO_PROFILE_DETAIL.to_string()))
        }
        Outcome::Cancelled => return Err(ApiError::Unavailable("Server is shutting down".to_string())),
        Outcome::Blank | Outcome::Completed => {}
    }

    let format = sink.format.unwrap_or_else(|| state.coordinator.output_format());
    let audio_base64 = if sink.audio.is_empty() {
        None
    } else {
        Some(encode_wav_base64(&sink.audio, &format)?)
    };
    let duration_ms = sink.audio.len() as u64 * 1000 / u64::from(format.bytes_per_second().max(1));

    Ok(Json(SpeakResponse {
        caller: report.caller.to_string(),
        sample_rate: format.sample_rate,
        cached_bytes: report.cached_bytes,
        fresh_bytes: report.fresh_bytes,
        duration_ms,
        audio_base64,
    }))
}

pub async fn stop(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.coordinator.stop();
    Json(serde_json::json!({ "stopped": true }))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.status.latest(),
        synthesizing: state.coordinator.is_synthesizing(),
    })
}

pub async fn profiles(State(state): State<AppState>) -> Json<Vec<VoiceProfile>> {
    Json(state.settings.enabled_profiles())
}

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Start the uptime clock reported by `/metrics`.
pub fn mark_start() {
    START_TIME.get_or_init(Instant::now);
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let uptime_seconds = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    Json(MetricsResponse {
        timestamp: Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: system.global_cpu_info().cpu_usage(),
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: state.request_count.load(Ordering::Relaxed),
            uptime_seconds,
            synthesizing: state.coordinator.is_synthesizing(),
        },
        speak: state.metrics.speak.stats(),
        deliveries: state.metrics.deliveries.stats(),
    })
}
