// Configuration for the speech server

use std::path::PathBuf;
use std::time::Duration;

use tts_core::{PcmFormat, StaticPackages};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    /// Remote synthesis endpoint; receives `{ text, profiles }`, answers with audio bytes.
    pub synth_backend_url: String,
    pub voice_profiles_path: PathBuf,
    pub app_settings_path: PathBuf,
    pub caller_packages: StaticPackages,
    pub output_sample_rate: u32,
    pub sink_chunk_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            synth_backend_url: "http://127.0.0.1:5050/synthesize".to_string(),
            voice_profiles_path: PathBuf::from("config/voice_profiles.json"),
            app_settings_path: PathBuf::from("config/app_settings.json"),
            caller_packages: StaticPackages::default(),
            output_sample_rate: 24_000,
            sink_chunk_bytes: 4096,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect()
            });

        let caller_packages = match std::env::var("CALLER_PACKAGES") {
            Ok(table) => table.parse().unwrap_or_else(|e| {
                tracing::warn!("Ignoring CALLER_PACKAGES: {e}");
                StaticPackages::default()
            }),
            Err(_) => StaticPackages::default(),
        };

        Self {
            port: env_or("PORT", defaults.port),
            rate_limit_per_minute: env_or("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
            cors_allowed_origins,
            synth_backend_url: std::env::var("SYNTH_BACKEND_URL").unwrap_or(defaults.synth_backend_url),
            voice_profiles_path: env_or("VOICE_PROFILES_PATH", defaults.voice_profiles_path),
            app_settings_path: env_or("APP_SETTINGS_PATH", defaults.app_settings_path),
            caller_packages,
            output_sample_rate: env_or("OUTPUT_SAMPLE_RATE", defaults.output_sample_rate),
            sink_chunk_bytes: env_or("SINK_CHUNK_BYTES", defaults.sink_chunk_bytes).max(2),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn output_format(&self) -> PcmFormat {
        PcmFormat::mono(self.output_sample_rate)
    }
}
