//! Voice profiles and app settings.
//!
//! The coordinator reads these through [`SettingsSource`] once per request;
//! it never owns or persists them.

use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TtsResult;

/// Timeout applied when the configured one is zero.
pub const FALLBACK_TIMEOUT: Duration = Duration::from_millis(10_000);

/// What part of a text a profile reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileScope {
    Narration,
    Dialogue,
    #[default]
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSpec {
    /// Backend voice identifier, e.g. `zh-CN-XiaoxiaoNeural`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// One named voice profile. The backend receives the enabled set as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceProfile {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub voice: VoiceSpec,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rate: f32,
    #[serde(default)]
    pub volume: f32,
    #[serde(default)]
    pub pitch: f32,
    #[serde(default = "default_style_intensity")]
    pub style_intensity: f32,
    #[serde(default = "default_audio_format")]
    pub audio_format: String,
    #[serde(default)]
    pub scope: ProfileScope,
    #[serde(default = "default_api_name")]
    pub api_name: String,
}

fn default_style_intensity() -> f32 {
    100.0
}

fn default_audio_format() -> String {
    "audio-24khz-48kbitrate-mono-mp3".to_string()
}

fn default_api_name() -> String {
    "Edge".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Per-attempt backend timeout in milliseconds; `0` selects [`FALLBACK_TIMEOUT`].
    pub request_timeout: u64,
    /// When false every caller gets freshly synthesized audio, never the look-ahead copy.
    pub cache_audio_book_audio: bool,
    pub max_attempts: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            request_timeout: 5_000,
            cache_audio_book_audio: true,
            max_attempts: 3,
        }
    }
}

impl AppSettings {
    pub fn request_timeout(&self) -> Duration {
        if self.request_timeout == 0 {
            FALLBACK_TIMEOUT
        } else {
            Duration::from_millis(self.request_timeout)
        }
    }

    pub fn always_fresh(&self) -> bool {
        !self.cache_audio_book_audio
    }
}

/// Read access to the external settings store.
pub trait SettingsSource: Send + Sync {
    fn enabled_profiles(&self) -> Vec<VoiceProfile>;
    fn app_settings(&self) -> AppSettings;
}

/// Serialize profiles into the JSON document handed to `SynthesisBackend::configure`.
pub fn profiles_json(profiles: &[VoiceProfile]) -> TtsResult<String> {
    Ok(serde_json::to_string(profiles)?)
}

/// In-memory settings, optionally loaded from JSON files.
#[derive(Debug, Default)]
pub struct SettingsStore {
    profiles: RwLock<Vec<VoiceProfile>>,
    settings: RwLock<AppSettings>,
}

impl SettingsStore {
    pub fn new(profiles: Vec<VoiceProfile>, settings: AppSettings) -> Self {
        Self {
            profiles: RwLock::new(profiles),
            settings: RwLock::new(settings),
        }
    }

    /// Load a profile list (JSON array) and, if given, an app settings object.
    pub fn load<P: AsRef<Path>>(profiles_path: P, settings_path: Option<P>) -> TtsResult<Self> {
        let text = fs::read_to_string(profiles_path.as_ref())?;
        let profiles: Vec<VoiceProfile> = serde_json::from_str(&text)?;

        let settings = match settings_path {
            Some(path) => serde_json::from_str(&fs::read_to_string(path.as_ref())?)?,
            None => AppSettings::default(),
        };

        tracing::debug!(
            profiles = profiles.len(),
            enabled = profiles.iter().filter(|p| p.enabled).count(),
            "Loaded voice settings"
        );
        Ok(Self::new(profiles, settings))
    }

    pub fn all_profiles(&self) -> Vec<VoiceProfile> {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace_profiles(&self, profiles: Vec<VoiceProfile>) {
        *self.profiles.write().unwrap_or_else(PoisonError::into_inner) = profiles;
    }
}

impl SettingsSource for SettingsStore {
    fn enabled_profiles(&self) -> Vec<VoiceProfile> {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|p| p.enabled)
            .cloned()
            .collect()
    }

    fn app_settings(&self) -> AppSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
