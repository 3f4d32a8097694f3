//! Speech synthesis request coordination.
//!
//! [`RequestCoordinator`] sits between callers that send text and a slow,
//! opaque synthesis backend. It serializes synthesis, retries the backend
//! with a bounded timeout, decodes the compressed result to PCM and streams
//! it to the caller's [`AudioSink`], handing back the previous utterance
//! while the current one is still being synthesized.

mod backend;
mod caller;
mod conform;
mod coordinator;
mod error;
mod request;
mod retry;
mod settings;
mod sink;
mod status;
mod text;
mod transcoder;
mod wav;

pub use backend::{BackendFactory, SynthesisBackend, SynthesisCallback};
pub use caller::{
    classify, CallerClass, NoPackages, PackageResolver, StaticPackages, FIRST_APPLICATION_UID,
    ROOT_UID, SYSTEM_UID,
};
pub use conform::conform;
pub use coordinator::{CoordinatorOptions, HandleReport, Outcome, RequestCoordinator, NO_PROFILE_DETAIL};
pub use error::{TtsError, TtsResult};
pub use request::{SynthesisRequest, SynthesisResult};
pub use retry::{BoundedRetryClient, RetryPolicy};
pub use settings::{
    profiles_json, AppSettings, ProfileScope, SettingsSource, SettingsStore, VoiceProfile, VoiceSpec,
    FALLBACK_TIMEOUT,
};
pub use sink::{deliver, AudioSink, CollectingSink, PcmFormat, SinkEvent, SinkStatus};
pub use status::StatusNotifier;
pub use text::{display_text, ellipsize_middle, DISPLAY_LEN};
pub use transcoder::{AudioTranscoder, DecodedAudio};
pub use wav::{encode_wav, encode_wav_base64};
