use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::caller::CallerClass;
use crate::text::ellipsize_middle;

/// One accepted inbound text.
///
/// Immutable apart from `result`, which the background synthesis task sets
/// at most once. The coordinator keeps at most two of these alive (current
/// and last).
#[derive(Debug)]
pub struct SynthesisRequest {
    pub source: CallerClass,
    pub text: String,
    pub short_text: String,
    pub created_at: Instant,
    result: OnceLock<SynthesisResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    /// 16-bit little-endian PCM in the coordinator's output format.
    pub pcm: Option<Vec<u8>>,
    pub sample_rate: u32,
    pub is_complete: bool,
    pub elapsed: Duration,
}

impl SynthesisResult {
    pub fn ready(pcm: Vec<u8>, sample_rate: u32, elapsed: Duration) -> Self {
        Self {
            pcm: Some(pcm),
            sample_rate,
            is_complete: true,
            elapsed,
        }
    }

    pub fn failed(elapsed: Duration) -> Self {
        Self {
            pcm: None,
            sample_rate: 0,
            is_complete: false,
            elapsed,
        }
    }
}

impl SynthesisRequest {
    pub fn new(source: CallerClass, text: impl Into<String>, display_len: usize) -> Self {
        let text = text.into();
        let short_text = ellipsize_middle(&text, display_len);
        Self {
            source,
            text,
            short_text,
            created_at: Instant::now(),
            result: OnceLock::new(),
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.source.is_privileged()
    }

    /// Record the outcome. Returns false if a result was already set.
    pub fn complete(&self, result: SynthesisResult) -> bool {
        self.result.set(result).is_ok()
    }

    pub fn result(&self) -> Option<&SynthesisResult> {
        self.result.get()
    }

    /// Finished audio, if synthesis completed with a non-empty buffer.
    pub fn audio(&self) -> Option<&[u8]> {
        self.result
            .get()
            .filter(|r| r.is_complete)
            .and_then(|r| r.pcm.as_deref())
            .filter(|pcm| !pcm.is_empty())
    }
}
