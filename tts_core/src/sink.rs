//! Playback sink capability and the chunked delivery adapter.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error};

use crate::error::TtsResult;

/// PCM layout announced to a sink before any bytes are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            bit_depth: 16,
            channels: 1,
        }
    }
}

impl PcmFormat {
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * u32::from(self.channels) * u32::from(self.bit_depth / 8)
    }
}

/// Whether the sink still wants audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Accepted,
    /// Playback was stopped; no further writes are wanted.
    Stopped,
}

/// Where delivered audio goes. One sink serves exactly one inbound call.
#[async_trait]
pub trait AudioSink: Send {
    async fn start(&mut self, format: PcmFormat) -> TtsResult<()>;

    /// Largest chunk `write` accepts.
    fn max_buffer_size(&self) -> usize;

    async fn write(&mut self, chunk: &[u8]) -> TtsResult<SinkStatus>;

    async fn done(&mut self) -> TtsResult<()>;

    async fn error(&mut self) -> TtsResult<()>;
}

/// Copy `audio` into `sink` in chunks of at most `max_buffer_size` bytes.
///
/// Stops early when the sink reports [`SinkStatus::Stopped`] or a write
/// fails; failures are logged, never returned. Returns the bytes written.
pub async fn deliver(sink: &mut dyn AudioSink, audio: &[u8]) -> usize {
    let max = sink.max_buffer_size().max(1);
    let mut written = 0;

    for chunk in audio.chunks(max) {
        match sink.write(chunk).await {
            Ok(SinkStatus::Accepted) => written += chunk.len(),
            Ok(SinkStatus::Stopped) => {
                debug!(written, total = audio.len(), "Sink stopped accepting audio");
                break;
            }
            Err(e) => {
                error!(error = %e, written, total = audio.len(), "Failed to write audio to sink");
                break;
            }
        }
    }
    written
}

/// Signals recorded by [`CollectingSink`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Start(PcmFormat),
    Write(usize),
    Done,
    Error,
}

/// Buffers everything delivered to it.
#[derive(Debug, Clone)]
pub struct CollectingSink {
    max_buffer_size: usize,
    pub format: Option<PcmFormat>,
    pub audio: Vec<u8>,
    pub events: Vec<SinkEvent>,
}

impl CollectingSink {
    pub fn new(max_buffer_size: usize) -> Self {
        Self {
            max_buffer_size,
            format: None,
            audio: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn finished(&self) -> bool {
        matches!(self.events.last(), Some(SinkEvent::Done | SinkEvent::Error))
    }

    pub fn failed(&self) -> bool {
        self.events.contains(&SinkEvent::Error)
    }
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[async_trait]
impl AudioSink for CollectingSink {
    async fn start(&mut self, format: PcmFormat) -> TtsResult<()> {
        self.format = Some(format);
        self.events.push(SinkEvent::Start(format));
        Ok(())
    }

    fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    async fn write(&mut self, chunk: &[u8]) -> TtsResult<SinkStatus> {
        self.audio.extend_from_slice(chunk);
        self.events.push(SinkEvent::Write(chunk.len()));
        Ok(SinkStatus::Accepted)
    }

    async fn done(&mut self) -> TtsResult<()> {
        self.events.push(SinkEvent::Done);
        Ok(())
    }

    async fn error(&mut self) -> TtsResult<()> {
        self.events.push(SinkEvent::Error);
        Ok(())
    }
}
