//! Compressed audio to raw PCM.
//!
//! The backend hands back one complete compressed buffer per request
//! (typically MP3). [`AudioTranscoder::decode`] probes it, picks the first
//! audio track and drains the decoder into interleaved 16-bit little-endian
//! PCM, reporting the track's real sample rate and channel count.

use std::io::{Cursor, ErrorKind};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{TtsError, TtsResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAudio {
    /// Interleaved i16 samples, little-endian.
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.pcm.len() / 2 / usize::from(self.channels.max(1))
    }
}

#[derive(Debug, Default, Clone)]
pub struct AudioTranscoder {
    hint: Option<String>,
}

impl AudioTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe with a file extension hint such as `"mp3"`.
    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            hint: Some(extension.into()),
        }
    }

    /// Decode one complete compressed buffer.
    ///
    /// Fails with [`TtsError::NoAudioTrack`] when the container holds no
    /// decodable audio track, and [`TtsError::Decode`] on codec errors or
    /// when no samples come out.
    pub fn decode(&self, compressed: &[u8]) -> TtsResult<DecodedAudio> {
        let mut hint = Hint::new();
        if let Some(ext) = &self.hint {
            hint.with_extension(ext);
        }

        let source = MediaSourceStream::new(Box::new(Cursor::new(compressed.to_vec())), Default::default());
        let probed = symphonia::default::get_probe().format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
            .ok_or(TtsError::NoAudioTrack)?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or_default();
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(1);

        let mut decoder =
            symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let mut pcm = Vec::with_capacity(compressed.len() * 4);
        drain(reader.as_mut(), decoder.as_mut(), track_id, &mut pcm, &mut sample_rate, &mut channels)?;
        decoder.finalize();

        if pcm.is_empty() {
            return Err(TtsError::Decode("decoder produced no samples".into()));
        }

        debug!(
            compressed_bytes = compressed.len(),
            pcm_bytes = pcm.len(),
            sample_rate,
            channels,
            "Decoded synthesized audio"
        );
        Ok(DecodedAudio {
            pcm,
            sample_rate,
            channels,
        })
    }
}

/// Feed packets until the reader reports end of stream, appending decoded
/// output. Output format follows the first decoded buffer.
fn drain(
    reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
    pcm: &mut Vec<u8>,
    sample_rate: &mut u32,
    channels: &mut u16,
) -> TtsResult<()> {
    let mut samples: Option<SampleBuffer<i16>> = None;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(SymphoniaError::ResetRequired) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!(error = msg, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if decoded.frames() == 0 {
            continue;
        }

        let spec = *decoded.spec();
        *sample_rate = spec.rate;
        *channels = spec.channels.count() as u16;

        let needed = decoded.capacity() * spec.channels.count();
        if samples.as_ref().map_or(true, |buffer| buffer.capacity() < needed) {
            samples = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        let Some(buffer) = samples.as_mut() else {
            continue;
        };
        buffer.copy_interleaved_ref(decoded);
        for sample in buffer.samples() {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
    }
}
