//! Bring decoded audio into the format announced to the sink.
//!
//! Sinks are started before synthesis finishes, so the announced format is
//! fixed up front. Decoded audio with another rate or channel count is
//! downmixed to mono and resampled to match.

use rubato::{FftFixedIn, Resampler as _};
use tracing::debug;

use crate::error::{TtsError, TtsResult};
use crate::sink::PcmFormat;
use crate::transcoder::DecodedAudio;

const CHUNK_SIZE: usize = 1024;

/// Convert `audio` to `target`. A no-op when formats already agree.
pub fn conform(audio: DecodedAudio, target: &PcmFormat) -> TtsResult<Vec<u8>> {
    let channels = usize::from(audio.channels.max(1));
    if audio.sample_rate == target.sample_rate && channels == usize::from(target.channels) {
        return Ok(audio.pcm);
    }
    if target.channels != 1 {
        return Err(TtsError::Resample(format!(
            "unsupported output channel count {}",
            target.channels
        )));
    }
    if audio.sample_rate == 0 {
        return Err(TtsError::Resample("decoded audio has no sample rate".into()));
    }

    let mono = downmix(&audio.pcm, channels);
    let resampled = resample(&mono, audio.sample_rate, target.sample_rate)?;
    debug!(
        from_rate = audio.sample_rate,
        from_channels = channels,
        to_rate = target.sample_rate,
        frames = resampled.len(),
        "Conformed decoded audio"
    );
    Ok(to_pcm(&resampled))
}

/// Average interleaved i16 LE frames into mono f32 in [-1, 1].
fn downmix(pcm: &[u8], channels: usize) -> Vec<f32> {
    pcm.chunks_exact(2 * channels)
        .map(|frame| {
            let sum: f32 = frame
                .chunks_exact(2)
                .map(|s| f32::from(i16::from_le_bytes([s[0], s[1]])))
                .sum();
            sum / channels as f32 / f32::from(i16::MAX)
        })
        .collect()
}

/// Resample mono audio, dropping the filter delay so output sample 0 lines
/// up with input sample 0 and the tail is flushed rather than cut short.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> TtsResult<Vec<f32>> {
    if samples.is_empty() || from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 2, 1)
        .map_err(|e| TtsError::Resample(e.to_string()))?;
    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).ceil() as usize;

    let mut output = Vec::with_capacity(delay + expected + CHUNK_SIZE);
    let mut chunks = samples.chunks_exact(CHUNK_SIZE);
    for chunk in chunks.by_ref() {
        let result = resampler
            .process(&[chunk], None)
            .map_err(|e| TtsError::Resample(e.to_string()))?;
        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
    }

    let remaining = chunks.remainder();
    if !remaining.is_empty() {
        let tail = [remaining];
        let result = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| TtsError::Resample(e.to_string()))?;
        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
    }

    // Push silence through until the delayed tail has come out.
    while output.len() < delay + expected {
        let result = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| TtsError::Resample(e.to_string()))?;
        match result.first() {
            Some(channel) if !channel.is_empty() => output.extend_from_slice(channel),
            _ => break,
        }
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

fn to_pcm(samples: &[f32]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let sample = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        pcm.extend_from_slice(&sample.to_le_bytes());
    }
    pcm
}
