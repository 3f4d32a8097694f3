use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};

use crate::error::{TtsError, TtsResult};
use crate::sink::PcmFormat;

/// Wrap 16-bit little-endian PCM in a WAV (RIFF) container.
pub fn encode_wav(pcm: &[u8], format: &PcmFormat) -> TtsResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bit_depth,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm.len()));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
        for sample in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .map_err(wav_error)?;
        }
        writer.finalize().map_err(wav_error)?;
    }
    Ok(cursor.into_inner())
}

/// [`encode_wav`], then Base64 for JSON transport.
pub fn encode_wav_base64(pcm: &[u8], format: &PcmFormat) -> TtsResult<String> {
    Ok(general_purpose::STANDARD.encode(encode_wav(pcm, format)?))
}

fn wav_error(e: hound::Error) -> TtsError {
    match e {
        hound::Error::IoError(e) => TtsError::Io(e),
        other => TtsError::Sink(other.to_string()),
    }
}
