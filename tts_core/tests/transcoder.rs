//! Decode compressed and container audio and conform it to the sink format.

use std::io::Cursor;

use tts_core::{conform, AudioTranscoder, PcmFormat, TtsError};

fn tone(sample_rate: u32, channels: u16, seconds: f32) -> (Vec<i16>, Vec<u8>) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let frames = (sample_rate as f32 * seconds) as usize;
    let samples: Vec<i16> = (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            ((t * 440.0 * std::f32::consts::TAU).sin() * 10_000.0) as i16
        })
        .collect();

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &sample in &samples {
            for _ in 0..channels {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    (samples, cursor.into_inner())
}

#[test]
fn test_tone_round_trip_at_output_format() {
    let (reference, wav) = tone(24_000, 1, 0.5);

    let decoded = AudioTranscoder::new().decode(&wav).unwrap();
    assert_eq!(decoded.sample_rate, 24_000);
    assert_eq!(decoded.channels, 1);
    assert_eq!(decoded.frames(), reference.len());

    let pcm = conform(decoded, &PcmFormat::default()).unwrap();
    let samples: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    assert_eq!(samples, reference);
}

#[test]
fn test_other_rates_are_conformed() {
    let (_, wav) = tone(48_000, 2, 1.0);

    let decoded = AudioTranscoder::new().decode(&wav).unwrap();
    assert_eq!((decoded.sample_rate, decoded.channels), (48_000, 2));

    let pcm = conform(decoded, &PcmFormat::default()).unwrap();
    assert_eq!(pcm.len() / 2, 24_000);
}

/// 24 kHz mono MPEG-2 Layer III at 48 kbit/s, as the remote voice service
/// sends it. A leading CBR `Info` frame carries no audio; 40 audio frames
/// follow, the first 4 silent and the rest holding a steady line near 1 kHz.
const MP3_FIXTURE: &[u8] = include_bytes!("fixtures/tone_24k_mono.mp3");
const MP3_AUDIO_FRAMES: usize = 40;
const MP3_SILENT_FRAMES: usize = 4;
const MP3_FRAME_SAMPLES: usize = 576;

fn samples_of(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

#[test]
fn test_mp3_decodes_at_stream_format() {
    let decoded = AudioTranscoder::with_extension("mp3").decode(MP3_FIXTURE).unwrap();
    assert_eq!(decoded.sample_rate, 24_000);
    assert_eq!(decoded.channels, 1);

    // The Info frame yields no samples; every audio frame yields one granule.
    let expected = MP3_AUDIO_FRAMES * MP3_FRAME_SAMPLES;
    assert!(
        decoded.frames().abs_diff(expected) <= MP3_FRAME_SAMPLES,
        "got {} frames, expected about {expected}",
        decoded.frames()
    );
}

#[test]
fn test_mp3_keeps_decoding_past_silent_lead_in() {
    let decoded = AudioTranscoder::new().decode(MP3_FIXTURE).unwrap();
    let samples = samples_of(&decoded.pcm);

    let lead_in = MP3_SILENT_FRAMES * MP3_FRAME_SAMPLES;
    assert!(samples[..lead_in].iter().all(|&s| s == 0));

    let peak = samples[lead_in + MP3_FRAME_SAMPLES..]
        .iter()
        .map(|s| s.unsigned_abs())
        .max()
        .unwrap_or(0);
    assert!(peak > 64, "audio after the lead-in is silent (peak {peak})");
}

#[test]
fn test_mp3_passes_through_conform_unchanged() {
    let decoded = AudioTranscoder::new().decode(MP3_FIXTURE).unwrap();
    let pcm = decoded.pcm.clone();
    assert_eq!(conform(decoded, &PcmFormat::default()).unwrap(), pcm);
}

#[test]
fn test_truncated_mp3_keeps_whole_frames() {
    // Cut mid-way through the last frame: the partial frame is dropped.
    let cut = MP3_FIXTURE.len() - 60;
    let decoded = AudioTranscoder::new().decode(&MP3_FIXTURE[..cut]).unwrap();
    assert!(decoded.frames() < MP3_AUDIO_FRAMES * MP3_FRAME_SAMPLES);
    assert!(decoded.frames() >= (MP3_AUDIO_FRAMES - 2) * MP3_FRAME_SAMPLES);
}

#[test]
fn test_truncated_header_fails() {
    let (_, wav) = tone(24_000, 1, 0.1);
    let err = AudioTranscoder::new().decode(&wav[..20]).unwrap_err();
    assert!(matches!(err, TtsError::Decode(_) | TtsError::NoAudioTrack));
}
