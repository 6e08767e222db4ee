//! In-memory WAV generation
//!
//! hound writes a plain 16-byte `fmt ` section for 16-bit integer PCM, so the
//! format tag sits at byte 20 of every container produced here.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;

/// Offset of the format tag in a canonical header
const FORMAT_TAG_OFFSET: usize = 20;

/// Encode interleaved 16-bit samples as a WAV container
pub fn wav_from_i16(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Vec::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut buffer), spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    buffer
}

/// Silent 16-bit WAV of `duration_ms`
pub fn generate_silent_wav(duration_ms: u64, sample_rate: u32, channels: u16) -> Vec<u8> {
    let frames = (sample_rate as u64 * duration_ms / 1000) as usize;
    wav_from_i16(&vec![0i16; frames * channels as usize], sample_rate, channels)
}

/// Mono 16-bit sine wave
pub fn generate_sine_wav(duration_ms: u64, sample_rate: u32, frequency_hz: f32, amplitude: f32) -> Vec<u8> {
    let frames = (sample_rate as u64 * duration_ms / 1000) as usize;
    let peak = amplitude * i16::MAX as f32;

    let samples: Vec<i16> = (0..frames)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            ((2.0 * PI * frequency_hz * t).sin() * peak) as i16
        })
        .collect();

    wav_from_i16(&samples, sample_rate, 1)
}

/// Same container with a different format tag (3 = IEEE float, 0x55 = MP3, ...)
pub fn with_format_tag(mut wav: Vec<u8>, tag: u16) -> Vec<u8> {
    wav[FORMAT_TAG_OFFSET..FORMAT_TAG_OFFSET + 2].copy_from_slice(&tag.to_le_bytes());
    wav
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn to_data_url(bytes: &[u8]) -> String {
    format!("data:audio/wav;base64,{}", STANDARD.encode(bytes))
}
