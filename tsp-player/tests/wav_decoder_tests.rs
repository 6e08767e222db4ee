//! Container decoder tests against independently generated WAV files
//!
//! 16-bit containers come from hound; other depths use `encode_pcm_wav`
//! (hound writes WAVE_FORMAT_EXTENSIBLE for them, which is not tag 1).

mod helpers;

use helpers::{generate_sine_wav, wav_from_i16, with_format_tag};
use tsp_player::audio::resampler::Resampler;
use tsp_player::audio::wav::{decode_wav, encode_pcm_wav};
use tsp_player::error::Error;

#[test]
fn test_16bit_round_trip_within_quantization() {
    let original: Vec<f32> = (0..480).map(|i| ((i as f32) * 0.05).sin() * 0.8).collect();
    let quantized: Vec<i16> = original.iter().map(|&s| (s * 32768.0).round() as i16).collect();

    let decoded = decode_wav(&wav_from_i16(&quantized, 24000, 1)).unwrap();
    assert_eq!(decoded.sample_rate, 24000);
    assert_eq!(decoded.channels, 1);
    assert_eq!(decoded.bits_per_sample, 16);
    assert_eq!(decoded.samples.len(), original.len());

    for (got, want) in decoded.samples.iter().zip(&original) {
        assert!((got - want).abs() <= 1.0 / 32768.0, "{} vs {}", got, want);
    }
}

#[test]
fn test_8bit_round_trip_within_quantization() {
    let original = [-1.0f32, -0.5, 0.0, 0.25, 0.99];
    let pcm: Vec<u8> = original
        .iter()
        .map(|&s| ((s * 128.0).round() + 128.0).clamp(0.0, 255.0) as u8)
        .collect();

    let decoded = decode_wav(&encode_pcm_wav(&pcm, 8000, 1, 8)).unwrap();
    for (got, want) in decoded.samples.iter().zip(&original) {
        assert!((got - want).abs() <= 1.0 / 128.0, "{} vs {}", got, want);
    }
}

#[test]
fn test_24bit_round_trip_within_quantization() {
    let original = [-1.0f32, -0.333, 0.0, 0.5, 0.999_999];
    let mut pcm = Vec::new();
    for &s in &original {
        let v = ((s as f64 * 8_388_608.0).round() as i32).clamp(-8_388_608, 8_388_607);
        pcm.extend_from_slice(&v.to_le_bytes()[..3]);
    }

    let decoded = decode_wav(&encode_pcm_wav(&pcm, 48000, 1, 24)).unwrap();
    assert_eq!(decoded.samples.len(), original.len());
    for (got, want) in decoded.samples.iter().zip(&original) {
        assert!((got - want).abs() <= 1.0 / 8_388_608.0 + f32::EPSILON, "{} vs {}", got, want);
    }
}

#[test]
fn test_32bit_float_is_exact() {
    let original = [0.0f32, 0.125, -0.75, 1.5];
    let pcm: Vec<u8> = original.iter().flat_map(|s| s.to_le_bytes()).collect();

    let decoded = decode_wav(&encode_pcm_wav(&pcm, 22050, 1, 32)).unwrap();
    assert_eq!(decoded.samples, original);
}

#[test]
fn test_stereo_container_keeps_interleaving() {
    let wav = wav_from_i16(&[16384, -16384, 8192, -8192], 44100, 2);

    let decoded = decode_wav(&wav).unwrap();
    assert_eq!(decoded.channels, 2);
    assert_eq!(decoded.frame_count(), 2);
    assert_eq!(decoded.samples, vec![0.5, -0.5, 0.25, -0.25]);
    assert_eq!(decoded.into_mono(), vec![0.0, 0.0]);
}

#[test]
fn test_compressed_tag_rejected() {
    let wav = with_format_tag(generate_sine_wav(100, 24000, 440.0, 0.5), 0x55);
    assert!(matches!(decode_wav(&wav), Err(Error::UnsupportedCodec(0x55))));
}

#[test]
fn test_header_only_buffer_is_truncated() {
    let wav = generate_sine_wav(100, 24000, 440.0, 0.5);
    // Complete fmt section, data section cut off
    let cut = &wav[..36];
    assert!(matches!(decode_wav(cut), Err(Error::TruncatedData(_))));
}

#[test]
fn test_decode_then_resample_to_output_rate() {
    let decoded = decode_wav(&generate_sine_wav(1000, 24000, 220.0, 0.5)).unwrap();
    let source_rate = decoded.sample_rate;
    let mono = decoded.into_mono();
    let peak_in = mono.iter().fold(0.0f32, |m, s| m.max(s.abs()));

    let resampled = Resampler::resample_owned(mono, source_rate, 48000);
    assert_eq!(resampled.len(), 48000);

    let peak_out = resampled.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!(peak_out <= peak_in);
}
