//! RIFF/WAVE container parsing for linear PCM
//!
//! Only uncompressed linear PCM (format tag 1) is accepted. Sections are
//! walked from offset 12; decoding stops at the first `data` section and
//! anything after it is ignored.
//!
//! # Sample scaling
//!
//! | bits | encoding               | scale           |
//! |------|------------------------|-----------------|
//! | 8    | unsigned, zero at 128  | `(v-128)/128`   |
//! | 16   | signed LE              | `v/32768`       |
//! | 24   | signed LE, 3 bytes     | `v/8388608`     |
//! | 32   | IEEE float LE          | unscaled        |

use crate::audio::types::DecodedAudio;
use crate::error::{Error, Result};
use tracing::debug;

/// Linear PCM format tag in the `fmt ` section
pub const FORMAT_TAG_PCM: u16 = 1;

/// Size of the header written by [`encode_pcm_wav`]
pub const CANONICAL_HEADER_LEN: usize = 44;

const RIFF_MAGIC: &[u8; 4] = b"RIFF";
const WAVE_MAGIC: &[u8; 4] = b"WAVE";
const FMT_ID: &[u8; 4] = b"fmt ";
const DATA_ID: &[u8; 4] = b"data";

/// Section walk starts after "RIFF" <size> "WAVE"
const FIRST_SECTION_OFFSET: usize = 12;

/// Bytes of the `fmt ` section we read (header + fields through bits-per-sample)
const FMT_MIN_LEN: usize = 24;

// Used when a data section precedes any fmt section
const DEFAULT_SAMPLE_RATE: u32 = 24000;
const DEFAULT_CHANNELS: u16 = 1;
const DEFAULT_BITS: u16 = 16;

/// Decode a linear-PCM WAV buffer into normalized f32 samples.
///
/// # Errors
/// - `Format`: missing `RIFF` signature or malformed `fmt ` section
/// - `UnsupportedCodec`: format tag other than 1
/// - `UnsupportedBitDepth`: bits per sample not 8/16/24/32
/// - `TruncatedData`: buffer ends before a `data` section
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    if bytes.len() < 4 || &bytes[0..4] != RIFF_MAGIC {
        return Err(Error::Format("missing RIFF signature".to_string()));
    }

    let mut sample_rate = DEFAULT_SAMPLE_RATE;
    let mut channels = DEFAULT_CHANNELS;
    let mut bits_per_sample = DEFAULT_BITS;

    let mut offset = FIRST_SECTION_OFFSET;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32(bytes, offset + 4) as usize;

        if id == FMT_ID {
            if offset + FMT_MIN_LEN > bytes.len() {
                return Err(Error::Format("fmt section truncated".to_string()));
            }

            let format_tag = read_u16(bytes, offset + 8);
            channels = read_u16(bytes, offset + 10);
            sample_rate = read_u32(bytes, offset + 12);
            bits_per_sample = read_u16(bytes, offset + 22);

            debug!(
                "WAV info: format={}, channels={}, sample_rate={}, bits={}",
                format_tag, channels, sample_rate, bits_per_sample
            );

            if format_tag != FORMAT_TAG_PCM {
                return Err(Error::UnsupportedCodec(format_tag));
            }
            if channels == 0 {
                return Err(Error::Format("fmt section declares zero channels".to_string()));
            }
            if sample_rate == 0 {
                return Err(Error::Format("fmt section declares zero sample rate".to_string()));
            }
        } else if id == DATA_ID {
            let start = offset + 8;
            // Streaming encoders often leave the size as a placeholder; clamp to what we have
            let end = start.saturating_add(size).min(bytes.len());
            let samples = decode_samples(&bytes[start..end], bits_per_sample)?;

            return Ok(DecodedAudio {
                samples,
                sample_rate,
                channels,
                bits_per_sample,
            });
        }

        // RIFF sections are word aligned
        let padded = size.saturating_add(size & 1);
        offset = match offset.checked_add(8).and_then(|o| o.checked_add(padded)) {
            Some(next) => next,
            None => break,
        };
    }

    Err(Error::TruncatedData("no data section found".to_string()))
}

/// Convert raw PCM bytes to normalized samples. A trailing partial sample is ignored.
fn decode_samples(data: &[u8], bits_per_sample: u16) -> Result<Vec<f32>> {
    let samples = match bits_per_sample {
        8 => data.iter().map(|&v| (v as f32 - 128.0) / 128.0).collect(),
        16 => data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect(),
        24 => data
            .chunks_exact(3)
            .map(|b| {
                // Little-endian on purpose: b[0] is the least significant byte, as
                // in every 24-bit WAV writer. Composing high byte first would
                // scramble real files. Place the 3 bytes in the top of an i32,
                // then shift back to sign-extend.
                let v = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
                v as f32 / 8_388_608.0
            })
            .collect(),
        32 => data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        other => return Err(Error::UnsupportedBitDepth(other)),
    };
    Ok(samples)
}

/// Wrap raw PCM bytes in a canonical 44-byte linear-PCM WAV header.
///
/// Used for TTS engines that emit headerless PCM.
pub fn encode_pcm_wav(pcm: &[u8], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let data_size = pcm.len() as u32;
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate * block_align as u32;

    let mut out = Vec::with_capacity(CANONICAL_HEADER_LEN + pcm.len());
    out.extend_from_slice(RIFF_MAGIC);
    out.extend_from_slice(&(36 + data_size).to_le_bytes());
    out.extend_from_slice(WAVE_MAGIC);
    out.extend_from_slice(FMT_ID);
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&FORMAT_TAG_PCM.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());
    out.extend_from_slice(DATA_ID);
    out.extend_from_slice(&data_size.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm16(values: &[i16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_16bit_mono() {
        let wav = encode_pcm_wav(&pcm16(&[0, 16384, -32768, 32767]), 24000, 1, 16);
        let audio = decode_wav(&wav).unwrap();

        assert_eq!(audio.sample_rate, 24000);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.bits_per_sample, 16);
        assert_eq!(audio.samples, vec![0.0, 0.5, -1.0, 32767.0 / 32768.0]);
    }

    #[test]
    fn test_decode_8bit() {
        let wav = encode_pcm_wav(&[128, 192, 0, 255], 8000, 1, 8);
        let audio = decode_wav(&wav).unwrap();
        assert_eq!(audio.samples, vec![0.0, 0.5, -1.0, 127.0 / 128.0]);
    }

    #[test]
    fn test_decode_24bit_sign_extension() {
        // +4194304 (0x400000) and -8388608 (0x800000), little-endian
        let wav = encode_pcm_wav(&[0x00, 0x00, 0x40, 0x00, 0x00, 0x80], 48000, 1, 24);
        let audio = decode_wav(&wav).unwrap();
        assert_eq!(audio.samples, vec![0.5, -1.0]);
    }

    #[test]
    fn test_decode_24bit_low_byte_first() {
        // 0x000001 and 0x7FFFFF; high-byte-first would read 0x010000 and 0xFFFF7F
        let wav = encode_pcm_wav(&[0x01, 0x00, 0x00, 0xFF, 0xFF, 0x7F], 48000, 1, 24);
        let audio = decode_wav(&wav).unwrap();
        assert_eq!(audio.samples, vec![1.0 / 8_388_608.0, 8_388_607.0 / 8_388_608.0]);
    }

    #[test]
    fn test_decode_32bit_float_passthrough() {
        let pcm: Vec<u8> = [0.25f32, -1.5].iter().flat_map(|v| v.to_le_bytes()).collect();
        let wav = encode_pcm_wav(&pcm, 16000, 1, 32);
        let audio = decode_wav(&wav).unwrap();
        assert_eq!(audio.samples, vec![0.25, -1.5]);
    }

    #[test]
    fn test_bad_magic() {
        let mut wav = encode_pcm_wav(&pcm16(&[0]), 24000, 1, 16);
        wav[0..4].copy_from_slice(b"RIFX");
        assert!(matches!(decode_wav(&wav), Err(Error::Format(_))));
        assert!(matches!(decode_wav(b"RI"), Err(Error::Format(_))));
    }

    #[test]
    fn test_non_pcm_format_tag() {
        let mut wav = encode_pcm_wav(&pcm16(&[0]), 24000, 1, 16);
        wav[20..22].copy_from_slice(&3u16.to_le_bytes());
        assert!(matches!(decode_wav(&wav), Err(Error::UnsupportedCodec(3))));
    }

    #[test]
    fn test_unsupported_bit_depth() {
        let wav = encode_pcm_wav(&[0; 12], 24000, 1, 12);
        assert!(matches!(decode_wav(&wav), Err(Error::UnsupportedBitDepth(12))));
    }

    #[test]
    fn test_missing_data_section() {
        let wav = encode_pcm_wav(&[], 24000, 1, 16);
        // Cut off the data section header
        assert!(matches!(
            decode_wav(&wav[..36]),
            Err(Error::TruncatedData(_))
        ));
    }

    #[test]
    fn test_skips_unknown_sections_and_ignores_trailing() {
        let base = encode_pcm_wav(&pcm16(&[16384]), 24000, 1, 16);
        let mut wav = base[..36].to_vec();
        // Odd-sized LIST section with pad byte
        wav.extend_from_slice(b"LIST");
        wav.extend_from_slice(&3u32.to_le_bytes());
        wav.extend_from_slice(&[1, 2, 3, 0]);
        wav.extend_from_slice(&base[36..]);
        wav.extend_from_slice(b"junk");
        wav.extend_from_slice(&4u32.to_le_bytes());
        wav.extend_from_slice(&[9, 9, 9, 9]);

        let audio = decode_wav(&wav).unwrap();
        assert_eq!(audio.samples, vec![0.5]);
    }

    #[test]
    fn test_placeholder_data_size_is_clamped() {
        let mut wav = encode_pcm_wav(&pcm16(&[0, 0, 0]), 24000, 1, 16);
        wav[40..44].copy_from_slice(&u32::MAX.to_le_bytes());
        let audio = decode_wav(&wav).unwrap();
        assert_eq!(audio.samples.len(), 3);
    }

    #[test]
    fn test_encode_header_layout() {
        let wav = encode_pcm_wav(&[0; 8], 24000, 2, 16);
        assert_eq!(wav.len(), CANONICAL_HEADER_LEN + 8);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(read_u32(&wav, 4), 44);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(read_u16(&wav, 22), 2);
        assert_eq!(read_u32(&wav, 24), 24000);
        assert_eq!(read_u32(&wav, 28), 96000);
        assert_eq!(read_u16(&wav, 32), 4);
        assert_eq!(read_u32(&wav, 40), 8);
    }
}
