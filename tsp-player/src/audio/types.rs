//! Core audio data types
//!
//! `DecodedAudio` is what the container decoder produces (native rate,
//! interleaved channels); `AudioChunk` is what the render side consumes
//! (engine output rate, mono, immutable).

/// Samples decoded from one PCM container, before resampling.
///
/// **Format:**
/// - Samples are f32, nominally -1.0 to 1.0 (32-bit float input is passed through)
/// - Interleaved when `channels > 1`: [L, R, L, R, ...]
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl DecodedAudio {
    /// Number of whole frames (one sample per channel)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Get duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Collapse to a single channel by averaging each frame.
    ///
    /// Mono input is returned as-is. A trailing partial frame is dropped.
    pub fn into_mono(self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples;
        }

        let scale = 1.0 / channels as f32;
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale)
            .collect()
    }
}

/// One decoded, resampled unit of mono audio at the engine output rate.
///
/// Ownership moves from the control side into the render queue on enqueue;
/// the render side drops it once fully played.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    samples: Box<[f32]>,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<f32>> for AudioChunk {
    fn from(samples: Vec<f32>) -> Self {
        Self::new(samples)
    }
}
