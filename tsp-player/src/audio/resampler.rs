//! Linear-interpolation sample rate conversion
//!
//! Converts decoded chunks to the engine's fixed output rate. Output length
//! is always `round(len * output_rate / input_rate)`; values are blends of
//! the two nearest input samples, so the output never leaves the input's
//! min/max range.

use std::borrow::Cow;
use tracing::debug;

/// Mono linear resampler.
pub struct Resampler;

impl Resampler {
    /// Resample mono audio from `input_rate` to `output_rate`.
    ///
    /// Returns the input borrowed (no copy) when the rates match or the
    /// input is empty.
    pub fn resample(input: &[f32], input_rate: u32, output_rate: u32) -> Cow<'_, [f32]> {
        if input_rate == output_rate || input.is_empty() || input_rate == 0 || output_rate == 0 {
            return Cow::Borrowed(input);
        }

        let output_len = Self::output_len(input.len(), input_rate, output_rate);
        let step = input_rate as f64 / output_rate as f64;
        let last = input.len() - 1;

        let output: Vec<f32> = (0..output_len)
            .map(|i| {
                let src_pos = i as f64 * step;
                let lower = (src_pos.floor() as usize).min(last);
                let upper = (src_pos.ceil() as usize).min(last);

                if lower == upper {
                    input[lower]
                } else {
                    let weight = src_pos - lower as f64;
                    (input[lower] as f64 * (1.0 - weight) + input[upper] as f64 * weight) as f32
                }
            })
            .collect();

        debug!(
            "Resampled {} samples at {}Hz to {} samples at {}Hz",
            input.len(),
            input_rate,
            output.len(),
            output_rate
        );

        Cow::Owned(output)
    }

    /// Owned variant: hands the buffer back untouched when no conversion is needed.
    pub fn resample_owned(input: Vec<f32>, input_rate: u32, output_rate: u32) -> Vec<f32> {
        if input_rate == output_rate || input.is_empty() || input_rate == 0 || output_rate == 0 {
            return input;
        }
        Self::resample(&input, input_rate, output_rate).into_owned()
    }

    /// Output length for a conversion: `round(len * output_rate / input_rate)`.
    pub fn output_len(input_len: usize, input_rate: u32, output_rate: u32) -> usize {
        if input_rate == output_rate || input_rate == 0 {
            return input_len;
        }
        (input_len as f64 * output_rate as f64 / input_rate as f64).round() as usize
    }
}
