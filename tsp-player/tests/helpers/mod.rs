//! Test helper modules for tsp-player integration tests
//!
//! - audio_generator: in-memory WAV containers and chunk payloads
//! - test_outputs: player configs and output backends for headless runs

#![allow(dead_code)]

pub mod audio_generator;
pub mod test_outputs;

pub use audio_generator::{
    generate_silent_wav, generate_sine_wav, to_base64, to_data_url, wav_from_i16, with_format_tag,
};
pub use test_outputs::{null_config, FlakyOutput};
