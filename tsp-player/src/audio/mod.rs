//! Audio decoding, rate conversion and output backends

pub mod null_output;
pub mod output;
pub mod resampler;
pub mod types;
pub mod wav;

pub use null_output::NullOutput;
pub use output::{open_output, ContextState, CpalOutput, OutputBackend};
pub use resampler::Resampler;
pub use types::{AudioChunk, DecodedAudio};
pub use wav::{decode_wav, encode_pcm_wav};
