//! # TSP Streaming Player Library (tsp-player)
//!
//! Plays incrementally delivered WAV chunks (typically text-to-speech output)
//! as one continuous stream.
//!
//! **Architecture:** a control-side `StreamController` decodes and resamples
//! each chunk, then hands it to a real-time `RenderLoop` over a lock-free
//! ring. The render side reports playback progress and signal level back
//! over a second ring. Audio output is cpal, or a clock-driven null device.

pub mod audio;
pub mod error;
pub mod playback;

pub use error::{Error, Result};
pub use playback::{StreamController, TicketId};
