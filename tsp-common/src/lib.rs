//! # TSP Common Library
//!
//! Shared code for the streaming TTS player:
//! - Configuration loading (TOML, env override, platform defaults)
//! - Event and stats types exchanged between the render and control sides
//! - Sample/time conversion helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use config::{OutputBackendKind, OutputConfig, PlayerConfig};
pub use error::{Error, Result};
pub use events::{StatsReport, StreamEvent};
