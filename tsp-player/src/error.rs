//! Error types for tsp-player
//!
//! Defines the player error taxonomy using thiserror. Container errors are
//! local to a single submitted chunk; `StreamStopped` and `TicketNotFound`
//! surface from `wait_until_finish`; `Init` means no output context exists.

use thiserror::Error;

/// Main error type for tsp-player
#[derive(Error, Debug)]
pub enum Error {
    /// No audio output capability (device missing or unusable)
    #[error("Audio init error: {0}")]
    Init(String),

    /// Container signature not recognized or malformed section
    #[error("Invalid container: {0}")]
    Format(String),

    /// Container encoding is not linear PCM
    #[error("Unsupported codec: format tag {0} (only linear PCM is supported)")]
    UnsupportedCodec(u16),

    /// PCM bit depth outside 8/16/24/32
    #[error("Unsupported bits per sample: {0}")]
    UnsupportedBitDepth(u16),

    /// Buffer ended before a data section was found
    #[error("Truncated data: {0}")]
    TruncatedData(String),

    /// Chunk payload is not valid base64
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Operation requires `init()` first (or the controller was destroyed)
    #[error("Audio output not initialized")]
    NotInitialized,

    /// Operation requires an active stream
    #[error("Stream not started")]
    NotStreaming,

    /// Unknown (never issued, already awaited, or reset) ticket
    #[error("Ticket not found: {0}")]
    TicketNotFound(i64),

    /// Stream was torn down while waiting on a ticket
    #[error("Stream stopped before media finished")]
    StreamStopped,

    /// Backlog exceeded the configured cap; the chunk was dropped
    #[error("Audio queue is too large ({queued_seconds:.2}s > {max_seconds:.2}s)")]
    QueueOverflow { queued_seconds: f64, max_seconds: f64 },

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] tsp_common::Error),
}

/// Convenience Result type using tsp-player Error
pub type Result<T> = std::result::Result<T, Error>;
