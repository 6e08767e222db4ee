//! Event types for the streaming player
//!
//! `StatsReport` is the render→control wire message; `StreamEvent` is what
//! the controller broadcasts to observers (CLI, lip-sync driver, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Periodic render-side snapshot of playback progress and signal level.
///
/// Serialized form: `{"type":"stats","volume":..,"playedSamples":..,"queueSamples":..,"underrunCount":..}`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename = "stats", rename_all = "camelCase")]
pub struct StatsReport {
    /// Smoothed loudness estimate (mouth-openness signal)
    pub volume: f32,
    /// Samples actually rendered from queued audio since the render side started
    pub played_samples: u64,
    /// Samples still waiting in the render queue
    pub queue_samples: u64,
    /// Render frames that ran out of queued audio
    pub underrun_count: u64,
}

/// Why a submitted chunk was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NotInitialized,
    NotStreaming,
    InvalidEncoding,
    InvalidContainer,
    QueueOverflow,
}

/// Events broadcast by the stream controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Streaming started at the given output rate
    StreamStarted {
        sample_rate: u32,
        timestamp: DateTime<Utc>,
    },

    /// Streaming stopped and all counters were reset
    StreamStopped {
        timestamp: DateTime<Utc>,
    },

    /// A chunk was decoded and scheduled
    ChunkAccepted {
        ticket: i64,
        samples: u64,
        end_sample_index: u64,
        timestamp: DateTime<Utc>,
    },

    /// A chunk was dropped
    ChunkRejected {
        reason: RejectReason,
        timestamp: DateTime<Utc>,
    },

    /// Latest render stats applied on the control side
    Stats {
        report: StatsReport,
        timestamp: DateTime<Utc>,
    },

    /// A waited-on ticket finished playing
    TicketFinished {
        ticket: i64,
        timestamp: DateTime<Utc>,
    },
}
