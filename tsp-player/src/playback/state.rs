//! Control-side stream state
//!
//! `total_samples_scheduled` is owned by the controller. The render-reported
//! fields are only ever written by applying the latest `StatsReport`, so
//! reads are a recent but possibly stale snapshot.

use chrono::{DateTime, Utc};
use tsp_common::StatsReport;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamState {
    /// Cumulative samples accepted since the stream started
    pub total_samples_scheduled: u64,
    /// Last render-reported played position
    pub played_samples: u64,
    /// Last render-reported backlog
    pub queue_samples: u64,
    /// Last render-reported underrun count
    pub underrun_count: u64,
    /// Last render-reported smoothed level
    pub volume: f32,
    pub last_volume_update: Option<DateTime<Utc>>,
    pub is_streaming: bool,
    pub is_playing: bool,
}

impl StreamState {
    /// Back to the stopped state with all counters at zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn apply(&mut self, report: &StatsReport, at: DateTime<Utc>) {
        self.played_samples = report.played_samples;
        self.queue_samples = report.queue_samples;
        self.underrun_count = report.underrun_count;
        self.volume = report.volume;
        self.last_volume_update = Some(at);
    }

    /// Scheduled samples not yet reported as played
    pub fn remaining_samples(&self) -> u64 {
        self.total_samples_scheduled.saturating_sub(self.played_samples)
    }
}
