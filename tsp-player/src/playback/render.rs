//! Real-time render loop
//!
//! Called once per fixed-size output frame by the audio backend. Each call:
//! 1. applies pending control commands,
//! 2. drains the render queue into the frame (silence + one underrun if it runs dry),
//! 3. updates the smoothed signal level,
//! 4. publishes a stats report every ~50ms of output.
//!
//! **REAL-TIME SAFE**: never locks or logs. The only
//! allocation is the queue growing past its preallocated capacity.

use crate::playback::queue::RenderQueue;
use crate::playback::ring_buffer::{RenderCommand, RenderEndpoint};
use tsp_common::StatsReport;

/// Seconds of output between stats reports
pub const REPORT_INTERVAL_SECONDS: f64 = 0.05;

/// Samples between stats reports at `sample_rate`: `max(1, floor(rate * 0.05))`
pub fn report_interval_samples(sample_rate: u32) -> usize {
    ((sample_rate as f64 * REPORT_INTERVAL_SECONDS).floor() as usize).max(1)
}

/// Loudness estimate driving the mouth-openness signal.
///
/// raw = `max(rms, peak * 0.7) * 10`, smoothed = `0.5 * raw + 0.5 * previous`.
/// The arithmetic is kept exactly as downstream animation expects it.
#[derive(Debug, Default, Clone)]
pub struct LevelMeter {
    smoothed: f32,
}

impl LevelMeter {
    const PEAK_WEIGHT: f32 = 0.7;
    const GAIN: f32 = 10.0;
    const SMOOTHING: f32 = 0.5;

    /// Unsmoothed level of one frame (0.0 for an empty frame)
    pub fn raw_level(frame: &[f32]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }

        let mut sum_squares = 0.0f32;
        let mut peak = 0.0f32;
        for &sample in frame {
            sum_squares += sample * sample;
            peak = peak.max(sample.abs());
        }

        let rms = (sum_squares / frame.len() as f32).sqrt();
        rms.max(peak * Self::PEAK_WEIGHT) * Self::GAIN
    }

    /// Fold one frame into the smoothed level and return it
    pub fn update(&mut self, frame: &[f32]) -> f32 {
        let raw = Self::raw_level(frame);
        self.smoothed = Self::SMOOTHING * raw + (1.0 - Self::SMOOTHING) * self.smoothed;
        self.smoothed
    }

    pub fn level(&self) -> f32 {
        self.smoothed
    }

    pub fn reset(&mut self) {
        self.smoothed = 0.0;
    }
}

/// Render-side consumer: owns the queue and all render counters.
pub struct RenderLoop {
    endpoint: RenderEndpoint,
    queue: RenderQueue,
    meter: LevelMeter,
    played_samples: u64,
    underrun_count: u64,
    samples_since_report: usize,
    report_interval: usize,
}

impl RenderLoop {
    /// Create a render loop for an output running at `sample_rate`.
    ///
    /// `queue_capacity` chunks are preallocated so steady-state enqueues do
    /// not reallocate.
    pub fn new(endpoint: RenderEndpoint, sample_rate: u32, queue_capacity: usize) -> Self {
        Self {
            endpoint,
            queue: RenderQueue::with_capacity(queue_capacity),
            meter: LevelMeter::default(),
            played_samples: 0,
            underrun_count: 0,
            samples_since_report: 0,
            report_interval: report_interval_samples(sample_rate),
        }
    }

    /// Render one mono frame into `out`.
    pub fn process(&mut self, out: &mut [f32]) {
        self.apply_commands();

        if out.is_empty() {
            return;
        }

        let filled = self.queue.fill(out);
        if filled < out.len() {
            out[filled..].fill(0.0);
            self.underrun_count += 1;
        }
        self.played_samples += filled as u64;

        self.meter.update(out);

        self.samples_since_report += out.len();
        if self.samples_since_report >= self.report_interval {
            self.samples_since_report = 0;
            self.endpoint.report(self.stats());
        }
    }

    fn apply_commands(&mut self) {
        while let Some(command) = self.endpoint.next_command() {
            match command {
                RenderCommand::Enqueue(chunk) => self.queue.push(chunk),
                RenderCommand::Clear => self.reset(),
            }
        }
    }

    fn reset(&mut self) {
        self.queue.clear();
        self.meter.reset();
        self.played_samples = 0;
        self.underrun_count = 0;
        self.samples_since_report = 0;
    }

    /// Current counters as a report
    pub fn stats(&self) -> StatsReport {
        StatsReport {
            volume: self.meter.level(),
            played_samples: self.played_samples,
            queue_samples: self.queue.queued_samples(),
            underrun_count: self.underrun_count,
        }
    }

    pub fn played_samples(&self) -> u64 {
        self.played_samples
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count
    }

    pub fn queued_samples(&self) -> u64 {
        self.queue.queued_samples()
    }

    pub fn report_interval(&self) -> usize {
        self.report_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::AudioChunk;
    use crate::playback::ring_buffer::{render_channel, ControlEndpoint};

    fn setup(sample_rate: u32) -> (ControlEndpoint, RenderLoop) {
        let (control, render) = render_channel(16);
        (control, RenderLoop::new(render, sample_rate, 16))
    }

    fn enqueue(control: &mut ControlEndpoint, samples: Vec<f32>) {
        control
            .send(RenderCommand::Enqueue(AudioChunk::new(samples)))
            .unwrap();
    }

    #[test]
    fn test_report_interval() {
        assert_eq!(report_interval_samples(24000), 1200);
        assert_eq!(report_interval_samples(44100), 2205);
        assert_eq!(report_interval_samples(10), 1);
    }

    #[test]
    fn test_drains_queue_in_order() {
        let (mut control, mut render) = setup(24000);
        enqueue(&mut control, vec![0.1, 0.2, 0.3]);
        enqueue(&mut control, vec![0.4]);

        let mut frame = [0.0; 4];
        render.process(&mut frame);

        assert_eq!(frame, [0.1, 0.2, 0.3, 0.4]);
        assert_eq!(render.played_samples(), 4);
        assert_eq!(render.underrun_count(), 0);
        assert_eq!(render.queued_samples(), 0);
    }

    #[test]
    fn test_underrun_zero_fills_and_counts_once_per_frame() {
        let (mut control, mut render) = setup(24000);
        enqueue(&mut control, vec![0.5, 0.5, 0.5]);

        let mut frame = [1.0; 8];
        render.process(&mut frame);
        assert_eq!(&frame[..3], &[0.5, 0.5, 0.5]);
        assert!(frame[3..].iter().all(|&s| s == 0.0));
        assert_eq!(render.underrun_count(), 1);
        assert_eq!(render.played_samples(), 3);

        for _ in 0..5 {
            let mut frame = [1.0; 8];
            render.process(&mut frame);
            assert!(frame.iter().all(|&s| s == 0.0));
        }
        assert_eq!(render.underrun_count(), 6);
        // Silence does not advance the played position
        assert_eq!(render.played_samples(), 3);
    }

    #[test]
    fn test_exact_fill_is_not_an_underrun() {
        let (mut control, mut render) = setup(24000);
        enqueue(&mut control, vec![0.1; 8]);

        let mut frame = [0.0; 8];
        render.process(&mut frame);
        assert_eq!(render.underrun_count(), 0);
    }

    #[test]
    fn test_clear_resets_counters() {
        let (mut control, mut render) = setup(24000);
        enqueue(&mut control, vec![0.3; 4]);

        let mut frame = [0.0; 8];
        render.process(&mut frame);
        assert_eq!(render.played_samples(), 4);

        enqueue(&mut control, vec![0.3; 100]);
        control.send(RenderCommand::Clear).unwrap();
        render.process(&mut frame);

        // Clear applied after the enqueue: queue empty, counters restarted
        assert_eq!(render.queued_samples(), 0);
        assert_eq!(render.played_samples(), 0);
        assert_eq!(render.underrun_count(), 1);
    }

    #[test]
    fn test_reports_every_interval() {
        // 100 Hz -> report every 5 samples
        let (mut control, mut render) = setup(100);
        assert_eq!(render.report_interval(), 5);
        enqueue(&mut control, vec![0.2; 12]);

        let mut frame = [0.0; 2];
        render.process(&mut frame); // 2 since last report
        render.process(&mut frame); // 4
        assert!(control.latest_stats().is_none());

        render.process(&mut frame); // 6 -> report
        let report = control.latest_stats().expect("report after interval");
        assert_eq!(report.played_samples, 6);
        assert_eq!(report.queue_samples, 6);
        assert_eq!(report.underrun_count, 0);
        assert!(report.volume > 0.0);
    }

    #[test]
    fn test_stats_current_after_long_undrained_run() {
        // 10s at 24 kHz in 128-sample frames, control side never reads
        let (mut control, mut render) = setup(24000);
        enqueue(&mut control, vec![0.1; 240_000]);

        let mut frame = [0.0; 128];
        while render.queued_samples() > 0 {
            render.process(&mut frame);
        }
        // One more report interval of silence; played position stays put
        for _ in 0..10 {
            render.process(&mut frame);
        }

        let report = control.latest_stats().expect("report after 10s of output");
        assert_eq!(report.played_samples, render.played_samples());
        assert_eq!(report.played_samples, 240_000);
        assert_eq!(report.queue_samples, 0);
    }

    #[test]
    fn test_level_meter_formula() {
        // Constant 0.1: rms = 0.1, peak*0.7 = 0.07 -> raw = 1.0
        let raw = LevelMeter::raw_level(&[0.1; 16]);
        assert!((raw - 1.0).abs() < 1e-5);

        // Single spike: peak dominates -> 0.7 * 10 = 7.0 when rms is small
        let mut spike = [0.0f32; 100];
        spike[0] = 1.0;
        let raw = LevelMeter::raw_level(&spike);
        assert!((raw - 7.0).abs() < 1e-5);

        let mut meter = LevelMeter::default();
        let first = meter.update(&[0.1; 16]);
        assert!((first - 0.5).abs() < 1e-5);
        let second = meter.update(&[0.1; 16]);
        assert!((second - 0.75).abs() < 1e-5);
        let decayed = meter.update(&[0.0; 16]);
        assert!((decayed - 0.375).abs() < 1e-5);
    }

    #[test]
    fn test_empty_frame_is_noop() {
        let (_control, mut render) = setup(24000);
        render.process(&mut []);
        assert_eq!(render.underrun_count(), 0);
        assert_eq!(render.stats().volume, 0.0);
    }
}
