//! Clock-driven virtual output device
//!
//! Renders fixed-size frames on a background thread at `speed ×` real time
//! and discards the audio. Used for headless runs and tests.

use crate::audio::output::{ContextState, OutputBackend, SharedContextState};
use crate::error::{Error, Result};
use crate::playback::render::RenderLoop;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};
use tsp_common::OutputConfig;

/// Rate used when the config does not name one
pub const DEFAULT_NULL_SAMPLE_RATE: u32 = 24000;

/// Frames rendered per wake-up before the clock is resynchronized
const MAX_BURST_FRAMES: u64 = 64;

const SUSPENDED_POLL: Duration = Duration::from_millis(5);
const MIN_WAIT: Duration = Duration::from_micros(200);

pub struct NullOutput {
    sample_rate: u32,
    frame_size: usize,
    speed: f64,
    state: SharedContextState,
    worker: Option<Worker>,
}

struct Worker {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl NullOutput {
    pub fn new(config: &OutputConfig) -> Self {
        let initial = if config.null_start_suspended {
            ContextState::Suspended
        } else {
            ContextState::Running
        };

        Self {
            sample_rate: config.sample_rate.unwrap_or(DEFAULT_NULL_SAMPLE_RATE),
            frame_size: config.null_frame_size.max(1),
            speed: config.null_speed,
            state: SharedContextState::new(initial),
            worker: None,
        }
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(worker.shutdown);
            if worker.handle.join().is_err() {
                error!("Null output thread panicked");
            }
        }
    }
}

impl OutputBackend for NullOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn state(&self) -> ContextState {
        self.state.get()
    }

    fn attach(&mut self, render: RenderLoop) -> Result<()> {
        if self.state.get() == ContextState::Closed {
            return Err(Error::AudioOutput("Output context is closed".to_string()));
        }
        self.stop_worker();

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let clock = FrameClock {
            frames_per_second: self.sample_rate as f64 * self.speed / self.frame_size as f64,
        };
        let frame_size = self.frame_size;
        let state = self.state.clone();

        let handle = thread::Builder::new()
            .name("tsp-null-output".to_string())
            .spawn(move || null_thread(render, frame_size, clock, state, shutdown_rx))
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn null output thread: {}", e)))?;

        debug!(
            "Null output attached: {} Hz, {} frames, {:.1}x",
            self.sample_rate, self.frame_size, self.speed
        );

        self.worker = Some(Worker {
            shutdown: shutdown_tx,
            handle,
        });
        Ok(())
    }

    fn detach(&mut self) {
        self.stop_worker();
    }

    fn suspend(&mut self) -> Result<()> {
        self.state.transition(ContextState::Suspended);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.state.transition(ContextState::Running);
        Ok(())
    }

    fn close(&mut self) {
        self.state.set(ContextState::Closed);
        self.stop_worker();
    }
}

impl Drop for NullOutput {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameClock {
    frames_per_second: f64,
}

impl FrameClock {
    /// Whole frames due after `elapsed` of wall time
    fn frames_due(&self, elapsed: Duration) -> u64 {
        (elapsed.as_secs_f64() * self.frames_per_second).floor() as u64
    }

    /// Wall time at which frame number `frame` is due
    fn due_at(&self, frame: u64) -> Duration {
        Duration::from_secs_f64(frame as f64 / self.frames_per_second)
    }
}

fn null_thread(
    mut render: RenderLoop,
    frame_size: usize,
    clock: FrameClock,
    state: SharedContextState,
    shutdown: Receiver<()>,
) {
    let mut frame = vec![0.0f32; frame_size];
    let mut epoch = Instant::now();
    let mut rendered: u64 = 0;
    let mut running = false;

    loop {
        let wait = if state.get() == ContextState::Running {
            if !running {
                epoch = Instant::now();
                rendered = 0;
                running = true;
            }

            let due = clock.frames_due(epoch.elapsed());
            if due.saturating_sub(rendered) > MAX_BURST_FRAMES {
                // Fell too far behind; skip ahead instead of bursting
                rendered = due - MAX_BURST_FRAMES;
            }
            while rendered < due {
                render.process(&mut frame);
                rendered += 1;
            }

            clock
                .due_at(rendered + 1)
                .saturating_sub(epoch.elapsed())
                .max(MIN_WAIT)
        } else {
            running = false;
            SUSPENDED_POLL
        };

        match shutdown.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
