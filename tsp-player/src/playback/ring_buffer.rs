/// Lock-Free Command Ring and Stats Snapshot Between Control and Render Sides
///
/// The render callback must never block, so the two sides talk only through
/// lock-free primitives:
///
/// - control → render: `RenderCommand` over a single-producer single-consumer ring
/// - render → control: a latest-value `StatsReport` snapshot in atomics
///
/// Chunk buffers move through the ring; neither side touches the other's
/// state directly. A full command ring hands the value back to the caller
/// instead of waiting. Each stats publish overwrites the previous one, so the
/// control side always reads the newest report no matter how long it was idle.

use crate::audio::types::AudioChunk;
use ringbuf::{traits::*, HeapRb};
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use tsp_common::StatsReport;

/// Control → render message
#[derive(Debug)]
pub enum RenderCommand {
    /// Append a chunk to the render queue (ownership moves to the render side)
    Enqueue(AudioChunk),
    /// Drop all queued audio and reset render-side counters
    Clear,
}

/// Create a connected pair of channel endpoints.
///
/// # Arguments
/// * `command_capacity` - Slots in the control→render ring
pub fn render_channel(command_capacity: usize) -> (ControlEndpoint, RenderEndpoint) {
    let command_capacity = command_capacity.max(1);

    debug!("Creating render channel: {} command slots", command_capacity);

    let (command_tx, command_rx) = HeapRb::<RenderCommand>::new(command_capacity).split();
    let stats = Arc::new(StatsCell::default());

    let control = ControlEndpoint {
        commands: command_tx,
        stats: Arc::clone(&stats),
        last_sequence: 0,
    };

    let render = RenderEndpoint {
        commands: command_rx,
        stats,
    };

    (control, render)
}

/// Single-writer snapshot of the newest stats report.
///
/// Sequence-locked: the writer makes the sequence odd while it stores the
/// fields and even again when done; a reader retries if the sequence was odd
/// or moved during its loads. `volume` is stored as `f32` bits.
#[derive(Debug, Default)]
struct StatsCell {
    sequence: AtomicU64,
    volume_bits: AtomicU32,
    played_samples: AtomicU64,
    queue_samples: AtomicU64,
    underrun_count: AtomicU64,
}

impl StatsCell {
    /// Only the render side calls this
    fn publish(&self, report: &StatsReport) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.volume_bits.store(report.volume.to_bits(), Ordering::Relaxed);
        self.played_samples.store(report.played_samples, Ordering::Relaxed);
        self.queue_samples.store(report.queue_samples, Ordering::Relaxed);
        self.underrun_count.store(report.underrun_count, Ordering::Relaxed);

        self.sequence.store(sequence.wrapping_add(2), Ordering::Release);
    }

    /// Consistent copy of the snapshot and the sequence it was taken at
    fn read(&self) -> (u64, StatsReport) {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let report = StatsReport {
                volume: f32::from_bits(self.volume_bits.load(Ordering::Relaxed)),
                played_samples: self.played_samples.load(Ordering::Relaxed),
                queue_samples: self.queue_samples.load(Ordering::Relaxed),
                underrun_count: self.underrun_count.load(Ordering::Relaxed),
            };

            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) == before {
                return (before, report);
            }
        }
    }
}

/// Control-side half: sends commands, reads stats
pub struct ControlEndpoint {
    commands: ringbuf::HeapProd<RenderCommand>,
    stats: Arc<StatsCell>,
    last_sequence: u64,
}

impl ControlEndpoint {
    /// Push a command to the render side.
    ///
    /// Returns the command back if the ring is full.
    pub fn send(&mut self, command: RenderCommand) -> Result<(), RenderCommand> {
        self.commands.try_push(command)
    }

    /// Newest report, or `None` if nothing was published since the last call.
    pub fn latest_stats(&mut self) -> Option<StatsReport> {
        let (sequence, report) = self.stats.read();
        if sequence == self.last_sequence {
            return None;
        }
        self.last_sequence = sequence;
        Some(report)
    }

    /// Commands sent but not yet picked up by the render side
    pub fn pending_commands(&self) -> usize {
        self.commands.occupied_len()
    }
}

/// Render-side half: receives commands, publishes stats.
///
/// All operations are lock-free and never allocate.
pub struct RenderEndpoint {
    commands: ringbuf::HeapCons<RenderCommand>,
    stats: Arc<StatsCell>,
}

impl RenderEndpoint {
    /// Pop the next command, if any
    pub fn next_command(&mut self) -> Option<RenderCommand> {
        self.commands.try_pop()
    }

    /// Publish a stats snapshot, replacing the previous one
    pub fn report(&mut self, report: StatsReport) {
        self.stats.publish(&report);
    }
}
