//! Stream controller (control side)
//!
//! Owns the output context lifecycle, turns submitted WAV chunks into
//! render commands, issues media tickets, and exposes playback position.
//!
//! **Threading:** every public method takes `&self`; state lives behind one
//! mutex that is never held across an await or while decoding. The render
//! side is reached only through the lock-free rings in `ring_buffer`.
//!
//! **Servicing:** there is no background task. Each control operation first
//! (re)attaches the render side if needed, flushes chunks waiting for ring
//! space, and applies the newest stats report.

use crate::audio::output::{open_output, ContextState, OutputBackend};
use crate::audio::resampler::Resampler;
use crate::audio::types::AudioChunk;
use crate::audio::wav::decode_wav;
use crate::error::{Error, Result};
use crate::playback::render::RenderLoop;
use crate::playback::ring_buffer::{render_channel, ControlEndpoint, RenderCommand};
use crate::playback::state::StreamState;
use crate::playback::tickets::{MediaTicket, TicketId, TicketTable};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tsp_common::events::RejectReason;
use tsp_common::time::{now, samples_to_seconds};
use tsp_common::{PlayerConfig, StatsReport, StreamEvent};

/// Buffered events per subscriber before slow receivers start lagging
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Result of `init()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitStatus {
    /// Fixed output rate of the acquired context
    pub sample_rate: u32,
    /// Context came up suspended; `start_stream()` will resume it
    pub suspended: bool,
}

struct ControllerInner {
    output: Option<Box<dyn OutputBackend>>,
    output_rate: u32,
    render: Option<ControlEndpoint>,
    /// Accepted chunks not yet handed to the render side, in submission order
    pending: VecDeque<AudioChunk>,
    state: StreamState,
    tickets: TicketTable,
    /// Bumped on every start/stop so waits can detect a restarted stream
    generation: u64,
}

impl ControllerInner {
    fn ensure_render_side(&mut self, config: &PlayerConfig) {
        if self.render.is_some() {
            return;
        }
        let Some(output) = self.output.as_mut() else {
            return;
        };

        let (control, render_endpoint) = render_channel(config.command_capacity);
        let render = RenderLoop::new(render_endpoint, self.output_rate, config.command_capacity);

        match output.attach(render) {
            Ok(()) => {
                debug!("Render loop attached at {} Hz", self.output_rate);
                self.render = Some(control);
            }
            Err(e) => warn!(
                "Render side not ready ({} chunks pending): {}",
                self.pending.len(),
                e
            ),
        }
    }

    fn flush_pending(&mut self) {
        let Some(render) = self.render.as_mut() else {
            return;
        };

        while let Some(chunk) = self.pending.pop_front() {
            match render.send(RenderCommand::Enqueue(chunk)) {
                Ok(()) => {}
                Err(RenderCommand::Enqueue(chunk)) => {
                    self.pending.push_front(chunk);
                    debug!("Command ring full, {} chunks pending", self.pending.len());
                    break;
                }
                Err(RenderCommand::Clear) => break,
            }
        }
    }

    fn teardown_stream(&mut self) {
        if let Some(mut render) = self.render.take() {
            // Silence anything the device plays before the detach lands
            let _ = render.send(RenderCommand::Clear);
            if let Some(output) = self.output.as_mut() {
                output.detach();
            }
        }
        self.pending.clear();
        self.tickets.clear();
        self.state.reset();
        self.generation += 1;
    }

    fn context_usable(&self) -> bool {
        self.output
            .as_ref()
            .is_some_and(|output| output.state() != ContextState::Closed)
    }
}

/// Control-thread façade over the streaming pipeline.
///
/// Share it between tasks with `Arc`; `wait_until_finish` borrows it for the
/// duration of the wait.
pub struct StreamController {
    config: PlayerConfig,
    inner: Mutex<ControllerInner>,
    events: broadcast::Sender<StreamEvent>,
}

impl StreamController {
    /// Create a controller. No output context is acquired until `init()`.
    pub fn new(config: PlayerConfig) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let tickets = TicketTable::new(config.max_completed_tickets);

        Ok(Self {
            config,
            inner: Mutex::new(ControllerInner {
                output: None,
                output_rate: 0,
                render: None,
                pending: VecDeque::new(),
                state: StreamState::default(),
                tickets,
                generation: 0,
            }),
            events,
        })
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, ControllerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StreamEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Attach the render side if due, flush pending chunks, apply fresh stats
    fn service(&self, inner: &mut ControllerInner) {
        if inner.state.is_streaming {
            inner.ensure_render_side(&self.config);
            inner.flush_pending();
        }

        let latest = inner.render.as_mut().and_then(|render| render.latest_stats());
        if let Some(report) = latest {
            let timestamp = now();
            inner.state.apply(&report, timestamp);
            self.emit(StreamEvent::Stats { report, timestamp });
        }
    }

    /// Acquire the configured audio output context.
    ///
    /// A context that starts suspended is reported through
    /// `InitStatus::suspended` rather than as an error. Calling `init()` on an
    /// initialized controller returns the current status.
    pub fn init(&self) -> Result<InitStatus> {
        {
            let inner = self.lock();
            if let Some(output) = inner.output.as_ref() {
                warn!("init() called on an initialized controller");
                return Ok(InitStatus {
                    sample_rate: inner.output_rate,
                    suspended: output.state() == ContextState::Suspended,
                });
            }
        }

        let output = open_output(&self.config.output).map_err(|e| match e {
            Error::Init(_) => e,
            other => Error::Init(other.to_string()),
        })?;
        self.init_with(output)
    }

    /// Adopt an already opened output backend
    pub fn init_with(&self, output: Box<dyn OutputBackend>) -> Result<InitStatus> {
        let state = output.state();
        if state == ContextState::Closed {
            return Err(Error::Init("Output context is closed".to_string()));
        }
        let sample_rate = output.sample_rate();
        if sample_rate == 0 {
            return Err(Error::Init("Output reports a zero sample rate".to_string()));
        }

        let mut inner = self.lock();
        if let Some(mut previous) = inner.output.take() {
            inner.teardown_stream();
            previous.close();
        }
        inner.output = Some(output);
        inner.output_rate = sample_rate;

        let suspended = state == ContextState::Suspended;
        info!(
            "Audio context initialized: {} Hz{}",
            sample_rate,
            if suspended { " (suspended)" } else { "" }
        );

        Ok(InitStatus { sample_rate, suspended })
    }

    /// Begin streaming. Logs and does nothing if not initialized or already
    /// streaming.
    pub fn start_stream(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let Some(output) = inner.output.as_mut() else {
            warn!("start_stream() called before init()");
            return;
        };
        if inner.state.is_streaming {
            warn!("start_stream() called while already streaming");
            return;
        }

        match output.state() {
            ContextState::Closed => {
                warn!("start_stream() on a closed audio context");
                return;
            }
            ContextState::Suspended => {
                if let Err(e) = output.resume() {
                    warn!("Failed to resume suspended audio context: {}", e);
                }
            }
            ContextState::Running => {}
        }

        inner.state.reset();
        inner.state.is_streaming = true;
        inner.state.is_playing = true;
        inner.generation += 1;
        let sample_rate = inner.output_rate;

        self.service(inner);
        drop(guard);

        info!("Stream started at {} Hz", sample_rate);
        self.emit(StreamEvent::StreamStarted {
            sample_rate,
            timestamp: now(),
        });
    }

    /// Submit one base64 (optionally data-URL prefixed) WAV chunk.
    ///
    /// Returns `TicketId::INVALID` if the chunk was rejected; the reason is
    /// logged and broadcast as `StreamEvent::ChunkRejected`.
    pub fn add_data(&self, payload: &str) -> TicketId {
        self.try_add_data(payload).unwrap_or(TicketId::INVALID)
    }

    /// `add_data` with the rejection cause
    pub fn try_add_data(&self, payload: &str) -> Result<TicketId> {
        let result = self
            .streaming_generation()
            .and_then(|generation| {
                let bytes = decode_payload(payload)?;
                self.schedule_wav(&bytes, generation)
            });
        self.note_rejection(result)
    }

    /// Submit raw WAV container bytes
    pub fn try_add_wav(&self, wav: &[u8]) -> Result<TicketId> {
        let result = self
            .streaming_generation()
            .and_then(|generation| self.schedule_wav(wav, generation));
        self.note_rejection(result)
    }

    fn streaming_generation(&self) -> Result<u64> {
        let inner = self.lock();
        if inner.output.is_none() {
            return Err(Error::NotInitialized);
        }
        if !inner.state.is_streaming {
            return Err(Error::NotStreaming);
        }
        Ok(inner.generation)
    }

    fn note_rejection(&self, result: Result<TicketId>) -> Result<TicketId> {
        if let Err(e) = &result {
            warn!("Chunk rejected: {}", e);
            if let Some(reason) = reject_reason(e) {
                self.emit(StreamEvent::ChunkRejected {
                    reason,
                    timestamp: now(),
                });
            }
        }
        result
    }

    /// Decode and resample outside the lock, then schedule under it
    fn schedule_wav(&self, wav: &[u8], generation: u64) -> Result<TicketId> {
        let decoded = decode_wav(wav)?;
        let source_rate = decoded.sample_rate;
        let output_rate = self.lock().output_rate;

        let mono = decoded.into_mono();
        let samples = Resampler::resample_owned(mono, source_rate, output_rate);
        if samples.is_empty() {
            return Err(Error::TruncatedData("chunk holds no whole samples".to_string()));
        }
        let chunk = AudioChunk::new(samples);
        let chunk_len = chunk.len() as u64;

        let mut inner = self.lock();
        if inner.generation != generation || !inner.state.is_streaming {
            return Err(Error::NotStreaming);
        }

        self.service(&mut inner);

        let queued_seconds = samples_to_seconds(inner.state.remaining_samples(), inner.output_rate);
        if queued_seconds > self.config.max_queue_seconds {
            return Err(Error::QueueOverflow {
                queued_seconds,
                max_seconds: self.config.max_queue_seconds,
            });
        }

        inner.state.total_samples_scheduled += chunk_len;
        let end_sample_index = inner.state.total_samples_scheduled;
        let ticket = inner.tickets.issue(end_sample_index);

        inner.pending.push_back(chunk);
        inner.flush_pending();

        let played = inner.state.played_samples;
        let pruned = inner.tickets.prune_completed(played);
        if pruned > 0 {
            debug!("Pruned {} completed tickets nobody waited on", pruned);
        }
        drop(inner);

        debug!(
            "Chunk accepted: ticket={}, {} samples ({} Hz -> {} Hz), end={}",
            ticket, chunk_len, source_rate, output_rate, end_sample_index
        );
        self.emit(StreamEvent::ChunkAccepted {
            ticket: ticket.value(),
            samples: chunk_len,
            end_sample_index,
            timestamp: now(),
        });

        Ok(ticket)
    }

    /// Wait until the chunk behind `id` has been fully played.
    ///
    /// Polls every `wait_poll_interval_ms`. Fails with `TicketNotFound` for
    /// an unknown id, and with `StreamStopped` if the stream stops (or the
    /// context closes) first. The ticket is released on every exit, including
    /// when the returned future is dropped.
    pub async fn wait_until_finish(&self, id: TicketId) -> Result<()> {
        let (end_sample_index, generation) = {
            let mut inner = self.lock();
            self.service(&mut inner);
            let ticket = inner.tickets.get(id).ok_or(Error::TicketNotFound(id.value()))?;
            (ticket.end_sample_index, inner.generation)
        };

        let _guard = TicketGuard { controller: self, id };

        let mut interval = tokio::time::interval(Duration::from_millis(self.config.wait_poll_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let mut inner = self.lock();
            self.service(&mut inner);

            if inner.generation != generation || !inner.state.is_streaming || !inner.context_usable() {
                debug!("Wait on ticket {} ended by stream teardown", id);
                return Err(Error::StreamStopped);
            }

            if inner.state.played_samples >= end_sample_index {
                drop(inner);
                debug!("Ticket {} finished", id);
                self.emit(StreamEvent::TicketFinished {
                    ticket: id.value(),
                    timestamp: now(),
                });
                return Ok(());
            }

            if inner.tickets.get(id).is_none() {
                return Err(Error::TicketNotFound(id.value()));
            }
        }
    }

    /// Suspend audio output, keeping queued and scheduled audio
    pub fn pause(&self) -> Result<()> {
        let mut inner = self.lock();
        let output = inner.output.as_mut().ok_or(Error::NotInitialized)?;
        output.suspend()?;
        inner.state.is_playing = false;
        info!("Playback paused");
        Ok(())
    }

    /// Resume audio output after `pause()`
    pub fn resume(&self) -> Result<()> {
        let mut inner = self.lock();
        let output = inner.output.as_mut().ok_or(Error::NotInitialized)?;
        output.resume()?;
        inner.state.is_playing = inner.state.is_streaming;
        info!("Playback resumed");
        Ok(())
    }

    /// Stop streaming: zero all counters, drop pending and queued audio,
    /// release every ticket, tear down the render side. Idempotent.
    pub fn stop(&self) {
        let mut inner = self.lock();
        let was_streaming = inner.state.is_streaming;
        inner.teardown_stream();
        drop(inner);

        if was_streaming {
            info!("Stream stopped");
            self.emit(StreamEvent::StreamStopped { timestamp: now() });
        }
    }

    /// `stop()` and release the output context. Idempotent; afterwards the
    /// controller behaves as never initialized.
    pub fn destroy(&self) {
        self.stop();

        let mut inner = self.lock();
        if let Some(mut output) = inner.output.take() {
            output.close();
            inner.output_rate = 0;
            info!("Audio context released");
        }
    }

    /// Seconds of audio accepted since the stream started
    pub fn total_duration(&self) -> f64 {
        let mut inner = self.lock();
        self.service(&mut inner);
        samples_to_seconds(inner.state.total_samples_scheduled, inner.output_rate)
    }

    /// Seconds of accepted audio not yet played
    pub fn remaining_duration(&self) -> f64 {
        let mut inner = self.lock();
        self.service(&mut inner);
        samples_to_seconds(inner.state.remaining_samples(), inner.output_rate)
    }

    /// Seconds of audio played since the stream started
    pub fn current_time(&self) -> f64 {
        let mut inner = self.lock();
        self.service(&mut inner);
        samples_to_seconds(inner.state.played_samples, inner.output_rate)
    }

    /// Latest smoothed signal level (mouth-openness driver)
    pub fn volume(&self) -> f32 {
        let mut inner = self.lock();
        self.service(&mut inner);
        inner.state.volume
    }

    pub fn last_volume_update(&self) -> Option<DateTime<Utc>> {
        self.lock().state.last_volume_update
    }

    /// Drain pending render reports and return the applied counters
    pub fn pump_stats(&self) -> StatsReport {
        let mut inner = self.lock();
        self.service(&mut inner);
        StatsReport {
            volume: inner.state.volume,
            played_samples: inner.state.played_samples,
            queue_samples: inner.state.queue_samples,
            underrun_count: inner.state.underrun_count,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Copy of the control-side stream state
    pub fn snapshot(&self) -> StreamState {
        let mut inner = self.lock();
        self.service(&mut inner);
        inner.state.clone()
    }

    pub fn ticket(&self, id: TicketId) -> Option<MediaTicket> {
        self.lock().tickets.get(id).cloned()
    }

    /// Tickets currently held in the table
    pub fn ticket_count(&self) -> usize {
        self.lock().tickets.len()
    }

    /// Accepted chunks still waiting to reach the render side
    pub fn pending_chunks(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().state.is_streaming
    }

    pub fn is_playing(&self) -> bool {
        self.lock().state.is_playing
    }

    pub fn is_context_suspended(&self) -> bool {
        self.lock()
            .output
            .as_ref()
            .is_some_and(|output| output.state() == ContextState::Suspended)
    }

    /// Output rate of the acquired context
    pub fn output_sample_rate(&self) -> Option<u32> {
        let inner = self.lock();
        inner.output.as_ref().map(|_| inner.output_rate)
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Removes a ticket from the table when a wait on it exits
struct TicketGuard<'a> {
    controller: &'a StreamController,
    id: TicketId,
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        self.controller.lock().tickets.remove(self.id);
    }
}

/// Strip an optional `data:<mime>;base64,` prefix and decode the payload
pub fn decode_payload(payload: &str) -> Result<Vec<u8>> {
    let trimmed = payload.trim();
    let encoded = match trimmed.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, data)| data),
        None => trimmed,
    };
    Ok(STANDARD.decode(encoded)?)
}

fn reject_reason(error: &Error) -> Option<RejectReason> {
    match error {
        Error::NotInitialized => Some(RejectReason::NotInitialized),
        Error::NotStreaming => Some(RejectReason::NotStreaming),
        Error::Base64(_) => Some(RejectReason::InvalidEncoding),
        Error::Format(_)
        | Error::UnsupportedCodec(_)
        | Error::UnsupportedBitDepth(_)
        | Error::TruncatedData(_) => Some(RejectReason::InvalidContainer),
        Error::QueueOverflow { .. } => Some(RejectReason::QueueOverflow),
        _ => None,
    }
}
