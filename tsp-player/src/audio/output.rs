//! Audio output backends
//!
//! An output backend is the platform "audio context": it has a fixed output
//! rate, a running/suspended/closed state, and drives a `RenderLoop` once per
//! hardware frame after `attach()`.
//!
//! `CpalOutput` owns the cpal device and stream on a dedicated thread (cpal
//! streams are not `Send`) and receives commands over a crossbeam channel.
//! `NullOutput` (see `null_output`) is a clock-driven stand-in with no
//! hardware.

use crate::audio::null_output::NullOutput;
use crate::error::{Error, Result};
use crate::playback::render::RenderLoop;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use tsp_common::{OutputBackendKind, OutputConfig};

/// Lifecycle state of the output context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContextState {
    Running = 0,
    Suspended = 1,
    Closed = 2,
}

impl ContextState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ContextState::Running,
            1 => ContextState::Suspended,
            _ => ContextState::Closed,
        }
    }
}

/// Context state shared between a backend handle and its worker thread
#[derive(Debug, Clone)]
pub struct SharedContextState(Arc<AtomicU8>);

impl SharedContextState {
    pub fn new(initial: ContextState) -> Self {
        Self(Arc::new(AtomicU8::new(initial as u8)))
    }

    pub fn get(&self) -> ContextState {
        ContextState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ContextState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `state` unless the context is already closed
    pub fn transition(&self, state: ContextState) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ContextState::Closed as u8).then_some(state as u8)
            });
    }
}

/// Platform audio output context.
///
/// Implementations must be cheap to query from the control thread; all
/// blocking work happens on the backend's own thread.
pub trait OutputBackend: Send {
    /// Fixed output rate in Hz
    fn sample_rate(&self) -> u32;

    fn state(&self) -> ContextState;

    /// Start driving `render` once per output frame.
    ///
    /// Replaces any previously attached render loop.
    fn attach(&mut self, render: RenderLoop) -> Result<()>;

    /// Stop driving the render loop and drop it
    fn detach(&mut self);

    fn suspend(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Release the context. Idempotent; the backend is unusable afterwards.
    fn close(&mut self);
}

/// Open the backend selected by `config`
pub fn open_output(config: &OutputConfig) -> Result<Box<dyn OutputBackend>> {
    match config.backend {
        OutputBackendKind::Device => Ok(Box::new(CpalOutput::open(config)?)),
        OutputBackendKind::Null => Ok(Box::new(NullOutput::new(config))),
    }
}

/// List the names of available output devices
pub fn list_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
        .filter_map(|device| device.name().ok())
        .collect();

    debug!("Found {} output devices", devices.len());
    Ok(devices)
}

/// Mono render frames per pass when the host picks the buffer size
const DEFAULT_SCRATCH_FRAMES: usize = 4096;

enum DeviceCommand {
    Attach(RenderLoop, Sender<Result<()>>),
    Detach,
    Suspend(Sender<Result<()>>),
    Resume(Sender<Result<()>>),
    Close,
}

/// Negotiated device parameters, reported back by the worker thread
struct DeviceInfo {
    name: String,
    sample_rate: u32,
    channels: u16,
    sample_format: SampleFormat,
}

/// cpal-backed output running on a dedicated thread
pub struct CpalOutput {
    commands: Sender<DeviceCommand>,
    state: SharedContextState,
    sample_rate: u32,
    worker: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the configured device (falling back to the default device).
    ///
    /// Fails with `Error::Init` if no output device can be opened.
    pub fn open(config: &OutputConfig) -> Result<Self> {
        let (command_tx, command_rx) = bounded::<DeviceCommand>(16);
        let (ready_tx, ready_rx) = bounded::<Result<DeviceInfo>>(1);
        let state = SharedContextState::new(ContextState::Running);

        let worker_state = state.clone();
        let worker_config = config.clone();
        let worker = thread::Builder::new()
            .name("tsp-audio-output".to_string())
            .spawn(move || device_thread(worker_config, worker_state, command_rx, ready_tx))
            .map_err(|e| Error::Init(format!("Failed to spawn audio thread: {}", e)))?;

        let info = ready_rx
            .recv()
            .map_err(|_| Error::Init("Audio thread exited during startup".to_string()))??;

        info!(
            "Audio output ready: device={}, sample_rate={}, channels={}, format={:?}",
            info.name, info.sample_rate, info.channels, info.sample_format
        );

        Ok(Self {
            commands: command_tx,
            state,
            sample_rate: info.sample_rate,
            worker: Some(worker),
        })
    }

    fn request(&self, make: impl FnOnce(Sender<Result<()>>) -> DeviceCommand) -> Result<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.commands
            .send(make(reply_tx))
            .map_err(|_| Error::AudioOutput("Audio thread is not running".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio thread dropped the request".to_string()))?
    }
}

impl OutputBackend for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn state(&self) -> ContextState {
        self.state.get()
    }

    fn attach(&mut self, render: RenderLoop) -> Result<()> {
        self.request(|reply| DeviceCommand::Attach(render, reply))
    }

    fn detach(&mut self) {
        let _ = self.commands.send(DeviceCommand::Detach);
    }

    fn suspend(&mut self) -> Result<()> {
        self.request(DeviceCommand::Suspend)
    }

    fn resume(&mut self) -> Result<()> {
        self.request(DeviceCommand::Resume)
    }

    fn close(&mut self) {
        self.state.set(ContextState::Closed);
        let _ = self.commands.send(DeviceCommand::Close);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Audio output thread panicked");
            }
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

fn device_thread(
    config: OutputConfig,
    state: SharedContextState,
    commands: Receiver<DeviceCommand>,
    ready: Sender<Result<DeviceInfo>>,
) {
    let (device, stream_config, sample_format) = match open_device(&config) {
        Ok(opened) => opened,
        Err(e) => {
            state.set(ContextState::Closed);
            let _ = ready.send(Err(e));
            return;
        }
    };

    let info = DeviceInfo {
        name: device.name().unwrap_or_else(|_| "Unknown".to_string()),
        sample_rate: stream_config.sample_rate.0,
        channels: stream_config.channels,
        sample_format,
    };
    if ready.send(Ok(info)).is_err() {
        return;
    }

    let mut stream: Option<Stream> = None;

    while let Ok(command) = commands.recv() {
        match command {
            DeviceCommand::Attach(render, reply) => {
                // Drop the old stream (and its render loop) first
                stream = None;
                let result = build_stream(&device, &stream_config, sample_format, render, &state)
                    .and_then(|new_stream| {
                        if state.get() == ContextState::Running {
                            new_stream
                                .play()
                                .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
                        }
                        Ok(new_stream)
                    })
                    .map(|new_stream| {
                        stream = Some(new_stream);
                    });
                let _ = reply.send(result);
            }
            DeviceCommand::Detach => {
                if stream.take().is_some() {
                    debug!("Render loop detached from audio device");
                }
            }
            DeviceCommand::Suspend(reply) => {
                let result = match stream.as_ref() {
                    Some(s) => s
                        .pause()
                        .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e))),
                    None => Ok(()),
                };
                if result.is_ok() {
                    state.transition(ContextState::Suspended);
                }
                let _ = reply.send(result);
            }
            DeviceCommand::Resume(reply) => {
                let result = match stream.as_ref() {
                    Some(s) => s
                        .play()
                        .map_err(|e| Error::AudioOutput(format!("Failed to resume stream: {}", e))),
                    None => Ok(()),
                };
                if result.is_ok() {
                    state.transition(ContextState::Running);
                }
                let _ = reply.send(result);
            }
            DeviceCommand::Close => break,
        }
    }

    drop(stream);
    state.set(ContextState::Closed);
    debug!("Audio output thread exiting");
}

fn open_device(config: &OutputConfig) -> Result<(Device, StreamConfig, SampleFormat)> {
    let host = cpal::default_host();

    let device = match config.device_name.as_ref() {
        Some(name) => {
            let found = host
                .output_devices()
                .map_err(|e| Error::Init(format!("Failed to enumerate devices: {}", e)))?
                .find(|d| d.name().ok().as_ref() == Some(name));

            match found {
                Some(dev) => {
                    info!("Found requested audio device: {}", name);
                    dev
                }
                None => {
                    warn!("Requested device '{}' not found, falling back to default device", name);
                    host.default_output_device().ok_or_else(|| {
                        Error::Init(format!("Device '{}' not found and no default device available", name))
                    })?
                }
            }
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::Init("No default output device found".to_string()))?,
    };

    let (mut stream_config, sample_format) = best_config(&device, config.sample_rate)?;

    if let Some(size) = config.buffer_size {
        stream_config.buffer_size = cpal::BufferSize::Fixed(size);
        debug!("Using requested buffer size: {} frames", size);
    }

    Ok((device, stream_config, sample_format))
}

/// Preferred rate if some supported range covers it (f32 first), else the
/// device default configuration.
fn best_config(device: &Device, preferred_rate: Option<u32>) -> Result<(StreamConfig, SampleFormat)> {
    if let Some(rate) = preferred_rate {
        let ranges: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::Init(format!("Failed to get device configs: {}", e)))?
            .filter(|range| range.min_sample_rate().0 <= rate && range.max_sample_rate().0 >= rate)
            .filter(|range| is_supported_format(range.sample_format()))
            .collect();

        let chosen = ranges
            .iter()
            .find(|range| range.sample_format() == SampleFormat::F32)
            .or_else(|| ranges.first());

        if let Some(range) = chosen {
            let supported = range.clone().with_sample_rate(cpal::SampleRate(rate));
            return Ok((supported.config(), supported.sample_format()));
        }

        warn!("Preferred sample rate {} Hz not supported, using device default", rate);
    }

    let supported = device
        .default_output_config()
        .map_err(|e| Error::Init(format!("Failed to get default config: {}", e)))?;

    Ok((supported.config(), supported.sample_format()))
}

fn is_supported_format(format: SampleFormat) -> bool {
    matches!(format, SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16)
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    render: RenderLoop,
    state: &SharedContextState,
) -> Result<Stream> {
    match sample_format {
        SampleFormat::F32 => build_typed_stream::<f32>(device, config, render, state),
        SampleFormat::I16 => build_typed_stream::<i16>(device, config, render, state),
        SampleFormat::U16 => build_typed_stream::<u16>(device, config, render, state),
        other => Err(Error::AudioOutput(format!("Unsupported sample format: {:?}", other))),
    }
}

fn build_typed_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut render: RenderLoop,
    state: &SharedContextState,
) -> Result<Stream>
where
    T: SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let error_state = state.clone();

    // Sized once here; larger host buffers are rendered in several passes
    let scratch_frames = match config.buffer_size {
        cpal::BufferSize::Fixed(frames) => (frames as usize).max(1),
        cpal::BufferSize::Default => DEFAULT_SCRATCH_FRAMES,
    };
    let mut mono = vec![0.0f32; scratch_frames];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                render_interleaved(&mut render, &mut mono, data, channels);
            },
            move |err| {
                error!("Audio stream error: {}", err);
                if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                    error_state.set(ContextState::Closed);
                }
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}

/// Render mono through `scratch` and copy it to every channel of `data`.
///
/// `data` longer than the scratch buffer is rendered in several passes.
fn render_interleaved<T>(render: &mut RenderLoop, scratch: &mut [f32], data: &mut [T], channels: usize)
where
    T: SizedSample + cpal::FromSample<f32>,
{
    if scratch.is_empty() {
        return;
    }

    for block in data.chunks_mut(scratch.len() * channels) {
        let frames = &mut scratch[..block.len() / channels];
        render.process(frames);

        for (frame, &sample) in block.chunks_mut(channels).zip(frames.iter()) {
            frame.fill(T::from_sample(sample.clamp(-1.0, 1.0)));
        }
    }
}
