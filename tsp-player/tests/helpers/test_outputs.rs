//! Output backends and configs for headless controller tests

use tsp_common::{OutputBackendKind, OutputConfig, PlayerConfig};
use tsp_player::audio::output::{ContextState, OutputBackend};
use tsp_player::audio::NullOutput;
use tsp_player::error::{Error, Result};
use tsp_player::playback::RenderLoop;

/// Null-output config at `sample_rate`, `speed ×` real time, 10ms wait polling
pub fn null_config(sample_rate: u32, speed: f64) -> PlayerConfig {
    PlayerConfig {
        wait_poll_interval_ms: 10,
        output: OutputConfig {
            backend: OutputBackendKind::Null,
            sample_rate: Some(sample_rate),
            null_speed: speed,
            ..OutputConfig::default()
        },
        ..PlayerConfig::default()
    }
}

/// Null output whose first `failures` attach attempts fail
pub struct FlakyOutput {
    inner: NullOutput,
    failures: usize,
}

impl FlakyOutput {
    pub fn new(config: &OutputConfig, failures: usize) -> Self {
        Self {
            inner: NullOutput::new(config),
            failures,
        }
    }
}

impl OutputBackend for FlakyOutput {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn state(&self) -> ContextState {
        self.inner.state()
    }

    fn attach(&mut self, render: RenderLoop) -> Result<()> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(Error::AudioOutput("device busy".to_string()));
        }
        self.inner.attach(render)
    }

    fn detach(&mut self) {
        self.inner.detach();
    }

    fn suspend(&mut self) -> Result<()> {
        self.inner.suspend()
    }

    fn resume(&mut self) -> Result<()> {
        self.inner.resume()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}
