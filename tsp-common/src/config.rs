//! Player configuration loading
//!
//! Resolution follows a fixed priority order:
//! 1. Explicit path (command-line argument, highest priority)
//! 2. `TSP_CONFIG` environment variable
//! 3. `<config_dir>/tsp/config.toml`
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is never fatal; an unreadable or invalid one is.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "TSP_CONFIG";

/// Default backlog cap before new chunks are dropped (seconds)
pub const DEFAULT_MAX_QUEUE_SECONDS: f64 = 120.0;

/// Default `wait_until_finish` poll cadence (milliseconds)
pub const DEFAULT_WAIT_POLL_INTERVAL_MS: u64 = 100;

/// Which audio output backend the controller opens on `init()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputBackendKind {
    /// Platform audio device via cpal
    #[default]
    Device,
    /// Clock-driven virtual device, no hardware required
    Null,
}

/// Audio output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub backend: OutputBackendKind,

    /// Output device name (None = system default)
    pub device_name: Option<String>,

    /// Preferred output rate. The device backend uses it only if supported;
    /// the null backend always runs at this rate (24000 Hz when unset).
    pub sample_rate: Option<u32>,

    /// Fixed frames per device callback (None = device default)
    pub buffer_size: Option<u32>,

    /// Frames per render invocation on the null backend
    pub null_frame_size: usize,

    /// Clock multiplier for the null backend (2.0 = twice real time)
    pub null_speed: f64,

    /// Null backend context starts suspended until `start_stream()` resumes it
    pub null_start_suspended: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            backend: OutputBackendKind::Device,
            device_name: None,
            sample_rate: None,
            buffer_size: None,
            null_frame_size: 128,
            null_speed: 1.0,
            null_start_suspended: false,
        }
    }
}

/// Streaming player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Maximum unplayed backlog (seconds) before `add_data` drops chunks
    pub max_queue_seconds: f64,

    /// Poll cadence of `wait_until_finish` (milliseconds)
    pub wait_poll_interval_ms: u64,

    /// Slots in the control→render command ring
    pub command_capacity: usize,

    /// Completed tickets retained for late waiters before the oldest are pruned
    pub max_completed_tickets: usize,

    pub output: OutputConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_queue_seconds: DEFAULT_MAX_QUEUE_SECONDS,
            wait_poll_interval_ms: DEFAULT_WAIT_POLL_INTERVAL_MS,
            command_capacity: 256,
            max_completed_tickets: 1024,
            output: OutputConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Parse configuration from TOML text and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PlayerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Resolve and load configuration using the priority order in the module docs.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_path) {
            Some(path) => Self::from_file(path),
            None => {
                debug!("No configuration file found, using compiled defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject values the player cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if !(self.max_queue_seconds > 0.0) {
            return Err(Error::Config(format!(
                "max_queue_seconds must be positive, got {}",
                self.max_queue_seconds
            )));
        }
        if self.wait_poll_interval_ms == 0 {
            return Err(Error::Config("wait_poll_interval_ms must be non-zero".to_string()));
        }
        if self.command_capacity == 0 {
            return Err(Error::Config("command_capacity must be non-zero".to_string()));
        }
        if self.output.null_frame_size == 0 {
            return Err(Error::Config("output.null_frame_size must be non-zero".to_string()));
        }
        if !(self.output.null_speed > 0.0) {
            return Err(Error::Config(format!(
                "output.null_speed must be positive, got {}",
                self.output.null_speed
            )));
        }
        if self.output.sample_rate == Some(0) {
            return Err(Error::Config("output.sample_rate must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Find the config file to load, if any.
///
/// Explicit and env-provided paths are returned even if they do not exist,
/// so the caller reports the missing file instead of silently using defaults.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
        warn!("{} is set but empty, ignoring", CONFIG_ENV_VAR);
    }

    // Priority 3: Platform config directory
    let user_config = default_config_path()?;
    if user_config.exists() {
        Some(user_config)
    } else {
        None
    }
}

/// Platform config file location (`~/.config/tsp/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tsp").join("config.toml"))
}
