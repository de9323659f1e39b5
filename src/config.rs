//! Player configuration with persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read config: {0}")]
  Io(#[from] std::io::Error),
  #[error("Malformed config: {0}")]
  Json(#[from] serde_json::Error),
  #[error("Invalid config: {0}")]
  Invalid(String),
}

/// Which external player to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerKind {
  #[default]
  Mpv,
  Iina,
}

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// Which player to launch.
  #[serde(default)]
  pub player: PlayerKind,

  /// Custom MPV executable path (None = auto-detect).
  #[serde(default)]
  pub mpv_path: Option<String>,

  /// Additional MPV command-line arguments.
  #[serde(default)]
  pub mpv_args: Vec<String>,

  /// Socket readiness probes after spawning.
  #[serde(default = "default_socket_retries")]
  pub socket_retries: u32,

  #[serde(default = "default_socket_delay_ms")]
  pub socket_delay_ms: u64,

  /// Attempts per IPC command (transport failures only).
  #[serde(default = "default_ipc_retries")]
  pub ipc_retries: u32,

  #[serde(default = "default_ipc_retry_delay_ms")]
  pub ipc_retry_delay_ms: u64,

  #[serde(default = "default_ipc_read_timeout_ms")]
  pub ipc_read_timeout_ms: u64,

  /// Read deadline on the event connection; bounds how long a stop waits.
  #[serde(default = "default_event_read_timeout_ms")]
  pub event_read_timeout_ms: u64,

  /// Progress polling period.
  #[serde(default = "default_tick_interval_ms")]
  pub tick_interval_ms: u64,

  /// How long to wait for a graceful quit before killing the player.
  #[serde(default = "default_quit_timeout_ms")]
  pub quit_timeout_ms: u64,

  #[serde(default = "default_true")]
  pub skip_intro: bool,

  #[serde(default = "default_true")]
  pub skip_outro: bool,
}

fn default_socket_retries() -> u32 {
  10
}

fn default_socket_delay_ms() -> u64 {
  300
}

fn default_ipc_retries() -> u32 {
  3
}

fn default_ipc_retry_delay_ms() -> u64 {
  100
}

fn default_ipc_read_timeout_ms() -> u64 {
  1000
}

fn default_event_read_timeout_ms() -> u64 {
  5000
}

fn default_tick_interval_ms() -> u64 {
  1000
}

fn default_quit_timeout_ms() -> u64 {
  3000
}

fn default_true() -> bool {
  true
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      player: PlayerKind::default(),
      mpv_path: None,
      mpv_args: Vec::new(),
      socket_retries: default_socket_retries(),
      socket_delay_ms: default_socket_delay_ms(),
      ipc_retries: default_ipc_retries(),
      ipc_retry_delay_ms: default_ipc_retry_delay_ms(),
      ipc_read_timeout_ms: default_ipc_read_timeout_ms(),
      event_read_timeout_ms: default_event_read_timeout_ms(),
      tick_interval_ms: default_tick_interval_ms(),
      quit_timeout_ms: default_quit_timeout_ms(),
      skip_intro: true,
      skip_outro: true,
    }
  }
}

const MAX_TIMEOUT_MS: u64 = 60_000;

impl PlayerConfig {
  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if self.socket_retries == 0 {
      return Err("Socket retries must be at least 1".to_string());
    }
    if self.ipc_retries == 0 {
      return Err("IPC retries must be at least 1".to_string());
    }
    if self.tick_interval_ms == 0 || self.socket_delay_ms == 0 {
      return Err("Intervals must be greater than zero".to_string());
    }
    let timeouts = [
      self.ipc_read_timeout_ms,
      self.event_read_timeout_ms,
      self.quit_timeout_ms,
    ];
    if timeouts.iter().any(|t| *t == 0 || *t > MAX_TIMEOUT_MS) {
      return Err("Timeouts must be between 1ms and 60 seconds".to_string());
    }
    if self.mpv_args.iter().any(|a| a.contains(['\0', '\n'])) {
      return Err("MPV arguments cannot contain control characters".to_string());
    }
    Ok(())
  }

  /// Default config location: `<config dir>/anisan/player.json`.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("anisan").join("player.json"))
  }

  /// Load from `path`. A missing file yields defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let config: PlayerConfig = match std::fs::read_to_string(path) {
      Ok(text) => serde_json::from_str(&text)?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        log::info!("No config at {}, using defaults", path.display());
        PlayerConfig::default()
      }
      Err(e) => return Err(e.into()),
    };
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
  }

  /// Load from the default location, falling back to defaults.
  pub fn load_default() -> Result<Self, ConfigError> {
    match Self::default_path() {
      Some(path) => Self::load(&path),
      None => Ok(PlayerConfig::default()),
    }
  }

  pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(self)?)?;
    Ok(())
  }
}
