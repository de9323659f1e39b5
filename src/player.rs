//! Player backends behind one interface.
//!
//! Only mpv speaks IPC; callers check `supports_ipc()` before using
//! position, chapters or events instead of probing the concrete type.

use std::collections::HashMap;

use crate::config::{PlayerConfig, PlayerKind};
use crate::iina::{IinaPlayer, IINA_SOCKET};
use crate::mpv::{ExitSignal, MpvPlayer, PlayerError};

pub enum Player {
  Mpv(MpvPlayer),
  Iina(IinaPlayer),
}

impl Player {
  pub fn from_config(config: PlayerConfig) -> Self {
    match config.player {
      PlayerKind::Mpv => Player::Mpv(MpvPlayer::new(config)),
      PlayerKind::Iina => Player::Iina(IinaPlayer::new()),
    }
  }

  /// Whether position/pause/seek/chapter/event operations are available.
  pub fn supports_ipc(&self) -> bool {
    matches!(self, Player::Mpv(_))
  }

  pub fn as_mpv(&self) -> Option<&MpvPlayer> {
    match self {
      Player::Mpv(mpv) => Some(mpv),
      Player::Iina(_) => None,
    }
  }

  pub async fn play(
    &self,
    target: &str,
    title: &str,
    headers: &HashMap<String, String>,
  ) -> Result<(), PlayerError> {
    match self {
      Player::Mpv(mpv) => mpv.play(target, title, headers).await,
      Player::Iina(iina) => iina.play(target, title, headers).await,
    }
  }

  pub async fn toggle_pause(&self) -> Result<(), PlayerError> {
    match self {
      Player::Mpv(mpv) => mpv.toggle_pause().await,
      Player::Iina(_) => Ok(()),
    }
  }

  pub async fn get_time_pos(&self) -> Result<f64, PlayerError> {
    match self {
      Player::Mpv(mpv) => mpv.get_time_pos().await,
      Player::Iina(_) => Err(PlayerError::Unsupported("time-pos")),
    }
  }

  pub async fn get_duration(&self) -> Result<f64, PlayerError> {
    match self {
      Player::Mpv(mpv) => mpv.get_duration().await,
      Player::Iina(_) => Err(PlayerError::Unsupported("duration")),
    }
  }

  pub async fn get_percent_watched(&self) -> Result<f64, PlayerError> {
    match self {
      Player::Mpv(mpv) => mpv.get_percent_watched().await,
      Player::Iina(_) => Err(PlayerError::Unsupported("percent watched")),
    }
  }

  pub async fn get_paused_status(&self) -> Result<bool, PlayerError> {
    match self {
      Player::Mpv(mpv) => mpv.get_paused_status().await,
      Player::Iina(_) => Err(PlayerError::Unsupported("pause")),
    }
  }

  pub async fn has_active_playback(&self) -> Result<bool, PlayerError> {
    match self {
      Player::Mpv(mpv) => mpv.has_active_playback().await,
      Player::Iina(_) => Ok(false),
    }
  }

  pub async fn seek(&self, seconds: f64) -> Result<(), PlayerError> {
    match self {
      Player::Mpv(mpv) => mpv.seek(seconds).await,
      Player::Iina(_) => Ok(()),
    }
  }

  pub async fn is_running(&self) -> bool {
    match self {
      Player::Mpv(mpv) => mpv.is_running().await,
      Player::Iina(iina) => iina.is_running(),
    }
  }

  pub async fn close(&self) -> Result<(), PlayerError> {
    match self {
      Player::Mpv(mpv) => mpv.close().await,
      Player::Iina(iina) => {
        iina.close();
        Ok(())
      }
    }
  }

  pub fn socket(&self) -> String {
    match self {
      Player::Mpv(mpv) => mpv.socket(),
      Player::Iina(_) => IINA_SOCKET.to_string(),
    }
  }

  /// Report `(position, duration)` periodically. A no-op without IPC.
  pub fn start_progress_polling<F>(&self, callback: F) -> Result<(), PlayerError>
  where
    F: Fn(f64, f64) + Send + Sync + 'static,
  {
    match self {
      Player::Mpv(mpv) => mpv.start_progress_polling(callback),
      Player::Iina(_) => Ok(()),
    }
  }

  pub fn stop_progress_polling(&self) {
    if let Player::Mpv(mpv) = self {
      mpv.stop_progress_polling();
    }
  }

  pub fn wait(&self) -> ExitSignal {
    match self {
      Player::Mpv(mpv) => mpv.wait(),
      Player::Iina(iina) => iina.wait(),
    }
  }
}
