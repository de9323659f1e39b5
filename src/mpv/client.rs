//! High-level MPV session: one player process, one socket.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

use super::events::EventListener;
use super::ipc::{IpcClient, IpcError};
use super::process::{
  build_args, cleanup_ipc, find_mpv, header_fields, ipc_path, spawn_player, wait_for_socket,
  PlayerProcess, ProcessError,
};
use super::protocol::{Chapter, MpvCommand, PropertyValue};
use super::sanitize::{sanitize_target, sanitize_title, SanitizeError};
use super::signal::ExitSignal;
use super::ticker::ProgressTicker;
use crate::config::PlayerConfig;

#[derive(Error, Debug)]
pub enum PlayerError {
  #[error(transparent)]
  InvalidTarget(#[from] SanitizeError),
  #[error("Process error: {0}")]
  Process(#[from] ProcessError),
  #[error("IPC error: {0}")]
  Ipc(#[from] IpcError),
  #[error("Not supported by this player: {0}")]
  Unsupported(&'static str),
}

/// Grace period for the reaper to confirm a forced kill.
const KILL_CONFIRM_TIMEOUT: Duration = Duration::from_secs(1);

struct SessionState {
  socket: Option<String>,
  process: Option<PlayerProcess>,
}

/// MPV playback session.
///
/// Owns the socket path, the spawned process and the progress ticker.
/// Clones share the same session.
#[derive(Clone)]
pub struct MpvPlayer {
  config: Arc<PlayerConfig>,
  state: Arc<Mutex<SessionState>>,
  ipc_lock: Arc<tokio::sync::Mutex<()>>,
  ticker: Arc<ProgressTicker>,
}

impl MpvPlayer {
  /// Create a session. Nothing is spawned until `play`.
  pub fn new(config: PlayerConfig) -> Self {
    Self::with_socket(config, None)
  }

  /// Attach to an mpv that is already listening on `socket`.
  pub fn attach(config: PlayerConfig, socket: impl Into<String>) -> Self {
    Self::with_socket(config, Some(socket.into()))
  }

  fn with_socket(config: PlayerConfig, socket: Option<String>) -> Self {
    if let Err(e) = config.validate() {
      log::warn!("Questionable player config: {}", e);
    }
    Self {
      config: Arc::new(config),
      state: Arc::new(Mutex::new(SessionState {
        socket,
        process: None,
      })),
      ipc_lock: Arc::new(tokio::sync::Mutex::new(())),
      ticker: Arc::new(ProgressTicker::new()),
    }
  }

  /// IPC client for the current socket.
  pub fn ipc(&self) -> Result<IpcClient, IpcError> {
    let socket = self.state.lock().socket.clone().ok_or(IpcError::NotStarted)?;
    Ok(IpcClient::new(socket, self.ipc_lock.clone(), &self.config))
  }

  /// Event listener bound to the current socket.
  pub fn event_listener(&self) -> Result<EventListener, IpcError> {
    let socket = self.state.lock().socket.clone().ok_or(IpcError::NotStarted)?;
    Ok(EventListener::new(
      socket,
      Duration::from_millis(self.config.event_read_timeout_ms),
    ))
  }

  fn resolve_executable(&self) -> Result<PathBuf, ProcessError> {
    self
      .config
      .mpv_path
      .as_deref()
      .filter(|p| !p.trim().is_empty())
      .map(PathBuf::from)
      .or_else(find_mpv)
      .ok_or(ProcessError::NotFound)
  }

  /// Start playback of `target`.
  ///
  /// If mpv is already running for this session the file is loaded into it;
  /// otherwise a new process is spawned on the session's socket.
  pub async fn play(
    &self,
    target: &str,
    title: &str,
    headers: &HashMap<String, String>,
  ) -> Result<(), PlayerError> {
    let target = sanitize_target(target)?;
    let title = sanitize_title(title);

    if self.is_running().await {
      log::info!("Loading into running player: {}", redact_url(&target));
      let ipc = self.ipc()?;
      ipc
        .set_property("http-header-fields", header_fields(headers))
        .await?;
      ipc.send(&MpvCommand::loadfile(&target)).await?;
      ipc.set_property("force-media-title", title.as_str()).await?;
      return Ok(());
    }

    let exe = self.resolve_executable()?;
    let (socket, stale) = {
      let mut state = self.state.lock();
      let socket = state.socket.get_or_insert_with(ipc_path).clone();
      (socket, state.process.take())
    };
    // Alive but not answering IPC: don't leak it.
    if let Some(stale) = stale {
      stale.kill();
    }
    cleanup_ipc(&socket);

    let args = build_args(&socket, &title, headers, &self.config.mpv_args, &target);
    log::info!("Starting playback: {} - {}", title, redact_url(&target));
    let process = spawn_player(&exe, &args)?;
    let exited = process.exited();
    self.state.lock().process = Some(process);

    if let Err(e) = wait_for_socket(
      &socket,
      &exited,
      self.config.socket_retries,
      Duration::from_millis(self.config.socket_delay_ms),
    )
    .await
    {
      if let Some(process) = self.state.lock().process.as_ref() {
        if !process.has_exited() {
          log::warn!("Killing player: socket never became ready");
          process.kill();
        }
      }
      let _ = tokio::time::timeout(KILL_CONFIRM_TIMEOUT, exited.wait()).await;
      cleanup_ipc(&socket);
      return Err(e.into());
    }

    log::info!("Player ready on {}", socket);
    Ok(())
  }

  /// Signal that fires when the current player process exits.
  pub fn wait(&self) -> ExitSignal {
    self
      .state
      .lock()
      .process
      .as_ref()
      .map(PlayerProcess::exited)
      .unwrap_or_else(ExitSignal::never)
  }

  pub fn pid(&self) -> Option<u32> {
    self.state.lock().process.as_ref().and_then(PlayerProcess::pid)
  }

  /// Socket path, or an empty string before the first `play`.
  pub fn socket(&self) -> String {
    self.state.lock().socket.clone().unwrap_or_default()
  }

  /// Whether mpv answers IPC commands.
  pub async fn is_running(&self) -> bool {
    {
      let state = self.state.lock();
      if state.socket.is_none() {
        return false;
      }
      if state.process.as_ref().is_some_and(PlayerProcess::has_exited) {
        return false;
      }
    }
    match self.ipc() {
      Ok(ipc) => ipc.ping().await,
      Err(_) => false,
    }
  }

  /// Current playback position in seconds.
  pub async fn get_time_pos(&self) -> Result<f64, PlayerError> {
    Ok(self.ipc()?.get_f64("time-pos").await?)
  }

  /// Duration of the current file in seconds.
  pub async fn get_duration(&self) -> Result<f64, PlayerError> {
    Ok(self.ipc()?.get_f64("duration").await?)
  }

  /// Watched percentage (0-100). Zero when the duration is unknown.
  pub async fn get_percent_watched(&self) -> Result<f64, PlayerError> {
    let position = self.get_time_pos().await?;
    match self.get_duration().await {
      Ok(duration) => Ok(percent(position, duration)),
      Err(_) => Ok(0.0),
    }
  }

  /// Pause state. An unexpected payload reads as "not paused".
  pub async fn get_paused_status(&self) -> Result<bool, PlayerError> {
    match self.ipc()?.get_bool("pause").await {
      Ok(paused) => Ok(paused),
      Err(IpcError::TypeMismatch { found, .. }) => {
        log::debug!("pause returned {}, treating as not paused", found);
        Ok(false)
      }
      Err(e) => Err(e.into()),
    }
  }

  /// Whether a file is loaded. "property unavailable" means nothing is.
  pub async fn has_active_playback(&self) -> Result<bool, PlayerError> {
    match self.ipc()?.get_property("time-pos").await {
      Ok(value) => Ok(value != PropertyValue::Null),
      Err(e) if e.is_property_unavailable() => Ok(false),
      Err(e) => Err(e.into()),
    }
  }

  pub async fn toggle_pause(&self) -> Result<(), PlayerError> {
    let paused = self.get_paused_status().await?;
    self.set_property("pause", !paused).await
  }

  /// Seek to an absolute position in seconds.
  pub async fn seek(&self, seconds: f64) -> Result<(), PlayerError> {
    Ok(self.ipc()?.seek(seconds).await?)
  }

  pub async fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<(), PlayerError> {
    Ok(self.ipc()?.set_property(name, value).await?)
  }

  /// Replace the chapter markers on the player timeline.
  pub async fn set_chapters(&self, chapters: &[Chapter]) -> Result<(), PlayerError> {
    self.ipc()?.send(&MpvCommand::set_chapters(chapters)).await?;
    Ok(())
  }

  /// Poll `(position, duration)` every tick until stopped or the player exits.
  pub fn start_progress_polling<F>(&self, callback: F) -> Result<(), PlayerError>
  where
    F: Fn(f64, f64) + Send + Sync + 'static,
  {
    let ipc = self.ipc()?;
    self.ticker.start(
      ipc,
      self.wait(),
      Duration::from_millis(self.config.tick_interval_ms),
      callback,
    );
    Ok(())
  }

  pub fn stop_progress_polling(&self) {
    self.ticker.stop();
  }

  /// Shut the player down: quit over IPC, wait, then kill the process group.
  ///
  /// Safe to call before `play` and more than once.
  pub async fn close(&self) -> Result<(), PlayerError> {
    self.stop_progress_polling();

    let (socket, exited) = {
      let state = self.state.lock();
      (
        state.socket.clone(),
        state.process.as_ref().map(PlayerProcess::exited),
      )
    };
    let Some(socket) = socket else {
      return Ok(());
    };

    if !exited.as_ref().is_some_and(ExitSignal::has_fired) {
      if let Err(e) = IpcClient::new(&socket, self.ipc_lock.clone(), &self.config)
        .quit()
        .await
      {
        log::debug!("Graceful quit failed: {}", e);
      }
    }

    if let Some(exited) = exited {
      let quit_timeout = Duration::from_millis(self.config.quit_timeout_ms);
      if tokio::time::timeout(quit_timeout, exited.wait()).await.is_err() {
        if let Some(process) = self.state.lock().process.as_ref() {
          log::warn!(
            "Player did not quit within {:?}, killing (pid: {:?})",
            quit_timeout,
            process.pid()
          );
          process.kill();
        }
        let _ = tokio::time::timeout(KILL_CONFIRM_TIMEOUT, exited.wait()).await;
      }
    }

    cleanup_ipc(&socket);
    log::info!("Player session closed");
    Ok(())
  }
}

pub(crate) fn percent(position: f64, duration: f64) -> f64 {
  if duration <= 0.0 {
    return 0.0;
  }
  (position / duration * 100.0).clamp(0.0, 100.0)
}

/// Drop the query string, which often carries tokens.
pub(crate) fn redact_url(url: &str) -> String {
  match url.find('?') {
    Some(idx) => format!("{}?[REDACTED]", &url[..idx]),
    None => url.to_string(),
  }
}
