//! IINA launcher (macOS). IINA exposes no IPC socket, so this player can
//! only start playback and report when it ends.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;

use crate::mpv::{
  header_fields, sanitize_target, sanitize_title, spawn_player, ExitSignal, PlayerError,
  PlayerProcess, ProcessError,
};

/// Socket identifier reported for IINA sessions.
pub const IINA_SOCKET: &str = "iina-native";

#[derive(Default)]
pub struct IinaPlayer {
  process: Mutex<Option<PlayerProcess>>,
}

/// Arguments for `open`; IINA forwards `--mpv-*` options to its embedded mpv.
pub fn build_iina_args(title: &str, headers: &HashMap<String, String>, target: &str) -> Vec<String> {
  let mut args = vec![
    "-a".to_string(),
    "IINA".to_string(),
    "--args".to_string(),
    format!("--mpv-force-media-title={}", title),
  ];
  let fields = header_fields(headers);
  if !fields.is_empty() {
    args.push(format!("--mpv-http-header-fields={}", fields.join(",")));
  }
  args.push(target.to_string());
  args
}

impl IinaPlayer {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn play(
    &self,
    target: &str,
    title: &str,
    headers: &HashMap<String, String>,
  ) -> Result<(), PlayerError> {
    let target = sanitize_target(target)?;
    let title = sanitize_title(title);

    if !cfg!(target_os = "macos") {
      return Err(ProcessError::Unsupported("IINA is only available on macOS".to_string()).into());
    }

    let args = build_iina_args(&title, headers, &target);
    let process = spawn_player(Path::new("open"), &args)?;
    if let Some(old) = self.process.lock().replace(process) {
      old.kill();
    }
    Ok(())
  }

  pub fn wait(&self) -> ExitSignal {
    self
      .process
      .lock()
      .as_ref()
      .map(PlayerProcess::exited)
      .unwrap_or_else(ExitSignal::never)
  }

  pub fn is_running(&self) -> bool {
    self
      .process
      .lock()
      .as_ref()
      .is_some_and(|p| !p.has_exited())
  }

  pub fn close(&self) {
    if let Some(process) = self.process.lock().as_ref() {
      process.kill();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn args_forward_title_and_headers() {
    let headers = HashMap::from([("Referer".to_string(), "https://a.example/".to_string())]);
    let args = build_iina_args("Ep 1", &headers, "https://example.com/v.mp4");
    assert_eq!(
      args,
      vec![
        "-a",
        "IINA",
        "--args",
        "--mpv-force-media-title=Ep 1",
        "--mpv-http-header-fields=Referer: https://a.example/",
        "https://example.com/v.mp4",
      ]
    );
  }

  #[tokio::test]
  async fn rejects_unsafe_target_first() {
    let player = IinaPlayer::new();
    let err = player.play("-x", "t", &HashMap::new()).await.unwrap_err();
    assert!(matches!(err, PlayerError::InvalidTarget(_)));
    assert!(!player.is_running());
  }

  #[cfg(not(target_os = "macos"))]
  #[tokio::test]
  async fn unsupported_off_macos() {
    let player = IinaPlayer::new();
    let err = player
      .play("https://example.com/v.mp4", "t", &HashMap::new())
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      PlayerError::Process(ProcessError::Unsupported(_))
    ));
  }
}
