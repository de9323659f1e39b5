//! MPV process detection, spawning and reaping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ipc;
use super::signal::{exit_signal, ExitSignal};

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("MPV executable not found")]
  NotFound,
  #[error("Failed to spawn player: {0}")]
  SpawnFailed(#[from] std::io::Error),
  #[error("Player socket not ready: {0}")]
  SocketNotReady(String),
  #[error("Unsupported on this platform: {0}")]
  Unsupported(String),
}

/// Generate a fresh, random IPC socket/pipe path.
pub fn ipc_path() -> String {
  let id = Uuid::new_v4().simple().to_string();
  let name = format!("anisan-{}", &id[..8]);
  #[cfg(windows)]
  {
    format!(r"\\.\pipe\{}", name)
  }
  #[cfg(not(windows))]
  {
    // temp_dir() honours $TMPDIR, which is not /tmp on macOS.
    std::env::temp_dir()
      .join(format!("{}.sock", name))
      .to_string_lossy()
      .into_owned()
  }
}

/// Find MPV executable in common locations.
pub fn find_mpv() -> Option<PathBuf> {
  // Check PATH first
  if let Ok(path) = which::which("mpv") {
    return Some(path);
  }

  #[cfg(windows)]
  let common_paths: &[&str] = &[
    r"C:\Program Files\mpv\mpv.exe",
    r"C:\Program Files (x86)\mpv\mpv.exe",
    r"C:\mpv\mpv.exe",
  ];
  #[cfg(target_os = "macos")]
  let common_paths: &[&str] = &[
    "/usr/local/bin/mpv",
    "/opt/homebrew/bin/mpv",
    "/Applications/mpv.app/Contents/MacOS/mpv",
  ];
  #[cfg(not(any(windows, target_os = "macos")))]
  let common_paths: &[&str] = &["/usr/bin/mpv", "/usr/local/bin/mpv"];

  common_paths
    .iter()
    .map(|p| PathBuf::from(*p))
    .find(|p| p.exists())
}

/// Join request headers into mpv's `--http-header-fields` list syntax.
///
/// Commas separate entries, so commas inside values are percent-encoded.
pub fn header_fields(headers: &HashMap<String, String>) -> Vec<String> {
  let mut fields = headers
    .iter()
    .filter(|(k, _)| !k.trim().is_empty())
    .map(|(k, v)| format!("{}: {}", k.trim(), v.replace(',', "%2C")))
    .collect::<Vec<_>>();
  fields.sort();
  fields
}

/// Build the player command line. `title` and `target` must already be sanitized.
///
/// No rendering flags (--vo, --hwdec, --profile) are passed so the user's
/// own mpv.conf stays in charge.
pub fn build_args(
  socket: &str,
  title: &str,
  headers: &HashMap<String, String>,
  extra_args: &[String],
  target: &str,
) -> Vec<String> {
  let mut args = vec![
    "--no-terminal".to_string(),
    "--really-quiet".to_string(),
    format!("--input-ipc-server={}", socket),
    format!("--force-media-title={}", title),
    // Some builds only honour --title
    format!("--title={}", title),
    "--force-window=yes".to_string(),
    "--idle=yes".to_string(),
  ];

  let fields = header_fields(headers);
  if !fields.is_empty() {
    args.push(format!("--http-header-fields={}", fields.join(",")));
  }

  args.extend(extra_args.iter().cloned());
  args.push(target.to_string());
  args
}

/// A spawned player process watched by a reaper task.
#[derive(Debug)]
pub struct PlayerProcess {
  pid: Option<u32>,
  exited: ExitSignal,
  kill: CancellationToken,
}

impl PlayerProcess {
  pub fn pid(&self) -> Option<u32> {
    self.pid
  }

  pub fn exited(&self) -> ExitSignal {
    self.exited.clone()
  }

  pub fn has_exited(&self) -> bool {
    self.exited.has_fired()
  }

  /// Ask the reaper to kill the process (and its group on unix).
  pub fn kill(&self) {
    if !self.has_exited() {
      self.kill.cancel();
    }
  }
}

/// Spawn the player detached from our process group, with no inherited stdio.
///
/// A reaper task owns the child: it waits for exit (or a kill request)
/// and fires the exit signal exactly once.
pub fn spawn_player(exe: &Path, args: &[String]) -> Result<PlayerProcess, ProcessError> {
  log::info!("Spawning player: {:?} ({} args)", exe, args.len());
  log::debug!("Player args: {:?}", args);

  let mut cmd = Command::new(exe);
  cmd
    .args(args)
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .kill_on_drop(false);

  #[cfg(unix)]
  cmd.process_group(0);

  let mut child = cmd.spawn()?;
  let pid = child.id();

  let (notifier, exited) = exit_signal();
  let kill = CancellationToken::new();
  let kill_requested = kill.clone();

  tokio::spawn(async move {
    let status = tokio::select! {
      status = child.wait() => status,
      _ = kill_requested.cancelled() => {
        log::warn!("Force-killing player process (pid: {:?})", pid);
        kill_process_group(pid);
        if let Err(e) = child.start_kill() {
          log::debug!("start_kill failed: {}", e);
        }
        child.wait().await
      }
    };
    match status {
      Ok(status) => log::info!("Player process exited with: {}", status),
      Err(e) => log::error!("wait() on player process failed: {}", e),
    }
    notifier.fire();
  });

  Ok(PlayerProcess { pid, exited, kill })
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
  let Some(pid) = pid else { return };
  let Ok(pgid) = libc::pid_t::try_from(pid) else {
    return;
  };
  // SAFETY: kill(2) with a negative pid signals the process group we created
  // with process_group(0); it touches no memory.
  let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
  if rc != 0 {
    log::debug!(
      "killpg({}) failed: {}",
      pgid,
      std::io::Error::last_os_error()
    );
  }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Poll until the player accepts connections on `socket`.
///
/// Gives up early if the process exits first.
pub async fn wait_for_socket(
  socket: &str,
  exited: &ExitSignal,
  retries: u32,
  delay: Duration,
) -> Result<(), ProcessError> {
  for attempt in 1..=retries {
    tokio::time::sleep(delay).await;

    if exited.has_fired() {
      return Err(ProcessError::SocketNotReady(
        "player exited before socket was ready".to_string(),
      ));
    }

    match ipc::connect(socket).await {
      Ok(_conn) => {
        log::debug!("Player socket ready after {} attempt(s)", attempt);
        return Ok(());
      }
      Err(e) => log::debug!("Socket probe {} failed: {}", attempt, e),
    }
  }

  Err(ProcessError::SocketNotReady(format!(
    "{} not ready after {} attempts",
    socket, retries
  )))
}

/// Remove a stale socket file. Missing files are fine.
pub fn cleanup_ipc(socket: &str) {
  #[cfg(not(windows))]
  {
    if let Err(e) = std::fs::remove_file(socket) {
      if e.kind() != std::io::ErrorKind::NotFound {
        log::warn!("Failed to remove socket {}: {}", socket, e);
      }
    }
  }
  // Windows named pipes are cleaned up automatically
  #[cfg(windows)]
  let _ = socket;
}

#[cfg(test)]
mod tests {
  use super::*;

  fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[test]
  fn socket_paths_are_unique() {
    let a = ipc_path();
    let b = ipc_path();
    assert_ne!(a, b);
    assert!(a.contains("anisan-"));
    #[cfg(unix)]
    assert!(a.starts_with(&*std::env::temp_dir().to_string_lossy()));
  }

  #[test]
  fn args_end_with_target() {
    let args = build_args(
      "/tmp/s.sock",
      "Show - 01",
      &HashMap::new(),
      &[],
      "https://example.com/v.mp4",
    );
    assert_eq!(args.last().unwrap(), "https://example.com/v.mp4");
    assert!(args.contains(&"--input-ipc-server=/tmp/s.sock".to_string()));
    assert!(args.contains(&"--force-media-title=Show - 01".to_string()));
    assert!(args.contains(&"--title=Show - 01".to_string()));
    assert!(args.contains(&"--idle=yes".to_string()));
    assert!(args.contains(&"--force-window=yes".to_string()));
    assert!(!args.iter().any(|a| a.starts_with("--http-header-fields")));
    assert!(!args.iter().any(|a| a.starts_with("--vo") || a.starts_with("--hwdec")));
  }

  #[test]
  fn header_values_escape_commas() {
    let h = headers(&[("Referer", "https://a.example/"), ("Cookie", "a=1,b=2")]);
    assert_eq!(
      header_fields(&h),
      vec![
        "Cookie: a=1%2Cb=2".to_string(),
        "Referer: https://a.example/".to_string()
      ]
    );

    let args = build_args("/s", "t", &h, &["--volume=50".to_string()], "v.mp4");
    let n = args.len();
    assert_eq!(
      args[n - 3],
      "--http-header-fields=Cookie: a=1%2Cb=2,Referer: https://a.example/"
    );
    assert_eq!(args[n - 2], "--volume=50");
    assert_eq!(args[n - 1], "v.mp4");
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn socket_wait_stops_when_process_dies() {
    let process = spawn_player(Path::new("true"), &[]).unwrap();
    let exited = process.exited();
    tokio::time::timeout(Duration::from_secs(2), exited.wait())
      .await
      .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("none.sock");
    let err = wait_for_socket(
      &socket.to_string_lossy(),
      &exited,
      10,
      Duration::from_millis(10),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ProcessError::SocketNotReady(msg) if msg.contains("exited")));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn socket_timeout_then_kill_reaps_process() {
    let process = spawn_player(Path::new("sleep"), &["30".to_string()]).unwrap();
    assert!(process.pid().is_some());
    let exited = process.exited();

    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("none.sock");
    let err = wait_for_socket(&socket.to_string_lossy(), &exited, 3, Duration::from_millis(20))
      .await
      .unwrap_err();
    assert!(matches!(err, ProcessError::SocketNotReady(_)));
    assert!(!process.has_exited());

    process.kill();
    tokio::time::timeout(Duration::from_secs(2), exited.wait())
      .await
      .unwrap();
    assert!(process.has_exited());
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn socket_probe_succeeds_once_listening() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("up.sock");
    let _listener = tokio::net::UnixListener::bind(&socket).unwrap();

    let (_notifier, exited) = exit_signal();
    wait_for_socket(&socket.to_string_lossy(), &exited, 2, Duration::from_millis(5))
      .await
      .unwrap();
  }

  #[test]
  fn cleanup_ignores_missing_file() {
    cleanup_ipc("/nonexistent/anisan-test.sock");
  }
}
