//! Long-lived event connection to MPV.
//!
//! mpv pushes newline-delimited JSON on any connection that has observed
//! properties. A single read may carry several objects or end mid-object,
//! so bytes go through a [`LineSplitter`] before decoding.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ipc::{self, IpcError, IpcStream, TransportError};
use super::protocol::{MpvCommand, MpvMessage};

/// Properties observed on the event connection, with their observer IDs.
pub const OBSERVED_PROPERTIES: [(i64, &str); 4] = [
  (1, "time-pos"),
  (2, "pause"),
  (3, "seeking"),
  (4, "eof-reached"),
];

/// Unterminated data beyond this is garbage, not a slow event.
const MAX_PENDING: usize = 1 << 20;

/// Floor for the read deadline; a zero deadline would spin the read loop.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Incremental newline splitter.
///
/// Bytes after the last `\n` are kept until a later `feed` completes them.
#[derive(Debug, Default)]
pub struct LineSplitter {
  pending: Vec<u8>,
}

impl LineSplitter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append `bytes` and return every line completed by them, trimmed,
  /// skipping blank ones.
  pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
    self.pending.extend_from_slice(bytes);

    let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
      if self.pending.len() > MAX_PENDING {
        log::warn!("Dropping {} bytes of unterminated IPC data", self.pending.len());
        self.pending.clear();
      }
      return Vec::new();
    };

    let rest = self.pending.split_off(last_newline + 1);
    let complete = std::mem::replace(&mut self.pending, rest);

    complete
      .split(|b| *b == b'\n')
      .map(|line| String::from_utf8_lossy(line).trim().to_string())
      .filter(|line| !line.is_empty())
      .collect()
  }

  /// Bytes still waiting for a newline.
  pub fn pending(&self) -> &[u8] {
    &self.pending
  }
}

/// Receives `(property, value)` for property changes and `(event, raw)` for
/// every other event kind.
pub type EventCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Decode one line and hand it to the callback. Malformed lines are dropped.
pub(crate) fn dispatch_line(line: &str, callback: &EventCallback) {
  let (event, raw) = match MpvMessage::parse(line) {
    Ok(MpvMessage::Event(event, raw)) => (event, raw),
    // Replies to our observe_property commands
    Ok(MpvMessage::Response(_)) => return,
    Err(e) => {
      log::trace!("Dropping malformed event line: {}", e);
      return;
    }
  };

  if event.is_property_change() {
    match event.name.as_deref() {
      Some(name) if !name.is_empty() => {
        let data = event.data.unwrap_or(Value::Null);
        callback(name, &data);
      }
      _ => {}
    }
  } else if !event.event.is_empty() {
    callback(&event.event, &raw);
  }
}

#[derive(Default)]
struct ListenerState {
  listening: bool,
  generation: u64,
  stop: Option<CancellationToken>,
  task: Option<JoinHandle<()>>,
}

/// Dedicated event reader for one player socket.
#[derive(Clone)]
pub struct EventListener {
  path: String,
  read_timeout: Duration,
  state: Arc<Mutex<ListenerState>>,
}

impl EventListener {
  pub fn new(path: impl Into<String>, read_timeout: Duration) -> Self {
    Self {
      path: path.into(),
      read_timeout: read_timeout.max(MIN_READ_TIMEOUT),
      state: Arc::new(Mutex::new(ListenerState::default())),
    }
  }

  pub async fn is_listening(&self) -> bool {
    self.state.lock().await.listening
  }

  /// Open the event connection, observe the tracked properties and start the
  /// read loop. A no-op while already listening.
  ///
  /// Observations in mpv are per client connection, so the observe commands
  /// are written on the same connection that is then read for events.
  pub async fn start<F>(&self, callback: F) -> Result<(), IpcError>
  where
    F: Fn(&str, &Value) + Send + Sync + 'static,
  {
    let mut state = self.state.lock().await;
    if state.listening {
      return Ok(());
    }

    let mut conn = tokio::time::timeout(self.read_timeout, ipc::connect(&self.path))
      .await
      .map_err(|_| TransportError::Timeout)?
      .map_err(TransportError::Connect)?;

    for (id, name) in OBSERVED_PROPERTIES {
      let line = MpvCommand::observe_property(id, name).to_line()?;
      ipc::write_line(&mut conn, &line, self.read_timeout).await?;
    }

    let stop = CancellationToken::new();
    state.generation += 1;
    state.listening = true;
    state.stop = Some(stop.clone());

    let callback: EventCallback = Arc::new(callback);
    let shared = self.state.clone();
    let generation = state.generation;
    let read_timeout = self.read_timeout;
    state.task = Some(tokio::spawn(async move {
      read_loop(conn, callback, stop, read_timeout).await;

      let mut state = shared.lock().await;
      // A newer start() owns the state now
      if state.generation == generation {
        state.listening = false;
        state.stop = None;
      }
    }));

    log::info!(
      "mpv event listener started on {} (observing: time-pos, pause, seeking, eof-reached)",
      self.path
    );
    Ok(())
  }

  /// Stop the read loop and drop the event connection.
  pub async fn stop(&self) {
    let mut state = self.state.lock().await;
    if !state.listening {
      return;
    }
    if let Some(stop) = state.stop.take() {
      stop.cancel();
    }
    state.task = None;
    state.listening = false;
    log::debug!("mpv event listener stopped");
  }
}

async fn read_loop(
  mut conn: IpcStream,
  callback: EventCallback,
  stop: CancellationToken,
  read_timeout: Duration,
) {
  let mut splitter = LineSplitter::new();
  let mut buf = [0u8; 4096];

  loop {
    let read = tokio::select! {
      biased;
      _ = stop.cancelled() => break,
      read = tokio::time::timeout(read_timeout, conn.read(&mut buf)) => read,
    };

    match read {
      // Idle; go round and re-check the stop signal.
      Err(_) => continue,
      Ok(Ok(0)) => {
        log::info!("mpv event connection closed");
        break;
      }
      Ok(Ok(n)) => {
        for line in splitter.feed(&buf[..n]) {
          if stop.is_cancelled() {
            return;
          }
          dispatch_line(&line, &callback);
        }
      }
      Ok(Err(e)) => {
        log::warn!("mpv event listener read error: {}", e);
        break;
      }
    }
  }
}
