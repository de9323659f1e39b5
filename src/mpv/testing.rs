//! In-process stand-in for mpv's IPC server, used by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

type Responder = dyn Fn(&Value) -> Value + Send + Sync;

pub(crate) fn ok(data: Value) -> Value {
  json!({ "data": data, "request_id": 0, "error": "success" })
}

pub(crate) fn remote_error(msg: &str) -> Value {
  json!({ "request_id": 0, "error": msg })
}

/// Answers the properties the session polls, like a file that is playing.
pub(crate) fn playing(position: f64, duration: f64) -> impl Fn(&Value) -> Value + Send + Sync {
  move |cmd| match (cmd[0].as_str(), cmd[1].as_str()) {
    (Some("get_property"), Some("pid")) => ok(json!(4242)),
    (Some("get_property"), Some("time-pos")) => ok(json!(position)),
    (Some("get_property"), Some("duration")) => ok(json!(duration)),
    (Some("get_property"), Some("pause")) => ok(json!(false)),
    _ => ok(Value::Null),
  }
}

struct Shared {
  commands: Mutex<Vec<Value>>,
  in_flight: AtomicUsize,
  max_in_flight: AtomicUsize,
}

/// Listens on a temp socket; records every command array and replies
/// with whatever the responder returns.
pub(crate) struct FakeMpv {
  path: String,
  shared: Arc<Shared>,
  task: JoinHandle<()>,
  _dir: TempDir,
}

impl FakeMpv {
  pub(crate) async fn start<F>(responder: F) -> Self
  where
    F: Fn(&Value) -> Value + Send + Sync + 'static,
  {
    Self::start_slow(Duration::ZERO, responder).await
  }

  /// Like `start`, but every reply is delayed.
  pub(crate) async fn start_slow<F>(delay: Duration, responder: F) -> Self
  where
    F: Fn(&Value) -> Value + Send + Sync + 'static,
  {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mpv.sock");
    let listener = UnixListener::bind(&path).expect("bind fake mpv socket");
    let shared = Arc::new(Shared {
      commands: Mutex::new(Vec::new()),
      in_flight: AtomicUsize::new(0),
      max_in_flight: AtomicUsize::new(0),
    });
    let responder: Arc<Responder> = Arc::new(responder);

    let task_shared = shared.clone();
    let task = tokio::spawn(async move {
      while let Ok((conn, _)) = listener.accept().await {
        let shared = task_shared.clone();
        let responder = responder.clone();
        tokio::spawn(async move {
          let (reader, mut writer) = conn.into_split();
          let mut lines = BufReader::new(reader).lines();
          while let Ok(Some(line)) = lines.next_line().await {
            let Ok(request) = serde_json::from_str::<Value>(&line) else {
              continue;
            };
            let cmd = request["command"].clone();

            let now = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            shared.max_in_flight.fetch_max(now, Ordering::SeqCst);
            shared.commands.lock().push(cmd.clone());
            if !delay.is_zero() {
              tokio::time::sleep(delay).await;
            }
            let reply = responder(&cmd);
            shared.in_flight.fetch_sub(1, Ordering::SeqCst);

            let mut out = reply.to_string().into_bytes();
            out.push(b'\n');
            if writer.write_all(&out).await.is_err() {
              break;
            }
          }
        });
      }
    });

    Self {
      path: path.to_string_lossy().into_owned(),
      shared,
      task,
      _dir: dir,
    }
  }

  pub(crate) fn path(&self) -> &str {
    &self.path
  }

  /// Every command array received so far, in arrival order.
  pub(crate) fn commands(&self) -> Vec<Value> {
    self.shared.commands.lock().clone()
  }

  pub(crate) fn count(&self, method: &str) -> usize {
    self
      .commands()
      .iter()
      .filter(|cmd| cmd[0].as_str() == Some(method))
      .count()
  }

  /// Highest number of commands the fake was handling at once.
  pub(crate) fn max_in_flight(&self) -> usize {
    self.shared.max_in_flight.load(Ordering::SeqCst)
  }
}

impl Drop for FakeMpv {
  fn drop(&mut self) {
    self.task.abort();
  }
}
