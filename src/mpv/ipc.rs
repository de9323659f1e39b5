//! Request/response IPC with MPV.
//!
//! Every command dials the socket fresh, writes one line and reads until the
//! matching response line arrives. Commands from all callers of a session are
//! serialized through one async mutex so they never interleave on the wire.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::events::LineSplitter;
use super::protocol::{MpvCommand, MpvMessage, MpvResponse, PropertyValue, PROPERTY_UNAVAILABLE};
use crate::config::PlayerConfig;

/// A single failed attempt at the transport level. These are retried.
#[derive(Error, Debug)]
pub enum TransportError {
  #[error("Connection failed: {0}")]
  Connect(#[source] io::Error),
  #[error("Write failed: {0}")]
  Write(#[source] io::Error),
  #[error("Read failed: {0}")]
  Read(#[source] io::Error),
  #[error("Timed out waiting for response")]
  Timeout,
  #[error("Connection closed before a response arrived")]
  Closed,
  #[error("Malformed response: {0}")]
  Decode(#[source] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum IpcError {
  #[error("IPC command failed after {attempts} attempts: {last}")]
  Exhausted {
    attempts: u32,
    #[source]
    last: TransportError,
  },
  #[error("IPC transport error: {0}")]
  Transport(#[from] TransportError),
  #[error("MPV error: {0}")]
  Remote(String),
  #[error("Property {property}: expected {expected}, got {found}")]
  TypeMismatch {
    property: String,
    expected: &'static str,
    found: &'static str,
  },
  #[error("Failed to encode command: {0}")]
  Encode(#[from] serde_json::Error),
  #[error("No player socket assigned")]
  NotStarted,
}

impl IpcError {
  /// True for the remote error meaning "no media loaded", which callers treat as a state.
  pub fn is_property_unavailable(&self) -> bool {
    matches!(self, IpcError::Remote(msg) if msg.contains(PROPERTY_UNAVAILABLE))
  }
}

#[cfg(unix)]
pub(crate) type IpcStream = tokio::net::UnixStream;
#[cfg(windows)]
pub(crate) type IpcStream = tokio::net::windows::named_pipe::NamedPipeClient;

/// Open a raw connection to the player socket/pipe.
#[cfg(unix)]
pub(crate) async fn connect(path: &str) -> io::Result<IpcStream> {
  tokio::net::UnixStream::connect(path).await
}

#[cfg(windows)]
pub(crate) async fn connect(path: &str) -> io::Result<IpcStream> {
  use tokio::net::windows::named_pipe::ClientOptions;
  ClientOptions::new().open(path)
}

const READ_BUF_SIZE: usize = 4096;

/// Write one full line, giving up after `deadline`.
pub(crate) async fn write_line(
  conn: &mut IpcStream,
  line: &[u8],
  deadline: Duration,
) -> Result<(), TransportError> {
  tokio::time::timeout(deadline, async {
    conn.write_all(line).await?;
    conn.flush().await
  })
  .await
  .map_err(|_| TransportError::Timeout)?
  .map_err(TransportError::Write)
}

/// Short-lived-connection IPC client bound to one socket path.
///
/// Cheap to clone; clones share the serialization lock.
#[derive(Debug, Clone)]
pub struct IpcClient {
  path: String,
  lock: Arc<Mutex<()>>,
  retries: u32,
  retry_delay: Duration,
  read_timeout: Duration,
}

impl IpcClient {
  pub fn new(path: impl Into<String>, lock: Arc<Mutex<()>>, config: &PlayerConfig) -> Self {
    Self {
      path: path.into(),
      lock,
      retries: config.ipc_retries.max(1),
      retry_delay: Duration::from_millis(config.ipc_retry_delay_ms),
      read_timeout: Duration::from_millis(config.ipc_read_timeout_ms),
    }
  }

  /// Send a command and return the response `data`.
  ///
  /// Transport failures are retried up to the configured bound; an error
  /// reported by mpv itself is returned immediately.
  pub async fn send(&self, cmd: &MpvCommand) -> Result<Value, IpcError> {
    let line = cmd.to_line()?;
    let _guard = self.lock.lock().await;

    let mut last = TransportError::Closed;
    for attempt in 1..=self.retries {
      if attempt > 1 {
        tokio::time::sleep(self.retry_delay).await;
      }

      match self.send_once(&line).await {
        Ok(response) if response.is_success() => return Ok(response.data),
        Ok(response) => return Err(IpcError::Remote(response.error)),
        Err(e) => {
          log::debug!(
            "IPC {:?} attempt {}/{} failed: {}",
            cmd.method().unwrap_or("?"),
            attempt,
            self.retries,
            e
          );
          last = e;
        }
      }
    }

    Err(IpcError::Exhausted {
      attempts: self.retries,
      last,
    })
  }

  async fn send_once(&self, line: &[u8]) -> Result<MpvResponse, TransportError> {
    let mut conn = tokio::time::timeout(self.read_timeout, connect(&self.path))
      .await
      .map_err(|_| TransportError::Timeout)?
      .map_err(TransportError::Connect)?;

    // One deadline covers the whole exchange.
    tokio::time::timeout(self.read_timeout, async {
      write_line(&mut conn, line, self.read_timeout).await?;
      read_response(&mut conn).await
    })
    .await
    .map_err(|_| TransportError::Timeout)?
  }

  /// Get a property as a typed value.
  pub async fn get_property(&self, name: &str) -> Result<PropertyValue, IpcError> {
    let data = self.send(&MpvCommand::get_property(name)).await?;
    Ok(PropertyValue::from(data))
  }

  pub async fn get_f64(&self, name: &str) -> Result<f64, IpcError> {
    match self.get_property(name).await? {
      PropertyValue::Number(n) => Ok(n),
      other => Err(IpcError::TypeMismatch {
        property: name.to_string(),
        expected: "number",
        found: other.kind(),
      }),
    }
  }

  pub async fn get_bool(&self, name: &str) -> Result<bool, IpcError> {
    match self.get_property(name).await? {
      PropertyValue::Bool(b) => Ok(b),
      other => Err(IpcError::TypeMismatch {
        property: name.to_string(),
        expected: "bool",
        found: other.kind(),
      }),
    }
  }

  pub async fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<(), IpcError> {
    self.send(&MpvCommand::set_property(name, value)).await?;
    Ok(())
  }

  /// Seek to absolute position in seconds.
  pub async fn seek(&self, seconds: f64) -> Result<(), IpcError> {
    self.send(&MpvCommand::seek(seconds)).await?;
    Ok(())
  }

  pub async fn quit(&self) -> Result<(), IpcError> {
    self.send(&MpvCommand::quit()).await?;
    Ok(())
  }

  /// Cheap liveness probe.
  pub async fn ping(&self) -> bool {
    self.send(&MpvCommand::get_property("pid")).await.is_ok()
  }
}

/// Read lines until the first command response. Event lines are skipped.
async fn read_response(conn: &mut IpcStream) -> Result<MpvResponse, TransportError> {
  let mut splitter = LineSplitter::new();
  let mut buf = [0u8; READ_BUF_SIZE];

  loop {
    let n = conn.read(&mut buf).await.map_err(TransportError::Read)?;
    if n == 0 {
      return Err(TransportError::Closed);
    }

    for line in splitter.feed(&buf[..n]) {
      match MpvMessage::parse(&line).map_err(TransportError::Decode)? {
        MpvMessage::Response(response) => return Ok(response),
        MpvMessage::Event(event, _) => {
          log::trace!("Skipping event on command connection: {}", event.event)
        }
      }
    }
  }
}
