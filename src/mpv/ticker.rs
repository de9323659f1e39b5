//! Periodic position/duration polling.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::ipc::IpcClient;
use super::signal::ExitSignal;

/// `tokio::time::interval` panics on a zero period.
const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Polls the player once per period and reports `(position, duration)`.
///
/// Stops on its own when the process exits.
#[derive(Debug, Default)]
pub struct ProgressTicker {
  stop: Mutex<Option<CancellationToken>>,
}

impl ProgressTicker {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_running(&self) -> bool {
    self
      .stop
      .lock()
      .as_ref()
      .is_some_and(|token| !token.is_cancelled())
  }

  /// Start polling. A no-op while a ticker is already running.
  pub fn start<F>(&self, ipc: IpcClient, exited: ExitSignal, period: Duration, callback: F)
  where
    F: Fn(f64, f64) + Send + Sync + 'static,
  {
    let mut stop = self.stop.lock();
    if stop.as_ref().is_some_and(|token| !token.is_cancelled()) {
      return;
    }

    let token = CancellationToken::new();
    *stop = Some(token.clone());
    let callback = Arc::new(callback);
    let period = period.max(MIN_PERIOD);

    tokio::spawn(async move {
      let mut interval = tokio::time::interval(period);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      // The first tick of an interval completes immediately
      interval.tick().await;

      loop {
        tokio::select! {
          biased;
          _ = token.cancelled() => break,
          _ = exited.wait() => {
            log::debug!("Player exited, stopping progress ticker");
            break;
          }
          _ = interval.tick() => {}
        }

        if let Some((position, duration)) = poll(&ipc).await {
          if token.is_cancelled() || exited.has_fired() {
            break;
          }
          callback(position, duration);
        }
      }
      // Idempotent, so racing an explicit stop() is harmless.
      token.cancel();
    });
  }

  /// Stop polling. Safe to call when not running or more than once.
  pub fn stop(&self) {
    if let Some(token) = self.stop.lock().take() {
      token.cancel();
    }
  }
}

/// One sample, or `None` to skip this tick.
async fn poll(ipc: &IpcClient) -> Option<(f64, f64)> {
  if !ipc.ping().await {
    return None;
  }

  let position = match ipc.get_f64("time-pos").await {
    Ok(position) => position,
    Err(e) => {
      log::trace!("Skipping tick: {}", e);
      return None;
    }
  };

  // Live streams have no duration
  let duration = ipc.get_f64("duration").await.unwrap_or(0.0);
  Some((position, duration))
}
