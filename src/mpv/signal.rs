//! One-shot "process exited" broadcast.

use std::sync::Arc;

use tokio::sync::watch;

/// Create a linked notifier/signal pair.
pub fn exit_signal() -> (ExitNotifier, ExitSignal) {
  let (tx, rx) = watch::channel(false);
  (
    ExitNotifier(tx),
    ExitSignal {
      rx,
      _idle: None,
    },
  )
}

/// Fires the exit signal. Held by the reaper task only.
#[derive(Debug)]
pub struct ExitNotifier(watch::Sender<bool>);

impl ExitNotifier {
  /// Flip the signal. Only the first call has an effect.
  pub fn fire(&self) {
    self.0.send_if_modified(|exited| {
      if *exited {
        false
      } else {
        *exited = true;
        true
      }
    });
  }
}

/// Cloneable view of the exit signal. Any number of tasks may wait on it,
/// before or after it fires.
#[derive(Debug, Clone)]
pub struct ExitSignal {
  rx: watch::Receiver<bool>,
  /// Sender kept alive by `never()` so waiters stay pending.
  _idle: Option<Arc<watch::Sender<bool>>>,
}

impl ExitSignal {
  /// A signal that never fires, for sessions without a process.
  pub fn never() -> Self {
    let (tx, rx) = watch::channel(false);
    ExitSignal {
      rx,
      _idle: Some(Arc::new(tx)),
    }
  }

  pub fn has_fired(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolve once the process has exited. A dropped notifier counts as exit.
  pub async fn wait(&self) {
    let mut rx = self.rx.clone();
    let _ = rx.wait_for(|exited| *exited).await;
  }
}
