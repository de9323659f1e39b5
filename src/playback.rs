//! Runs one episode from launch to exit.

use std::collections::HashMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::mpv::{percent, redact_url, ExitSignal, MpvPlayer, PlayerError};
use crate::player::Player;
use crate::skip::{SkipController, SkipTimes};

/// Samples buffered between the ticker and the driver loop.
const SAMPLE_BUFFER: usize = 8;

/// A resolved stream ready to hand to the player.
#[derive(Debug, Clone, Default)]
pub struct Video {
  pub url: String,
  pub title: String,
  pub headers: HashMap<String, String>,
  pub quality: Option<String>,
}

/// Drives a [`Player`] through one playback session.
pub struct PlaybackDriver {
  player: Player,
  skip_intro: bool,
  skip_outro: bool,
}

impl PlaybackDriver {
  pub fn new(player: Player, skip_intro: bool, skip_outro: bool) -> Self {
    Self {
      player,
      skip_intro,
      skip_outro,
    }
  }

  /// Play `video` until the player exits or `cancel` fires, then close the
  /// session. `on_finish` receives the highest watched percentage seen.
  ///
  /// Players without IPC report 100% once they exit on their own.
  pub async fn run<F>(
    &self,
    video: &Video,
    skip_times: Option<SkipTimes>,
    cancel: CancellationToken,
    on_finish: F,
  ) -> Result<f64, PlayerError>
  where
    F: FnOnce(f64),
  {
    match &video.quality {
      Some(quality) => log::info!("Selected video: {} ({})", redact_url(&video.url), quality),
      None => log::info!("Selected video: {}", redact_url(&video.url)),
    }

    self
      .player
      .play(&video.url, &video.title, &video.headers)
      .await?;
    let exited = self.player.wait();
    log::info!("Player launched on socket {}", self.player.socket());

    let watched = match self.player.as_mpv() {
      Some(mpv) => self.watch(mpv, skip_times, &exited, &cancel).await,
      None => {
        tokio::select! {
          _ = cancel.cancelled() => 0.0,
          _ = exited.wait() => 100.0,
        }
      }
    };

    log::info!("Playback finished at {:.1}%", watched);
    on_finish(watched);
    self.player.close().await?;
    Ok(watched)
  }

  async fn watch(
    &self,
    mpv: &MpvPlayer,
    skip_times: Option<SkipTimes>,
    exited: &ExitSignal,
    cancel: &CancellationToken,
  ) -> f64 {
    let skipper =
      skip_times.map(|times| SkipController::new(times, self.skip_intro, self.skip_outro));
    if let Some(skipper) = &skipper {
      if let Err(e) = skipper.apply_chapters(mpv).await {
        log::warn!("Failed to apply chapters: {}", e);
      }
    }

    let listener = match mpv.event_listener() {
      Ok(listener) => {
        if let Err(e) = listener.start(on_event).await {
          log::warn!("Event listener unavailable: {}", e);
        }
        Some(listener)
      }
      Err(e) => {
        log::warn!("Event listener unavailable: {}", e);
        None
      }
    };

    let (tx, rx) = async_channel::bounded::<(f64, f64)>(SAMPLE_BUFFER);
    mpv.stop_progress_polling();
    if let Err(e) = mpv.start_progress_polling(move |position, duration| {
      // A full buffer means the driver is mid-seek; the next tick catches up.
      let _ = tx.try_send((position, duration));
    }) {
      log::warn!("Progress polling unavailable: {}", e);
    }

    let mut watched: f64 = 0.0;
    loop {
      let sample = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          log::info!("Playback cancelled");
          break;
        }
        _ = exited.wait() => break,
        sample = rx.recv() => sample,
      };

      let Ok((position, duration)) = sample else {
        // Ticker is gone; only an exit or a cancel can end the session now.
        tokio::select! {
          _ = cancel.cancelled() => {}
          _ = exited.wait() => {}
        }
        break;
      };

      watched = watched.max(percent(position, duration));
      if let Some(skipper) = &skipper {
        match skipper.check(mpv, position).await {
          Ok(_) => {}
          Err(PlayerError::Ipc(e)) if e.is_property_unavailable() => {
            log::debug!("Nothing loaded, skip check ignored");
          }
          Err(e) => log::warn!("Skip check failed: {}", e),
        }
      }
    }

    mpv.stop_progress_polling();
    if !exited.has_fired() {
      if let Ok(now) = mpv.get_percent_watched().await {
        watched = watched.max(now);
      }
    }
    if let Some(listener) = listener {
      listener.stop().await;
    }
    watched
  }
}

fn on_event(name: &str, value: &Value) {
  match name {
    "eof-reached" if value.as_bool() == Some(true) => log::info!("Reached end of file"),
    "pause" => log::debug!("Paused: {}", value),
    "end-file" => log::debug!("end-file: {}", value),
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::PlayerConfig;
  use crate::iina::IinaPlayer;

  #[tokio::test]
  async fn rejected_target_never_reaches_the_sink() {
    let driver = PlaybackDriver::new(Player::Mpv(MpvPlayer::new(PlayerConfig::default())), true, true);
    let video = Video {
      url: "--script=evil.lua".to_string(),
      title: "t".to_string(),
      ..Video::default()
    };
    let mut called = false;
    let result = driver
      .run(&video, None, CancellationToken::new(), |_| called = true)
      .await;
    assert!(matches!(result, Err(PlayerError::InvalidTarget(_))));
    assert!(!called);
  }

  #[tokio::test]
  async fn iina_rejects_bad_target_too() {
    let driver = PlaybackDriver::new(Player::Iina(IinaPlayer::new()), true, true);
    let video = Video {
      url: "   ".to_string(),
      ..Video::default()
    };
    let result = driver
      .run(&video, None, CancellationToken::new(), |_| {})
      .await;
    assert!(matches!(result, Err(PlayerError::InvalidTarget(_))));
  }

  #[cfg(unix)]
  mod socket {
    use super::*;
    use crate::mpv::testing::{playing, FakeMpv};
    use crate::skip::Interval;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn fast() -> PlayerConfig {
      PlayerConfig {
        ipc_retry_delay_ms: 5,
        ipc_read_timeout_ms: 200,
        event_read_timeout_ms: 100,
        tick_interval_ms: 20,
        quit_timeout_ms: 200,
        ..PlayerConfig::default()
      }
    }

    #[tokio::test]
    async fn skips_intro_and_reports_progress_on_cancel() {
      let mpv = FakeMpv::start(playing(15.0, 60.0)).await;
      let player = Player::Mpv(MpvPlayer::attach(fast(), mpv.path()));
      let driver = PlaybackDriver::new(player, true, true);
      let times = SkipTimes {
        opening: Interval { start: 10.0, end: 30.0 },
        has_intro: true,
        ..SkipTimes::default()
      };
      let video = Video {
        url: "https://example.com/ep1.mp4".to_string(),
        title: "Ep 1".to_string(),
        ..Video::default()
      };

      let cancel = CancellationToken::new();
      let stopper = cancel.clone();
      tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        stopper.cancel();
      });

      let reported = Arc::new(parking_lot::Mutex::new(None));
      let sink = reported.clone();
      let watched = driver
        .run(&video, Some(times), cancel, move |pct| *sink.lock() = Some(pct))
        .await
        .unwrap();

      assert_eq!(watched, 25.0);
      assert_eq!(*reported.lock(), Some(25.0));

      let commands = mpv.commands();
      assert!(commands.contains(&json!(["loadfile", "https://example.com/ep1.mp4", "replace"])));
      assert!(commands.iter().any(|c| c[1] == "chapter-list"));
      // The fake never moves, but the opening is only skipped once.
      assert_eq!(
        commands.iter().filter(|c| c[0] == "seek").count(),
        1
      );
      assert_eq!(mpv.count("quit"), 1);
    }
  }
}
