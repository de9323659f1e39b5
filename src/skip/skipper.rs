//! Automatic intro/outro skipping driven by position samples.

use std::sync::atomic::{AtomicBool, Ordering};

use super::aniskip::{Interval, SkipTimes};
use crate::mpv::{Chapter, MpvPlayer, PlayerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
  Opening,
  Ending,
}

/// Seeks past the opening and ending of one episode.
///
/// Each interval is skipped at most once per session; a viewer who seeks
/// back into an opening gets to watch it.
#[derive(Debug)]
pub struct SkipController {
  times: SkipTimes,
  skip_intro: bool,
  skip_outro: bool,
  opening_done: AtomicBool,
  ending_done: AtomicBool,
}

impl SkipController {
  pub fn new(times: SkipTimes, skip_intro: bool, skip_outro: bool) -> Self {
    Self {
      times,
      skip_intro,
      skip_outro,
      opening_done: AtomicBool::new(false),
      ending_done: AtomicBool::new(false),
    }
  }

  fn done_flag(&self, segment: Segment) -> &AtomicBool {
    match segment {
      Segment::Opening => &self.opening_done,
      Segment::Ending => &self.ending_done,
    }
  }

  /// Where to seek for `position`, if anywhere. Opening wins over ending.
  pub fn target_for(&self, position: f64) -> Option<(Segment, f64)> {
    let candidates = [
      (
        Segment::Opening,
        self.skip_intro && self.times.has_intro,
        self.times.opening,
      ),
      (
        Segment::Ending,
        self.skip_outro && self.times.has_outro,
        self.times.ending,
      ),
    ];

    candidates
      .into_iter()
      .filter(|(segment, enabled, _)| *enabled && !self.done_flag(*segment).load(Ordering::Acquire))
      .find(|(_, _, interval)| interval.contains(position))
      .map(|(segment, _, interval)| (segment, interval.end))
  }

  /// Seek past the interval containing `position`. Returns whether a seek
  /// was issued.
  ///
  /// A failed seek leaves the interval armed so the next sample retries.
  pub async fn check(&self, player: &MpvPlayer, position: f64) -> Result<bool, PlayerError> {
    let Some((segment, target)) = self.target_for(position) else {
      return Ok(false);
    };
    // Claim first so a concurrent sample can't seek twice.
    if self.done_flag(segment).swap(true, Ordering::AcqRel) {
      return Ok(false);
    }

    log::info!("Skipping {:?}: {:.1}s -> {:.1}s", segment, position, target);
    if let Err(e) = player.seek(target).await {
      self.done_flag(segment).store(false, Ordering::Release);
      return Err(e);
    }
    Ok(true)
  }

  /// Timeline markers for the known intervals, in ascending time order.
  pub fn chapters(&self) -> Vec<Chapter> {
    let mut chapters = vec![Chapter::new("Part A", 0.0)];
    if self.times.has_intro {
      push_interval(&mut chapters, "Opening", "Part B", self.times.opening);
    }
    if self.times.has_outro {
      push_interval(&mut chapters, "Ending", "Preview / Next", self.times.ending);
    }
    chapters
  }

  /// Push the chapter list to the player's timeline.
  pub async fn apply_chapters(&self, player: &MpvPlayer) -> Result<(), PlayerError> {
    let chapters = self.chapters();
    log::debug!("Applying {} chapters", chapters.len());
    player.set_chapters(&chapters).await
  }
}

fn push_interval(chapters: &mut Vec<Chapter>, title: &str, after: &str, interval: Interval) {
  chapters.push(Chapter::new(title, interval.start));
  chapters.push(Chapter::new(after, interval.end));
}

#[cfg(test)]
mod tests {
  use super::*;

  fn both() -> SkipTimes {
    SkipTimes {
      opening: Interval { start: 10.0, end: 30.0 },
      ending: Interval { start: 200.0, end: 210.0 },
      has_intro: true,
      has_outro: true,
    }
  }

  #[test]
  fn targets_follow_intervals() {
    let skip = SkipController::new(both(), true, true);
    assert_eq!(skip.target_for(5.0), None);
    assert_eq!(skip.target_for(15.0), Some((Segment::Opening, 30.0)));
    assert_eq!(skip.target_for(205.0), Some((Segment::Ending, 210.0)));
    assert_eq!(skip.target_for(35.0), None);
    assert_eq!(skip.target_for(30.0), None);
  }

  #[test]
  fn disabled_or_absent_segments_are_ignored() {
    let skip = SkipController::new(both(), false, true);
    assert_eq!(skip.target_for(15.0), None);
    assert_eq!(skip.target_for(205.0), Some((Segment::Ending, 210.0)));

    let no_outro = SkipTimes {
      has_outro: false,
      ..both()
    };
    let skip = SkipController::new(no_outro, true, true);
    assert_eq!(skip.target_for(205.0), None);
  }

  #[test]
  fn five_chapters_in_order() {
    let skip = SkipController::new(both(), true, true);
    let times = skip
      .chapters()
      .iter()
      .map(|c| c.time)
      .collect::<Vec<_>>();
    assert_eq!(times, vec![0.0, 10.0, 30.0, 200.0, 210.0]);
    let titles = skip
      .chapters()
      .into_iter()
      .map(|c| c.title)
      .collect::<Vec<_>>();
    assert_eq!(
      titles,
      vec!["Part A", "Opening", "Part B", "Ending", "Preview / Next"]
    );
  }

  #[test]
  fn chapters_without_intervals() {
    let skip = SkipController::new(SkipTimes::default(), true, true);
    assert_eq!(skip.chapters(), vec![Chapter::new("Part A", 0.0)]);
  }

  #[cfg(unix)]
  mod socket {
    use super::*;
    use crate::config::PlayerConfig;
    use crate::mpv::testing::{playing, remote_error, FakeMpv};
    use serde_json::{json, Value};

    fn player(mpv: &FakeMpv) -> MpvPlayer {
      let config = PlayerConfig {
        ipc_retry_delay_ms: 5,
        ipc_read_timeout_ms: 200,
        ..PlayerConfig::default()
      };
      MpvPlayer::attach(config, mpv.path())
    }

    fn seeks(mpv: &FakeMpv) -> Vec<Value> {
      mpv
        .commands()
        .into_iter()
        .filter(|cmd| cmd[0] == "seek")
        .collect()
    }

    #[tokio::test]
    async fn check_seeks_once_per_interval() {
      let mpv = FakeMpv::start(playing(0.0, 0.0)).await;
      let player = player(&mpv);
      let skip = SkipController::new(both(), true, true);

      assert!(!skip.check(&player, 5.0).await.unwrap());
      assert!(skip.check(&player, 15.0).await.unwrap());
      assert!(skip.check(&player, 205.0).await.unwrap());
      assert!(!skip.check(&player, 35.0).await.unwrap());
      // Viewer seeks back into the opening
      assert!(!skip.check(&player, 12.0).await.unwrap());

      assert_eq!(
        seeks(&mpv),
        vec![
          json!(["seek", 30.0, "absolute"]),
          json!(["seek", 210.0, "absolute"]),
        ]
      );
    }

    #[tokio::test]
    async fn failed_seek_stays_armed() {
      let mpv = FakeMpv::start(|_| remote_error("error running command")).await;
      let player = player(&mpv);
      let skip = SkipController::new(both(), true, true);

      assert!(skip.check(&player, 15.0).await.is_err());
      assert_eq!(skip.target_for(16.0), Some((Segment::Opening, 30.0)));
    }

    #[tokio::test]
    async fn apply_chapters_sends_one_command() {
      let mpv = FakeMpv::start(playing(0.0, 0.0)).await;
      let player = player(&mpv);
      SkipController::new(both(), true, true)
        .apply_chapters(&player)
        .await
        .unwrap();

      let commands = mpv.commands();
      assert_eq!(commands.len(), 1);
      assert_eq!(commands[0][0], "set_property");
      assert_eq!(commands[0][1], "chapter-list");
      assert_eq!(commands[0][2].as_array().unwrap().len(), 5);
    }
  }
}
