//! Launch and drive an external media player, with automatic intro/outro skipping.
//!
//! [`mpv::MpvPlayer`] owns one mpv process and talks to it over JSON IPC;
//! [`playback::PlaybackDriver`] ties a player, skip times and a completion
//! callback together for a single episode.

pub mod config;
pub mod iina;
pub mod mpv;
pub mod playback;
pub mod player;
pub mod skip;

pub use config::{ConfigError, PlayerConfig, PlayerKind};
pub use mpv::{MpvPlayer, PlayerError};
pub use playback::{PlaybackDriver, Video};
pub use player::Player;
pub use skip::{AniSkipClient, SkipController, SkipTimes};
