use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anisan_player::{
  AniSkipClient, PlaybackDriver, Player, PlayerConfig, PlayerKind, SkipTimes, Video,
};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, ValueEnum)]
enum PlayerArg {
  Mpv,
  Iina,
}

#[derive(Parser)]
#[command(name = "anisan-play", about = "Play a stream in mpv with intro/outro skipping")]
struct Cli {
  /// URL or local file to play
  target: String,

  #[arg(long, default_value = "")]
  title: String,

  /// Request header, `Name: value` (repeatable)
  #[arg(long = "header", value_parser = parse_header)]
  headers: Vec<(String, String)>,

  /// MyAnimeList id, used to look up skip times
  #[arg(long, requires = "episode")]
  mal_id: Option<u64>,

  #[arg(long, requires = "mal_id")]
  episode: Option<u32>,

  #[arg(long, value_enum)]
  player: Option<PlayerArg>,

  /// Config file (defaults to the per-user config directory)
  #[arg(long)]
  config: Option<PathBuf>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
  let (name, value) = raw
    .split_once(':')
    .ok_or_else(|| format!("expected `Name: value`, got {:?}", raw))?;
  let name = name.trim();
  if name.is_empty() {
    return Err("header name is empty".to_string());
  }
  Ok((name.to_string(), value.trim().to_string()))
}

async fn lookup_skip_times(mal_id: Option<u64>, episode: Option<u32>) -> Option<SkipTimes> {
  let (mal_id, episode) = mal_id.zip(episode)?;
  let client = match AniSkipClient::new() {
    Ok(client) => client,
    Err(e) => {
      log::warn!("Skip lookup disabled: {}", e);
      return None;
    }
  };
  match client.get_skip_times(mal_id, episode).await {
    Ok(times) => times,
    Err(e) => {
      log::warn!("Skip lookup failed: {}", e);
      None
    }
  }
}

#[tokio::main]
async fn main() -> ExitCode {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  let cli = Cli::parse();

  let loaded = match &cli.config {
    Some(path) => PlayerConfig::load(path),
    None => PlayerConfig::load_default(),
  };
  let mut config = match loaded {
    Ok(config) => config,
    Err(e) => {
      log::error!("Failed to load config: {}", e);
      return ExitCode::FAILURE;
    }
  };
  if let Some(player) = cli.player {
    config.player = match player {
      PlayerArg::Mpv => PlayerKind::Mpv,
      PlayerArg::Iina => PlayerKind::Iina,
    };
  }

  let skip_times = lookup_skip_times(cli.mal_id, cli.episode).await;
  let video = Video {
    url: cli.target,
    title: cli.title,
    headers: cli.headers.into_iter().collect::<HashMap<_, _>>(),
    quality: None,
  };

  let driver = PlaybackDriver::new(
    Player::from_config(config.clone()),
    config.skip_intro,
    config.skip_outro,
  );

  let cancel = CancellationToken::new();
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      log::info!("Interrupted, closing player");
      on_signal.cancel();
    }
  });

  match driver.run(&video, skip_times, cancel, |_| {}).await {
    Ok(watched) => {
      println!("{:.1}", watched);
      ExitCode::SUCCESS
    }
    Err(e) => {
      log::error!("Playback failed: {}", e);
      ExitCode::FAILURE
    }
  }
}
