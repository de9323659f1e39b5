//! AniSkip HTTP client for opening/ending skip intervals.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.aniskip.com/v1/skip-times";

#[derive(Debug, Error)]
pub enum SkipLookupError {
  #[error("HTTP request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("HTTP error: {0}")]
  Status(u16),

  #[error("Malformed skip-times response: {0}")]
  Json(#[from] serde_json::Error),
}

/// A `[start, end)` range in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Interval {
  pub start: f64,
  pub end: f64,
}

impl Interval {
  pub fn contains(&self, position: f64) -> bool {
    position >= self.start && position < self.end
  }
}

/// Opening and ending intervals for one episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipTimes {
  pub opening: Interval,
  pub ending: Interval,
  pub has_intro: bool,
  pub has_outro: bool,
}

#[derive(Deserialize)]
struct ApiResponse {
  #[serde(default)]
  found: bool,
  #[serde(default)]
  results: Vec<ApiResult>,
}

#[derive(Deserialize)]
struct ApiResult {
  interval: ApiInterval,
  skip_type: String,
}

#[derive(Deserialize)]
struct ApiInterval {
  start_time: f64,
  end_time: f64,
}

/// Turn an API body into skip times. `None` when nothing is registered.
pub fn parse_response(body: &str) -> Result<Option<SkipTimes>, SkipLookupError> {
  let data: ApiResponse = serde_json::from_str(body)?;
  if !data.found || data.results.is_empty() {
    return Ok(None);
  }

  let mut times = SkipTimes::default();
  for result in data.results {
    let interval = Interval {
      start: result.interval.start_time,
      end: result.interval.end_time,
    };
    match result.skip_type.as_str() {
      "op" => {
        times.opening = interval;
        times.has_intro = true;
      }
      "ed" => {
        times.ending = interval;
        times.has_outro = true;
      }
      other => log::debug!("Ignoring skip type {:?}", other),
    }
  }
  Ok(Some(times))
}

/// Skip-interval lookup against the AniSkip API.
pub struct AniSkipClient {
  http: Client,
  base_url: String,
}

impl AniSkipClient {
  pub fn new() -> Result<Self, SkipLookupError> {
    Self::with_base_url(DEFAULT_BASE_URL)
  }

  pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, SkipLookupError> {
    Ok(Self {
      http: Client::builder().timeout(Duration::from_secs(10)).build()?,
      base_url: base_url.into().trim_end_matches('/').to_string(),
    })
  }

  async fn fetch(&self, mal_id: u64, episode: u32) -> Result<String, SkipLookupError> {
    let url = format!("{}/{}/{}", self.base_url, mal_id, episode);
    let response = self
      .http
      .get(&url)
      .query(&[("types", "op"), ("types", "ed")])
      .send()
      .await?;

    if !response.status().is_success() {
      return Err(SkipLookupError::Status(response.status().as_u16()));
    }
    Ok(response.text().await?)
  }

  /// Fetch skip times for an episode.
  ///
  /// The service is optional: network failures and error statuses yield
  /// `Ok(None)`. Only an unreadable body is an error.
  pub async fn get_skip_times(
    &self,
    mal_id: u64,
    episode: u32,
  ) -> Result<Option<SkipTimes>, SkipLookupError> {
    let body = match self.fetch(mal_id, episode).await {
      Ok(body) => body,
      Err(SkipLookupError::Status(status)) => {
        log::warn!("aniskip returned status {}", status);
        return Ok(None);
      }
      Err(SkipLookupError::Http(e)) if !e.is_body() && !e.is_decode() => {
        log::warn!("aniskip request failed: {}", e);
        return Ok(None);
      }
      Err(e) => return Err(e),
    };

    let times = parse_response(&body)?;
    match &times {
      Some(t) => log::info!(
        "Skip times for {} ep {}: intro={} outro={}",
        mal_id,
        episode,
        t.has_intro,
        t.has_outro
      ),
      None => log::info!("No skip times for {} ep {}", mal_id, episode),
    }
    Ok(times)
  }
}
