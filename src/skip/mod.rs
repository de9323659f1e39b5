//! Intro/outro skipping: interval lookup and the position-driven controller.

mod aniskip;
mod skipper;

pub use aniskip::{parse_response, AniSkipClient, Interval, SkipLookupError, SkipTimes};
pub use skipper::{Segment, SkipController};
