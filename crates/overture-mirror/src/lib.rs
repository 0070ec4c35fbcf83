//! Mirror selection for Overture.
//!
//! - [`MirrorRegistry`]: persisted per-class primary/fallback mirrors and global toggles
//! - [`OfficialUpstreams`]: hardcoded upstream per resource class
//! - [`MirrorSpeedRanker`]: concurrent probing with a TTL-bounded ranking cache

#![warn(clippy::all)]

mod official;
mod probe;
mod ranker;
mod registry;
mod speed;

pub use official::OfficialUpstreams;
pub use probe::{HttpProbe, MirrorProbe};
pub use ranker::MirrorSpeedRanker;
pub use registry::{MirrorEntry, MirrorRegistry, MirrorSettings, validate_mirror_url};
pub use speed::{CacheState, MirrorStatus, SpeedTestCache, SpeedTestResult, rank_results};
