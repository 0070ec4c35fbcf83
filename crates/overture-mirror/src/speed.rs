//! Speed-test results and the TTL-bounded ranking cache.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

/// Probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorStatus {
    /// Responded in time with a non-error status.
    Online,
    /// Timed out, failed to connect or returned an error status.
    Offline,
}

/// One mirror probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedTestResult {
    /// Probed URL.
    pub url: String,
    /// Outcome.
    pub status: MirrorStatus,
    /// Elapsed time for online mirrors.
    pub response_time_ms: Option<u64>,
}

impl SpeedTestResult {
    /// An online result.
    #[must_use]
    pub fn online(url: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            url: url.into(),
            status: MirrorStatus::Online,
            response_time_ms: Some(response_time_ms),
        }
    }

    /// An offline result.
    #[must_use]
    pub fn offline(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: MirrorStatus::Offline,
            response_time_ms: None,
        }
    }

    /// Whether the mirror answered.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status == MirrorStatus::Online
    }
}

/// Order results: ascending response time, offline last, ties keep input order.
#[must_use]
pub fn rank_results(mut results: Vec<SpeedTestResult>) -> Vec<SpeedTestResult> {
    results.sort_by_key(|r| {
        (
            r.status == MirrorStatus::Offline,
            r.response_time_ms.unwrap_or(u64::MAX),
        )
    });
    results
}

/// Observable state of the ranking cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No cache file (or it was unreadable).
    Missing,
    /// Present and within its TTL.
    Valid,
    /// Present but past its TTL.
    Expired,
}

/// Persisted ranking with creation time and TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedTestCache {
    /// Ranked results.
    pub results: Vec<SpeedTestResult>,
    /// When the ranking was produced.
    pub created_at: DateTime<Utc>,
    /// Lifetime in seconds.
    pub ttl_seconds: u64,
}

impl SpeedTestCache {
    /// Wrap a fresh ranking.
    #[must_use]
    pub const fn new(results: Vec<SpeedTestResult>, created_at: DateTime<Utc>, ttl_seconds: u64) -> Self {
        Self {
            results,
            created_at,
            ttl_seconds,
        }
    }

    /// Instant the cache stops being valid.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX);
        self.created_at
            .checked_add_signed(Duration::try_seconds(ttl).unwrap_or(Duration::MAX))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Valid while `now < created_at + ttl`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }

    /// Tri-state at `now` (never `Missing`).
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> CacheState {
        if self.is_valid_at(now) {
            CacheState::Valid
        } else {
            CacheState::Expired
        }
    }

    /// Whether every URL in `urls` has a cached result.
    #[must_use]
    pub fn covers(&self, urls: &[String]) -> bool {
        let cached: HashSet<&str> = self.results.iter().map(|r| r.url.as_str()).collect();
        urls.iter().all(|u| cached.contains(u.as_str()))
    }

    /// Cached results for `urls`, in ranked order.
    #[must_use]
    pub fn ordered_for(&self, urls: &[String]) -> Vec<SpeedTestResult> {
        let wanted: HashSet<&str> = urls.iter().map(String::as_str).collect();
        self.results
            .iter()
            .filter(|r| wanted.contains(r.url.as_str()))
            .cloned()
            .collect()
    }

    /// Read the cache file. Missing or corrupt files yield `None`.
    #[must_use]
    pub fn load(path: &Path) -> Option<Self> {
        match overture_core::read_json_file(path) {
            Ok(cache) => cache,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable speed-test cache");
                None
            }
        }
    }

    /// Replace the cache file atomically.
    ///
    /// # Errors
    /// Returns error if the write fails.
    pub fn save(&self, path: &Path) -> overture_core::Result<()> {
        overture_core::write_json_file(path, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn offline_sorts_last_and_ties_keep_input_order() {
        let ranked = rank_results(vec![
            SpeedTestResult::offline("https://down.example"),
            SpeedTestResult::online("https://slow.example", 300),
            SpeedTestResult::online("https://tie-a.example", 50),
            SpeedTestResult::online("https://tie-b.example", 50),
        ]);
        let urls: Vec<&str> = ranked.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://tie-a.example",
                "https://tie-b.example",
                "https://slow.example",
                "https://down.example",
            ]
        );
    }

    #[test]
    fn ttl_boundary() {
        let cache = SpeedTestCache::new(Vec::new(), t0(), 3600);
        assert!(cache.is_valid_at(t0() + Duration::seconds(3599)));
        assert!(!cache.is_valid_at(t0() + Duration::seconds(3600)));
        assert!(!cache.is_valid_at(t0() + Duration::seconds(3601)));
        assert_eq!(cache.state_at(t0()), CacheState::Valid);
        assert_eq!(
            cache.state_at(t0() + Duration::seconds(3601)),
            CacheState::Expired
        );
    }

    #[test]
    fn huge_ttl_never_overflows() {
        let cache = SpeedTestCache::new(Vec::new(), t0(), u64::MAX);
        assert!(cache.is_valid_at(t0() + Duration::days(365 * 100)));
    }

    #[test]
    fn corrupt_cache_reads_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speed-test.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(SpeedTestCache::load(&path).is_none());
    }

    #[test]
    fn cache_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speed-test.json");
        let cache = SpeedTestCache::new(
            vec![
                SpeedTestResult::online("https://a.example", 12),
                SpeedTestResult::offline("https://b.example"),
            ],
            t0(),
            60,
        );
        cache.save(&path).unwrap();
        assert_eq!(SpeedTestCache::load(&path), Some(cache));
    }

    #[test]
    fn ordered_for_filters_and_keeps_rank() {
        let cache = SpeedTestCache::new(
            vec![
                SpeedTestResult::online("https://a.example", 1),
                SpeedTestResult::online("https://b.example", 2),
                SpeedTestResult::online("https://c.example", 3),
            ],
            t0(),
            60,
        );
        let wanted = vec!["https://c.example".to_string(), "https://a.example".to_string()];
        assert!(cache.covers(&wanted));
        let urls: Vec<String> = cache.ordered_for(&wanted).into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://a.example", "https://c.example"]);
        assert!(!cache.covers(&["https://z.example".to_string()]));
    }

    proptest! {
        #[test]
        fn ranking_is_deterministic_and_sorted(
            probes in prop::collection::vec(prop::option::of(0u64..500), 0..40)
        ) {
            let input: Vec<SpeedTestResult> = probes
                .iter()
                .enumerate()
                .map(|(i, p)| match p {
                    Some(ms) => SpeedTestResult::online(format!("https://m{i}.example"), *ms),
                    None => SpeedTestResult::offline(format!("https://m{i}.example")),
                })
                .collect();
            let first = rank_results(input.clone());
            let second = rank_results(input);
            prop_assert_eq!(&first, &second);

            let online_done = first.iter().position(|r| !r.is_online()).unwrap_or(first.len());
            prop_assert!(first[online_done..].iter().all(|r| !r.is_online()));
            for pair in first[..online_done].windows(2) {
                prop_assert!(pair[0].response_time_ms <= pair[1].response_time_ms);
            }
        }
    }
}
