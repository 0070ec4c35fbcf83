//! Concurrent mirror ranking with a persisted TTL cache.

use crate::{CacheState, MirrorProbe, SpeedTestCache, SpeedTestResult, rank_results};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use overture_core::Result;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Ranks mirrors by probing them, caching the ranking for `ttl_secs`.
#[derive(Clone)]
pub struct MirrorSpeedRanker {
    probe: Arc<dyn MirrorProbe>,
    cache_path: PathBuf,
    ttl_secs: u64,
    timeout: Duration,
    concurrency: usize,
    clock: Clock,
}

impl std::fmt::Debug for MirrorSpeedRanker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorSpeedRanker")
            .field("cache_path", &self.cache_path)
            .field("ttl_secs", &self.ttl_secs)
            .field("timeout", &self.timeout)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl MirrorSpeedRanker {
    /// Create a ranker persisting to `cache_path`.
    #[must_use]
    pub fn new(probe: Arc<dyn MirrorProbe>, cache_path: impl Into<PathBuf>, ttl_secs: u64) -> Self {
        Self {
            probe,
            cache_path: cache_path.into(),
            ttl_secs,
            timeout: Duration::from_secs(5),
            concurrency: 8,
            clock: Arc::new(Utc::now),
        }
    }

    /// Per-probe timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum concurrent probes.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Probe `urls` concurrently, rank them and replace the cache.
    ///
    /// Duplicate URLs are probed once; ties keep first-occurrence order.
    ///
    /// # Errors
    /// Returns error if the cache cannot be written.
    pub async fn rank(&self, urls: &[String]) -> Result<Vec<SpeedTestResult>> {
        let mut seen = HashSet::new();
        let unique: Vec<&String> = urls.iter().filter(|u| seen.insert(u.as_str())).collect();
        debug!(count = unique.len(), concurrency = self.concurrency, "probing mirrors");

        let results: Vec<SpeedTestResult> = stream::iter(unique)
            .map(|url| self.probe.probe(url, self.timeout))
            .buffered(self.concurrency)
            .collect()
            .await;
        let ranked = rank_results(results);

        SpeedTestCache::new(ranked.clone(), (self.clock)(), self.ttl_secs).save(&self.cache_path)?;
        info!(
            online = ranked.iter().filter(|r| r.is_online()).count(),
            total = ranked.len(),
            "mirror ranking refreshed"
        );
        Ok(ranked)
    }

    /// Ranked results for `urls`, re-probing only when the cache is missing,
    /// expired, or does not cover every URL.
    ///
    /// # Errors
    /// Returns error if a fresh ranking cannot be persisted.
    pub async fn get_cached_or_rank(&self, urls: &[String]) -> Result<Vec<SpeedTestResult>> {
        let now = (self.clock)();
        let cached = SpeedTestCache::load(&self.cache_path);
        let to_rank = match &cached {
            Some(cache) if cache.is_valid_at(now) && cache.covers(urls) => {
                debug!("speed-test cache hit");
                return Ok(cache.ordered_for(urls));
            }
            Some(cache) if cache.is_valid_at(now) => {
                debug!("speed-test cache incomplete, re-ranking union");
                let mut union: Vec<String> = urls.to_vec();
                union.extend(cache.results.iter().map(|r| r.url.clone()));
                union
            }
            _ => urls.to_vec(),
        };
        let ranked = self.rank(&to_rank).await?;
        let wanted: HashSet<&str> = urls.iter().map(String::as_str).collect();
        Ok(ranked
            .into_iter()
            .filter(|r| wanted.contains(r.url.as_str()))
            .collect())
    }

    /// Cache state without probing.
    #[must_use]
    pub fn state(&self) -> CacheState {
        SpeedTestCache::load(&self.cache_path)
            .map_or(CacheState::Missing, |c| c.state_at((self.clock)()))
    }

    /// The persisted cache, if any.
    #[must_use]
    pub fn cached(&self) -> Option<SpeedTestCache> {
        SpeedTestCache::load(&self.cache_path)
    }

    /// Delete the cache.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be removed.
    pub fn clear_cache(&self) -> Result<()> {
        match std::fs::remove_file(&self.cache_path) {
            Ok(()) => {
                info!(path = %self.cache_path.display(), "speed-test cache cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(overture_core::Error::io(&self.cache_path, e)),
        }
    }
}
