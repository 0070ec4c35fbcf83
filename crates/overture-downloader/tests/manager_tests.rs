//! End-to-end fetch behaviour against local mock mirrors.

use overture_cache::ArtifactCache;
use overture_core::{Artifact, Error, PhpVersion, ResourceClass};
use overture_downloader::{
    DownloadConfig, DownloadManager, FetchEvent, FetchRequest, LocalManifest, SignatureVerifier,
};
use overture_mirror::{HttpProbe, MirrorRegistry, MirrorSpeedRanker, OfficialUpstreams};
use overture_test_utils::{MockMirror, RangeMode, TempHome, php_source_tarball, sha256_hex};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const PATH: &str = "/php-8.3.4.tar.gz";

fn artifact() -> Artifact {
    Artifact::php_source(&PhpVersion::parse("8.3.4").unwrap())
}

fn config() -> DownloadConfig {
    DownloadConfig::builder()
        .max_retries(1)
        .segment_retries(1)
        .retry_delays(Duration::from_millis(1), Duration::from_millis(5))
        .multi_thread(false)
        .build()
}

struct Setup {
    home: TempHome,
    official: MockMirror,
    cache: Arc<ArtifactCache>,
}

impl Setup {
    async fn new() -> Self {
        let home = TempHome::new();
        let cache = Arc::new(ArtifactCache::at_path(home.paths().artifacts_dir()).unwrap());
        Self {
            home,
            official: MockMirror::start().await,
            cache,
        }
    }

    fn registry(&self, primary: &str, fallbacks: &[&str], auto_fallback: bool) -> MirrorRegistry {
        let official = OfficialUpstreams {
            php: self.official.url(),
            ..OfficialUpstreams::default()
        };
        let mut registry = MirrorRegistry::load(self.home.paths().mirrors_file())
            .unwrap()
            .with_official(official);
        registry.set_primary(&ResourceClass::Php, primary).unwrap();
        for fallback in fallbacks {
            registry.add_fallback(&ResourceClass::Php, fallback).unwrap();
        }
        registry.set_auto_fallback(auto_fallback);
        registry
    }

    fn manager(&self, pinned: Option<&str>) -> DownloadManager {
        let manager = DownloadManager::new(config(), Arc::clone(&self.cache)).unwrap();
        match pinned {
            Some(sha) => {
                let mut manifest = LocalManifest::default();
                manifest.insert(&artifact(), sha);
                manager.with_verifier(SignatureVerifier::new(Arc::new(manifest)))
            }
            None => manager.with_verifier(SignatureVerifier::new(Arc::new(LocalManifest::default()))),
        }
    }
}

#[tokio::test]
async fn verified_cache_hit_makes_no_requests() {
    let setup = Setup::new().await;
    let mirror = MockMirror::start().await;
    let body = php_source_tarball("8.3.4");
    mirror.serve(PATH, body.clone()).await;
    let registry = setup.registry(&mirror.url(), &[], false);
    let manager = setup.manager(Some(&sha256_hex(&body)));
    let request = FetchRequest::new(artifact());

    let first = manager.fetch(&registry, &request).await.unwrap();
    assert!(first.verified_signature);
    assert_eq!(mirror.get_requests().await, 1);

    let mut events = Vec::new();
    let second = manager
        .fetch_with(&registry, &request, |e| events.push(e))
        .await
        .unwrap();
    assert_eq!(second.path, first.path);
    assert_eq!(mirror.get_requests().await, 1);
    assert!(matches!(events.as_slice(), [FetchEvent::CacheHit { .. }]));
}

#[tokio::test]
async fn offline_primary_falls_back_without_touching_official() {
    let setup = Setup::new().await;
    let primary = MockMirror::start_offline().await;
    let fallback = MockMirror::start().await;
    let body = php_source_tarball("8.3.4");
    fallback.serve(PATH, body.clone()).await;
    setup.official.serve(PATH, body.clone()).await;

    let registry = setup.registry(&primary.url(), &[&fallback.url()], false);
    let manager = setup.manager(Some(&sha256_hex(&body)));

    let mut events = Vec::new();
    let entry = manager
        .fetch_with(&registry, &FetchRequest::new(artifact()), |e| events.push(e))
        .await
        .unwrap();

    assert_eq!(std::fs::read(&entry.path).unwrap(), body);
    assert_eq!(fallback.get_requests().await, 1);
    assert_eq!(setup.official.get_requests().await, 0);
    assert!(events.iter().any(|e| matches!(e, FetchEvent::Failed { url, .. } if url.starts_with(&primary.url()))));
    assert!(events.iter().any(|e| matches!(e, FetchEvent::Verified { .. })));
}

#[tokio::test]
async fn official_upstream_rescues_failed_mirrors_when_allowed() {
    let setup = Setup::new().await;
    let primary = MockMirror::start_offline().await;
    let fallback = MockMirror::start_offline().await;
    let body = php_source_tarball("8.3.4");
    setup.official.serve(PATH, body.clone()).await;
    let manager = setup.manager(Some(&sha256_hex(&body)));

    let with_fallback = setup.registry(&primary.url(), &[&fallback.url()], true);
    let entry = manager
        .fetch(&with_fallback, &FetchRequest::new(artifact()))
        .await
        .unwrap();
    assert!(entry.verified_signature);
    assert_eq!(setup.official.get_requests().await, 1);
}

#[tokio::test]
async fn exhausted_chain_lists_every_attempt() {
    let setup = Setup::new().await;
    let primary = MockMirror::start_offline().await;
    let fallback = MockMirror::start_offline().await;
    let body = php_source_tarball("8.3.4");
    setup.official.serve(PATH, body.clone()).await;
    let manager = setup.manager(Some(&sha256_hex(&body)));

    let registry = setup.registry(&primary.url(), &[&fallback.url()], false);
    let err = manager
        .fetch(&registry, &FetchRequest::new(artifact()))
        .await
        .unwrap_err();

    match err {
        Error::DownloadExhausted { attempted, .. } => {
            let urls: Vec<String> = attempted.into_iter().map(|a| a.url).collect();
            assert_eq!(
                urls,
                vec![primary.url_for(PATH), fallback.url_for(PATH)]
            );
        }
        other => panic!("expected DownloadExhausted, got {other:?}"),
    }
    assert_eq!(setup.official.get_requests().await, 0);
    assert!(setup.cache.get(&artifact()).is_none());
}

#[tokio::test]
async fn mismatched_bytes_are_never_cached() {
    let setup = Setup::new().await;
    let mirror = MockMirror::start().await;
    mirror.serve(PATH, php_source_tarball("8.3.4")).await;
    let registry = setup.registry(&mirror.url(), &[], false);
    let manager = setup.manager(Some(&sha256_hex(b"something else")));

    let err = manager
        .fetch(&registry, &FetchRequest::new(artifact()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SignatureMismatch { .. }));
    assert!(setup.cache.get(&artifact()).is_none());
    let leftovers = std::fs::read_dir(setup.cache.download_dir().unwrap())
        .unwrap()
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn mismatch_on_one_mirror_moves_to_the_next() {
    let setup = Setup::new().await;
    let tampered = MockMirror::start().await;
    let good = MockMirror::start().await;
    let body = php_source_tarball("8.3.4");
    tampered.serve(PATH, b"not php".to_vec()).await;
    good.serve(PATH, body.clone()).await;
    let registry = setup.registry(&tampered.url(), &[&good.url()], false);
    let manager = setup.manager(Some(&sha256_hex(&body)));

    let mut events = Vec::new();
    let entry = manager
        .fetch_with(&registry, &FetchRequest::new(artifact()), |e| events.push(e))
        .await
        .unwrap();

    assert_eq!(std::fs::read(&entry.path).unwrap(), body);
    assert!(events.iter().any(|e| matches!(e, FetchEvent::Rejected { .. })));
}

#[tokio::test]
async fn missing_reference_fails_before_any_download() {
    let setup = Setup::new().await;
    let mirror = MockMirror::start().await;
    mirror.serve(PATH, php_source_tarball("8.3.4")).await;
    let registry = setup.registry(&mirror.url(), &[], true);
    let manager = setup.manager(None);

    let err = manager
        .fetch(&registry, &FetchRequest::new(artifact()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ReferenceUnavailable { .. }));
    assert_eq!(mirror.total_requests().await, 0);
    assert_eq!(setup.official.total_requests().await, 0);
}

#[tokio::test]
async fn unverified_fetch_is_cached_as_unverified() {
    let setup = Setup::new().await;
    let mirror = MockMirror::start().await;
    mirror.serve(PATH, php_source_tarball("8.3.4")).await;
    let registry = setup.registry(&mirror.url(), &[], false);
    let manager = setup.manager(None);

    let entry = manager
        .fetch(&registry, &FetchRequest::new(artifact()).verify_signature(false))
        .await
        .unwrap();
    assert!(!entry.verified_signature);

    // A verified request must not trust the unverified copy.
    let err = manager
        .fetch(&registry, &FetchRequest::new(artifact()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ReferenceUnavailable { .. }));
}

#[tokio::test]
async fn segmented_fetch_through_manager() {
    let setup = Setup::new().await;
    let mirror = MockMirror::start().await;
    let body = overture_test_utils::sample_bytes(64 * 1024 + 17);
    mirror.serve(PATH, body.clone()).await;
    let registry = setup.registry(&mirror.url(), &[], false);
    let manager = setup.manager(Some(&sha256_hex(&body)));

    let mut segments = 0;
    let entry = manager
        .fetch_with(
            &registry,
            &FetchRequest::new(artifact()).threading(true, 4),
            |e| {
                if let FetchEvent::Downloaded { segments: n, .. } = e {
                    segments = n;
                }
            },
        )
        .await
        .unwrap();

    assert_eq!(segments, 4);
    assert_eq!(std::fs::read(&entry.path).unwrap(), body);
}

#[tokio::test]
async fn server_without_ranges_degrades_to_single_stream() {
    let setup = Setup::new().await;
    let mirror = MockMirror::start().await;
    let body = overture_test_utils::sample_bytes(10_000);
    mirror.serve_without_ranges(PATH, body.clone()).await;
    let registry = setup.registry(&mirror.url(), &[], false);
    let manager = setup.manager(Some(&sha256_hex(&body)));

    let mut segments = 0;
    let entry = manager
        .fetch_with(
            &registry,
            &FetchRequest::new(artifact()).threading(true, 4),
            |e| {
                if let FetchEvent::Downloaded { segments: n, .. } = e {
                    segments = n;
                }
            },
        )
        .await
        .unwrap();

    assert_eq!(segments, 1);
    assert_eq!(std::fs::read(&entry.path).unwrap(), body);
}

#[tokio::test]
async fn refused_segments_degrade_to_single_stream() {
    let setup = Setup::new().await;
    let mirror = MockMirror::start().await;
    let body = overture_test_utils::sample_bytes(32 * 1024 + 5);
    let responder = mirror
        .serve_with(PATH, body.clone(), RangeMode::ProbeOnly)
        .await;
    let registry = setup.registry(&mirror.url(), &[], false);
    let manager = setup.manager(Some(&sha256_hex(&body)));

    let mut segments = 0;
    let mut attempts = Vec::new();
    let entry = manager
        .fetch_with(
            &registry,
            &FetchRequest::new(artifact()).threading(true, 4),
            |e| match e {
                FetchEvent::Downloaded { segments: n, .. } => segments = n,
                FetchEvent::Failed { url, .. } => attempts.push(url),
                _ => {}
            },
        )
        .await
        .unwrap();

    assert_eq!(segments, 1);
    assert!(attempts.is_empty());
    assert_eq!(std::fs::read(&entry.path).unwrap(), body);
    assert!(responder.hits() >= 3);
}

#[tokio::test]
async fn ranking_puts_offline_mirrors_last() {
    let setup = Setup::new().await;
    let offline = MockMirror::start_offline().await;
    let online = MockMirror::start().await;
    let body = php_source_tarball("8.3.4");
    online.serve(PATH, body.clone()).await;
    let registry = setup.registry(&offline.url(), &[&online.url()], false);

    let ranker = MirrorSpeedRanker::new(
        Arc::new(HttpProbe::new(true).unwrap()),
        setup.home.paths().speed_test_cache(),
        3600,
    );
    let manager = setup.manager(Some(&sha256_hex(&body))).with_ranker(ranker);

    let chain = manager.candidate_chain(&registry, &ResourceClass::Php).await;
    assert_eq!(chain, vec![online.url(), offline.url()]);

    manager
        .fetch(&registry, &FetchRequest::new(artifact()))
        .await
        .unwrap();
    assert_eq!(offline.get_requests().await, 0);
}
