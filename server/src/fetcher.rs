use crate::upstream::{ReleaseRecord, UpstreamError};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Source of one channel's current release record.
#[async_trait]
pub trait VersionFetcher: Send + Sync {
    async fn get(&self) -> Result<ReleaseRecord, UpstreamError>;
}

/// Wraps a fetcher with a time-bounded cache. Within the TTL the cached
/// record is served without touching the delegate. Past the TTL the delegate
/// is consulted again; if it fails while a cached record exists, the stale
/// record is served and the next call retries the delegate.
pub struct CachedVersionFetcher<F> {
    delegate: F,
    ttl: Duration,
    slot: Mutex<Option<CacheEntry>>,
}

struct CacheEntry {
    record: ReleaseRecord,
    fetched_at: Instant,
}

impl<F: VersionFetcher> CachedVersionFetcher<F> {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    pub fn new(delegate: F) -> Self {
        Self::with_ttl(delegate, Self::DEFAULT_TTL)
    }

    pub fn with_ttl(delegate: F, ttl: Duration) -> Self {
        Self {
            delegate,
            ttl,
            slot: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<F: VersionFetcher> VersionFetcher for CachedVersionFetcher<F> {
    async fn get(&self) -> Result<ReleaseRecord, UpstreamError> {
        // The lock is held across the delegate call so concurrent requests
        // for the same channel trigger at most one upstream fetch.
        let mut slot = self.slot.lock().await;

        if let Some(entry) = slot.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.record.clone());
            }
        }

        match self.delegate.get().await {
            Ok(record) => {
                *slot = Some(CacheEntry {
                    record: record.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(record)
            }
            Err(err) => match slot.as_ref() {
                Some(entry) => {
                    warn!(
                        channel = entry.record.release_channel.as_str(),
                        error = %err,
                        "upstream fetch failed; serving cached record"
                    );
                    Ok(entry.record.clone())
                }
                None => Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Plays back a fixed sequence of outcomes, then keeps failing.
    struct ScriptedFetcher {
        outcomes: Mutex<VecDeque<Result<ReleaseRecord, UpstreamError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(outcomes: Vec<Result<ReleaseRecord, UpstreamError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VersionFetcher for ScriptedFetcher {
        async fn get(&self) -> Result<ReleaseRecord, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(failure()))
        }
    }

    fn record(build: &str) -> ReleaseRecord {
        ReleaseRecord {
            release_channel: "stable".to_string(),
            build_number: build.to_string(),
            version_hash: "abcd1234".to_string(),
        }
    }

    fn failure() -> UpstreamError {
        UpstreamError::MetadataNotFound {
            url: "https://example.com/login".to_string(),
        }
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_delegate() {
        let fetcher =
            CachedVersionFetcher::with_ttl(ScriptedFetcher::new(vec![Ok(record("1"))]), Duration::from_secs(60));

        let first = fetcher.get().await.unwrap();
        let second = fetcher.get().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.delegate.call_count(), 1);
    }

    #[tokio::test]
    async fn stale_record_is_served_when_the_delegate_fails() {
        // Zero TTL: every call consults the delegate.
        let fetcher = CachedVersionFetcher::with_ttl(
            ScriptedFetcher::new(vec![Ok(record("1")), Err(failure())]),
            Duration::ZERO,
        );

        let healthy = fetcher.get().await.unwrap();
        let fallback = fetcher.get().await.unwrap();

        assert_eq!(healthy, fallback);
        assert_eq!(fetcher.delegate.call_count(), 2);
    }

    #[tokio::test]
    async fn failure_with_no_cache_propagates() {
        let fetcher = CachedVersionFetcher::with_ttl(
            ScriptedFetcher::new(vec![Err(failure())]),
            Duration::ZERO,
        );

        let err = fetcher.get().await.unwrap_err();
        assert!(matches!(err, UpstreamError::MetadataNotFound { .. }));
    }

    #[tokio::test]
    async fn delegate_is_retried_after_a_fallback() {
        let fetcher = CachedVersionFetcher::with_ttl(
            ScriptedFetcher::new(vec![Ok(record("1")), Err(failure()), Ok(record("2"))]),
            Duration::ZERO,
        );

        assert_eq!(fetcher.get().await.unwrap().build_number, "1");
        assert_eq!(fetcher.get().await.unwrap().build_number, "1");
        assert_eq!(fetcher.get().await.unwrap().build_number, "2");
        assert_eq!(fetcher.delegate.call_count(), 3);
    }
}
