//! Expiring credential cache.
//!
//! Vendor session credentials (Yahoo's cookie + crumb pair, for example) are
//! acquired on first use, reused until they expire or are rejected, then
//! refreshed. Refresh is exclusive: concurrent callers wait for the one
//! refresh in flight instead of each starting their own.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::errors::MarketDataError;

#[derive(Debug)]
struct CachedCredential<T> {
    value: T,
    expires_at: Instant,
}

/// Cache for a single expiring credential of type `T`.
#[derive(Debug)]
pub struct CredentialCache<T> {
    name: &'static str,
    slot: Mutex<Option<CachedCredential<T>>>,
}

impl<T: Clone> CredentialCache<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached credential, refreshing it first if missing or
    /// expired.
    ///
    /// `refresh` yields the new value and how long it stays valid. A failed
    /// refresh leaves the cache empty and returns the error.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<T, MarketDataError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, Duration), MarketDataError>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.value.clone());
            }
            debug!("Credential '{}' expired, refreshing", self.name);
        }

        *slot = None;
        let (value, ttl) = refresh().await?;
        debug!("Credential '{}' refreshed, valid for {:?}", self.name, ttl);
        *slot = Some(CachedCredential {
            value: value.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(value)
    }

    /// Drop the cached credential, e.g. after the vendor rejected it.
    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        if slot.take().is_some() {
            debug!("Credential '{}' invalidated", self.name);
        }
    }

    /// Time left on the cached credential, if any.
    pub async fn remaining(&self) -> Option<Duration> {
        let slot = self.slot.lock().await;
        slot.as_ref()
            .map(|cached| cached.expires_at.saturating_duration_since(Instant::now()))
            .filter(|left| !left.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_reuses_until_expiry() {
        let cache = CredentialCache::new("crumb");
        let refreshes = AtomicU32::new(0);

        let refresh = || async {
            let n = refreshes.fetch_add(1, Ordering::SeqCst);
            Ok::<_, MarketDataError>((format!("crumb-{}", n), Duration::from_secs(300)))
        };

        assert_eq!(cache.get_or_refresh(refresh).await.ok().as_deref(), Some("crumb-0"));
        assert_eq!(cache.get_or_refresh(refresh).await.ok().as_deref(), Some("crumb-0"));

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.get_or_refresh(refresh).await.ok().as_deref(), Some("crumb-1"));
        assert_eq!(refreshes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_is_not_cached() {
        let cache: CredentialCache<String> = CredentialCache::new("crumb");

        let result = cache
            .get_or_refresh(|| async {
                Err(MarketDataError::Authentication {
                    provider: "YAHOO".to_string(),
                    message: "no cookie".to_string(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(cache.remaining().await, None);

        let result = cache
            .get_or_refresh(|| async { Ok::<_, MarketDataError>(("ok".to_string(), Duration::from_secs(60))) })
            .await;
        assert_eq!(result.ok().as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let cache = CredentialCache::new("token");
        let _ = cache
            .get_or_refresh(|| async { Ok::<_, MarketDataError>((1u32, Duration::from_secs(60))) })
            .await;
        cache.invalidate().await;

        let value = cache
            .get_or_refresh(|| async { Ok::<_, MarketDataError>((2u32, Duration::from_secs(60))) })
            .await;
        assert_eq!(value.ok(), Some(2));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let cache = Arc::new(CredentialCache::new("crumb"));
        let refreshes = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let refreshes = Arc::clone(&refreshes);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(|| async move {
                        refreshes.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Ok::<_, MarketDataError>(("shared".to_string(), Duration::from_secs(60)))
                    })
                    .await
            }));
        }

        for handle in handles {
            let value = handle.await.expect("task panicked");
            assert_eq!(value.ok().as_deref(), Some("shared"));
        }
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }
}
