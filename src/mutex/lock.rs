//! Distributed mutex built on set-if-absent with expiry.
//!
//! # Timing contract
//!
//! A lock lives for at most its `ttl`. If the guarded body runs longer than
//! that, the store expires the lock while the body is still running and
//! another caller can acquire it: exclusivity only holds for bodies that
//! finish within `ttl`. Choose `ttl` as the worst-case body duration plus a
//! margin ([`DistributedMutex::run_exclusive_for`] adds the configured one).
//!
//! Release is compare-and-delete on this holder's token, so an overrunning
//! holder never removes a lock someone else acquired after expiry.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::guarded::Guarded;
use crate::config::MutexConfig;
use crate::error::{RedlineError, Result};
use crate::store::{check_ttl, CoordinationStore};

/// Token identifying one acquisition of a lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The token as stored.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fail-fast distributed mutex.
///
/// Contention never blocks: a busy lock is reported immediately and the
/// caller decides whether and when to try again.
pub struct DistributedMutex<S: CoordinationStore + ?Sized> {
    /// The shared store
    store: Arc<S>,
    /// Key prefix and TTL margin
    config: MutexConfig,
}

impl<S: CoordinationStore + ?Sized> DistributedMutex<S> {
    /// Create a new distributed mutex.
    pub fn new(store: Arc<S>, config: MutexConfig) -> Self {
        Self { store, config }
    }

    fn store_key(&self, lock_key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, lock_key)
    }

    /// Try to acquire `lock_key` for `ttl` without waiting.
    ///
    /// Returns `None` if the lock is held by someone else.
    pub async fn try_lock(&self, lock_key: &str, ttl: Duration) -> Result<Option<LockToken>> {
        check_ttl(ttl)?;

        let key = self.store_key(lock_key);
        let token = LockToken::generate();

        if self.store.set_if_absent(&key, token.as_str(), ttl).await? {
            trace!(key = %key, token = %token, ttl = ?ttl, "Lock acquired");
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    /// Release `lock_key` if it is still held with `token`.
    ///
    /// Returns `false` when the lock already expired (and may now belong to
    /// another holder); nothing is deleted in that case.
    pub async fn unlock(&self, lock_key: &str, token: &LockToken) -> Result<bool> {
        let key = self.store_key(lock_key);
        self.store.delete_if_equals(&key, token.as_str()).await
    }

    /// The token currently holding `lock_key`, if any.
    pub async fn holder(&self, lock_key: &str) -> Result<Option<String>> {
        self.store.get(&self.store_key(lock_key)).await
    }

    /// Run `body` while holding `lock_key`, or return [`Guarded::Busy`] at once
    /// if the lock is held elsewhere.
    ///
    /// The lock is released after `body` finishes, whether it returned or
    /// panicked; a panic is resumed after release. Store failures while
    /// acquiring are returned as errors and `body` does not run. A failed
    /// release is logged and left to expire; the body's result is still
    /// returned.
    pub async fn run_exclusive<F, Fut, T>(
        &self,
        lock_key: &str,
        ttl: Duration,
        body: F,
    ) -> Result<Guarded<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(token) = self.try_lock(lock_key, ttl).await? else {
            debug!(key = %lock_key, "Lock busy, skipping guarded execution");
            return Ok(Guarded::Busy);
        };

        let outcome = AssertUnwindSafe(async move { body().await })
            .catch_unwind()
            .await;

        self.release(lock_key, &token).await;

        match outcome {
            Ok(value) => Ok(Guarded::Ran(value)),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Like [`run_exclusive`](Self::run_exclusive) with a TTL of
    /// `max_processing_time` plus the configured margin.
    ///
    /// Fails with [`RedlineError::Config`] if that sum exceeds
    /// [`MAX_TTL`](crate::store::MAX_TTL).
    pub async fn run_exclusive_for<F, Fut, T>(
        &self,
        lock_key: &str,
        max_processing_time: Duration,
        body: F,
    ) -> Result<Guarded<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let ttl = max_processing_time
            .checked_add(self.config.ttl_margin())
            .ok_or_else(|| {
                RedlineError::Config(format!(
                    "max processing time {:?} plus margin overflows",
                    max_processing_time
                ))
            })?;
        self.run_exclusive(lock_key, ttl, body).await
    }

    async fn release(&self, lock_key: &str, token: &LockToken) {
        match self.unlock(lock_key, token).await {
            Ok(true) => trace!(key = %lock_key, token = %token, "Lock released"),
            Ok(false) => warn!(
                key = %lock_key,
                token = %token,
                "Lock expired before release; exclusivity was not guaranteed for this run"
            ),
            Err(e) => warn!(
                key = %lock_key,
                token = %token,
                error = %e,
                "Failed to release lock, it will expire after its TTL"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn mutex() -> (Arc<MemoryStore>, Arc<DistributedMutex<MemoryStore>>) {
        let store = Arc::new(MemoryStore::new());
        let mutex = Arc::new(DistributedMutex::new(store.clone(), MutexConfig::default()));
        (store, mutex)
    }

    #[tokio::test]
    async fn test_run_exclusive_returns_body_result_and_releases() {
        let (_, mutex) = mutex();

        let result = mutex
            .run_exclusive("job", Duration::from_secs(3), || async { 42 })
            .await
            .unwrap();

        assert_eq!(result, Guarded::Ran(42));
        assert_eq!(mutex.holder("job").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_busy_when_held() {
        let (_, mutex) = mutex();
        let token = mutex
            .try_lock("job", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        let ran = AtomicBool::new(false);
        let result = mutex
            .run_exclusive("job", Duration::from_secs(3), || async {
                ran.store(true, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert!(result.is_busy());
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(mutex.holder("job").await.unwrap(), Some(token.to_string()));
    }

    #[tokio::test]
    async fn test_failing_body_releases_lock() {
        let (_, mutex) = mutex();

        let result: Guarded<std::result::Result<(), String>> = mutex
            .run_exclusive("job", Duration::from_secs(3), || async {
                Err("transaction failed".to_string())
            })
            .await
            .unwrap();

        assert_eq!(result, Guarded::Ran(Err("transaction failed".to_string())));
        assert_eq!(mutex.holder("job").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_panicking_body_releases_lock() {
        let (_, mutex) = mutex();

        let task = {
            let mutex = mutex.clone();
            tokio::spawn(async move {
                mutex
                    .run_exclusive("job", Duration::from_secs(3), || async {
                        let fail = true;
                        if fail {
                            panic!("body failed");
                        }
                        1u32
                    })
                    .await
            })
        };

        let err = task.await.unwrap_err();
        assert!(err.is_panic());
        assert_eq!(mutex.holder("job").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unlock_requires_matching_token() {
        let (_, mutex) = mutex();
        let token = mutex
            .try_lock("job", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        let stranger = LockToken::generate();
        assert!(!mutex.unlock("job", &stranger).await.unwrap());
        assert!(mutex.holder("job").await.unwrap().is_some());

        assert!(mutex.unlock("job", &token).await.unwrap());
        assert!(mutex.holder("job").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_expires_after_ttl() {
        let (_, mutex) = mutex();
        mutex
            .try_lock("job", Duration::from_secs(3))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert!(mutex.try_lock("job", Duration::from_secs(3)).await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(mutex.try_lock("job", Duration::from_secs(3)).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_body_allows_steal_after_expiry() {
        let (_, mutex) = mutex();
        let ttl = Duration::from_secs(3);
        let a_running = Arc::new(AtomicBool::new(false));

        // A holds the lock for a body that outlives its TTL.
        let a = {
            let mutex = mutex.clone();
            let a_running = a_running.clone();
            tokio::spawn(async move {
                mutex
                    .run_exclusive("job", ttl, || async move {
                        a_running.store(true, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        a_running.store(false, Ordering::SeqCst);
                        "a"
                    })
                    .await
                    .unwrap()
            })
        };

        // t=1s: B is turned away.
        tokio::time::sleep(Duration::from_secs(1)).await;
        let b = mutex.run_exclusive("job", ttl, || async { "b" }).await.unwrap();
        assert!(b.is_busy());

        // t=3.5s: A's lock has expired while A is still running; C gets in.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let c = mutex
            .run_exclusive("job", ttl, || async { a_running.load(Ordering::SeqCst) })
            .await
            .unwrap();
        assert_eq!(c, Guarded::Ran(true), "C ran while A was still running");

        // t=4s: D takes the lock; A's late release must not remove it.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let d = mutex
            .try_lock("job", Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(a.await.unwrap(), Guarded::Ran("a"));
        assert_eq!(mutex.holder("job").await.unwrap(), Some(d.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_bodies_never_overlap() {
        let (_, mutex) = mutex();
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let mutex = mutex.clone();
                let active = active.clone();
                let max_active = max_active.clone();
                let runs = runs.clone();
                tokio::spawn(async move {
                    for attempt in 0..20u64 {
                        let active = active.clone();
                        let max_active = max_active.clone();
                        let outcome = mutex
                            .run_exclusive("job", Duration::from_secs(1), || async move {
                                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                                max_active.fetch_max(now, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(30)).await;
                                active.fetch_sub(1, Ordering::SeqCst);
                            })
                            .await
                            .unwrap();
                        if outcome.ran() {
                            runs.fetch_add(1, Ordering::SeqCst);
                        }
                        tokio::time::sleep(Duration::from_millis(7 + worker + attempt % 5)).await;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert!(runs.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exclusive_for_adds_margin() {
        let (_, mutex) = mutex();

        // 2s processing + 3s default margin: still held at 4.5s.
        let held_late = mutex
            .run_exclusive_for("job", Duration::from_secs(2), || async {
                tokio::time::sleep(Duration::from_millis(4500)).await;
                mutex.holder("job").await.unwrap().is_some()
            })
            .await
            .unwrap();

        assert_eq!(held_late, Guarded::Ran(true));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (_, mutex) = mutex();
        let _held = mutex
            .try_lock("a", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        let result = mutex
            .run_exclusive("b", Duration::from_secs(3), || async { "b" })
            .await
            .unwrap();
        assert_eq!(result, Guarded::Ran("b"));
    }

    #[tokio::test]
    async fn test_zero_ttl_is_rejected() {
        let (_, mutex) = mutex();
        let result = mutex.run_exclusive("job", Duration::ZERO, || async {}).await;
        assert!(matches!(result, Err(RedlineError::Config(_))));
    }

    #[tokio::test]
    async fn test_unbounded_ttl_is_rejected() {
        let (_, mutex) = mutex();

        let result = mutex.run_exclusive("job", Duration::MAX, || async {}).await;
        assert!(matches!(result, Err(RedlineError::Config(_))));

        let result = mutex
            .run_exclusive_for("job", Duration::MAX, || async {})
            .await;
        assert!(matches!(result, Err(RedlineError::Config(_))));

        let just_over = crate::store::MAX_TTL + Duration::from_millis(1);
        let result = mutex.run_exclusive("job", just_over, || async {}).await;
        assert!(matches!(result, Err(RedlineError::Config(_))));

        assert_eq!(mutex.holder("job").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_failure_skips_body() {
        let (store, mutex) = mutex();
        store.set_available(false);

        let ran = AtomicBool::new(false);
        let result = mutex
            .run_exclusive("job", Duration::from_secs(3), || async {
                ran.store(true, Ordering::SeqCst);
            })
            .await;

        assert!(result.unwrap_err().is_unavailable());
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_key_prefix() {
        let (store, mutex) = mutex();
        let token = mutex
            .try_lock("process_transaction", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            store.get("lock:process_transaction").await.unwrap(),
            Some(token.to_string())
        );
    }
}
