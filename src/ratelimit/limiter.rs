//! Sliding-window-log rate limiter.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::window::{entry_nonce, WindowKey};
use crate::config::{FailurePolicy, RateLimiterConfig};
use crate::error::{RedlineError, Result};
use crate::store::CoordinationStore;

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the request was admitted
    pub admitted: bool,
    /// Requests inside the trailing window, including this one if admitted
    pub in_window: u64,
    /// The configured maximum per window
    pub limit: u64,
    /// Requests still available in the window
    pub remaining: u64,
}

/// A sliding-window-log rate limiter backed by a shared store.
///
/// Each check is one atomic store operation: entries older than the period
/// are trimmed, the rest are counted, and a new uniquely-named entry is added
/// only when the count is below `max_requests`. Any number of processes may
/// share a window; at most `max_requests` checks are admitted in any trailing
/// interval of length `period`.
pub struct SlidingWindowLimiter<S: CoordinationStore + ?Sized> {
    /// The shared store
    store: Arc<S>,
    /// Window configuration, replaceable at runtime
    config: RwLock<RateLimiterConfig>,
}

impl<S: CoordinationStore + ?Sized> SlidingWindowLimiter<S> {
    /// Create a new rate limiter.
    pub fn new(store: Arc<S>, config: RateLimiterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config: RwLock::new(config),
        })
    }

    /// Replace the window configuration.
    ///
    /// Existing entries are kept and counted against the new limits.
    pub fn set_config(&self, config: RateLimiterConfig) -> Result<()> {
        config.validate()?;
        *self.config.write() = config;
        Ok(())
    }

    /// Get the current configuration.
    pub fn config(&self) -> RateLimiterConfig {
        self.config.read().clone()
    }

    /// Check the rate limit for `subject`, recording the request if admitted.
    pub async fn check(&self, subject: &str) -> Result<Admission> {
        let config = self.config();
        let key = WindowKey::new(&config.name, subject);

        trace!(key = %key, "Checking rate limit");

        let outcome = self
            .store
            .admit_to_window(
                &key.to_store_key(),
                config.period(),
                config.max_requests,
                &entry_nonce(),
            )
            .await?;

        if !outcome.admitted {
            debug!(
                key = %key,
                count = outcome.in_window,
                limit = config.max_requests,
                "Rate limit exceeded"
            );
        }

        Ok(Admission {
            admitted: outcome.admitted,
            in_window: outcome.in_window,
            limit: config.max_requests,
            remaining: config.max_requests.saturating_sub(outcome.in_window),
        })
    }

    /// Returns `true` if the request is admitted, `false` if over the limit.
    ///
    /// Store failures are returned to the caller; see [`admit`](Self::admit)
    /// for a variant that applies the configured failure policy.
    pub async fn try_acquire(&self, subject: &str) -> Result<bool> {
        Ok(self.check(subject).await?.admitted)
    }

    /// Like [`try_acquire`](Self::try_acquire), but resolves store failures
    /// with the configured [`FailurePolicy`] (deny by default).
    pub async fn admit(&self, subject: &str) -> bool {
        match self.try_acquire(subject).await {
            Ok(admitted) => admitted,
            Err(e) => {
                let policy = self.config.read().failure_policy;
                warn!(
                    subject = %subject,
                    error = %e,
                    policy = ?policy,
                    "Rate limit check failed, applying failure policy"
                );
                policy == FailurePolicy::Open
            }
        }
    }

    /// Admit the request or fail with [`RedlineError::RateLimitExceeded`].
    pub async fn acquire(&self, subject: &str) -> Result<()> {
        if self.try_acquire(subject).await? {
            Ok(())
        } else {
            Err(RedlineError::RateLimitExceeded {
                subject: subject.to_string(),
            })
        }
    }

    /// Number of requests currently inside the trailing window for `subject`.
    pub async fn in_window(&self, subject: &str) -> Result<u64> {
        let config = self.config();
        let key = WindowKey::new(&config.name, subject);
        self.store
            .window_len(&key.to_store_key(), config.period())
            .await
    }
}
