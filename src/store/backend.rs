//! Store trait shared by the Redis and in-memory implementations.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{RedlineError, Result};

/// Longest TTL any store accepts: Redis keeps expiries as signed 64-bit
/// milliseconds.
pub const MAX_TTL: Duration = Duration::from_millis(i64::MAX as u64);

/// Validate a key expiry and return it in whole milliseconds.
pub(crate) fn check_ttl(ttl: Duration) -> Result<u64> {
    if ttl < Duration::from_millis(1) {
        return Err(RedlineError::Config(format!(
            "ttl must be at least 1ms, got {:?}",
            ttl
        )));
    }
    if ttl > MAX_TTL {
        return Err(RedlineError::Config(format!(
            "ttl must be at most {:?}, got {:?}",
            MAX_TTL, ttl
        )));
    }
    Ok(ttl.as_millis() as u64)
}

/// Outcome of one atomic sliding-window step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAdmission {
    /// Whether a new entry was inserted
    pub admitted: bool,
    /// Entries inside the window after the step
    pub in_window: u64,
}

/// Atomic operations required from the shared store.
///
/// Implementations must be safe to call concurrently from any number of
/// processes or tasks; each method is one indivisible unit at the store.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Trim entries of `window` older than `now - period`, count what remains,
    /// and insert a new entry scored `now` only if the count is below
    /// `max_requests`. `nonce` disambiguates entries that share a timestamp.
    async fn admit_to_window(
        &self,
        window: &str,
        period: Duration,
        max_requests: u64,
        nonce: &str,
    ) -> Result<WindowAdmission>;

    /// Count entries of `window` scored within the trailing `period`.
    async fn window_len(&self, window: &str, period: Duration) -> Result<u64>;

    /// Set `key` to `value` with expiry `ttl` only if `key` does not exist.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` only if it currently holds `value`.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool>;

    /// Read the value of `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Append `value` to the tail of `list`, returning the new length.
    async fn push_tail(&self, list: &str, value: &str) -> Result<u64>;

    /// Remove and return the head of `list`.
    async fn pop_head(&self, list: &str) -> Result<Option<String>>;

    /// Length of `list`.
    async fn list_len(&self, list: &str) -> Result<u64>;
}
