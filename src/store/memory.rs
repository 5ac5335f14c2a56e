//! In-process implementation of [`CoordinationStore`].
//!
//! Each operation runs inside the `DashMap` shard lock of the single key it
//! touches, which gives the same per-call atomicity Redis gives a script.
//! Time comes from `tokio::time`, so paused-clock tests can advance it.
//!
//! Idle state is reclaimed the way Redis reclaims it: a window expires one
//! period after its last admission, lock records expire after their TTL, and a
//! list disappears once it is empty. Expired keys are removed when touched and
//! by a sweep that runs at most once per [`SWEEP_INTERVAL`].

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::backend::{check_ttl, CoordinationStore, WindowAdmission};
use crate::error::{RedlineError, Result};

/// Minimum time between two sweeps of expired keys.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// A value with an absolute expiry.
#[derive(Debug, Clone)]
struct ExpiringValue {
    value: String,
    expires_at: Instant,
}

impl ExpiringValue {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Entries of one sliding window.
#[derive(Debug)]
struct Window {
    /// (score in µs since the store origin, member)
    entries: BTreeSet<(u64, String)>,
    /// One period after the last admission
    expires_at: Instant,
}

impl Window {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// An in-process store for tests and single-process deployments.
#[derive(Debug)]
pub struct MemoryStore {
    /// Sliding windows
    windows: DashMap<String, Window>,
    /// Key-value pairs with expiry
    values: DashMap<String, ExpiringValue>,
    /// Non-empty lists
    lists: DashMap<String, VecDeque<String>>,
    /// Reference point for window scores
    origin: Instant,
    /// When the last sweep ran
    last_sweep: Mutex<Instant>,
    /// When false every call fails with `StoreUnavailable`
    available: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            windows: DashMap::new(),
            values: DashMap::new(),
            lists: DashMap::new(),
            origin: now,
            last_sweep: Mutex::new(now),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Check availability and sweep expired keys if one is due.
    ///
    /// Must be called before taking any map reference.
    fn begin(&self) -> Result<Instant> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(RedlineError::StoreUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }

        let now = Instant::now();
        self.maybe_sweep(now);
        Ok(now)
    }

    fn maybe_sweep(&self, now: Instant) {
        {
            let mut last_sweep = self.last_sweep.lock();
            if now.duration_since(*last_sweep) < SWEEP_INTERVAL {
                return;
            }
            *last_sweep = now;
        }

        self.windows.retain(|_, window| window.is_live(now));
        self.values.retain(|_, value| value.is_live(now));
        self.lists.retain(|_, entries| !entries.is_empty());

        debug!(
            windows = self.windows.len(),
            values = self.values.len(),
            lists = self.lists.len(),
            "Swept expired keys"
        );
    }

    fn micros_since_origin(&self, now: Instant) -> u64 {
        now.duration_since(self.origin).as_micros() as u64
    }

    fn expiry(now: Instant, ttl: Duration) -> Result<Instant> {
        now.checked_add(ttl).ok_or_else(|| {
            RedlineError::Config(format!("ttl {:?} is out of range", ttl))
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn admit_to_window(
        &self,
        window: &str,
        period: Duration,
        max_requests: u64,
        nonce: &str,
    ) -> Result<WindowAdmission> {
        let now = self.begin()?;
        let expires_at = Self::expiry(now, period)?;

        let score = self.micros_since_origin(now);
        let cutoff = score.saturating_sub(period.as_micros() as u64);

        let outcome = match self.windows.entry(window.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get_mut();
                if current.is_live(now) {
                    let kept = current.entries.split_off(&(cutoff, String::new()));
                    current.entries = kept;
                } else {
                    current.entries.clear();
                }

                let count = current.entries.len() as u64;
                trace!(window = %window, count = count, "Trimmed window");

                if count < max_requests {
                    current.entries.insert((score, format!("{}-{}", score, nonce)));
                    current.expires_at = expires_at;
                    WindowAdmission {
                        admitted: true,
                        in_window: count + 1,
                    }
                } else {
                    if current.entries.is_empty() {
                        occupied.remove();
                    }
                    WindowAdmission {
                        admitted: false,
                        in_window: count,
                    }
                }
            }
            Entry::Vacant(vacant) => {
                if max_requests == 0 {
                    WindowAdmission {
                        admitted: false,
                        in_window: 0,
                    }
                } else {
                    let mut entries = BTreeSet::new();
                    entries.insert((score, format!("{}-{}", score, nonce)));
                    vacant.insert(Window {
                        entries,
                        expires_at,
                    });
                    WindowAdmission {
                        admitted: true,
                        in_window: 1,
                    }
                }
            }
        };

        Ok(outcome)
    }

    async fn window_len(&self, window: &str, period: Duration) -> Result<u64> {
        let now = self.begin()?;

        let cutoff = self
            .micros_since_origin(now)
            .saturating_sub(period.as_micros() as u64);
        Ok(self
            .windows
            .get(window)
            .filter(|current| current.is_live(now))
            .map(|current| current.entries.range((cutoff, String::new())..).count() as u64)
            .unwrap_or(0))
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        check_ttl(ttl)?;
        let now = self.begin()?;

        let record = ExpiringValue {
            value: value.to_string(),
            expires_at: Self::expiry(now, ttl)?,
        };

        match self.values.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(false);
                }
                occupied.insert(record);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(true)
            }
        }
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool> {
        let now = self.begin()?;

        // Expired records go regardless of owner; only a live match counts.
        Ok(self
            .values
            .remove_if(key, |_, current| !current.is_live(now) || current.value == value)
            .map_or(false, |(_, removed)| removed.is_live(now)))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.begin()?;

        self.values.remove_if(key, |_, current| !current.is_live(now));
        Ok(self.values.get(key).map(|current| current.value.clone()))
    }

    async fn push_tail(&self, list: &str, value: &str) -> Result<u64> {
        self.begin()?;

        let mut entries = self.lists.entry(list.to_string()).or_default();
        entries.push_back(value.to_string());
        Ok(entries.len() as u64)
    }

    async fn pop_head(&self, list: &str) -> Result<Option<String>> {
        self.begin()?;

        let head = self
            .lists
            .get_mut(list)
            .and_then(|mut entries| entries.pop_front());
        self.lists.remove_if(list, |_, entries| entries.is_empty());
        Ok(head)
    }

    async fn list_len(&self, list: &str) -> Result<u64> {
        self.begin()?;

        Ok(self
            .lists
            .get(list)
            .map(|entries| entries.len() as u64)
            .unwrap_or(0))
    }
}
