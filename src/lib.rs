//! Redline - Redis-backed coordination primitives
//!
//! This crate implements three primitives that stay correct across independent
//! processes sharing one store: a sliding-window rate limiter, a fail-fast
//! distributed mutex with TTL-based crash safety, and a FIFO message queue.
//! Every read-modify-write sequence runs as a single atomic operation at the
//! store (a Lua script on Redis), never as separate round trips.
//!
//! The store handle is constructed by the application and passed to each
//! primitive; the primitives never share state with each other.
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use redline::config::{MutexConfig, RateLimiterConfig, StoreConfig};
//! use redline::mutex::{DistributedMutex, Guarded};
//! use redline::ratelimit::SlidingWindowLimiter;
//! use redline::store::RedisStore;
//!
//! let store = Arc::new(RedisStore::connect(&StoreConfig::default()).await?);
//!
//! let limiter = SlidingWindowLimiter::new(store.clone(), RateLimiterConfig::default())?;
//! if limiter.admit("client-42").await {
//!     // handle the request
//! }
//!
//! let mutex = DistributedMutex::new(store, MutexConfig::default());
//! match mutex.run_exclusive("nightly-report", Duration::from_secs(30), || build_report()).await? {
//!     Guarded::Ran(report) => publish(report),
//!     Guarded::Busy => {}
//! }
//! ```

pub mod config;
pub mod error;
pub mod mutex;
pub mod queue;
pub mod ratelimit;
pub mod store;
