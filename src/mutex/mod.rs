//! Fail-fast distributed mutual exclusion with TTL-based crash safety.

mod guarded;
mod lock;

pub use guarded::Guarded;
pub use lock::{DistributedMutex, LockToken};
