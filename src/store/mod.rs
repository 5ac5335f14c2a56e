//! Store clients for the coordination primitives.
//!
//! Every primitive talks to the store through [`CoordinationStore`], which
//! exposes only the atomic operations the primitives need. Anything that reads
//! and then writes (trim + count + insert, compare + delete) is a single call
//! on this trait and must be atomic in every implementation.

mod backend;
mod memory;
mod redis_store;
mod scripts;

pub use backend::{CoordinationStore, WindowAdmission, MAX_TTL};
pub(crate) use backend::check_ttl;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
