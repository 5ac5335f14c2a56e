//! Sliding-window rate limiting.

mod limiter;
mod window;

pub use limiter::{Admission, SlidingWindowLimiter};
pub use window::WindowKey;
