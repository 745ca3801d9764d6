//! Queueing primitives - the concurrency limiter

pub mod limiter;

pub use limiter::{ConcurrencyLimiter, LimiterStats, Permit};
