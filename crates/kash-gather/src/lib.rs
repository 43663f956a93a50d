// SPDX-License-Identifier: MIT OR Apache-2.0
//! kash-gather
//!
//! Rate-limited, bounded-concurrency gather primitives.
//!
//! Responsibilities:
//! - run async task lists under a concurrency semaphore and a leaky-bucket
//!   rate limiter
//! - per-task and global retry budgets with classified retriable errors
//! - backoff with jitter, honoring server-directed `Retry-After`
//! - a progress-reporting protocol decoupled from rendering

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The gather primitives themselves.
pub mod gather;
/// Leaky-bucket rate limiting.
pub mod limiter;
/// Progress-reporting protocol.
pub mod progress;
/// Retry settings, classification, and backoff.
pub mod retry;

pub use gather::{
    gather_limited, gather_limited_futures, gather_limited_sync, try_gather_limited, GatherOptions,
};
pub use limiter::RateLimiter;
pub use progress::{LogTracker, ProgressTracker, TaskState};
pub use retry::{
    calculate_backoff, default_is_retriable, RetryAfterError, RetryExhausted, RetrySettings,
};
