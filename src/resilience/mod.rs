//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Mirrored request:
//!     → retries.rs (attempt, classify outcome, retry or stop)
//!     → backoff.rs (delay between attempts, zero by default)
//! ```
//!
//! # Design Decisions
//! - Every attempt re-sends the same buffered request
//! - Retry count is bounded; exhaustion surfaces as a generic 500
//! - Upstream deadlines are enforced by the fetcher's client

pub mod backoff;
pub mod retries;

pub use retries::{RetryPolicy, MAX_RETRIES};
