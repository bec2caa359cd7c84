//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Handlers and the retry loop produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (text or JSON lines)
//!     → Metrics endpoint (Prometheus scrape), when configured
//! ```
//!
//! # Design Decisions
//! - Structured fields (url, attempt, status, request_id) on every event
//! - Request ID flows from the middleware into upstream requests
//! - Metric macros are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
