//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! MirroredRequest (method, url, headers, buffered body)
//!     → fetcher.rs (one outbound call)
//!     → UpstreamResponse (status, headers, buffered body) | FetchError
//! ```

pub mod fetcher;

pub use fetcher::{FetchError, Fetcher, HttpFetcher, MirroredRequest, UpstreamResponse};
