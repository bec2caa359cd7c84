//! Transparent mirroring reverse proxy.
//!
//! Forwards every request to a single origin and rewrites response bodies
//! so absolute references to the origin (and to configured secondary
//! origins) resolve through the mirror's own host.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server (router + middleware)
//!                   │
//!                   ├── /check, /check_alive ──▶ "Ok"
//!                   │
//!                   ├── /_EXTERNAL_ ──▶ upstream::fetcher (single attempt)
//!                   │                      ├── 3xx ──▶ rewrite::redirect
//!                   │                      └── else ─▶ rewrite::content
//!                   │
//!                   └── /* ──▶ resilience::retries ──▶ upstream::fetcher
//!                                                         └──▶ rewrite::content
//!
//!     Cross-cutting: config, error, lifecycle, observability
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod rewrite;
pub mod upstream;

pub use config::ProxyConfig;
pub use error::MirrorError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
