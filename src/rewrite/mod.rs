//! Response rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! UpstreamResponse
//!     → redirect.rs (external route, 3xx with Location: re-target, no body)
//!     → content.rs  (everything else: substring rewrite of the body)
//! ```
//!
//! The content rewriter sits behind a trait so a markup-aware
//! implementation can replace it without touching fetch or retry code.

pub mod content;
pub mod redirect;

pub use content::{ContentRewriter, SubstringRewriter, EXTERNAL_ROUTE_PREFIX};
pub use redirect::{is_redirect, retarget_location, InboundOrigin};
