//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, route table)
//!     → handlers.rs (mirror | external | check)
//!     → request.rs (request ID, upstream URL, forwarded headers)
//!     → [upstream fetch, retry, rewrite]
//!     → response.rs (status + surviving headers + rewritten body)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
