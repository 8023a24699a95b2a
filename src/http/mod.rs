//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID on the span and the response)
//!     → auth.rs (bearer token on /system routes, when enabled)
//!     → handlers.rs
//!         /function/*          → resolver → proxy
//!         /system/logs         → logs (NDJSON stream)
//!         /system/function/*   → replicas (status)
//!         /system/scale-function/* → replicas (scale)
//! ```

pub mod auth;
pub mod handlers;
pub mod request;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, Gateway, HttpServer};
