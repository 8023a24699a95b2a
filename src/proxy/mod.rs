//! Function invocation forwarding.
//!
//! # Data Flow
//! ```text
//! /function/{name}/{path}
//!     → resolver (name → scheme + host)
//!     → forwarder.rs (rewrite URI, copy headers, one upstream request)
//!     → relay status, headers, body; negotiate Content-Type
//! ```
//!
//! # Design Decisions
//! - No connection reuse: replicas come and go between requests
//! - No retries: the caller sees the first upstream outcome
//! - Bodies are streamed both ways, never buffered

pub mod forwarder;

pub use forwarder::{function_path, negotiate_content_type, ForwardError, Forwarder, DEFAULT_CONTENT_TYPE};
