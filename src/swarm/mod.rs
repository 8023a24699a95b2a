//! Docker Swarm integration.
//!
//! # Data Flow
//! ```text
//! resolver / logs / replicas (capability traits)
//!     → client.rs (SwarmClient implements every capability)
//!     → HTTP/1.1 over unix socket or TCP
//!     → Docker Engine API on a swarm manager
//!     → types.rs (decode services, tasks, errors)
//! ```

pub mod client;
pub mod types;

pub use client::SwarmClient;
pub use types::{EngineError, EngineResult, Service, ServiceSpec};
