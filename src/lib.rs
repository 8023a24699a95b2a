//! Docker Swarm function provider.
//!
//! Resolves function names to replicas, forwards invocations, streams
//! function logs and reads or sets replica counts, all against the Docker
//! Engine API of a swarm manager.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod logs;
pub mod observability;
pub mod proxy;
pub mod replicas;
pub mod resolver;
pub mod swarm;

pub use config::schema::ProviderConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
