//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)            process environment
//!     → loader.rs (parse)   +   (port, read_timeout, write_timeout, dnsrr, DOCKER_HOST)
//!     → validation.rs (semantic checks)
//!     → ProviderConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → server rebuilds the gateway and swaps it atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::ProviderConfig;
pub use schema::{
    AuthConfig, EngineConfig, ListenerConfig, LogFormat, ObservabilityConfig, ResolverConfig,
    ScalingConfig, SelectionMode, TimeoutConfig,
};
