//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the provider.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the swarm provider.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Function address resolution.
    pub resolver: ResolverConfig,

    /// Docker Engine connection settings.
    pub engine: EngineConfig,

    /// Replica bounds and the labels that carry them.
    pub scaling: ScalingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Bearer token protection for the `/system` API.
    pub auth: AuthConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Inbound read timeout in seconds.
    pub read_secs: u64,

    /// Inbound write timeout in seconds. Bounds every non-streaming response.
    pub write_secs: u64,

    /// Connect timeout towards a function replica, in milliseconds.
    pub connect_ms: u64,

    /// Time allowed for a function to return response headers, in seconds.
    /// Zero means "same as `write_secs`".
    pub upstream_secs: u64,
}

impl TimeoutConfig {
    /// Effective upstream timeout.
    pub fn upstream(&self) -> std::time::Duration {
        let secs = if self.upstream_secs == 0 {
            self.write_secs
        } else {
            self.upstream_secs
        };
        std::time::Duration::from_secs(secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 10,
            write_secs: 10,
            connect_ms: 3000,
            upstream_secs: 0,
        }
    }
}

/// How replica addresses are picked under DNS round robin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    Random,
    RoundRobin,
}

/// Function address resolution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Resolve through `tasks.<name>` DNS records instead of the service VIP.
    pub dns_round_robin: bool,

    /// Replica selection under DNS round robin.
    pub selection: SelectionMode,

    /// Scheme used to reach functions.
    pub scheme: String,

    /// Port every function's watchdog listens on.
    pub function_port: u16,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            dns_round_robin: false,
            selection: SelectionMode::Random,
            scheme: "http".to_string(),
            function_port: 8080,
        }
    }
}

/// Docker Engine connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine address: `unix:///var/run/docker.sock` or `tcp://host:port`.
    pub host: String,

    /// Optional API version prefix, e.g. "1.41".
    pub api_version: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "unix:///var/run/docker.sock".to_string(),
            api_version: None,
        }
    }
}

/// Replica bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Service label holding the minimum replica count.
    pub min_label: String,

    /// Service label holding the maximum replica count.
    pub max_label: String,

    pub default_min: u64,

    pub default_max: u64,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            min_label: "com.openfaas.scale.min".to_string(),
            max_label: "com.openfaas.scale.max".to_string(),
            default_min: 1,
            default_max: 20,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty output for development, JSON for production.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// System API authentication.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Require `Authorization: Bearer <token>` on `/system` routes.
    pub enabled: bool,

    pub token: String,
}
