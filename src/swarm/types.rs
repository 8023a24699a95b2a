//! Engine API objects and error definitions.
//!
//! Service specs are decoded only as deep as the provider needs. Every other
//! field is carried through untouched so an update round-trips the spec the
//! engine handed out.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors talking to the Docker Engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine host is not `unix://` or `tcp://`.
    #[error("invalid engine host '{0}'")]
    InvalidHost(String),

    #[error("cannot connect to engine at {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine request failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid engine request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("cannot read engine response: {0}")]
    Body(#[from] axum::Error),

    /// Engine answered with a non-success status.
    #[error("engine returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("cannot decode engine response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl EngineError {
    /// True when the engine reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Status { status: 404, .. })
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Version token required for compare-and-swap updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectVersion {
    #[serde(rename = "Index", default)]
    pub index: u64,
}

/// A swarm service as returned by list and inspect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Version", default)]
    pub version: ObjectVersion,

    #[serde(rename = "Spec", default)]
    pub spec: ServiceSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(rename = "Name", default)]
    pub name: String,

    #[serde(rename = "Labels", default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,

    #[serde(rename = "Mode", default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ServiceMode>,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceMode {
    #[serde(rename = "Replicated", default, skip_serializing_if = "Option::is_none")]
    pub replicated: Option<ReplicatedService>,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedService {
    #[serde(rename = "Replicas", default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u64>,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl ServiceSpec {
    /// Label value, if present.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.as_ref()?.get(key).map(String::as_str)
    }

    /// Desired replica count; `None` for global-mode services.
    pub fn replicas(&self) -> Option<u64> {
        self.mode.as_ref()?.replicated.as_ref()?.replicas
    }

    /// Set the desired replica count. Returns false if the service is not replicated.
    pub fn set_replicas(&mut self, count: u64) -> bool {
        match self.mode.as_mut().and_then(|m| m.replicated.as_mut()) {
            Some(replicated) => {
                replicated.replicas = Some(count);
                true
            }
            None => false,
        }
    }
}

/// Response body of a service update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceUpdateResponse {
    #[serde(rename = "Warnings", default)]
    pub warnings: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Task {
    #[serde(rename = "ID", default)]
    pub id: String,

    #[serde(rename = "Status", default)]
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskStatus {
    #[serde(rename = "State", default)]
    pub state: String,
}

/// `GET /version`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineVersion {
    #[serde(rename = "ApiVersion", default)]
    pub api_version: String,

    #[serde(rename = "Version", default)]
    pub version: String,
}

/// Error body returned by the engine.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorMessage {
    pub message: String,
}
