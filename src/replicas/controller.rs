//! Replica count reads and writes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::ScalingConfig;
use crate::swarm::{EngineError, Service, ServiceSpec};

/// Service inspection/update capability.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    /// Inspect a service; the returned version is the update token.
    async fn inspect(&self, name: &str) -> Result<Service, EngineError>;

    /// Replace a service spec. Returns engine warnings.
    async fn update(&self, id: &str, version: u64, spec: &ServiceSpec) -> Result<Vec<String>, EngineError>;

    /// Up-to-date tasks currently running for a service.
    async fn running_tasks(&self, name: &str) -> Result<u64, EngineError>;
}

#[derive(Debug, Error)]
pub enum ReplicaError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("service {0} is not in replicated mode")]
    NotReplicated(String),
}

impl ReplicaError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReplicaError::Engine(e) if e.is_not_found())
    }
}

/// Desired replicas and the bounds an autoscaler must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaSpec {
    pub current: u64,
    pub min: u64,
    pub max: u64,
}

/// Replica status reported by the read endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStatus {
    pub name: String,
    pub replicas: u64,
    pub available_replicas: u64,
    pub min_replicas: u64,
    pub max_replicas: u64,
}

/// Reads and writes replica counts through a [`ServiceStore`].
#[derive(Clone)]
pub struct ReplicaController {
    store: Arc<dyn ServiceStore>,
    scaling: ScalingConfig,
}

impl ReplicaController {
    pub fn new(store: Arc<dyn ServiceStore>, scaling: ScalingConfig) -> Self {
        Self { store, scaling }
    }

    /// Current replicas plus min/max from labels, falling back to defaults.
    pub async fn get_replicas(&self, name: &str) -> Result<ReplicaSpec, ReplicaError> {
        let service = self.store.inspect(name).await?;
        let spec = &service.spec;

        let max = self.bound(name, spec, &self.scaling.max_label, self.scaling.default_max);
        let min = self.bound(name, spec, &self.scaling.min_label, self.scaling.default_min);

        Ok(ReplicaSpec {
            current: spec.replicas().unwrap_or(0),
            min,
            max,
        })
    }

    fn bound(&self, name: &str, spec: &ServiceSpec, label: &str, default: u64) -> u64 {
        match spec.label(label).filter(|v| !v.is_empty()) {
            Some(value) => match value.parse::<u64>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    tracing::warn!(
                        function = %name,
                        label = %label,
                        value = %value,
                        default,
                        "Bad replica count label, should be uint"
                    );
                    default
                }
            },
            None => default,
        }
    }

    /// Set the desired replica count. Errors are returned as-is, without retry.
    pub async fn set_replicas(&self, name: &str, count: u64) -> Result<(), ReplicaError> {
        let mut service = self.store.inspect(name).await?;

        if !service.spec.set_replicas(count) {
            return Err(ReplicaError::NotReplicated(name.to_string()));
        }

        let warnings = self
            .store
            .update(&service.id, service.version.index, &service.spec)
            .await?;

        for warning in warnings {
            tracing::warn!(function = %name, warning = %warning, "Service update warning");
        }

        tracing::info!(function = %name, replicas = count, "Scaled function");
        Ok(())
    }

    /// Running replicas. Failure is logged and reported as zero.
    pub async fn available_replicas(&self, name: &str) -> u64 {
        match self.store.running_tasks(name).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(function = %name, error = %e, "Failed to count available replicas");
                0
            }
        }
    }

    pub async fn status(&self, name: &str) -> Result<FunctionStatus, ReplicaError> {
        let spec = self.get_replicas(name).await?;
        let available = self.available_replicas(name).await;

        Ok(FunctionStatus {
            name: name.to_string(),
            replicas: spec.current,
            available_replicas: available,
            min_replicas: spec.min,
            max_replicas: spec.max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::types::{ObjectVersion, ReplicatedService, ServiceMode};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockStore {
        labels: Option<HashMap<String, String>>,
        global: bool,
        fail_inspect: bool,
        fail_update: bool,
        updates: Mutex<Vec<(String, u64, ServiceSpec)>>,
    }

    impl MockStore {
        fn with_labels(pairs: &[(&str, &str)]) -> Self {
            Self {
                labels: Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ServiceStore for MockStore {
        async fn inspect(&self, name: &str) -> Result<Service, EngineError> {
            if self.fail_inspect {
                return Err(EngineError::Status { status: 404, message: format!("service {} not found", name) });
            }
            let mode = if self.global {
                ServiceMode::default()
            } else {
                ServiceMode {
                    replicated: Some(ReplicatedService { replicas: Some(3), ..Default::default() }),
                    ..Default::default()
                }
            };
            Ok(Service {
                id: format!("id-{}", name),
                version: ObjectVersion { index: 42 },
                spec: ServiceSpec {
                    name: name.to_string(),
                    labels: self.labels.clone(),
                    mode: Some(mode),
                    ..Default::default()
                },
            })
        }

        async fn update(&self, id: &str, version: u64, spec: &ServiceSpec) -> Result<Vec<String>, EngineError> {
            if self.fail_update {
                return Err(EngineError::Status { status: 500, message: "update out of sequence".into() });
            }
            self.updates.lock().unwrap().push((id.to_string(), version, spec.clone()));
            Ok(vec!["image could not be accessed".into()])
        }

        async fn running_tasks(&self, _name: &str) -> Result<u64, EngineError> {
            Err(EngineError::Status { status: 500, message: "tasks unavailable".into() })
        }
    }

    fn controller(store: MockStore) -> (ReplicaController, Arc<MockStore>) {
        let store = Arc::new(store);
        (ReplicaController::new(store.clone(), ScalingConfig::default()), store)
    }

    #[tokio::test]
    async fn defaults_without_labels() {
        let (c, _) = controller(MockStore::default());
        let spec = c.get_replicas("echo").await.unwrap();
        assert_eq!(spec, ReplicaSpec { current: 3, min: 1, max: 20 });
    }

    #[tokio::test]
    async fn labels_override_bounds() {
        let (c, _) = controller(MockStore::with_labels(&[
            ("com.openfaas.scale.min", "2"),
            ("com.openfaas.scale.max", "8"),
        ]));
        let spec = c.get_replicas("echo").await.unwrap();
        assert_eq!(spec, ReplicaSpec { current: 3, min: 2, max: 8 });
    }

    #[tokio::test]
    async fn bad_labels_fall_back() {
        let (c, _) = controller(MockStore::with_labels(&[
            ("com.openfaas.scale.min", "-1"),
            ("com.openfaas.scale.max", "lots"),
        ]));
        let spec = c.get_replicas("echo").await.unwrap();
        assert_eq!(spec, ReplicaSpec { current: 3, min: 1, max: 20 });
    }

    #[tokio::test]
    async fn set_replicas_updates_only_the_count() {
        let (c, store) = controller(MockStore::with_labels(&[("team", "a")]));
        c.set_replicas("echo", 5).await.unwrap();

        let updates = store.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        let (id, version, spec) = &updates[0];
        assert_eq!(id, "id-echo");
        assert_eq!(*version, 42);
        assert_eq!(spec.replicas(), Some(5));
        assert_eq!(spec.label("team"), Some("a"));
    }

    #[tokio::test]
    async fn errors_propagate_unmodified() {
        let (c, _) = controller(MockStore { fail_inspect: true, ..MockStore::default() });
        let err = c.set_replicas("echo", 1).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "engine returned 404: service echo not found");

        let (c, store) = controller(MockStore { fail_update: true, ..MockStore::default() });
        let err = c.set_replicas("echo", 1).await.unwrap_err();
        assert_eq!(err.to_string(), "engine returned 500: update out of sequence");
        assert!(store.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn global_services_cannot_be_scaled() {
        let (c, store) = controller(MockStore { global: true, ..MockStore::default() });
        assert!(matches!(c.set_replicas("agent", 2).await, Err(ReplicaError::NotReplicated(_))));
        assert!(store.updates.lock().unwrap().is_empty());
        assert_eq!(c.get_replicas("agent").await.unwrap().current, 0);
    }

    #[tokio::test]
    async fn status_tolerates_task_listing_failure() {
        let (c, _) = controller(MockStore::default());
        let status = c.status("echo").await.unwrap();
        assert_eq!(status.replicas, 3);
        assert_eq!(status.available_replicas, 0);
        assert_eq!(status.max_replicas, 20);
    }
}
