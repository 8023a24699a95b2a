//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the provider subsystems from configuration (the [`Gateway`])
//! - Create the Axum Router with all handlers and middleware
//! - Serve until shutdown, swapping the gateway on config reload

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::{any, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
    trace::TraceLayer,
};

use crate::config::ProviderConfig;
use crate::http::auth::system_auth_middleware;
use crate::http::handlers;
use crate::http::request::{request_id, MakeRequestUuid, X_REQUEST_ID};
use crate::logs::{LogRequester, LogSource};
use crate::proxy::Forwarder;
use crate::replicas::{ReplicaController, ServiceStore};
use crate::resolver::{HostLookup, Resolver, ServiceLister, SystemDns};
use crate::swarm::{EngineError, SwarmClient};

/// Everything a request needs, built from one configuration snapshot.
pub struct Gateway {
    pub config: ProviderConfig,
    pub resolver: Resolver,
    pub forwarder: Forwarder,
    pub logs: LogRequester,
    pub replicas: ReplicaController,
}

impl Gateway {
    /// Build a gateway talking to the configured engine.
    pub fn new(config: ProviderConfig) -> Result<Self, EngineError> {
        let client = Arc::new(SwarmClient::new(&config.engine)?);
        Ok(Self::with_backends(
            config,
            client.clone(),
            Arc::new(SystemDns),
            client.clone(),
            client,
        ))
    }

    /// Build a gateway from explicit capability implementations.
    pub fn with_backends(
        config: ProviderConfig,
        services: Arc<dyn ServiceLister>,
        dns: Arc<dyn HostLookup>,
        store: Arc<dyn ServiceStore>,
        logs: Arc<dyn LogSource>,
    ) -> Self {
        Self {
            resolver: Resolver::from_config(&config.resolver, services, dns),
            forwarder: Forwarder::from_config(&config),
            logs: LogRequester::new(logs),
            replicas: ReplicaController::new(store, config.scaling.clone()),
            config,
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ArcSwap<Gateway>>,
    /// Parent of every log stream's token; cancelled on shutdown.
    pub streams: CancellationToken,
}

/// HTTP server for the provider API.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a server for `config`, connecting to the configured engine.
    pub fn new(config: ProviderConfig) -> Result<Self, EngineError> {
        Ok(Self::from_gateway(Gateway::new(config)?))
    }

    pub fn from_gateway(gateway: Gateway) -> Self {
        let state = AppState {
            gateway: Arc::new(ArcSwap::from_pointee(gateway)),
            streams: CancellationToken::new(),
        };
        let router = Self::build_router(&state.gateway.load().config, state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProviderConfig, state: AppState) -> Router {
        let write_timeout = Duration::from_secs(config.timeouts.write_secs);
        let read_timeout = Duration::from_secs(config.timeouts.read_secs);

        // Log streams can outlive any write deadline; they are added after the timeout layer.
        let system = Router::new()
            .route("/system/function/{name}", get(handlers::function_status))
            .route("/system/scale-function/{name}", post(handlers::scale_function))
            .route("/system/info", get(handlers::info))
            .layer(TimeoutLayer::new(write_timeout))
            .route("/system/logs", get(handlers::function_logs))
            .route_layer(middleware::from_fn_with_state(state.clone(), system_auth_middleware));

        // Function calls are bounded by the forwarder's own upstream timeout.
        let functions = Router::new()
            .route("/function", any(handlers::invoke_by_header))
            .route("/function/", any(handlers::invoke_by_header))
            .route("/function/{name}", any(handlers::invoke_function))
            .route("/function/{name}/", any(handlers::invoke_function))
            .route("/function/{name}/{*path}", any(handlers::invoke_function));

        Router::new()
            .merge(system)
            .merge(functions)
            .route("/healthz", get(handlers::healthz))
            .with_state(state)
            .layer(RequestBodyTimeoutLayer::new(read_timeout))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id(request),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID)),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configs received on `config_updates` replace the gateway for new
    /// requests. Listener and timeout changes need a restart.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProviderConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let gateway = self.state.gateway.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match Gateway::new(config) {
                    Ok(next) => {
                        gateway.store(Arc::new(next));
                        tracing::info!("Configuration reloaded");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Rejected reloaded configuration, keeping current");
                    }
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let streams = self.state.streams.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
                // Followed log streams would otherwise hold their connections open.
                streams.cancel();
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}
