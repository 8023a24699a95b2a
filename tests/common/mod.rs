//! Shared mock servers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use swarm_provider::config::ProviderConfig;
use swarm_provider::http::{Gateway, HttpServer};
use swarm_provider::resolver::HostLookup;
use swarm_provider::swarm::SwarmClient;
use swarm_provider::Shutdown;

/// In-memory Docker Engine: services, tasks, logs and recorded updates.
#[derive(Default)]
pub struct EngineState {
    pub services: Mutex<Vec<Value>>,
    pub log_lines: Vec<Vec<u8>>,
    pub updates: Mutex<Vec<(String, u64, Value)>>,
    pub log_queries: Mutex<Vec<HashMap<String, String>>>,
}

impl EngineState {
    pub fn with_services(names: &[&str]) -> Self {
        let services = names
            .iter()
            .map(|name| {
                json!({
                    "ID": format!("id-{}", name),
                    "Version": { "Index": 7 },
                    "Spec": {
                        "Name": name,
                        "Labels": { "com.openfaas.scale.max": "5" },
                        "TaskTemplate": { "ContainerSpec": { "Image": format!("functions/{}", name) } },
                        "Mode": { "Replicated": { "Replicas": 2 } }
                    }
                })
            })
            .collect();
        Self {
            services: Mutex::new(services),
            ..Self::default()
        }
    }

    fn find(&self, id_or_name: &str) -> Option<Value> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .find(|s| s["ID"] == id_or_name || s["Spec"]["Name"] == id_or_name)
            .cloned()
    }
}

/// One multiplexed log frame as the engine writes it.
pub fn log_frame(seconds: u32, task: &str, text: &str) -> Vec<u8> {
    let payload = format!(
        "2019-02-09T02:34:{:02}.000000001Z com.docker.swarm.service.id=svc,com.docker.swarm.task.id={} {}\n",
        seconds, task, text
    );
    let mut frame = vec![1, 0, 0, 0];
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload.as_bytes());
    frame
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": format!("service {} not found", what) })),
    )
        .into_response()
}

fn name_filter(query: &HashMap<String, String>) -> Option<String> {
    let filters: Value = serde_json::from_str(query.get("filters")?).ok()?;
    filters.get("name")?.get(0)?.as_str().map(str::to_string)
}

async fn list_services(State(engine): State<Arc<EngineState>>, Query(query): Query<HashMap<String, String>>) -> Json<Vec<Value>> {
    let prefix = name_filter(&query).unwrap_or_default();
    let services = engine
        .services
        .lock()
        .unwrap()
        .iter()
        .filter(|s| s["Spec"]["Name"].as_str().unwrap_or_default().starts_with(&prefix))
        .cloned()
        .collect();
    Json(services)
}

async fn inspect_service(State(engine): State<Arc<EngineState>>, Path(id): Path<String>) -> Response {
    match engine.find(&id) {
        Some(service) => Json(service).into_response(),
        None => not_found(&id),
    }
}

async fn update_service(
    State(engine): State<Arc<EngineState>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(spec): Json<Value>,
) -> Response {
    if engine.find(&id).is_none() {
        return not_found(&id);
    }
    let version = query.get("version").and_then(|v| v.parse().ok()).unwrap_or_default();
    engine.updates.lock().unwrap().push((id, version, spec));
    Json(json!({ "Warnings": null })).into_response()
}

async fn service_logs(
    State(engine): State<Arc<EngineState>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if engine.find(&id).is_none() {
        return not_found(&id);
    }
    engine.log_queries.lock().unwrap().push(query);

    // Canned frames, then the connection stays open like a followed stream.
    let lines: Vec<Result<Bytes, io::Error>> = engine
        .log_lines
        .iter()
        .map(|line| Ok(Bytes::from(line.clone())))
        .collect();
    let body = stream::iter(lines).chain(stream::pending());
    Response::new(Body::from_stream(body))
}

async fn list_tasks() -> Json<Value> {
    Json(json!([
        { "ID": "t1", "Status": { "State": "running" } },
        { "ID": "t2", "Status": { "State": "starting" } }
    ]))
}

async fn version() -> Json<Value> {
    Json(json!({ "ApiVersion": "1.41", "Version": "24.0.7" }))
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Start a mock engine and return its address.
pub async fn start_mock_engine(engine: Arc<EngineState>) -> SocketAddr {
    let app = Router::new()
        .route("/services", get(list_services))
        .route("/services/{id}", get(inspect_service))
        .route("/services/{id}/update", post(update_service))
        .route("/services/{id}/logs", get(service_logs))
        .route("/tasks", get(list_tasks))
        .route("/version", get(version))
        .with_state(engine);
    serve(app).await
}

/// Start a function that answers `<method> <path?query> <body>` with its own headers.
pub async fn start_mock_function() -> SocketAddr {
    let handler = |request: Request<Body>| async move {
        let method = request.method().to_string();
        let uri = request.uri().to_string();
        let body = axum::body::to_bytes(request.into_body(), 1024 * 1024).await.unwrap_or_default();
        (
            [("x-served-by", "mock-function")],
            format!("{} {} {}", method, uri, String::from_utf8_lossy(&body)),
        )
    };
    let app = Router::new().route("/", any(handler)).route("/{*path}", any(handler));
    serve(app).await
}

/// Resolves `tasks.<name>` to loopback for the listed function names only.
pub struct LoopbackDns {
    pub functions: Vec<String>,
}

#[async_trait]
impl HostLookup for LoopbackDns {
    async fn lookup_host(&self, name: &str) -> io::Result<Vec<IpAddr>> {
        let known = name
            .strip_prefix("tasks.")
            .is_some_and(|f| self.functions.iter().any(|known| known == f));
        if known {
            Ok(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Start the provider against `engine_addr`, forwarding to `function_port` on loopback.
pub async fn start_provider(
    engine_addr: SocketAddr,
    function_port: u16,
    functions: &[&str],
    configure: impl FnOnce(&mut ProviderConfig),
) -> (SocketAddr, Shutdown) {
    let mut config = ProviderConfig::default();
    config.engine.host = format!("tcp://{}", engine_addr);
    config.resolver.dns_round_robin = true;
    config.resolver.function_port = function_port;
    config.observability.metrics_enabled = false;
    configure(&mut config);

    let client = Arc::new(SwarmClient::new(&config.engine).unwrap());
    let dns = Arc::new(LoopbackDns {
        functions: functions.iter().map(|f| f.to_string()).collect(),
    });
    let gateway = Gateway::with_backends(config, client.clone(), dns, client.clone(), client);
    let server = HttpServer::from_gateway(gateway);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (_, config_updates) = tokio::sync::mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    (addr, shutdown)
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
