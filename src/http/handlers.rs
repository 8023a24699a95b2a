//! Route handlers for the provider API.

use std::collections::HashMap;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::stream;
use serde::{Deserialize, Serialize};

use crate::http::request::request_id;
use crate::http::server::AppState;
use crate::logs::{LogError, LogQuery};
use crate::observability::metrics;
use crate::proxy::function_path;
use crate::replicas::{FunctionStatus, ReplicaError};

pub const NDJSON: &str = "application/x-ndjson";

/// Body of `POST /system/scale-function/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleServiceRequest {
    #[serde(default)]
    pub service_name: String,
    pub replicas: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub orchestration: String,
    pub provider: String,
    pub version: VersionInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub release: String,
    pub sha: String,
}

/// Header naming the function when the route carries no name.
pub const FUNCTION_HEADER: &str = "x-function";

/// `/function/{name}` and `/function/{name}/{*path}`.
pub async fn invoke_function(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request<Body>,
) -> Response {
    let name = params.get("name").cloned().unwrap_or_default();
    invoke(state, name, request).await
}

/// `/function`: the target comes from the `X-Function` header.
pub async fn invoke_by_header(State(state): State<AppState>, request: Request<Body>) -> Response {
    let name = request
        .headers()
        .get(FUNCTION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    match name {
        Some(name) => invoke(state, name, request).await,
        None => (
            StatusCode::BAD_REQUEST,
            "Provide an x-function header or valid route /function/function_name.",
        )
            .into_response(),
    }
}

async fn invoke(state: AppState, name: String, request: Request<Body>) -> Response {
    let gateway = state.gateway.load_full();

    let address = match gateway.resolver.resolve(&name).await {
        Ok(address) => address,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id(&request),
                function = %name,
                cause = %e.cause(),
                "Cannot resolve function"
            );
            return (StatusCode::NOT_FOUND, format!("Cannot find service: {}.", name)).into_response();
        }
    };

    let path = function_path(request.uri());
    gateway.forwarder.proxy(&name, &address, request, &path).await
}

/// `GET /system/logs`: newline-delimited JSON, one [`crate::logs::LogMessage`] per line.
pub async fn function_logs(State(state): State<AppState>, Query(query): Query<LogQuery>) -> Response {
    if query.name.is_empty() {
        return (StatusCode::BAD_REQUEST, "Function name is required.").into_response();
    }

    let gateway = state.gateway.load_full();
    let name = query.name.clone();
    let cancel = state.streams.child_token();

    let rx = match gateway.logs.query(cancel.clone(), query).await {
        Ok(rx) => rx,
        Err(LogError::InvalidPattern(e)) => {
            return (StatusCode::BAD_REQUEST, format!("Invalid pattern: {}", e)).into_response();
        }
        Err(LogError::Source(e)) => {
            tracing::error!(function = %name, error = %e, "Failed to open log stream");
            let status = if e.is_not_found() {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            return (status, e.to_string()).into_response();
        }
    };

    // The guard travels with the body; a client hang-up drops it and stops the worker.
    let guard = cancel.drop_guard();
    let lines = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let message = rx.recv().await?;
        let line = serde_json::to_vec(&message).map(|mut line| {
            line.push(b'\n');
            line
        });
        Some((line, (rx, guard)))
    });

    ([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response()
}

/// `GET /system/function/{name}`.
pub async fn function_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<FunctionStatus>, Response> {
    let gateway = state.gateway.load_full();
    gateway
        .replicas
        .status(&name)
        .await
        .map(Json)
        .map_err(|e| replica_error(&name, "status", e).0)
}

/// `POST /system/scale-function/{name}`. The path name wins over `serviceName`.
pub async fn scale_function(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ScaleServiceRequest>,
) -> Response {
    if !request.service_name.is_empty() && request.service_name != name {
        tracing::debug!(
            function = %name,
            service_name = %request.service_name,
            "Scale body names a different service, using the path"
        );
    }

    let gateway = state.gateway.load_full();
    match gateway.replicas.set_replicas(&name, request.replicas).await {
        Ok(()) => {
            metrics::record_scale(&name, "ok");
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            let (response, result) = replica_error(&name, "scale", e);
            metrics::record_scale(&name, result);
            response
        }
    }
}

fn replica_error(name: &str, operation: &str, e: ReplicaError) -> (Response, &'static str) {
    tracing::error!(function = %name, operation, error = %e, "Replica operation failed");
    if e.is_not_found() {
        ((StatusCode::NOT_FOUND, e.to_string()).into_response(), "not_found")
    } else {
        ((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(), "error")
    }
}

/// `GET /system/info`.
pub async fn info() -> Json<ProviderInfo> {
    Json(ProviderInfo {
        orchestration: "swarm".to_string(),
        provider: env!("CARGO_PKG_NAME").to_string(),
        version: VersionInfo {
            release: env!("CARGO_PKG_VERSION").to_string(),
            sha: option_env!("GIT_SHA").unwrap_or("unknown").to_string(),
        },
    })
}

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
