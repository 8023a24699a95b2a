//! Request forwarding to function replicas.

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode, Uri},
    response::IntoResponse,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::observability::metrics;
use crate::resolver::ResolvedAddress;

/// Content-Type used when neither the function nor the caller sent one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Idle connections are never reused; this only bounds the pool's cleanup.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_millis(120);

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("cannot reach {function}: {source}")]
    Unreachable {
        function: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    #[error("{function} did not respond within {timeout:?}")]
    Timeout { function: String, timeout: Duration },

    #[error("cannot build upstream request for {function}: {source}")]
    Request {
        function: String,
        #[source]
        source: axum::http::Error,
    },
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Diagnostic body returned to the caller.
    pub fn body(&self) -> String {
        match self {
            ForwardError::Unreachable { function, .. } | ForwardError::Request { function, .. } => {
                format!("Can't reach service for: {}.", function)
            }
            ForwardError::Timeout { function, .. } => {
                format!("Timed out waiting for: {}.", function)
            }
        }
    }
}

/// Relays requests to function replicas over short-lived connections.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    function_port: u16,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(function_port: u16, connect_timeout: Duration, timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_keepalive(None);
        connector.set_nodelay(true);

        // A replica may be gone by the next request: no pooled connections.
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build(connector);

        Self {
            client,
            function_port,
            timeout,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(
            config.resolver.function_port,
            Duration::from_millis(config.timeouts.connect_ms),
            config.timeouts.upstream(),
        )
    }

    /// Forward and convert failures into gateway responses.
    pub async fn proxy(
        &self,
        function: &str,
        address: &ResolvedAddress,
        request: Request<Body>,
        path: &str,
    ) -> Response<Body> {
        let start = Instant::now();
        let response = match self.forward(function, address, request, path).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(function = %function, error = %e, "Upstream error");
                (e.status(), e.body()).into_response()
            }
        };
        metrics::record_invocation(function, response.status().as_u16(), start);
        response
    }

    /// Send exactly one upstream request for `request` and relay the response.
    ///
    /// `path` is the part of the inbound path after the function name.
    pub async fn forward(
        &self,
        function: &str,
        address: &ResolvedAddress,
        request: Request<Body>,
        path: &str,
    ) -> Result<Response<Body>, ForwardError> {
        let (parts, body) = request.into_parts();
        let request_content_type = parts.headers.get(header::CONTENT_TYPE).cloned();

        let uri = upstream_uri(address, self.function_port, path, parts.uri.query());

        tracing::debug!(
            function = %function,
            method = %parts.method,
            uri = %uri,
            content_type = ?request_content_type,
            "Forwarding request"
        );

        let mut builder = Request::builder().method(parts.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            copy_headers(headers, &parts.headers);
        }
        let upstream = builder.body(body).map_err(|source| ForwardError::Request {
            function: function.to_string(),
            source,
        })?;

        let response = match tokio::time::timeout(self.timeout, self.client.request(upstream)).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(ForwardError::Unreachable {
                    function: function.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(ForwardError::Timeout {
                    function: function.to_string(),
                    timeout: self.timeout,
                })
            }
        };

        let (mut parts, body) = response.into_parts();
        let content_type = negotiate_content_type(
            parts.headers.get(header::CONTENT_TYPE),
            request_content_type.as_ref(),
        );
        parts.headers.insert(header::CONTENT_TYPE, content_type);

        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// Copy every header value; `Host` is derived from the upstream URI instead.
fn copy_headers(destination: &mut HeaderMap, source: &HeaderMap) {
    for (name, value) in source.iter() {
        if name == header::HOST {
            continue;
        }
        destination.append(name.clone(), value.clone());
    }
}

fn upstream_uri(address: &ResolvedAddress, port: u16, path: &str, query: Option<&str>) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    match query {
        Some(q) if !q.is_empty() => format!("{}://{}{}?{}", address.scheme, address.authority(port), path, q),
        _ => format!("{}://{}{}", address.scheme, address.authority(port), path),
    }
}

/// Response Content-Type wins, then the request's, then [`DEFAULT_CONTENT_TYPE`].
pub fn negotiate_content_type(response: Option<&HeaderValue>, request: Option<&HeaderValue>) -> HeaderValue {
    response
        .filter(|v| !v.is_empty())
        .or_else(|| request.filter(|v| !v.is_empty()))
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE))
}

/// Raw path after `/function/<name>`, `/` when there is none.
pub fn function_path(uri: &Uri) -> String {
    let rest = uri.path().strip_prefix("/function/").unwrap_or_default();
    match rest.find('/') {
        Some(i) => rest[i..].to_string(),
        None => "/".to_string(),
    }
}
