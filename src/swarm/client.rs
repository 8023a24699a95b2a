//! Docker Engine API client.
//!
//! # Responsibilities
//! - Connect to the engine over a unix socket or TCP
//! - Issue service/task/log requests and decode responses
//! - Implement the provider capabilities (service listing, log source,
//!   service inspection/update)
//!
//! # Design Decisions
//! - One HTTP/1.1 connection per request; the engine socket is local and cheap
//! - Log streams hand back the live response body as an `AsyncRead`

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use futures_util::TryStreamExt;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::io::StreamReader;
use url::form_urlencoded;

use crate::config::EngineConfig;
use crate::logs::{LogSource, LogStream, LogStreamOptions};
use crate::replicas::ServiceStore;
use crate::resolver::ServiceLister;
use crate::swarm::types::{
    EngineError, EngineResult, EngineVersion, ErrorMessage, Service, ServiceSpec,
    ServiceUpdateResponse, Task,
};

/// Error bodies and JSON documents larger than this are rejected.
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Transport {
    Unix(PathBuf),
    Tcp(String),
}

/// Client for the Docker Engine API of a swarm manager.
#[derive(Debug, Clone)]
pub struct SwarmClient {
    transport: Transport,
    host: String,
    prefix: String,
}

impl SwarmClient {
    /// Create a client for the configured engine host.
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let transport = parse_host(&config.host)?;
        let prefix = config
            .api_version
            .as_deref()
            .map(|v| format!("/v{}", v.trim_start_matches('v')))
            .unwrap_or_default();

        Ok(Self {
            transport,
            host: config.host.clone(),
            prefix,
        })
    }

    /// Engine version, used as a startup connectivity check.
    pub async fn version(&self) -> EngineResult<EngineVersion> {
        self.get_json("/version").await
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> EngineResult<T> {
        let response = self.send(Method::GET, path_and_query, None).await?;
        decode(response).await
    }

    async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<Vec<u8>>,
    ) -> EngineResult<Response<Incoming>> {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("{}{}", self.prefix, path_and_query))
            .header(header::HOST, "docker");

        let body = match body {
            Some(bytes) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(bytes)
            }
            None => Body::empty(),
        };
        let request = builder.body(body)?;

        tracing::trace!(method = %request.method(), uri = %request.uri(), "Engine request");

        let response = match &self.transport {
            #[cfg(unix)]
            Transport::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path)
                    .await
                    .map_err(|source| self.connect_error(source))?;
                dispatch(stream, request).await?
            }
            #[cfg(not(unix))]
            Transport::Unix(_) => return Err(EngineError::InvalidHost(self.host.clone())),
            Transport::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|source| self.connect_error(source))?;
                stream.set_nodelay(true).ok();
                dispatch(stream, request).await?
            }
        };

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_RESPONSE_BYTES).await?;
        let message = serde_json::from_slice::<ErrorMessage>(&bytes)
            .map(|m| m.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string());

        Err(EngineError::Status { status, message })
    }

    fn connect_error(&self, source: io::Error) -> EngineError {
        EngineError::Connect {
            host: self.host.clone(),
            source,
        }
    }
}

async fn dispatch<S>(stream: S, request: Request<Body>) -> EngineResult<Response<Incoming>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "Engine connection closed with error");
        }
    });
    Ok(sender.send_request(request).await?)
}

async fn decode<T: DeserializeOwned>(response: Response<Incoming>) -> EngineResult<T> {
    let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_RESPONSE_BYTES).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn parse_host(host: &str) -> EngineResult<Transport> {
    if let Some(path) = host.strip_prefix("unix://") {
        if !path.is_empty() {
            return Ok(Transport::Unix(PathBuf::from(path)));
        }
    } else if let Some(addr) = host.strip_prefix("tcp://") {
        let addr = addr.trim_end_matches('/');
        if !addr.is_empty() {
            let addr = if addr.contains(':') {
                addr.to_string()
            } else {
                format!("{}:2375", addr)
            };
            return Ok(Transport::Tcp(addr));
        }
    }
    Err(EngineError::InvalidHost(host.to_string()))
}

/// `filters` query parameter: a JSON map of filter name to values.
fn filters_query(filters: &[(&str, &str)]) -> String {
    let mut map = serde_json::Map::new();
    for (key, value) in filters {
        map.insert((*key).to_string(), json!([value]));
    }
    form_urlencoded::Serializer::new(String::new())
        .append_pair("filters", &serde_json::Value::Object(map).to_string())
        .finish()
}

fn escape_segment(segment: &str) -> String {
    form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

fn logs_query(options: &LogStreamOptions) -> String {
    let flag = |on: bool| if on { "1" } else { "0" };
    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("stdout", flag(options.stdout))
        .append_pair("stderr", flag(options.stderr))
        .append_pair("timestamps", flag(options.timestamps))
        .append_pair("details", flag(options.details))
        .append_pair("follow", flag(options.follow));

    if let Some(since) = options.since {
        // The engine takes `<seconds>.<nanoseconds>` since the epoch.
        let value = format!("{}.{:09}", since.timestamp(), since.timestamp_subsec_nanos());
        query.append_pair("since", &value);
    }

    match options.tail {
        Some(tail) => query.append_pair("tail", &tail.to_string()),
        None => query.append_pair("tail", "all"),
    };

    query.finish()
}

#[async_trait]
impl ServiceLister for SwarmClient {
    async fn list_services(&self, name_filter: &str) -> EngineResult<Vec<Service>> {
        let path = format!("/services?{}", filters_query(&[("name", name_filter)]));
        self.get_json(&path).await
    }
}

#[async_trait]
impl ServiceStore for SwarmClient {
    async fn inspect(&self, name: &str) -> EngineResult<Service> {
        let path = format!("/services/{}?insertDefaults=true", escape_segment(name));
        self.get_json(&path).await
    }

    async fn update(&self, id: &str, version: u64, spec: &ServiceSpec) -> EngineResult<Vec<String>> {
        let path = format!(
            "/services/{}/update?version={}&registryAuthFrom=spec",
            escape_segment(id),
            version
        );
        let body = serde_json::to_vec(spec)?;
        let response = self.send(Method::POST, &path, Some(body)).await?;
        let update: ServiceUpdateResponse = decode(response).await?;
        Ok(update.warnings.unwrap_or_default())
    }

    async fn running_tasks(&self, name: &str) -> EngineResult<u64> {
        let path = format!(
            "/tasks?{}",
            filters_query(&[
                ("_up-to-date", "true"),
                ("service", name),
                ("desired-state", "running"),
            ])
        );
        let tasks: Vec<Task> = self.get_json(&path).await?;
        Ok(tasks.iter().filter(|t| t.status.state == "running").count() as u64)
    }
}

#[async_trait]
impl LogSource for SwarmClient {
    async fn open_log_stream(&self, service: &str, options: LogStreamOptions) -> EngineResult<LogStream> {
        let path = format!("/services/{}/logs?{}", escape_segment(service), logs_query(&options));
        let response = self.send(Method::GET, &path, None).await?;

        let chunks = Body::new(response.into_body())
            .into_data_stream()
            .map_err(io::Error::other);
        Ok(Box::pin(StreamReader::new(chunks)))
    }
}
