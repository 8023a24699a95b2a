//! Function log streaming.
//!
//! # Data Flow
//! ```text
//! LogQuery (from /system/logs)
//!     → requester.rs (compile filter, open engine stream, spawn worker)
//!     → LogSource::open_log_stream (raw multiplexed bytes)
//!     → worker: read line → poll cancel → frame.rs parse → filter → send
//!     → mpsc::Receiver<LogMessage> (closed on EOF, cancel, limit or parse failure)
//! ```
//!
//! # Design Decisions
//! - One worker task per query, no shared state between queries
//! - Channel capacity of one: a slow reader stalls the engine read
//! - Every await in the worker races the cancellation token, so a silent
//!   source cannot pin the worker after the client leaves

pub mod frame;
pub mod requester;

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::swarm::EngineError;

pub use frame::{parse_frame, FrameError};
pub use requester::{LogError, LogRequester};

/// Raw log byte stream handed out by a [`LogSource`].
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// Options for opening a raw log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStreamOptions {
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
    pub details: bool,
    pub follow: bool,
    pub since: Option<DateTime<Utc>>,
    /// Last N lines only; `None` means everything.
    pub tail: Option<usize>,
}

impl Default for LogStreamOptions {
    fn default() -> Self {
        Self {
            stdout: true,
            stderr: true,
            timestamps: true,
            details: true,
            follow: false,
            since: None,
            tail: None,
        }
    }
}

impl From<&LogQuery> for LogStreamOptions {
    fn from(query: &LogQuery) -> Self {
        Self {
            follow: query.follow,
            since: query.since,
            tail: query.limit(),
            ..Self::default()
        }
    }
}

/// Log source capability.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn open_log_stream(&self, service: &str, options: LogStreamOptions) -> Result<LogStream, EngineError>;
}

/// A log query for one function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    /// Function name.
    pub name: String,

    /// Only messages from this replica.
    #[serde(default)]
    pub instance: Option<String>,

    /// Only messages at or after this time.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,

    /// Maximum number of messages; zero or negative is unbounded.
    #[serde(default, alias = "tail")]
    pub limit: i64,

    /// Keep the stream open for new messages.
    #[serde(default)]
    pub follow: bool,

    /// Regular expression the message text must match.
    #[serde(default)]
    pub pattern: Option<String>,

    /// Invert `pattern`: keep messages that do not match.
    #[serde(default, rename = "invert")]
    pub invert_pattern: bool,
}

impl LogQuery {
    /// Positive limit, if bounded.
    pub fn limit(&self) -> Option<usize> {
        usize::try_from(self.limit).ok().filter(|l| *l > 0)
    }
}

/// One parsed log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    /// Function name.
    pub name: String,
    /// Task id of the replica that wrote the line.
    pub instance: String,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}
