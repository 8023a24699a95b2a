//! Engine log frame reading and parsing.
//!
//! A service log line with timestamps and details enabled looks like:
//!
//! ```text
//! <8-byte stream header>2019-02-09T02:34:38.914788800Z com.docker.swarm.node.id=lf..,com.docker.swarm.task.id=zz.. 2019/02/09 02:34:38 message text
//! ```

use std::collections::HashMap;
use std::io;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::form_urlencoded;

use crate::logs::LogMessage;

/// Length of the stdout/stderr multiplexing header on every frame.
pub const STREAM_HEADER_LEN: usize = 8;

/// Detail key carrying the task (replica) id.
pub const TASK_ID_KEY: &str = "com.docker.swarm.task.id";

/// Largest payload accepted from the engine in one frame.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame of {0} bytes is shorter than the stream header")]
    Truncated(usize),

    #[error("failed to parse timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("missing log details")]
    MissingDetails,

    #[error("invalid details format '{0}'")]
    Details(String),

    #[error("frame payload of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    TooLarge(usize),

    #[error("error reading log stream: {0}")]
    Io(#[from] io::Error),
}

/// Read one multiplexed frame (header and payload) into `buf`.
///
/// The header's big-endian length decides where the frame ends, so payload
/// bytes never split a frame. Returns `Ok(false)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<bool, FrameError>
where
    R: AsyncRead + Unpin,
{
    buf.clear();

    let mut header = [0u8; STREAM_HEADER_LEN];
    let mut filled = 0;
    while filled < STREAM_HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(FrameError::Truncated(filled));
        }
        filled += n;
    }

    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }

    buf.extend_from_slice(&header);
    buf.resize(STREAM_HEADER_LEN + len, 0);
    reader.read_exact(&mut buf[STREAM_HEADER_LEN..]).await?;
    Ok(true)
}

/// Parse one frame (one line, terminator optional) into a message for `name`.
pub fn parse_frame(name: &str, frame: &[u8]) -> Result<LogMessage, FrameError> {
    let line = strip_line_ending(frame);
    if line.len() < STREAM_HEADER_LEN {
        return Err(FrameError::Truncated(line.len()));
    }

    let payload = String::from_utf8_lossy(&line[STREAM_HEADER_LEN..]);
    let payload = payload.trim_matches('\0');

    let mut parts = payload.splitn(3, ' ');
    let raw_timestamp = parts.next().unwrap_or_default();
    let timestamp = DateTime::parse_from_rfc3339(raw_timestamp)
        .map_err(|source| FrameError::Timestamp {
            value: raw_timestamp.to_string(),
            source,
        })?
        .with_timezone(&Utc);

    let details = parse_details(parts.next().ok_or(FrameError::MissingDetails)?)?;
    let text = parts.next().unwrap_or_default().trim();

    Ok(LogMessage {
        name: name.to_string(),
        instance: instance_id(&details).unwrap_or_default().to_string(),
        timestamp,
        text: text.to_string(),
    })
}

/// Parse `k=v,k=v` details; keys and values are query-escaped.
pub fn parse_details(details: &str) -> Result<HashMap<String, String>, FrameError> {
    if details.is_empty() {
        return Err(FrameError::Details(details.to_string()));
    }

    let mut map = HashMap::new();
    for pair in details.split(',') {
        if !pair.contains('=') {
            return Err(FrameError::Details(details.to_string()));
        }
        if let Some((key, value)) = form_urlencoded::parse(pair.as_bytes()).next() {
            map.insert(key.into_owned(), value.into_owned());
        }
    }
    Ok(map)
}

fn instance_id(details: &HashMap<String, String>) -> Option<&str> {
    details
        .get(TASK_ID_KEY)
        .or_else(|| {
            details
                .iter()
                .find(|(key, _)| key.ends_with(".task.id"))
                .map(|(_, value)| value)
        })
        .map(String::as_str)
}

fn strip_line_ending(frame: &[u8]) -> &[u8] {
    let frame = frame.strip_suffix(b"\n").unwrap_or(frame);
    frame.strip_suffix(b"\r").unwrap_or(frame)
}
