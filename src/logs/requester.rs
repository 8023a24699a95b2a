//! Log query execution.

use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::logs::frame::{parse_frame, read_frame};
use crate::logs::{LogMessage, LogQuery, LogSource, LogStream, LogStreamOptions};
use crate::observability::metrics;
use crate::swarm::EngineError;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid log pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("failed to open log stream: {0}")]
    Source(#[from] EngineError),
}

/// Server side filtering of parsed messages.
#[derive(Debug, Clone)]
struct MessageFilter {
    instance: Option<String>,
    pattern: Option<Regex>,
    invert: bool,
}

impl MessageFilter {
    fn new(query: &LogQuery) -> Result<Self, regex::Error> {
        let pattern = match query.pattern.as_deref().filter(|p| !p.is_empty()) {
            Some(p) => Some(Regex::new(p)?),
            None => None,
        };
        Ok(Self {
            instance: query.instance.clone().filter(|i| !i.is_empty()),
            pattern,
            invert: query.invert_pattern,
        })
    }

    fn matches(&self, message: &LogMessage) -> bool {
        if let Some(instance) = &self.instance {
            if &message.instance != instance {
                return false;
            }
        }
        match &self.pattern {
            Some(pattern) => pattern.is_match(&message.text) != self.invert,
            None => true,
        }
    }
}

/// Opens function log streams and republishes them as [`LogMessage`]s.
#[derive(Clone)]
pub struct LogRequester {
    source: Arc<dyn LogSource>,
}

impl LogRequester {
    pub fn new(source: Arc<dyn LogSource>) -> Self {
        Self { source }
    }

    /// Start a query. The returned channel closes when the source ends, `cancel`
    /// fires, the receiver is dropped, a line fails to parse, or `limit`
    /// messages have been delivered.
    pub async fn query(
        &self,
        cancel: CancellationToken,
        query: LogQuery,
    ) -> Result<mpsc::Receiver<LogMessage>, LogError> {
        let filter = MessageFilter::new(&query)?;
        let options = LogStreamOptions::from(&query);

        tracing::debug!(function = %query.name, ?options, "Opening log stream");
        let stream = self.source.open_log_stream(&query.name, options).await?;

        let limit = query.limit();
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(relay(cancel, query.name, limit, filter, stream, tx));
        Ok(rx)
    }
}

async fn relay(
    cancel: CancellationToken,
    name: String,
    limit: Option<usize>,
    filter: MessageFilter,
    stream: LogStream,
    tx: mpsc::Sender<LogMessage>,
) {
    metrics::log_stream_opened();

    let mut reader = BufReader::new(stream);
    let mut frame = Vec::with_capacity(256);
    let mut sent = 0usize;

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = read_frame(&mut reader, &mut frame) => read,
        };

        match read {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(function = %name, sent, "Log stream ended");
                break;
            }
            Err(e) => {
                tracing::warn!(function = %name, error = %e, "Error reading log stream");
                break;
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        let message = match parse_frame(&name, &frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(function = %name, error = %e, "Failed to parse log line, closing stream");
                break;
            }
        };

        if !filter.matches(&message) {
            continue;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            res = tx.send(message) => {
                if res.is_err() {
                    tracing::debug!(function = %name, "Log reader went away");
                    break;
                }
            }
        }

        sent += 1;
        if limit.is_some_and(|limit| sent >= limit) {
            break;
        }
    }

    metrics::log_stream_closed();
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    fn framed(payload: &str) -> Vec<u8> {
        let mut bytes = vec![1, 0, 0, 0];
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(payload.as_bytes());
        bytes
    }

    fn line(ts_secs: u32, task: &str, text: &str) -> Vec<u8> {
        framed(&format!(
            "2019-02-09T02:34:{:02}.000000001Z com.docker.swarm.task.id={} {}\n",
            ts_secs, task, text
        ))
    }

    /// Serves canned bytes, optionally followed by a stream that never ends.
    struct MockSource {
        data: Vec<u8>,
        hold_open: bool,
        writer: Mutex<Option<DuplexStream>>,
        opened_with: Mutex<Option<LogStreamOptions>>,
    }

    impl MockSource {
        fn new(data: Vec<u8>, hold_open: bool) -> Arc<Self> {
            Arc::new(Self {
                data,
                hold_open,
                writer: Mutex::new(None),
                opened_with: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl LogSource for MockSource {
        async fn open_log_stream(&self, _service: &str, options: LogStreamOptions) -> Result<LogStream, EngineError> {
            *self.opened_with.lock().unwrap() = Some(options);
            if !self.hold_open {
                return Ok(Box::pin(std::io::Cursor::new(self.data.clone())));
            }
            let (mut writer, reader) = tokio::io::duplex(64 * 1024);
            writer.write_all(&self.data).await.unwrap();
            // Keep the write half alive so reads block after the canned data.
            *self.writer.lock().unwrap() = Some(writer);
            Ok(Box::pin(reader))
        }
    }

    async fn collect(mut rx: mpsc::Receiver<LogMessage>) -> Vec<LogMessage> {
        let mut out = Vec::new();
        while let Some(msg) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("channel should close")
        {
            out.push(msg);
        }
        out
    }

    fn query(name: &str) -> LogQuery {
        LogQuery { name: name.into(), ..LogQuery::default() }
    }

    #[tokio::test]
    async fn emits_messages_in_order_then_closes() {
        let mut data = line(1, "t1", "first");
        data.extend(line(2, "t2", "second message"));
        let requester = LogRequester::new(MockSource::new(data, false));

        let rx = requester.query(CancellationToken::new(), query("echo")).await.unwrap();
        let messages = collect(rx).await;

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "first");
        assert_eq!(messages[0].instance, "t1");
        assert_eq!(messages[1].text, "second message");
        assert_eq!(messages[1].name, "echo");
    }

    #[tokio::test]
    async fn limit_closes_channel_while_source_is_open() {
        let mut data = Vec::new();
        for i in 0..5 {
            data.extend(line(i, "t1", &format!("line {}", i)));
        }
        let source = MockSource::new(data, true);
        let requester = LogRequester::new(source.clone());

        let mut q = query("echo");
        q.limit = 2;
        let messages = collect(requester.query(CancellationToken::new(), q).await.unwrap()).await;

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, "line 1");
        assert_eq!(source.opened_with.lock().unwrap().as_ref().unwrap().tail, Some(2));
    }

    #[tokio::test]
    async fn bad_timestamp_ends_stream() {
        let mut data = line(1, "t1", "ok");
        data.extend(framed("not-a-time com.docker.swarm.task.id=t1 broken\n"));
        data.extend(line(3, "t1", "never seen"));
        let requester = LogRequester::new(MockSource::new(data, false));

        let messages = collect(requester.query(CancellationToken::new(), query("echo")).await.unwrap()).await;

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "ok");
    }

    #[tokio::test]
    async fn payload_length_with_newline_byte_keeps_frames_intact() {
        // A 266 byte payload puts 0x0A in the length field.
        let prefix = "2019-02-09T02:34:01.000000001Z com.docker.swarm.task.id=t1 \n";
        let text = "y".repeat(266 - prefix.len());
        let long = line(1, "t1", &text);
        assert_eq!(&long[4..8], &[0, 0, 1, 10]);

        let mut data = long;
        data.extend(line(2, "t2", "after"));
        let requester = LogRequester::new(MockSource::new(data, false));

        let messages = collect(requester.query(CancellationToken::new(), query("echo")).await.unwrap()).await;

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, text);
        assert_eq!(messages[1].instance, "t2");
        assert_eq!(messages[1].text, "after");
    }

    #[tokio::test]
    async fn oversized_frame_ends_stream() {
        let mut data = line(1, "t1", "ok");
        data.extend([1, 0, 0, 0]);
        data.extend(((crate::logs::frame::MAX_FRAME_LEN + 1) as u32).to_be_bytes());
        data.extend(line(3, "t1", "never seen"));
        let requester = LogRequester::new(MockSource::new(data, true));

        let rx = requester.query(CancellationToken::new(), query("echo")).await.unwrap();
        let messages = tokio::time::timeout(Duration::from_millis(500), collect(rx))
            .await
            .expect("oversized frame should close the stream");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "ok");
    }

    #[tokio::test]
    async fn cancel_while_blocked_closes_channel() {
        let requester = LogRequester::new(MockSource::new(Vec::new(), true));
        let cancel = CancellationToken::new();
        let mut rx = requester.query(cancel.clone(), query("echo")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let next = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("worker should observe cancellation");
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn nothing_is_emitted_after_cancel() {
        let mut data = Vec::new();
        for i in 0..10 {
            data.extend(line(i, "t1", "spam"));
        }
        let requester = LogRequester::new(MockSource::new(data, true));
        let cancel = CancellationToken::new();
        let mut rx = requester.query(cancel.clone(), query("echo")).await.unwrap();

        assert!(rx.recv().await.is_some());
        cancel.cancel();

        // At most the one message already buffered in the channel.
        let mut after = 0;
        while let Ok(Some(_)) = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
            after += 1;
        }
        assert!(after <= 1, "received {} messages after cancel", after);
    }

    #[tokio::test]
    async fn dropped_receiver_stops_worker() {
        let mut data = Vec::new();
        for i in 0..10 {
            data.extend(line(i, "t1", "spam"));
        }
        let source = MockSource::new(data, true);
        let requester = LogRequester::new(source.clone());

        let rx = requester.query(CancellationToken::new(), query("echo")).await.unwrap();
        drop(rx);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The worker has exited and released its read half, so writes fail.
        let mut writer = source.writer.lock().unwrap().take().unwrap();
        assert!(writer.write_all(b"more").await.is_err());
    }

    #[tokio::test]
    async fn filters_by_instance_and_pattern() {
        let mut data = line(1, "t1", "GET /healthz");
        data.extend(line(2, "t2", "GET /healthz"));
        data.extend(line(3, "t1", "error: boom"));
        data.extend(line(4, "t1", "GET /"));

        let requester = LogRequester::new(MockSource::new(data.clone(), false));
        let mut q = query("echo");
        q.instance = Some("t1".into());
        q.pattern = Some("healthz".into());
        q.invert_pattern = true;
        q.limit = 1;
        let messages = collect(requester.query(CancellationToken::new(), q).await.unwrap()).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "error: boom");

        let requester = LogRequester::new(MockSource::new(data, false));
        let mut q = query("echo");
        q.pattern = Some("^GET".into());
        let messages = collect(requester.query(CancellationToken::new(), q).await.unwrap()).await;
        assert_eq!(messages.len(), 3);
    }

    #[tokio::test]
    async fn invalid_pattern_fails_before_opening_stream() {
        let source = MockSource::new(Vec::new(), false);
        let requester = LogRequester::new(source.clone());
        let mut q = query("echo");
        q.pattern = Some("(".into());

        let err = requester.query(CancellationToken::new(), q).await.unwrap_err();
        assert!(matches!(err, LogError::InvalidPattern(_)));
        assert!(source.opened_with.lock().unwrap().is_none());
    }
}
