//! HTTP event stream transport backed by `reqwest`.

use bytes::Bytes;
use futures::{pin_mut, Stream, StreamExt};
use reqwest::header::{HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use tokio::task::JoinHandle;

use crate::config::StreamConfig;
use crate::error::{AppError, BridgeError};
use crate::metrics::StreamMetrics;

use super::backoff::{BackoffConfig, ExponentialBackoff};
use super::decoder::FrameDecoder;
use super::interest::Interest;
use super::types::{ConnectionId, Frame, FrameSink, InboundFrame, Subscription, SubscriptionId};
use super::{StreamHandle, StreamTransport};

const EVENT_STREAM_MIME: &str = "text/event-stream";
const LAST_EVENT_ID: &str = "Last-Event-ID";

/// Opens `text/event-stream` connections over HTTP(S)
pub struct SseTransport {
    client: reqwest::Client,
    config: StreamConfig,
    base_url: Option<Url>,
}

impl SseTransport {
    pub fn new(config: StreamConfig) -> Result<Self, AppError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(parse_base_url)
            .transpose()?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::with_config(BackoffConfig {
            initial_delay_ms: self.config.retry_ms,
            max_delay_ms: self.config.max_retry_ms.max(self.config.retry_ms),
            ..BackoffConfig::default()
        })
    }
}

impl StreamTransport for SseTransport {
    fn open(
        &self,
        connection: ConnectionId,
        address: &str,
        frames: FrameSink,
    ) -> Result<Box<dyn StreamHandle>, BridgeError> {
        let url = parse_address(address, self.base_url.as_ref())?;
        let interest = Interest::new();

        let reader = StreamReader {
            client: self.client.clone(),
            url,
            connection,
            interest: interest.clone(),
            frames,
            backoff: self.backoff(),
            max_line_bytes: self.config.max_line_bytes,
        };
        let task = tokio::spawn(reader.run());

        Ok(Box::new(SseHandle {
            address: address.to_string(),
            interest,
            task,
            closed: false,
        }))
    }
}

fn parse_base_url(base: &str) -> Result<Url, AppError> {
    let url = Url::parse(base).map_err(|e| {
        config::ConfigError::Message(format!("stream.base_url '{}': {}", base, e))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(config::ConfigError::Message(format!(
            "stream.base_url '{}' must be http or https",
            base
        ))
        .into());
    }
    Ok(url)
}

/// Validate a stream address before any network activity.
///
/// Relative addresses such as `/events` are joined onto `base`; without a
/// base they are rejected.
fn parse_address(address: &str, base: Option<&Url>) -> Result<Url, BridgeError> {
    if address.trim().is_empty() {
        return Err(BridgeError::invalid_address(address, "empty address"));
    }

    let url = match base {
        Some(base) => base.join(address),
        None => Url::parse(address),
    }
    .map_err(|e| BridgeError::invalid_address(address, e.to_string()))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(BridgeError::invalid_address(
            address,
            format!("unsupported scheme '{}'", other),
        )),
    }
}

/// Handle to one running stream reader
pub struct SseHandle {
    address: String,
    /// Shared with the reader task, which drops frames nobody listens to
    interest: Interest,
    task: JoinHandle<()>,
    closed: bool,
}

impl StreamHandle for SseHandle {
    fn attach(&mut self, subscription: Subscription) {
        self.interest.attach(subscription);
    }

    fn detach(&mut self, id: SubscriptionId) -> bool {
        self.interest.detach(id)
    }

    fn replace(&mut self, old: SubscriptionId, new: Subscription) -> bool {
        self.interest.replace(old, new)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.interest.clear();
        self.task.abort();
        tracing::debug!(address = %self.address, "Stream reader stopped");
    }
}

impl Drop for SseHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Why a connection attempt did not yield a readable stream
#[derive(Debug)]
enum ConnectFailure {
    /// Network-level failure, retried after the reconnection delay
    Retryable(String),
    /// The server answered but not with an event stream; never retried
    Fatal(String),
}

/// How reading a connected stream ended
enum StreamEnd {
    Eof,
    Interrupted(String),
    SinkClosed,
}

struct StreamReader {
    client: reqwest::Client,
    url: Url,
    connection: ConnectionId,
    interest: Interest,
    frames: FrameSink,
    backoff: ExponentialBackoff,
    max_line_bytes: usize,
}

impl StreamReader {
    #[tracing::instrument(
        name = "stream.reader",
        skip_all,
        fields(connection_id = %self.connection, address = %self.url)
    )]
    async fn run(mut self) {
        let mut decoder = FrameDecoder::with_max_line(self.max_line_bytes);

        loop {
            match self.connect(decoder.last_event_id()).await {
                Ok(response) => {
                    self.backoff.reset();
                    StreamMetrics::record_connected();
                    tracing::info!("Event stream connected");

                    decoder.reset();
                    let end = self.consume(response.bytes_stream(), &mut decoder).await;
                    if let Some(retry) = decoder.retry() {
                        self.backoff.set_initial_delay(retry);
                        self.backoff.reset();
                    }

                    match end {
                        StreamEnd::SinkClosed => {
                            tracing::debug!("Frame sink closed, stopping reader");
                            return;
                        }
                        StreamEnd::Eof => tracing::info!("Event stream ended by server"),
                        StreamEnd::Interrupted(reason) => {
                            tracing::warn!(reason = %reason, "Event stream interrupted")
                        }
                    }
                }
                Err(ConnectFailure::Fatal(reason)) => {
                    StreamMetrics::record_failed("fatal");
                    tracing::error!(reason = %reason, "Event stream failed, not reconnecting");
                    return;
                }
                Err(ConnectFailure::Retryable(reason)) => {
                    StreamMetrics::record_failed("retryable");
                    tracing::warn!(reason = %reason, "Event stream connection failed");
                }
            }

            if self.frames.is_closed() {
                return;
            }

            let delay = self.backoff.next_delay();
            StreamMetrics::record_reconnect();
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt = self.backoff.attempt(),
                "Reconnecting event stream"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect(&self, last_event_id: Option<&str>) -> Result<reqwest::Response, ConnectFailure> {
        let mut request = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, EVENT_STREAM_MIME)
            .header(CACHE_CONTROL, "no-cache");

        if let Some(id) = last_event_id.and_then(|id| HeaderValue::from_str(id).ok()) {
            request = request.header(LAST_EVENT_ID, id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConnectFailure::Retryable(e.to_string()))?;

        check_response(response.status(), response.headers().get(CONTENT_TYPE))?;
        Ok(response)
    }

    async fn consume<S>(&self, body: S, decoder: &mut FrameDecoder) -> StreamEnd
    where
        S: Stream<Item = Result<Bytes, reqwest::Error>>,
    {
        let decoded = decode_frames(body, decoder);
        pin_mut!(decoded);

        while let Some(item) = decoded.next().await {
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => return StreamEnd::Interrupted(e.to_string()),
            };

            StreamMetrics::record_frame();
            if !self.interest.wants(&frame) {
                tracing::trace!(event_type = ?frame.event_type, "No listener for frame");
                StreamMetrics::record_filtered();
                continue;
            }

            let inbound = InboundFrame {
                connection: self.connection,
                frame,
            };
            if self.frames.send(inbound).await.is_err() {
                return StreamEnd::SinkClosed;
            }
        }

        StreamEnd::Eof
    }
}

/// Decide whether a response can be read as an event stream
fn check_response(
    status: StatusCode,
    content_type: Option<&HeaderValue>,
) -> Result<(), ConnectFailure> {
    if status == StatusCode::NO_CONTENT {
        return Err(ConnectFailure::Fatal("server closed the stream (204)".to_string()));
    }
    if !status.is_success() {
        return Err(ConnectFailure::Fatal(format!("unexpected status {}", status)));
    }

    let is_event_stream = content_type
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with(EVENT_STREAM_MIME))
        .unwrap_or(false);
    if !is_event_stream {
        return Err(ConnectFailure::Fatal(format!(
            "unexpected content type {:?}",
            content_type
        )));
    }

    Ok(())
}

fn decode_frames<'a, S>(
    body: S,
    decoder: &'a mut FrameDecoder,
) -> impl Stream<Item = Result<Frame, reqwest::Error>> + 'a
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + 'a,
{
    async_stream::stream! {
        pin_mut!(body);
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in decoder.feed(&bytes) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ListenerKey;

    fn base(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn test_parse_address_accepts_http() {
        assert!(parse_address("http://localhost:8080/events", None).is_ok());
        assert!(parse_address("https://example.com/stream?topic=a", None).is_ok());
    }

    #[test]
    fn test_relative_address_joined_onto_base() {
        let base = base("http://localhost:8080");
        let url = parse_address("/events", Some(&base)).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/events");

        let url = parse_address("/stream?topic=a", Some(&base)).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/stream?topic=a");
    }

    #[test]
    fn test_absolute_address_ignores_base() {
        let base = base("http://localhost:8080");
        let url = parse_address("https://example.com/events", Some(&base)).unwrap();
        assert_eq!(url.as_str(), "https://example.com/events");
    }

    #[test]
    fn test_relative_address_without_base_rejected() {
        let err = parse_address("/events", None).unwrap_err();
        assert_eq!(err.code(), "INVALID_ADDRESS");
        assert!(err.to_string().contains("relative URL without a base"));
    }

    #[test]
    fn test_other_schemes_rejected_with_or_without_base() {
        let err = parse_address("ws://localhost/events", None).unwrap_err();
        assert!(err.to_string().contains("unsupported scheme 'ws'"));

        let base = base("http://localhost:8080");
        let err = parse_address("ftp://example.com/events", Some(&base)).unwrap_err();
        assert_eq!(err.code(), "INVALID_ADDRESS");
        assert!(err.to_string().contains("unsupported scheme 'ftp'"));
    }

    #[test]
    fn test_empty_address_rejected_with_base() {
        let base = base("http://localhost:8080");
        let err = parse_address("  ", Some(&base)).unwrap_err();
        assert_eq!(err.code(), "INVALID_ADDRESS");
    }

    #[test]
    fn test_invalid_base_url_fails_construction() {
        for bad in ["not a url", "ftp://example.com"] {
            let config = StreamConfig {
                base_url: Some(bad.to_string()),
                ..StreamConfig::default()
            };
            assert!(matches!(SseTransport::new(config), Err(AppError::Config(_))));
        }
    }

    #[test]
    fn test_check_response() {
        let sse = HeaderValue::from_static("text/event-stream; charset=utf-8");
        assert!(check_response(StatusCode::OK, Some(&sse)).is_ok());

        let json = HeaderValue::from_static("application/json");
        assert!(matches!(
            check_response(StatusCode::OK, Some(&json)),
            Err(ConnectFailure::Fatal(_))
        ));
        assert!(matches!(
            check_response(StatusCode::NO_CONTENT, Some(&sse)),
            Err(ConnectFailure::Fatal(_))
        ));
        assert!(matches!(
            check_response(StatusCode::SERVICE_UNAVAILABLE, None),
            Err(ConnectFailure::Fatal(_))
        ));
        assert!(matches!(
            check_response(StatusCode::OK, None),
            Err(ConnectFailure::Fatal(_))
        ));
    }

    #[tokio::test]
    async fn test_decode_frames_across_chunks() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b"event: price\nda")),
            Ok(Bytes::from_static(b"ta: 42\nid: 7\n\ndata: ping\n\n")),
        ];
        let mut decoder = FrameDecoder::new();
        let frames: Vec<Frame> = decode_frames(futures::stream::iter(chunks), &mut decoder)
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(
            frames,
            vec![
                Frame::new("42").with_type("price").with_id("7"),
                Frame::new("ping"),
            ]
        );
        assert_eq!(decoder.last_event_id(), Some("7"));
    }

    #[tokio::test]
    async fn test_handle_attach_detach_close() {
        let transport = SseTransport::new(StreamConfig::default()).unwrap();
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        // Nothing listens on port 9, so the reader just keeps retrying
        let mut handle = transport
            .open(uuid::Uuid::new_v4(), "http://127.0.0.1:9/events", tx)
            .unwrap();

        let id = SubscriptionId::new(1);
        handle.attach(Subscription {
            id,
            key: ListenerKey::Typed("price".into()),
        });
        assert!(handle.detach(id));
        assert!(!handle.detach(id));

        handle.close();
        // Closing twice is a no-op
        handle.close();
        assert!(!handle.detach(id));
    }
}
