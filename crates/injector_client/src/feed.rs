/* 📖 # Why a blocking watch loop with a shutdown flag?

A change feed is one long-lived HTTP response. The watcher reads it on the
calling thread and hands every decoded event to a handler; when the stream ends
or breaks it reconnects after a delay, taken from the server's last
`retry:` field when it sent one. Callers that want the feed in the
background run `watch` on a thread of their own and stop it through a
FeedHandle, the same way a server loop is stopped.

Malformed messages are not fatal. A feed is shared with every other client of
the backend, so one bad frame is logged, counted and skipped.

A rejected connection (404, 401, 403) will not start working on retry and ends
the watch. Other failures are retried until `max_attempts` consecutive
connection attempts have failed; a successful connection resets the count.
*/

use std::fmt;
use std::io::{BufReader, Read};
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use injector_base::transport::{HttpBody, HttpRequest};
use injector_base::{InjectorResult, TransportHandle};

use crate::api::LoadError;
use crate::endpoint::Endpoints;
use crate::envelope::ChangeEnvelope;
use crate::model::{ProjectItem, SecretItem};
use crate::sse::{FrameMode, SseFrame, SseReader};

/// Event name of the handshake frame the backend sends on connect.
const CONNECTED_EVENT: &str = "connected";

/// One item read from a change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent<T> {
    /// Handshake; `channel` names the feed when the backend sent it.
    Connected { channel: Option<String> },
    Change(ChangeEnvelope<T>),
}

#[derive(Deserialize)]
struct Handshake {
    channel: Option<String>,
}

type Frames = SseReader<BufReader<Box<dyn Read + Send>>>;

/// Decoded events of one feed connection.
pub struct ChangeFeed<T> {
    frames: Frames,
    dropped: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> ChangeFeed<T> {
    pub fn from_body(body: HttpBody, mode: FrameMode) -> Self {
        let reader = SseReader::new(BufReader::new(body.into_reader()), mode);
        Self {
            frames: reader,
            dropped: 0,
            _marker: PhantomData,
        }
    }

    /// Number of malformed messages skipped so far, unreadable frames included.
    pub fn dropped(&self) -> usize {
        self.dropped + self.frames.dropped()
    }

    /// Reconnection time requested by the server, if it sent one.
    pub fn retry_hint(&self) -> Option<Duration> {
        self.frames.retry()
    }

    fn decode(&mut self, frame: SseFrame) -> Option<FeedEvent<T>> {
        if frame.event.as_deref() == Some(CONNECTED_EVENT) {
            let channel = serde_json::from_str::<Handshake>(&frame.data)
                .ok()
                .and_then(|handshake| handshake.channel);
            return Some(FeedEvent::Connected { channel });
        }
        match ChangeEnvelope::decode(frame.event.as_deref(), &frame.data) {
            Ok(envelope) => Some(FeedEvent::Change(envelope)),
            Err(reason) => {
                self.dropped += 1;
                warn!(event = ?frame.event, %reason, dropped = self.dropped, "dropping malformed feed message");
                None
            }
        }
    }
}

impl<T: DeserializeOwned> Iterator for ChangeFeed<T> {
    type Item = InjectorResult<FeedEvent<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.frames.next()? {
                Ok(frame) => {
                    if let Some(event) = self.decode(frame) {
                        return Some(Ok(event));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl<T> fmt::Debug for ChangeFeed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("dropped", &self.dropped)
            .finish_non_exhaustive()
    }
}

/// How a watcher reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait before reconnecting, replaced by the server's `retry:` once one arrives.
    pub delay: Duration,
    /// Consecutive failed attempts tolerated; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_attempts: Some(5),
        }
    }
}

/// Stops a running watch from another thread.
#[derive(Debug, Clone, Default)]
pub struct FeedHandle {
    shutdown: Arc<AtomicBool>,
}

impl FeedHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the watch to stop. Takes effect at the next event or reconnect.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Why a watch returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEnd {
    /// The handler returned `ControlFlow::Break`.
    Stopped,
    /// The FeedHandle was shut down.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// The backend refused the feed; retrying would not help.
    Rejected(LoadError),
    /// Too many consecutive failed connection attempts.
    GaveUp { attempts: u32, last: LoadError },
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(error) => write!(f, "Feed rejected: {}", error),
            Self::GaveUp { attempts, last } => {
                write!(f, "Feed unavailable after {} attempts: {}", attempts, last)
            }
        }
    }
}

impl std::error::Error for WatchError {}

/// Connects to the backend's change feeds.
#[derive(Debug, Clone)]
pub struct FeedClient {
    transport: TransportHandle,
    endpoints: Endpoints,
}

impl FeedClient {
    pub fn new(transport: TransportHandle, endpoints: Endpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    /// Open one feed connection.
    pub fn connect<T: DeserializeOwned>(&self, url: &str) -> Result<ChangeFeed<T>, LoadError> {
        let request = HttpRequest::get(url)
            .with_header("Accept", "text/event-stream")
            .with_header("Cache-Control", "no-cache");
        let response = self.transport.open_stream(request).map_err(|e| {
            warn!(url, error = %e, "feed connection failed");
            LoadError::ConnectionFailed
        })?;
        let status = response.status();
        if !status.is_success() {
            warn!(url, status = %status, "feed connection refused");
            return Err(LoadError::from_status(status, response.status_text()));
        }
        let mode = FrameMode::from_content_type(response.headers().content_type().as_deref());
        Ok(ChangeFeed::from_body(response.into_body(), mode))
    }

    /// Stream events of the feed at `path` (relative to `/events`) into
    /// `handler`, reconnecting per `policy`.
    #[instrument(skip(self, handle, handler))]
    pub fn watch<T, F>(
        &self,
        path: &str,
        policy: ReconnectPolicy,
        handle: &FeedHandle,
        mut handler: F,
    ) -> Result<WatchEnd, WatchError>
    where
        T: DeserializeOwned,
        F: FnMut(FeedEvent<T>) -> ControlFlow<()>,
    {
        let url = self.endpoints.events(path);
        let mut failures: u32 = 0;
        let mut delay = policy.delay;
        loop {
            if handle.is_shutdown() {
                return Ok(WatchEnd::Shutdown);
            }
            let last = match self.connect::<T>(&url) {
                Ok(mut feed) => {
                    info!("feed connected");
                    failures = 0;
                    for event in feed.by_ref() {
                        if handle.is_shutdown() {
                            return Ok(WatchEnd::Shutdown);
                        }
                        match event {
                            Ok(event) => {
                                if handler(event).is_break() {
                                    return Ok(WatchEnd::Stopped);
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "feed interrupted");
                                break;
                            }
                        }
                    }
                    if let Some(hint) = feed.retry_hint() {
                        delay = hint;
                    }
                    info!(dropped = feed.dropped(), "feed ended");
                    LoadError::ConnectionFailed
                }
                Err(error @ (LoadError::NotFound | LoadError::Forbidden)) => {
                    return Err(WatchError::Rejected(error));
                }
                Err(error) => error,
            };
            failures += 1;
            if let Some(max_attempts) = policy.max_attempts {
                if failures > max_attempts {
                    return Err(WatchError::GaveUp {
                        attempts: failures,
                        last,
                    });
                }
            }
            debug!(attempt = failures, ?delay, "reconnecting");
            std::thread::sleep(delay);
        }
    }

    pub fn watch_projects<F>(
        &self,
        policy: ReconnectPolicy,
        handle: &FeedHandle,
        handler: F,
    ) -> Result<WatchEnd, WatchError>
    where
        F: FnMut(FeedEvent<ProjectItem>) -> ControlFlow<()>,
    {
        self.watch("projects", policy, handle, handler)
    }

    pub fn watch_secrets<F>(
        &self,
        policy: ReconnectPolicy,
        handle: &FeedHandle,
        handler: F,
    ) -> Result<WatchEnd, WatchError>
    where
        F: FnMut(FeedEvent<SecretItem>) -> ControlFlow<()>,
    {
        self.watch("secrets", policy, handle, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Change, ChangeKind};
    use crate::live::{LiveSet, LiveSetHandle};
    use crate::model::Timestamp;
    use crate::model::fixtures::{project, secret};
    use injector_base::MockTransport;
    use injector_base::transport::{HttpMethod, MockReply};

    const FEED: &str = "http://backend/events/projects";
    const SECRETS_FEED: &str = "http://backend/events/secrets";

    fn feed_client(mock: &MockTransport) -> FeedClient {
        FeedClient::new(
            TransportHandle::new(mock.clone()),
            Endpoints::new("http://backend"),
        )
    }

    fn frame(change: Change<ProjectItem>) -> String {
        ChangeEnvelope {
            timestamp: Some(Timestamp::new("2025-01-02T10:00:01Z")),
            change,
        }
        .to_sse_frame()
        .unwrap()
    }

    fn no_delay(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: Duration::ZERO,
            max_attempts: Some(max_attempts),
        }
    }

    #[test]
    fn test_feed_decodes_backend_stream() {
        let mock = MockTransport::new();
        let stream = format!(
            "event: connected\ndata: {{\"status\":\"connected\",\"channel\":\"project_list\"}}\n\n\
             event: ping\ndata: {{}}\n\n{}",
            frame(Change::Create(project("p1", "web")))
        );
        mock.respond(HttpMethod::Get, FEED, MockReply::event_stream(stream));

        let feed = feed_client(&mock).connect::<ProjectItem>(FEED).unwrap();
        let events: Vec<_> = feed.map(|event| event.unwrap()).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            FeedEvent::Connected {
                channel: Some("project_list".to_string())
            }
        );
        assert!(matches!(&events[1], FeedEvent::Change(e) if e.change == Change::Ping));
        assert!(
            matches!(&events[2], FeedEvent::Change(e) if e.change.kind() == ChangeKind::Create)
        );

        let request = &mock.requests()[0];
        assert_eq!(
            request.headers().get("accept").map(String::as_str),
            Some("text/event-stream")
        );
    }

    #[test]
    fn test_malformed_messages_are_dropped_and_counted() {
        let mock = MockTransport::new();
        let stream = format!(
            "data: not json\n\nevent: create\ndata: {{\"type\":\"upsert\"}}\n\n{}",
            frame(Change::Delete(project("p1", "web")))
        );
        mock.respond(HttpMethod::Get, FEED, MockReply::event_stream(stream));

        let mut feed = feed_client(&mock).connect::<ProjectItem>(FEED).unwrap();
        let event = feed.next().unwrap().unwrap();
        assert!(
            matches!(event, FeedEvent::Change(e) if e.change == Change::Delete(project("p1", "web")))
        );
        assert_eq!(feed.dropped(), 2);
        assert!(feed.next().is_none());
    }

    #[test]
    fn test_connect_status_mapping() {
        let mock = MockTransport::new();
        mock.respond(HttpMethod::Get, FEED, MockReply::status(502));
        assert_eq!(
            feed_client(&mock).connect::<ProjectItem>(FEED).unwrap_err(),
            LoadError::Upstream {
                status: 502,
                status_text: "Bad Gateway".to_string()
            }
        );
    }

    #[test]
    fn test_watch_feeds_live_set_until_handler_stops() {
        let mock = MockTransport::new();
        let stream = format!(
            "{}{}{}",
            frame(Change::Create(project("p1", "web"))),
            frame(Change::Create(project("p2", "api"))),
            frame(Change::Update(project("p1", "site"))),
        );
        mock.respond(HttpMethod::Get, FEED, MockReply::event_stream(stream));

        let live = LiveSetHandle::new(LiveSet::new());
        let mut seen = 0;
        let end = feed_client(&mock)
            .watch_projects(no_delay(3), &FeedHandle::new(), |event| {
                if let FeedEvent::Change(envelope) = event {
                    live.apply(&envelope);
                    seen += 1;
                }
                if seen == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(end, WatchEnd::Stopped);
        let names: Vec<String> = live.snapshot().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["site", "api"]);
    }

    #[test]
    fn test_watch_reconnects_then_gives_up() {
        let mock = MockTransport::new();
        mock.respond(
            HttpMethod::Get,
            FEED,
            MockReply::event_stream(frame(Change::Create(project("p1", "web")))),
        );
        mock.respond(HttpMethod::Get, FEED, MockReply::failure("connection refused"));

        let mut events = 0;
        let error = feed_client(&mock)
            .watch::<ProjectItem, _>("projects", no_delay(2), &FeedHandle::new(), |_| {
                events += 1;
                ControlFlow::Continue(())
            })
            .unwrap_err();
        assert_eq!(events, 1);
        assert_eq!(
            error,
            WatchError::GaveUp {
                attempts: 3,
                last: LoadError::ConnectionFailed
            }
        );
        // one stream, then two failed reconnects
        assert_eq!(mock.requests().len(), 3);
    }

    #[test]
    fn test_watch_stops_on_rejection() {
        let mock = MockTransport::new();
        mock.respond(HttpMethod::Get, FEED, MockReply::status(403));
        let error = feed_client(&mock)
            .watch::<ProjectItem, _>("projects", no_delay(5), &FeedHandle::new(), |_| {
                ControlFlow::Continue(())
            })
            .unwrap_err();
        assert_eq!(error, WatchError::Rejected(LoadError::Forbidden));
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn test_watch_honors_shutdown() {
        let mock = MockTransport::new();
        let stream = format!(
            "{}{}",
            frame(Change::Create(project("p1", "web"))),
            frame(Change::Create(project("p2", "api"))),
        );
        mock.respond(HttpMethod::Get, FEED, MockReply::event_stream(stream));

        let handle = FeedHandle::new();
        let stopper = handle.clone();
        let mut events = 0;
        let end = feed_client(&mock)
            .watch::<ProjectItem, _>("projects", no_delay(5), &handle, |_| {
                events += 1;
                stopper.shutdown();
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(end, WatchEnd::Shutdown);
        assert_eq!(events, 1);
    }

    #[test]
    fn test_unreadable_frame_does_not_interrupt_feed() {
        let mut body = b"event: create\ndata: \xff\xfe\n\n".to_vec();
        body.extend_from_slice(frame(Change::Create(project("p1", "web"))).as_bytes());
        let mut feed =
            ChangeFeed::<ProjectItem>::from_body(HttpBody::from(body), FrameMode::EventStream);
        let event = feed.next().unwrap().unwrap();
        assert!(
            matches!(event, FeedEvent::Change(e) if e.change == Change::Create(project("p1", "web")))
        );
        assert!(feed.next().is_none());
        assert_eq!(feed.dropped(), 1);
    }

    #[test]
    fn test_watch_keeps_connection_after_unreadable_frame() {
        let mock = MockTransport::new();
        let mut body = b"data: \xc3\x28\n\n".to_vec();
        body.extend_from_slice(frame(Change::Create(project("p1", "web"))).as_bytes());
        mock.respond(HttpMethod::Get, FEED, MockReply::event_stream(body));

        let mut changes = Vec::new();
        let end = feed_client(&mock)
            .watch_projects(no_delay(0), &FeedHandle::new(), |event| {
                if let FeedEvent::Change(envelope) = event {
                    changes.push(envelope.change);
                }
                ControlFlow::Break(())
            })
            .unwrap();
        assert_eq!(end, WatchEnd::Stopped);
        assert_eq!(changes, vec![Change::Create(project("p1", "web"))]);
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn test_json_lines_feed_is_decoded() {
        let mock = MockTransport::new();
        let create = ChangeEnvelope {
            timestamp: Some(Timestamp::new("2025-01-02T10:00:01Z")),
            change: Change::Create(project("p1", "web")),
        };
        let body = format!(
            "{{\"type\":\"ping\"}}\nnot json\n{}\n",
            create.to_json().unwrap()
        );
        mock.respond(HttpMethod::Get, FEED, MockReply::json_lines(body));

        let mut feed = feed_client(&mock).connect::<ProjectItem>(FEED).unwrap();
        let events: Vec<_> = feed.by_ref().map(|event| event.unwrap()).collect();
        assert_eq!(
            events,
            vec![
                FeedEvent::Change(ChangeEnvelope {
                    timestamp: None,
                    change: Change::Ping
                }),
                FeedEvent::Change(create),
            ]
        );
        assert_eq!(feed.dropped(), 1);
    }

    #[test]
    fn test_watch_secrets_uses_secrets_feed() {
        let mock = MockTransport::new();
        let stream = ChangeEnvelope {
            timestamp: Some(Timestamp::new("2025-01-02T10:00:01Z")),
            change: Change::Delete(secret("s1", "p1", "TOKEN", "abc")),
        }
        .to_sse_frame()
        .unwrap();
        mock.respond(HttpMethod::Get, SECRETS_FEED, MockReply::event_stream(stream));

        let live = LiveSetHandle::new(LiveSet::from_snapshot(vec![secret(
            "s1", "p1", "TOKEN", "abc",
        )]));
        let end = feed_client(&mock)
            .watch_secrets(no_delay(0), &FeedHandle::new(), |event| {
                if let FeedEvent::Change(envelope) = event {
                    live.apply(&envelope);
                }
                ControlFlow::Break(())
            })
            .unwrap();
        assert_eq!(end, WatchEnd::Stopped);
        assert!(live.is_empty());
        assert_eq!(mock.requested_urls(), vec![SECRETS_FEED.to_string()]);
    }

    #[test]
    fn test_watch_reconnects_after_server_retry_hint() {
        let mock = MockTransport::new();
        let stream = format!(
            "retry: 0\n\n{}",
            frame(Change::Create(project("p1", "web")))
        );
        mock.respond(HttpMethod::Get, FEED, MockReply::event_stream(stream));
        mock.respond(HttpMethod::Get, FEED, MockReply::failure("connection refused"));

        let policy = ReconnectPolicy {
            delay: Duration::from_secs(60),
            max_attempts: Some(1),
        };
        let started = std::time::Instant::now();
        let error = feed_client(&mock)
            .watch::<ProjectItem, _>("projects", policy, &FeedHandle::new(), |_| {
                ControlFlow::Continue(())
            })
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(error, WatchError::GaveUp { attempts: 2, .. }));
        assert_eq!(mock.requests().len(), 2);
    }
}
