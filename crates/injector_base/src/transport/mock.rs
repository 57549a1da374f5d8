use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::{InjectorError, InjectorResult};

use super::http::{HttpBody, HttpMethod, HttpRequest, HttpResponse, HttpStatus};
use super::traits::Transport;

/* 📖 # Why queue replies per route in MockTransport?

Tests of the feed watcher need a sequence of outcomes for the same URL (a
stream that ends, a refused reconnect, another stream). Replies for one route
are served in registration order; the last one stays in place and is repeated,
so single-reply routes behave like a static backend.

Every request is recorded, which lets tests assert what was (and what was not)
sent, e.g. that a failed project fetch never triggers the secrets fetch.
*/

/// A canned outcome for one request.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A buffered response.
    Response {
        status: u16,
        content_type: Option<String>,
        body: String,
    },
    /// A response whose body is handed out as a stream.
    Stream {
        status: u16,
        content_type: String,
        body: Vec<u8>,
    },
    /// No response at all, as if the connection failed.
    Failure { message: String },
}

impl MockReply {
    /// 200 OK with a JSON body.
    pub fn json(body: impl Into<String>) -> Self {
        Self::Response {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }

    /// A JSON body with an arbitrary status.
    pub fn json_with_status(status: u16, body: impl Into<String>) -> Self {
        Self::Response {
            status,
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }

    /// An empty response with the given status.
    pub fn status(status: u16) -> Self {
        Self::Response {
            status,
            content_type: None,
            body: String::new(),
        }
    }

    /// A 200 text/event-stream response with the given wire bytes.
    pub fn event_stream(body: impl Into<Vec<u8>>) -> Self {
        Self::Stream {
            status: 200,
            content_type: "text/event-stream".to_string(),
            body: body.into(),
        }
    }

    /// A 200 application/x-ndjson stream, one JSON document per line.
    pub fn json_lines(body: impl Into<Vec<u8>>) -> Self {
        Self::Stream {
            status: 200,
            content_type: "application/x-ndjson".to_string(),
            body: body.into(),
        }
    }

    /// A transport failure.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    fn into_response(self, url: &str) -> InjectorResult<HttpResponse> {
        match self {
            Self::Response {
                status,
                content_type,
                body,
            } => {
                let mut response = HttpResponse::new(HttpStatus(status)).with_body(body);
                if let Some(content_type) = content_type {
                    response = response.with_header("Content-Type", content_type);
                }
                Ok(response)
            }
            Self::Stream {
                status,
                content_type,
                body,
            } => Ok(HttpResponse::new(HttpStatus(status))
                .with_header("Content-Type", content_type)
                .with_body(HttpBody::from_reader(std::io::Cursor::new(body)))),
            Self::Failure { message } => Err(Box::new(InjectorError::transport(url, message))),
        }
    }
}

/// In-memory Transport implementation for testing.
///
/// # Examples
///
/// ```
/// use injector_base::{MockTransport, Transport};
/// use injector_base::transport::{HttpMethod, HttpRequest, MockReply};
///
/// let mock = MockTransport::new();
/// mock.respond(HttpMethod::Get, "http://backend/api/projects", MockReply::json("[]"));
/// let response = mock.execute(HttpRequest::get("http://backend/api/projects")).unwrap();
/// assert_eq!(response.status().as_u16(), 200);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    replies: Arc<Mutex<HashMap<(HttpMethod, String), VecDeque<MockReply>>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    /// Create a mock with no registered routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reply for a method and absolute URL.
    pub fn respond(&self, method: HttpMethod, url: impl Into<String>, reply: MockReply) {
        self.replies
            .lock()
            .unwrap()
            .entry((method, url.into()))
            .or_default()
            .push_back(reply);
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// URLs of all requests received so far, in order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.url().to_string())
            .collect()
    }

    fn next_reply(&self, request: &HttpRequest) -> Option<MockReply> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(&(request.method(), request.url().to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: HttpRequest) -> InjectorResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let url = request.url().to_string();
        let Some(reply) = self.next_reply(&request) else {
            return Err(Box::new(InjectorError::transport(
                url,
                format!("no mock reply registered for {}", request.method()),
            )));
        };
        let response = reply.into_response(&url)?;
        // Buffered calls see the whole body, like a real client would.
        match response.into_body_parts() {
            (head, HttpBody::Stream(mut reader)) => {
                let mut bytes = Vec::new();
                std::io::Read::read_to_end(&mut reader, &mut bytes)
                    .map_err(|e| Box::new(InjectorError::transport(&url, e.to_string())))?;
                Ok(head.with_body(bytes))
            }
            (head, body) => Ok(head.with_body(body)),
        }
    }

    fn open_stream(&self, request: HttpRequest) -> InjectorResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let url = request.url().to_string();
        match self.next_reply(&request) {
            Some(reply) => reply.into_response(&url),
            None => Err(Box::new(InjectorError::transport(
                url,
                format!("no mock reply registered for {}", request.method()),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://backend/api/projects";

    #[test]
    fn test_unregistered_route_is_transport_failure() {
        let mock = MockTransport::new();
        let err = mock.execute(HttpRequest::get(URL)).unwrap_err();
        assert!(err.is_transport());
        assert_eq!(mock.requested_urls(), vec![URL.to_string()]);
    }

    #[test]
    fn test_replies_are_served_in_order_and_last_repeats() {
        let mock = MockTransport::new();
        mock.respond(HttpMethod::Get, URL, MockReply::status(500));
        mock.respond(HttpMethod::Get, URL, MockReply::json("[]"));

        let statuses: Vec<u16> = (0..3)
            .map(|_| mock.execute(HttpRequest::get(URL)).unwrap().status().as_u16())
            .collect();
        assert_eq!(statuses, vec![500, 200, 200]);
    }

    #[test]
    fn test_methods_are_routed_separately() {
        let mock = MockTransport::new();
        mock.respond(HttpMethod::Delete, URL, MockReply::status(204));
        assert!(mock.execute(HttpRequest::get(URL)).is_err());
        let response = mock
            .execute(HttpRequest::new(HttpMethod::Delete, URL))
            .unwrap();
        assert_eq!(response.status(), HttpStatus::NO_CONTENT);
    }

    #[test]
    fn test_failure_reply() {
        let mock = MockTransport::new();
        mock.respond(HttpMethod::Get, URL, MockReply::failure("connection refused"));
        let err = mock.execute(HttpRequest::get(URL)).unwrap_err();
        assert_eq!(err.to_string(), format!("Request to {} failed: connection refused", URL));
    }

    #[test]
    fn test_stream_reply_is_buffered_by_execute() {
        let mock = MockTransport::new();
        mock.respond(HttpMethod::Get, URL, MockReply::event_stream("event: ping\ndata: {}\n\n"));
        let response = mock.execute(HttpRequest::get(URL)).unwrap();
        assert_eq!(
            response.body().as_string(),
            Some("event: ping\ndata: {}\n\n".to_string())
        );

        let streamed = mock.open_stream(HttpRequest::get(URL)).unwrap();
        assert!(matches!(streamed.body(), HttpBody::Stream(_)));
    }
}
