use std::error::Error as StdError;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use tracing::{debug, instrument};

use crate::{InjectorError, InjectorResult, err};

use super::http::{HttpBody, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpStatus};
use super::traits::Transport;

/* 📖 # Why reqwest's blocking client?

The client performs at most two sequential calls per page load and reads event
streams on the calling thread, so an async runtime would add complexity without
buying concurrency. reqwest's blocking API gives connection pooling, TLS and
timeouts, and its response implements Read, which is exactly what the SSE
reader consumes.
*/

/// Transport implementation backed by reqwest.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: Client,
    stream_client: Client,
}

impl ReqwestTransport {
    /// Create a transport whose buffered requests time out after `timeout`.
    /// Streaming requests have no overall timeout.
    pub fn new(timeout: Duration) -> InjectorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| err!("Failed to build HTTP client: {}", e))?;
        let stream_client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| err!("Failed to build streaming HTTP client: {}", e))?;
        Ok(Self {
            client,
            stream_client,
        })
    }

    fn send(&self, client: &Client, request: &HttpRequest) -> InjectorResult<Response> {
        let method = match request.method() {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut builder = client.request(method, request.url());
        for (key, value) in request.headers().iter() {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }
        builder.send().map_err(|e| {
            debug!(url = request.url(), error = %e, "request failed before a response arrived");
            Box::new(InjectorError::transport(request.url(), describe(&e)))
        })
    }

    fn response_head(response: &Response) -> HttpResponse {
        let status = response.status();
        let mut headers = HttpHeaders::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str(), value);
            }
        }
        let mut head = HttpResponse::new(HttpStatus(status.as_u16()))
            .with_status_text(status.canonical_reason().unwrap_or_default());
        for (key, value) in headers.iter() {
            head = head.with_header(key.as_str(), value.as_str());
        }
        head
    }
}

impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method(), url = request.url()))]
    fn execute(&self, request: HttpRequest) -> InjectorResult<HttpResponse> {
        let response = self.send(&self.client, &request)?;
        let head = Self::response_head(&response);
        let bytes = response.bytes().map_err(|e| {
            debug!(error = %e, "failed to read response body");
            Box::new(InjectorError::transport(request.url(), describe(&e)))
        })?;
        debug!(status = %head.status(), length = bytes.len(), "response received");
        Ok(head.with_body(bytes.to_vec()))
    }

    #[instrument(skip(self, request), fields(method = %request.method(), url = request.url()))]
    fn open_stream(&self, request: HttpRequest) -> InjectorResult<HttpResponse> {
        let response = self.send(&self.stream_client, &request)?;
        let head = Self::response_head(&response);
        debug!(status = %head.status(), "stream opened");
        Ok(head.with_body(HttpBody::from_reader(response)))
    }
}

/// Flatten an error and its sources into one line.
fn describe(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
