/* 📖 # Why own HTTP types instead of exposing reqwest's?

The client code builds requests and inspects responses through these small types
so that it stays fully testable with MockTransport. Only ReqwestTransport knows
about reqwest; swapping the HTTP stack touches one file.
*/

use std::collections::HashMap;
use std::io::{Cursor, Read};

/// HTTP methods used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Convert the method to its string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP headers collection. Names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    inner: HashMap<String, String>,
}

impl HttpHeaders {
    /// Create empty headers.
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Insert a header, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .insert(key.into().to_ascii_lowercase(), value.into());
    }

    /// Get a header value.
    pub fn get(&self, key: &str) -> Option<&String> {
        self.inner.get(&key.to_ascii_lowercase())
    }

    /// Iterate over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.inner.iter()
    }

    /// The media type of the Content-Type header, without parameters.
    pub fn content_type(&self) -> Option<String> {
        self.get("content-type").map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }
}

/* 📖 # Why support both bytes and streaming in HttpBody?
The change feeds are long-lived text/event-stream responses that are consumed as
they arrive. Regular API responses are small JSON documents read in one go.
Supporting both modes lets one response type serve both request styles.
*/

/// HTTP response body content.
pub enum HttpBody {
    /// Fully buffered body content
    Bytes(Vec<u8>),
    /// Body that is still arriving
    Stream(Box<dyn Read + Send>),
}

impl HttpBody {
    /// Create an empty body.
    pub fn empty() -> Self {
        Self::Bytes(vec![])
    }

    /// Create from a streaming reader.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self::Stream(Box::new(reader))
    }

    /// Get content as bytes (empty for the Stream variant).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Stream(_) => &[],
        }
    }

    /// Get content as a string if valid UTF-8 (only works for Bytes variant).
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::Bytes(bytes) => String::from_utf8(bytes.clone()).ok(),
            Self::Stream(_) => None,
        }
    }

    /// Convert into a reader regardless of variant.
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            Self::Bytes(bytes) => Box::new(Cursor::new(bytes)),
            Self::Stream(reader) => reader,
        }
    }
}

impl Default for HttpBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for HttpBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.debug_tuple("Stream").finish(),
        }
    }
}

impl From<Vec<u8>> for HttpBody {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<String> for HttpBody {
    fn from(s: String) -> Self {
        Self::Bytes(s.into_bytes())
    }
}

impl From<&str> for HttpBody {
    fn from(s: &str) -> Self {
        Self::Bytes(s.as_bytes().to_vec())
    }
}

/// Outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: HttpMethod,
    url: String,
    headers: HttpHeaders,
    body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Create a new HTTP request for an absolute URL.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HttpHeaders::new(),
            body: None,
        }
    }

    /// Shorthand for a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Get the HTTP method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Get the request URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the request headers.
    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    /// Get the request body, if any.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON body together with its Content-Type.
    pub fn with_json_body(self, json: impl Into<String>) -> Self {
        self.with_header("Content-Type", "application/json")
            .with_body(json.into().into_bytes())
    }

    /// Set a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }
}

/// Numeric HTTP status code. Any value is representable; unknown codes are not
/// folded into a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HttpStatus(pub u16);

impl HttpStatus {
    pub const OK: HttpStatus = HttpStatus(200);
    pub const CREATED: HttpStatus = HttpStatus(201);
    pub const NO_CONTENT: HttpStatus = HttpStatus(204);
    pub const UNAUTHORIZED: HttpStatus = HttpStatus(401);
    pub const FORBIDDEN: HttpStatus = HttpStatus(403);
    pub const NOT_FOUND: HttpStatus = HttpStatus(404);
    pub const INTERNAL_SERVER_ERROR: HttpStatus = HttpStatus(500);

    /// Get the numeric status code.
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// True for 2xx codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Get the standard reason phrase, or an empty string for unknown codes.
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            409 => "Conflict",
            418 => "I'm a teapot",
            422 => "Unprocessable Entity",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "",
        }
    }
}

impl From<u16> for HttpStatus {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl std::fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Incoming HTTP response.
#[derive(Debug)]
pub struct HttpResponse {
    status: HttpStatus,
    status_text: String,
    headers: HttpHeaders,
    body: HttpBody,
}

impl HttpResponse {
    /// Create a new response with the given status and its standard reason phrase.
    pub fn new(status: impl Into<HttpStatus>) -> Self {
        let status = status.into();
        Self {
            status,
            status_text: status.reason_phrase().to_string(),
            headers: HttpHeaders::new(),
            body: HttpBody::empty(),
        }
    }

    /// Create a 200 OK JSON response.
    pub fn json(body: impl Into<String>) -> Self {
        Self::new(HttpStatus::OK)
            .with_header("Content-Type", "application/json")
            .with_body(body.into())
    }

    /// Get the status code.
    pub fn status(&self) -> HttpStatus {
        self.status
    }

    /// Get the status text sent alongside the code.
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Get the headers.
    pub fn headers(&self) -> &HttpHeaders {
        &self.headers
    }

    /// Get the body.
    pub fn body(&self) -> &HttpBody {
        &self.body
    }

    /// Take ownership of the body.
    pub fn into_body(self) -> HttpBody {
        self.body
    }

    /// Split into the head (with an empty body) and the body.
    pub fn into_body_parts(mut self) -> (HttpResponse, HttpBody) {
        let body = std::mem::take(&mut self.body);
        (self, body)
    }

    /// Set the response body.
    pub fn with_body(mut self, body: impl Into<HttpBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Override the status text.
    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_headers_are_case_insensitive() {
        let mut headers = HttpHeaders::new();
        headers.insert("Content-Type", "text/event-stream; charset=utf-8");

        assert_eq!(
            headers.get("content-type").map(String::as_str),
            Some("text/event-stream; charset=utf-8")
        );
        assert_eq!(
            headers.content_type(),
            Some("text/event-stream".to_string())
        );

        headers.insert("CONTENT-TYPE", "Application/X-NDJSON");
        assert_eq!(headers.iter().count(), 1);
        assert_eq!(
            headers.content_type(),
            Some("application/x-ndjson".to_string())
        );
    }

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::new(HttpMethod::Post, "http://localhost/api/projects")
            .with_json_body("{\"name\": \"web\"}");

        assert_eq!(request.method(), HttpMethod::Post);
        assert_eq!(request.url(), "http://localhost/api/projects");
        assert_eq!(
            request.headers().get("Content-Type"),
            Some(&"application/json".to_string())
        );
        assert_eq!(request.body(), Some(&b"{\"name\": \"web\"}"[..]));
    }

    #[test]
    fn test_http_status_keeps_unknown_codes() {
        assert!(HttpStatus(204).is_success());
        assert!(!HttpStatus(404).is_success());
        assert_eq!(HttpStatus::from(599).as_u16(), 599);
        assert_eq!(HttpStatus(599).reason_phrase(), "");
        assert_eq!(HttpStatus(403).reason_phrase(), "Forbidden");
    }

    #[test]
    fn test_http_response_defaults_status_text() {
        let response = HttpResponse::new(502u16);
        assert_eq!(response.status_text(), "Bad Gateway");

        let json = HttpResponse::json("[]");
        assert_eq!(json.status(), HttpStatus::OK);
        assert_eq!(json.body().as_string(), Some("[]".to_string()));
        assert_eq!(json.headers().content_type(), Some("application/json".to_string()));
    }

    #[test]
    fn test_http_body_into_reader() {
        let mut reader = HttpBody::from("event: ping\n\n").into_reader();
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "event: ping\n\n");
        assert_eq!(HttpBody::from_reader(std::io::empty()).as_bytes(), b"");
    }
}
