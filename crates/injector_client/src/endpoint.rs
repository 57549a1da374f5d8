/* 📖 # Why strip redundant prefixes with a loop instead of a regex?

Callers pass backend-relative paths written in several styles: "projects",
"/projects", "api/projects", even "//api/api/projects". All of them must resolve
to the same URL. An anchored loop that removes one slash run or one literal
segment per step is easy to reason about, cannot backtrack, and guarantees the
cleaned path never starts with "/" or with the segment again, so cleaning twice
gives the same result as cleaning once.
*/

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

const API_SEGMENT: &str = "api";
const EVENT_SEGMENT: &str = "event";

/// Characters escaped when an identifier is placed into a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Remove leading slashes and leading `{segment}/` repetitions, in any interleaving.
///
/// A remaining path equal to the bare segment name is treated as the segment
/// itself. Matching is case-sensitive and anchored at the start.
pub fn clean_path<'a>(path: &'a str, segment: &str) -> &'a str {
    let mut rest = path;
    loop {
        rest = rest.trim_start_matches('/');
        match rest.strip_prefix(segment) {
            Some("") => return "",
            Some(after) if after.starts_with('/') => rest = &after[1..],
            _ => return rest,
        }
    }
}

/// `{base_url}/api/{path}` with redundant leading slashes and `api/` removed.
pub fn resolve_api_url(base_url: &str, path: &str) -> String {
    format!("{}/api/{}", base_url, clean_path(path, API_SEGMENT))
}

/// `{base_url}/events/{path}` with redundant leading slashes and `event/` removed.
pub fn resolve_event_url(base_url: &str, path: &str) -> String {
    format!("{}/events/{}", base_url, clean_path(path, EVENT_SEGMENT))
}

/// Percent-encode an identifier for use as one path segment.
pub fn encode_segment(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}

/// The URL families of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api(&self, path: &str) -> String {
        resolve_api_url(&self.base_url, path)
    }

    pub fn events(&self, path: &str) -> String {
        resolve_event_url(&self.base_url, path)
    }

    pub fn projects(&self) -> String {
        self.api("/projects")
    }

    pub fn project(&self, project_id: &str) -> String {
        self.api(&format!("/projects/{}", encode_segment(project_id)))
    }

    pub fn project_secrets(&self, project_id: &str) -> String {
        self.api(&format!("/projects/{}/secrets", encode_segment(project_id)))
    }

    pub fn secrets(&self) -> String {
        self.api("/secrets")
    }

    pub fn secret(&self, secret_id: &str) -> String {
        self.api(&format!("/secrets/{}", encode_segment(secret_id)))
    }

    pub fn project_feed(&self) -> String {
        self.events("/projects")
    }

    pub fn secret_feed(&self) -> String {
        self.events("/secrets")
    }
}
