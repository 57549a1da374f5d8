/* 📖 # Why is the client split into small modules?

Each module owns one part of the backend contract: where things live
(endpoint), what they look like (model, envelope), how they are fetched (api,
pages) and how changes arrive (sse, feed, live). None of them touches the
network directly; everything goes through the TransportHandle from
injector_base so every module can be tested against MockTransport.
*/

pub mod api;
pub mod config;
pub mod endpoint;
pub mod envelope;
pub mod feed;
pub mod inject;
pub mod live;
pub mod model;
pub mod pages;
pub mod sse;

pub use api::{ApiClient, LoadError, WriteError};
pub use config::ClientConfig;
pub use endpoint::{Endpoints, resolve_api_url, resolve_event_url};
pub use envelope::{Change, ChangeEnvelope, ChangeKind, EnvelopeError};
pub use feed::{
    ChangeFeed, FeedClient, FeedEvent, FeedHandle, ReconnectPolicy, WatchEnd, WatchError,
};
pub use inject::{build_environment, run_with_environment, to_screaming_snake_case};
pub use live::{Applied, LiveSet, LiveSetHandle};
pub use model::{
    Entity, NewProject, NewSecret, ProjectItem, ProjectPatch, SecretItem, SecretPatch, Timestamp,
};
pub use pages::{
    LoadStage, ProjectPage, ProjectPageError, ProjectsPage, load_project_page, load_projects,
};
pub use sse::{FrameMode, SseFrame, SseReader};
