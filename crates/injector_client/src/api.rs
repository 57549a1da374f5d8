/* 📖 # Why translate HTTP outcomes immediately?

Callers of the client should never have to look at raw transport errors or
status codes. Every request goes through one `send` helper that turns the
outcome into a small closed set of failures:

| outcome                          | LoadError                    |
|----------------------------------|------------------------------|
| 404                              | NotFound                     |
| 401, 403                         | Forbidden                    |
| 500                              | ServerError                  |
| any other non-2xx                | Upstream { status, text }    |
| no response, undecodable body    | ConnectionFailed             |

The body of the response is trusted to match the expected entity type; no
further shape validation happens here.
*/

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use injector_base::error::ErrorKind;
use injector_base::{InjectorError, TransportHandle};
use injector_base::transport::{HttpMethod, HttpRequest, HttpResponse, HttpStatus};

use crate::endpoint::Endpoints;
use crate::model::{NewProject, NewSecret, ProjectItem, ProjectPatch, SecretItem, SecretPatch};

/// User-facing failure categories of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    NotFound,
    Forbidden,
    ServerError,
    Upstream { status: u16, status_text: String },
    ConnectionFailed,
}

impl LoadError {
    /// Map an unsuccessful status to its category.
    pub fn from_status(status: HttpStatus, status_text: &str) -> Self {
        match status {
            HttpStatus::NOT_FOUND => Self::NotFound,
            HttpStatus::UNAUTHORIZED | HttpStatus::FORBIDDEN => Self::Forbidden,
            HttpStatus::INTERNAL_SERVER_ERROR => Self::ServerError,
            other => Self::Upstream {
                status: other.as_u16(),
                status_text: status_text.to_string(),
            },
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::NotFound => "Not found",
            Self::Forbidden => "Forbidden",
            Self::ServerError => "Server error",
            Self::Upstream { .. } => "Request failed",
            Self::ConnectionFailed => "Failed to connect to server",
        }
    }

    pub fn details(&self) -> String {
        match self {
            Self::NotFound => "The server could not find the requested resource".to_string(),
            Self::Forbidden => "You are not allowed to access this resource".to_string(),
            Self::ServerError => {
                "The server encountered an error while handling the request".to_string()
            }
            Self::Upstream {
                status,
                status_text,
            } => format!("Server returned status {}: {}", status, status_text),
            Self::ConnectionFailed => {
                "Please check your network connection and try again".to_string()
            }
        }
    }

    /// The status a presentation layer should render this failure with.
    pub fn page_status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Forbidden => 403,
            Self::ServerError => 500,
            Self::Upstream { status, .. } => *status,
            Self::ConnectionFailed => 503,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.details())
    }
}

impl std::error::Error for LoadError {}

/// Failure of a create/update/delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// Rejected locally before anything was sent.
    Invalid(String),
    Failed(LoadError),
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(reason) => write!(f, "Invalid request: {}", reason),
            Self::Failed(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for WriteError {}

impl From<LoadError> for WriteError {
    fn from(error: LoadError) -> Self {
        Self::Failed(error)
    }
}

/// Typed access to the backend's request/response API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: TransportHandle,
    endpoints: Endpoints,
}

impl ApiClient {
    pub fn new(transport: TransportHandle, endpoints: Endpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Perform one request and map every non-2xx outcome.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, LoadError> {
        let url = request.url().to_string();
        let response = self.transport.execute(request).map_err(|e| {
            warn!(url = %url, error = %e, "request failed without a response");
            LoadError::ConnectionFailed
        })?;
        let status = response.status();
        if status.is_success() {
            debug!(url = %url, status = %status, "request succeeded");
            return Ok(response);
        }
        let error = LoadError::from_status(status, response.status_text());
        match server_message(&response) {
            Some(message) => {
                warn!(url = %url, status = %status, server_message = %message, "request rejected")
            }
            None => warn!(url = %url, status = %status, "request rejected"),
        }
        Err(error)
    }

    /// GET `url` and decode the JSON body as `T`.
    pub fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, LoadError> {
        let response =
            self.send(HttpRequest::get(url).with_header("Accept", "application/json"))?;
        decode_body(url, &response)
    }

    fn write_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        url: &str,
        body: &B,
    ) -> Result<T, WriteError> {
        let json = serde_json::to_string(body).map_err(|e| WriteError::Invalid(e.to_string()))?;
        let request = HttpRequest::new(method, url)
            .with_header("Accept", "application/json")
            .with_json_body(json);
        let response = self.send(request)?;
        Ok(decode_body(url, &response)?)
    }

    fn delete(&self, url: &str) -> Result<(), WriteError> {
        self.send(HttpRequest::new(HttpMethod::Delete, url))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn list_projects(&self) -> Result<Vec<ProjectItem>, LoadError> {
        self.fetch_json(&self.endpoints.projects())
    }

    #[instrument(skip(self))]
    pub fn get_project(&self, project_id: &str) -> Result<ProjectItem, LoadError> {
        self.fetch_json(&self.endpoints.project(project_id))
    }

    #[instrument(skip(self))]
    pub fn list_project_secrets(&self, project_id: &str) -> Result<Vec<SecretItem>, LoadError> {
        self.fetch_json(&self.endpoints.project_secrets(project_id))
    }

    #[instrument(skip(self))]
    pub fn list_secrets(&self) -> Result<Vec<SecretItem>, LoadError> {
        self.fetch_json(&self.endpoints.secrets())
    }

    #[instrument(skip(self))]
    pub fn get_secret(&self, secret_id: &str) -> Result<SecretItem, LoadError> {
        self.fetch_json(&self.endpoints.secret(secret_id))
    }

    #[instrument(skip(self))]
    pub fn create_project(&self, project: &NewProject) -> Result<ProjectItem, WriteError> {
        project
            .validate()
            .map_err(|e| WriteError::Invalid(e.to_string()))?;
        self.write_json(HttpMethod::Post, &self.endpoints.projects(), project)
    }

    #[instrument(skip(self))]
    pub fn update_project(
        &self,
        project_id: &str,
        patch: &ProjectPatch,
    ) -> Result<ProjectItem, WriteError> {
        patch
            .validate()
            .map_err(|e| WriteError::Invalid(e.to_string()))?;
        self.write_json(HttpMethod::Patch, &self.endpoints.project(project_id), patch)
    }

    /// Delete a project. The backend removes its secrets in the same transaction.
    #[instrument(skip(self))]
    pub fn delete_project(&self, project_id: &str) -> Result<(), WriteError> {
        self.delete(&self.endpoints.project(project_id))
    }

    #[instrument(skip(self))]
    pub fn create_secret(&self, secret: &NewSecret) -> Result<SecretItem, WriteError> {
        secret
            .validate()
            .map_err(|e| WriteError::Invalid(e.to_string()))?;
        self.write_json(HttpMethod::Post, &self.endpoints.secrets(), secret)
    }

    #[instrument(skip(self))]
    pub fn update_secret(
        &self,
        secret_id: &str,
        patch: &SecretPatch,
    ) -> Result<SecretItem, WriteError> {
        patch
            .validate()
            .map_err(|e| WriteError::Invalid(e.to_string()))?;
        self.write_json(HttpMethod::Patch, &self.endpoints.secret(secret_id), patch)
    }

    #[instrument(skip(self))]
    pub fn delete_secret(&self, secret_id: &str) -> Result<(), WriteError> {
        self.delete(&self.endpoints.secret(secret_id))
    }
}

fn decode_body<T: DeserializeOwned>(url: &str, response: &HttpResponse) -> Result<T, LoadError> {
    serde_json::from_slice(response.body().as_bytes()).map_err(|source| {
        let error = InjectorError::new(ErrorKind::Decode {
            what: format!("response from {}", url),
            source,
        });
        warn!(%error, "response body could not be decoded");
        LoadError::ConnectionFailed
    })
}

/// The backend reports failures as `{"error": "..."}`.
fn server_message(response: &HttpResponse) -> Option<String> {
    let value: Value = serde_json::from_slice(response.body().as_bytes()).ok()?;
    value.get("error")?.as_str().map(str::to_string)
}
