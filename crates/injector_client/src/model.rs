/* 📖 # Why keep timestamps as text?

The backend owns creation and mutation of every entity; the client only reads
and echoes them. Timestamps therefore stay in their wire form and are parsed on
demand, so an unexpected format never makes a whole listing undecodable. Both
RFC 3339 and the SQLite "YYYY-MM-DD HH:MM:SS" form are understood.
*/

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};

use injector_base::{InjectorResult, bail};

/// An ISO-8601 timestamp as sent by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the text form. SQLite-style timestamps without an offset are UTC.
    pub fn parse(&self) -> Option<DateTime<FixedOffset>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&self.0) {
            return Some(parsed);
        }
        ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(&self.0, format).ok())
            .map(|naive| naive.and_utc().fixed_offset())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entities that carry a stable identifier and backend timestamps.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn created_at(&self) -> &Timestamp;
    fn updated_at(&self) -> &Timestamp;

    /// `Some(true)` when `updated_at >= created_at`, `None` if either is unparsable.
    fn has_ordered_timestamps(&self) -> Option<bool> {
        let created = self.created_at().parse()?;
        let updated = self.updated_at().parse()?;
        Some(updated >= created)
    }
}

/// A named container for secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectItem {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Entity for ProjectItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    fn updated_at(&self) -> &Timestamp {
        &self.updated_at
    }
}

/// One key/value secret scoped to a project.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretItem {
    pub id: String,
    pub project_id: String,
    pub description: Option<String>,
    pub key: String,
    pub value: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SecretItem {
    /// The value with everything but its length hidden.
    pub fn masked_value(&self) -> String {
        "*".repeat(self.value.chars().count().min(8))
    }
}

// Secret values must not end up in logs through `{:?}`.
impl fmt::Debug for SecretItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretItem")
            .field("id", &self.id)
            .field("project_id", &self.project_id)
            .field("description", &self.description)
            .field("key", &self.key)
            .field("value", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl Entity for SecretItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    fn updated_at(&self) -> &Timestamp {
        &self.updated_at
    }
}

fn require_text(field: &str, value: &str) -> InjectorResult<()> {
    if value.trim().is_empty() {
        bail!("{} cannot be empty", field);
    }
    Ok(())
}

fn require_optional_text(field: &str, value: &Option<String>) -> InjectorResult<()> {
    match value {
        Some(value) => require_text(field, value),
        None => Ok(()),
    }
}

/// Body of `POST /api/projects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
}

impl NewProject {
    pub fn validate(&self) -> InjectorResult<()> {
        require_text("Project name", &self.name)
    }
}

/// Body of `PATCH /api/projects/{id}`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProjectPatch {
    pub fn validate(&self) -> InjectorResult<()> {
        if self.name.is_none() && self.description.is_none() {
            bail!("At least one field (name or description) must be provided");
        }
        require_optional_text("Project name", &self.name)?;
        require_optional_text("Project description", &self.description)
    }
}

/// Body of `POST /api/secrets`.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct NewSecret {
    pub project_id: String,
    pub key: String,
    pub value: String,
    pub description: Option<String>,
}

impl NewSecret {
    pub fn validate(&self) -> InjectorResult<()> {
        require_text("Project ID", &self.project_id)?;
        require_text("Secret key", &self.key)?;
        require_text("Secret value", &self.value)
    }
}

impl fmt::Debug for NewSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewSecret")
            .field("project_id", &self.project_id)
            .field("key", &self.key)
            .field("value", &"<redacted>")
            .field("description", &self.description)
            .finish()
    }
}

/// Body of `PATCH /api/secrets/{id}`. Absent fields are left unchanged.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecretPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SecretPatch {
    pub fn validate(&self) -> InjectorResult<()> {
        if self.key.is_none() && self.value.is_none() && self.description.is_none() {
            bail!("At least one field (key, value or description) must be provided");
        }
        require_optional_text("Secret key", &self.key)?;
        require_optional_text("Secret value", &self.value)?;
        require_optional_text("Secret description", &self.description)
    }
}

impl fmt::Debug for SecretPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretPatch")
            .field("key", &self.key)
            .field("value", &self.value.as_ref().map(|_| "<redacted>"))
            .field("description", &self.description)
            .finish()
    }
}
