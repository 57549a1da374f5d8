/* 📖 # Why layer configuration sources?

The same binary talks to a local development backend and to deployed ones. A
project directory can pin its backend in `injector.toml`, a deployment sets
`PUBLIC_BASE_URL`, and a single invocation can override both with
`--base-url`. Each layer only replaces what it sets, in that order.

The base URL is normalized once here (trailing slashes removed) so the
endpoint resolver can join paths without looking at the base again.
*/

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use injector_base::error::ErrorKind;
use injector_base::{InjectorError, InjectorResult, ResultExt, bail, err};

use crate::feed::ReconnectPolicy;

/// Default config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "injector.toml";

/// Environment variable overriding the configured base URL.
pub const BASE_URL_ENV: &str = "PUBLIC_BASE_URL";

/// Settings of the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Origin of the backend, e.g. `http://localhost:5544`.
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub reconnect_delay_ms: u64,
    /// Consecutive failed feed connections tolerated; 0 retries forever.
    pub max_reconnect_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5544".to_string(),
            request_timeout_secs: 30,
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 5,
        }
    }
}

impl ClientConfig {
    /// Parse a TOML document. Absent keys keep their defaults.
    pub fn from_toml(text: &str) -> InjectorResult<Self> {
        toml::from_str(text).map_err(|e| err!("Invalid configuration: {}", e))
    }

    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> InjectorResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            Box::new(InjectorError::new(ErrorKind::FileError {
                path: path.to_path_buf(),
                source,
            }))
        })?;
        Self::from_toml(&text).context(path.display().to_string())
    }

    /// Build the effective configuration.
    ///
    /// An explicit `path` must exist; without one, `injector.toml` in the
    /// working directory is used if present.
    pub fn load(path: Option<&Path>, base_url_override: Option<&str>) -> InjectorResult<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE_NAME).is_file() => {
                Self::from_file(Path::new(CONFIG_FILE_NAME))?
            }
            None => Self::default(),
        };
        let mut config = config.apply_env_with(|name| std::env::var(name).ok());
        if let Some(base_url) = base_url_override {
            config.base_url = base_url.to_string();
        }
        config.normalized()
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|value| !value.is_empty()) {
            debug!(base_url = %base_url, "base url taken from environment");
            self.base_url = base_url;
        }
        self
    }

    /// Validate and trim trailing slashes from the base URL.
    pub fn normalized(mut self) -> InjectorResult<Self> {
        let base_url = self.base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            bail!("Base URL cannot be empty");
        }
        let Some((scheme, rest)) = base_url.split_once("://") else {
            bail!("Base URL must start with http:// or https://: {}", base_url);
        };
        if !matches!(scheme, "http" | "https") || rest.is_empty() {
            bail!("Base URL must start with http:// or https://: {}", base_url);
        }
        self.base_url = base_url.to_string();
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: Duration::from_millis(self.reconnect_delay_ms),
            max_attempts: match self.max_reconnect_attempts {
                0 => None,
                attempts => Some(attempts),
            },
        }
    }
}
