//! Resolver configuration: defaults, an optional TOML file, then environment
//! overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

pub const ENV_BASE_URL: &str = "PHOTOREF_BASE_URL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "PHOTOREF_REQUEST_TIMEOUT_SECS";
pub const ENV_USER_AGENT: &str = "PHOTOREF_USER_AGENT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid request timeout '{0}', expected whole seconds")]
    InvalidTimeout(String),

    #[error("base url must not be empty")]
    EmptyBaseUrl,
}

/// Normalized backend address: has a scheme, never ends with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBase(String);

impl ApiBase {
    /// Many users configure `localhost:8000`, which reqwest rejects, so a
    /// missing scheme becomes `http://`. Trailing slashes are dropped so
    /// joined paths never contain `//`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyBaseUrl);
        }
        match add_missing_scheme(trimmed) {
            Some(with_scheme) => {
                log::warn!(
                    "[ResolverConfig] Normalized base URL from '{}' to '{}'",
                    raw,
                    with_scheme
                );
                Ok(Self(with_scheme))
            }
            None => Ok(Self(trimmed.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<base><path>` for a path that already starts with `/`.
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

/// `Some` only when `trimmed` had no scheme and `http://` was prepended.
fn add_missing_scheme(trimmed: &str) -> Option<String> {
    (!crate::paths::is_absolute_url(trimmed)).then(|| format!("http://{trimmed}"))
}

impl Default for ApiBase {
    fn default() -> Self {
        Self(DEFAULT_BASE_URL.to_string())
    }
}

impl std::fmt::Display for ApiBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    pub base_url: ApiBase,
    /// Unset by default: a fetch that never settles keeps its in-flight slot.
    pub request_timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

impl ResolverConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: ApiBase::parse(base_url)?,
            ..Self::default()
        })
    }

    /// Defaults, then `path` when given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| {
                    ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(content)?;
        let mut config = Self::default();
        if let Some(base_url) = file.base_url {
            config.base_url = ApiBase::parse(&base_url)?;
        }
        config.request_timeout = file.request_timeout_secs.map(Duration::from_secs);
        config.user_agent = file.user_agent.filter(|agent| !agent.trim().is_empty());
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            self.base_url = ApiBase::parse(&base_url)?;
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
            self.request_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(agent) = lookup(ENV_USER_AGENT).filter(|a| !a.trim().is_empty())
        {
            self.user_agent = Some(agent);
        }
        Ok(())
    }
}
