// src/config.rs

use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://www.europeansocialsurvey.org";
pub const DEFAULT_USER_AGENT: &str = concat!("essurvey/", env!("CARGO_PKG_VERSION"));

pub const BASE_URL_ENV: &str = "ESS_BASE_URL";
pub const EMAIL_ENV: &str = "ESS_EMAIL";
pub const TIMEOUT_ENV: &str = "ESS_TIMEOUT_SECS";
pub const SCRATCH_DIR_ENV: &str = "ESS_SCRATCH_DIR";

/// Everything needed to talk to the data portal.
///
/// `email` plays the part of a registered credential: calls that are not
/// given an email explicitly fall back to it. Nothing is stored globally,
/// callers that want persistence keep this struct (or the environment)
/// themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,
    pub email: Option<String>,
    /// Whole-request timeout. `None` leaves requests unbounded.
    pub timeout_secs: Option<u64>,
    pub user_agent: String,
    /// Parent directory for import scratch space; system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            email: None,
            timeout_secs: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            scratch_dir: None,
        }
    }
}

impl PortalConfig {
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Build from `ESS_*` environment variables, defaults for the rest.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(base) = lookup(BASE_URL_ENV).filter(|s| !s.trim().is_empty()) {
            config.base_url = base.trim().to_string();
        }
        config.email = lookup(EMAIL_ENV)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(raw) = lookup(TIMEOUT_ENV).filter(|s| !s.trim().is_empty()) {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("{TIMEOUT_ENV} must be a whole number of seconds, got '{raw}'"))
            })?;
            config.timeout_secs = Some(secs);
        }
        config.scratch_dir = lookup(SCRATCH_DIR_ENV)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        config.base_url()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: Self = serde_yaml::from_str(&text)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))?;
        config.base_url()?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_yaml::to_string(self)
            .map_err(|e| Error::Config(format!("serialising config: {e}")))?;
        fs::write(path, text).map_err(|e| Error::io(path, e))
    }

    /// Parsed base URL, always ending in `/` so relative joins keep its path.
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw)
            .map_err(|e| Error::Config(format!("invalid base_url '{}': {e}", self.base_url)))?;
        if url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "base_url '{}' cannot be used as a base",
                self.base_url
            )));
        }
        Ok(url)
    }

    /// The credential for one call: an explicit email wins over the configured one.
    pub fn resolve_email(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.email
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .ok_or(Error::MissingCredential)
    }
}
