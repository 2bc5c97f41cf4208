//! Run configuration.
//!
//! A [`JournalConfig`] is an immutable value built once per run (from a TOML
//! file or defaults) and handed to each component. Secrets are never read from
//! the file; [`ClientCredentials::from_env`] pulls them from the environment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::render::DateStyle;
use crate::GeoBoundingBox;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "activity-journal.toml";

/// Largest page the activity list endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Configuration for one journal run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JournalConfig {
    /// Activity type of interest (exact, case-sensitive)
    pub activity_type: String,
    /// Number of recent activities to list (1..=200, default: 30)
    pub page_size: u32,
    /// Timeout for every outbound request in seconds (default: 10)
    pub request_timeout_secs: u64,
    /// Maximum detail requests in flight (default: 4)
    pub detail_concurrency: usize,
    /// Minimum spacing between detail request starts in ms (default: 100)
    pub dispatch_interval_ms: u64,
    /// Start-location geofence
    pub bounds: GeoBoundingBox,
    pub endpoints: Endpoints,
    pub journal: JournalSettings,
    /// Optional upload of the committed document
    pub publish: Option<PublishSettings>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            activity_type: "RollerSki".to_string(),
            page_size: 30,
            request_timeout_secs: 10,
            detail_concurrency: 4,
            dispatch_interval_ms: 100,
            bounds: GeoBoundingBox::san_diego(),
            endpoints: Endpoints::default(),
            journal: JournalSettings::default(),
            publish: None,
        }
    }
}

/// Remote endpoints. Overridable so tests can point at a local responder.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Endpoints {
    pub token_url: String,
    pub api_base: String,
    /// Base of the public activity links embedded in snippets
    pub site_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token_url: "https://www.strava.com/oauth/token".to_string(),
            api_base: "https://www.strava.com/api/v3".to_string(),
            site_base: "https://www.strava.com".to_string(),
        }
    }
}

/// Where the journal and its companions live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JournalSettings {
    pub document: PathBuf,
    /// `id` of the element holding the snippets
    pub container_id: String,
    pub token_cache: PathBuf,
    /// JSON index of published entries; `None` disables it
    pub manifest: Option<PathBuf>,
    pub date_style: DateStyle,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            document: PathBuf::from("templates/action-journal.html"),
            container_id: "activity-journal".to_string(),
            token_cache: PathBuf::from("strava_tokens.json"),
            manifest: None,
            date_style: DateStyle::Long,
        }
    }
}

/// GitHub contents API target for the committed document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishSettings {
    /// `owner/name`
    pub repository: String,
    /// Path of the document inside the repository
    pub path: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_github_api")]
    pub api_base: String,
    #[serde(default = "default_commit_message")]
    pub message: String,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_commit_message() -> String {
    "Update activity journal".to_string()
}

impl JournalConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] is
    /// used when present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    log::debug!("No {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
                    let config = Self::default();
                    config.validate()?;
                    return Ok(config);
                }
                default
            }
        };

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&raw).map_err(|err| match err {
            ConfigError::Parse { details, .. } => ConfigError::Parse {
                path: path.clone(),
                details,
            },
            other => other,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            details: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every component relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.activity_type.trim().is_empty() {
            return Err(invalid("activity_type must not be empty"));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(invalid(format!(
                "page_size must be within 1..={}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs must be positive"));
        }
        if self.detail_concurrency == 0 {
            return Err(invalid("detail_concurrency must be positive"));
        }
        let id = &self.journal.container_id;
        if id.is_empty()
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid(format!(
                "container_id must match [A-Za-z0-9_-]+, got {:?}",
                id
            )));
        }
        if let Some(publish) = &self.publish {
            if publish.repository.split('/').filter(|s| !s.is_empty()).count() != 2 {
                return Err(invalid(format!(
                    "publish.repository must be owner/name, got {:?}",
                    publish.repository
                )));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_interval_ms)
    }
}

fn invalid(details: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        details: details.into(),
    }
}

/// OAuth client identity and long-lived refresh token.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

impl ClientCredentials {
    pub const CLIENT_ID_VAR: &'static str = "STRAVA_CLIENT_ID";
    pub const CLIENT_SECRET_VAR: &'static str = "STRAVA_CLIENT_SECRET";
    pub const REFRESH_TOKEN_VAR: &'static str = "STRAVA_REFRESH_TOKEN";

    /// Read the client identity from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: env_required(Self::CLIENT_ID_VAR)?,
            client_secret: env_required(Self::CLIENT_SECRET_VAR)?,
            refresh_token: env_required(Self::REFRESH_TOKEN_VAR)?,
        })
    }
}

/// Token for the publish step, if one is configured.
pub fn github_token_from_env() -> Result<String, ConfigError> {
    env_required("GITHUB_TOKEN")
}

fn env_required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .ok_or(ConfigError::MissingEnv { name })
}
