//! Error types for each pipeline stage.
//!
//! Fatal kinds ([`AuthError`], [`MergeError`], a list-call [`SourceError`])
//! abort the run before the document is written. [`RenderError`] and
//! per-activity [`SourceError`]s are logged and the activity is skipped.

use std::path::PathBuf;

use thiserror::Error;

/// Shared `Result` alias for the crate.
pub type Result<T> = std::result::Result<T, JournalError>;

/// Configuration could not be loaded or violates an invariant.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {details}")]
    Parse { path: PathBuf, details: String },

    #[error("invalid bounding box: {details}")]
    InvalidBounds { details: String },

    #[error("invalid configuration: {details}")]
    Invalid { details: String },

    #[error("missing environment variable {name}")]
    MissingEnv { name: &'static str },
}

/// Credential exchange failed. Always fatal.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token exchange request failed: {details}")]
    Transport { details: String },

    #[error("token endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token response could not be decoded: {details}")]
    Decode { details: String },

    #[error("token response has no {field}")]
    MissingField { field: &'static str },
}

/// Activity API call failed.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{operation}: request failed: {details}")]
    Transport { operation: String, details: String },

    #[error("{operation}: HTTP {status}")]
    Status { operation: String, status: u16 },

    #[error("{operation}: rate limited by the activity API")]
    RateLimited { operation: String },

    #[error("{operation}: response could not be decoded: {details}")]
    Decode { operation: String, details: String },
}

/// One activity could not be rendered; the activity is skipped.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("activity {id}: missing required field {field}")]
    MissingField { id: String, field: &'static str },

    #[error("activity {id}: invalid {field}: {details}")]
    InvalidField {
        id: String,
        field: &'static str,
        details: String,
    },
}

/// The journal document could not be merged or committed. Always fatal; the
/// document on disk is left as it was.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("journal container #{container_id} is malformed: {reason}")]
    Malformed { container_id: String, reason: String },

    #[error("snippet for activity {id} is unusable: {details}")]
    Snippet { id: String, details: String },

    #[error("failed to serialize journal document: {source}")]
    Serialize {
        #[source]
        source: std::io::Error,
    },

    #[error("journal IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("journal {path} is locked by another run")]
    Locked { path: PathBuf },
}

/// Uploading the committed document failed.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish request failed: {details}")]
    Transport { details: String },

    #[error("publish endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("publish response could not be decoded: {details}")]
    Decode { details: String },
}

/// Top-level error for one journal run.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("runtime failure: {details}")]
    Runtime { details: String },
}

impl JournalError {
    /// Stable machine-parseable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "AJ-CONFIG",
            Self::Auth(_) => "AJ-AUTH",
            Self::Source(_) => "AJ-SOURCE",
            Self::Merge(_) => "AJ-MERGE",
            Self::Publish(_) => "AJ-PUBLISH",
            Self::Runtime { .. } => "AJ-RUNTIME",
        }
    }

    /// Process exit status for this error.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Auth(_) => 2,
            Self::Merge(_) => 3,
            _ => 1,
        }
    }
}
