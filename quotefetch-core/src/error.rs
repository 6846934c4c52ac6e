//! Structured error types for the fetch pipeline.
//!
//! Every stage returns `PipelineError`. The batch orchestrator turns these
//! into per-item failure outcomes, so they are displayable on their own and
//! carry the offending identifier where one exists.

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Catalog or client configuration is unreadable or malformed.
    #[error("config error: {0}")]
    Config(String),

    #[error("{kind} '{id}' not found in catalog")]
    NotFound { kind: &'static str, id: String },

    #[error("endpoint '{endpoint}' is missing required parameters: {}", .missing.join(", "))]
    MissingParameter {
        endpoint: String,
        missing: Vec<String>,
    },

    #[error("template error in '{template}': {reason}")]
    Template { template: String, reason: String },

    #[error("network error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Network {
        status: Option<u16>,
        message: String,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("I/O error at {path}: {message}")]
    Io { path: String, message: String },
}

/// Discriminant of a [`PipelineError`], for matching without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    NotFound,
    MissingParameter,
    Template,
    Network,
    Decode,
    Schema,
    Io,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::MissingParameter { .. } => ErrorKind::MissingParameter,
            Self::Template { .. } => ErrorKind::Template,
            Self::Network { .. } => ErrorKind::Network,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Schema(_) => ErrorKind::Schema,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    pub fn endpoint_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "endpoint",
            id: id.to_string(),
        }
    }

    pub fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Config => "ConfigError",
            Self::NotFound => "NotFoundError",
            Self::MissingParameter => "MissingParameterError",
            Self::Template => "TemplateError",
            Self::Network => "NetworkError",
            Self::Decode => "DecodeError",
            Self::Schema => "SchemaError",
            Self::Io => "IoError",
        };
        f.write_str(name)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
