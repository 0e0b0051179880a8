//! Error taxonomy for configuration, listing, parsing and transfer failures

use std::path::PathBuf;

use thiserror::Error;

/// Invalid or contradictory inputs, detected before any network call
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Date must be in YYYY-MM-DD format (e.g. 2020-03-20), got '{0}'")]
    InvalidDate(String),

    #[error("Since date {since} cannot be greater than until date {until}")]
    InvertedWindow {
        since: chrono::NaiveDate,
        until: chrono::NaiveDate,
    },

    #[error("Credentials must be given as <username>:<password>")]
    InvalidCredentials,

    #[error("No credentials given: use -a <username>:<password> or set NXGET_USERNAME and NXGET_PASSWORD")]
    MissingCredentials,

    #[error("Invalid remote URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Conflicting options: {0}")]
    ConflictingOptions(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),
}

impl ConfigError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidDate(_) => 3,
            Self::InvertedWindow { .. } => 4,
            _ => 2,
        }
    }
}

/// Failures raised while crawling, replaying a manifest or downloading
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Any non-207 answer to a listing request, including authentication failures
    #[error("PROPFIND {url} failed{}: {message}", status.map(|s| format!(" with status {}", s)).unwrap_or_default())]
    Transport {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Malformed listing response from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Download of {url} failed{}: {message}", status.map(|s| format!(" with status {}", s)).unwrap_or_default())]
    Download {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Crawl exceeded maximum depth {max_depth} at {url}")]
    DepthLimit { url: String, max_depth: usize },

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Raised after a `--keep-going` run that had at least one failed transfer
    #[error("{failed} of {attempted} downloads failed")]
    IncompleteSync { failed: usize, attempted: usize },
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(e) => e.exit_code(),
            _ => 1,
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
