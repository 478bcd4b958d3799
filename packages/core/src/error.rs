//! Error types for secret resolution and process launch.
//!
//! Every variant is terminal: nothing in the crate retries or degrades.
//! [`Error::kind`] groups variants into the five failure classes the
//! binary reports.

use std::path::PathBuf;
use thiserror::Error;

/// Broad failure class of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid invocation parameters.
    Configuration,
    /// Secret material could not be obtained.
    SourceRead,
    /// The remote payload failed its checksum.
    Integrity,
    /// The payload could not be turned into assignments.
    Format,
    /// The target program could not be started.
    Launch,
}

/// Errors that can occur while resolving secrets or launching the target.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required parameter '{0}' in api secret mode")]
    MissingParameter(&'static str),

    #[error("invalid secret mode '{0}': must be either 'file' or 'api'")]
    InvalidMode(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("error accessing path {}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("error reading file {}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to access secret version: {0}")]
    Api(String),

    #[error("no Google Cloud credentials available: {0}")]
    Credentials(String),

    #[error("data corruption detected in {name}: expected crc32c {expected}, computed {actual}")]
    ChecksumMismatch {
        name: String,
        expected: i64,
        actual: u32,
    },

    #[error("secret payload for {0} carries no crc32c checksum")]
    MissingChecksum(String),

    #[error("couldn't parse secret payload: {0}")]
    Format(String),

    #[error("invalid environment variable name {0:?}")]
    InvalidName(String),

    #[error("failed to execute '{program}'")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingParameter(_) | Self::InvalidMode(_) | Self::Config(_) => {
                ErrorKind::Configuration
            }
            Self::Walk { .. } | Self::ReadFile { .. } | Self::Api(_) | Self::Credentials(_) => {
                ErrorKind::SourceRead
            }
            Self::ChecksumMismatch { .. } | Self::MissingChecksum(_) => ErrorKind::Integrity,
            Self::Format(_) | Self::InvalidName(_) => ErrorKind::Format,
            Self::Launch { .. } => ErrorKind::Launch,
        }
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, Error>;
