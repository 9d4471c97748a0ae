//! Error types for kiln
//!
//! All modules use `KilnResult<T>` as their return type.

use crate::release::ReleaseId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// All errors that can occur in kiln
#[derive(Error, Debug)]
pub enum KilnError {
    // Configuration errors
    #[error("encountered a configuration file error with {file}: {reason}")]
    ConfigFile { file: String, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid release source {id}: {reason}")]
    SourceConfig { id: String, reason: String },

    // Lock record errors
    #[error("No release named {name} in {lock}")]
    ReleaseNotInLock { name: String, lock: PathBuf },

    // Resolution errors
    #[error("could not find the following releases\n{}", format_missing(.0))]
    MissingReleases(Vec<ReleaseId>),

    #[error("Catalog query to {source_id} failed: {reason}")]
    Catalog { source_id: String, reason: String },

    #[error("Failed to download {release}: {reason}")]
    Download { release: ReleaseId, reason: String },

    #[error("Checksum mismatch for {release}: lock pins {expected}, file on disk is {actual}")]
    ChecksumMismatch {
        release: ReleaseId,
        expected: String,
        actual: String,
    },

    #[error("Failed to read release manifest from {path}: {reason}")]
    ReleaseManifest { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

fn format_missing(ids: &[ReleaseId]) -> String {
    let mut ids: Vec<&ReleaseId> = ids.iter().collect();
    ids.sort();
    ids.iter()
        .map(|id| format!("- {} ({})", id.name, id.version))
        .collect::<Vec<_>>()
        .join("\n")
}

impl KilnError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a configuration file error naming the offending file
    pub fn config_file(file: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConfigFile {
            file: file.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a catalog query error for a release source
    pub fn catalog(source_id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Catalog {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a download error for a single release
    pub fn download(release: &ReleaseId, reason: impl ToString) -> Self {
        Self::Download {
            release: release.clone(),
            reason: reason.to_string(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingReleases(_) => {
                Some("Check the release_sources in your Kilnfile or the pinned versions in Kilnfile.lock")
            }
            Self::ChecksumMismatch { .. } => {
                Some("Delete the file and fetch again; if it persists the remote artifact changed")
            }
            Self::ReleaseNotInLock { .. } => {
                Some("update-release only bumps existing pins; add the release to Kilnfile.lock first")
            }
            Self::ConfigNotFound(_) => Some("Pass --kilnfile <path> or run from the tile directory"),
            _ => None,
        }
    }
}
