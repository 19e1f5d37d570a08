//! Error types for Omni
//!
//! All modules use `OmniResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Omni operations
pub type OmniResult<T> = Result<T, OmniError>;

/// All errors that can occur in Omni
#[derive(Error, Debug)]
pub enum OmniError {
    // Configuration errors
    #[error("failed to read config {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("missing required argument for task(s)")]
    MissingTasks,

    // Graph errors
    #[error("circular dependency detected in task {0:?}")]
    CircularDependency(String),

    #[error("dependency on target {0:?} that does not exist")]
    UnknownDependencyTarget(String),

    #[error("invalid task name {0:?}, task names cannot contain colons")]
    BadTaskName(String),

    #[error("no tasks were found to process")]
    NoTasks,

    // Cache errors
    #[error("cache asset {0:?} does not exist")]
    CacheMissing(String),

    #[error("cache bundle is missing the result for {id:?}")]
    ResultMissing { id: String },

    #[error("cache I/O error: {context}")]
    CacheIo {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk directory {path:?}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to hash file {path:?}: {source}")]
    HashIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remote cache error: {0}")]
    RemoteCache(String),

    // Lock errors
    #[error("the workspace lock is held by another process")]
    LockAlreadyHeld,

    #[error("the workspace lock is not held")]
    LockNotHeld,

    #[error("lock backend error: {0}")]
    LockBackend(String),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Process errors
    #[error("failed to spawn shell for command {command:?}: {source}")]
    TaskSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl OmniError {
    /// Create a cache I/O error with context
    pub fn cache_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::CacheIo {
            context: context.into(),
            source,
        }
    }

    /// Check if the error means a cache asset simply does not exist yet
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::CacheMissing(_))
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::LockAlreadyHeld => Some("Run: omni unlock"),
            Self::ConfigRead { .. } => {
                Some("Run omni from the workspace root containing omni-workspace.yaml")
            }
            _ => None,
        }
    }
}
