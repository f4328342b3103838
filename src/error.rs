use std::path::PathBuf;
use thiserror::Error;

/// The main error type for hfstage operations.
#[derive(Debug, Error)]
pub enum HfstageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid reference '{input}': {message}")]
    InvalidReference { input: String, message: String },

    #[error("Invalid dataset identifier '{name}': expected exactly four ASCII digits")]
    InvalidIdentifier { name: String },

    #[error("No Hugging Face token configured (pass --token or set HUGGINGFACE_TOKEN / HF_TOKEN)")]
    MissingCredential,

    #[error("Failed to write archive {path}: {source}")]
    ArchiveWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read archive {path}: {source}")]
    ArchiveRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse index JSON from {path}: {source}")]
    IndexParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write index JSON to {path}: {source}")]
    IndexWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Archive member '{member}' does not match its index entry: {message}")]
    IndexMismatch { member: String, message: String },

    #[error("Archive member '{member}' is not present in the index")]
    MemberNotFound { member: String },

    #[error("Push to '{repo_id}' failed: {message}")]
    RemotePush { repo_id: String, message: String },

    #[error("Hugging Face API error for '{repo_id}': {message}")]
    HfApiError { repo_id: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl HfstageError {
    /// Whether a failed operation may succeed when attempted again.
    ///
    /// Only remote pushes are considered transient; input-shape and local
    /// filesystem problems cannot change between attempts.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HfstageError::RemotePush { .. })
    }
}
