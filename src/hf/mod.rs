//! Hugging Face Hub orchestration helpers.
//!
//! Everything that talks about or to the Hub lives here. Local archive
//! handling stays in `crate::archive`.

pub mod download;
#[cfg(feature = "hub")]
pub mod remote;
pub mod resolve;

pub use resolve::resolve_reference;

use std::path::{Path, PathBuf};

use crate::error::HfstageError;

pub(crate) const CANONICAL_HOST: &str = "huggingface.co";
pub(crate) const MIRROR_HOST: &str = "hf-mirror.com";

/// Canonical reference to a Hub repository, optionally naming one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteReference {
    pub repository: String,
    /// Path inside the repository, with a leading `/`.
    pub file_path: Option<String>,
}

impl RemoteReference {
    /// Render the form that resolves back to this reference.
    pub fn canonical(&self) -> String {
        match &self.file_path {
            None if self.repository.matches('/').count() == 1 => self.repository.clone(),
            None => format!(
                "https://{CANONICAL_HOST}/{}/resolve/main",
                self.repository
            ),
            Some(file) => format!(
                "https://{CANONICAL_HOST}/{}/resolve/main{}",
                self.repository, file
            ),
        }
    }

    /// File path relative to the repository root.
    pub fn file_in_repo(&self) -> Option<&str> {
        self.file_path
            .as_deref()
            .map(|file| file.trim_start_matches('/'))
    }
}

/// Download behaviour for [`RemoteRepository::fetch`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Re-download even when a cached copy exists.
    pub force: bool,
}

/// Remote object repository the pipelines talk to.
pub trait RemoteRepository {
    /// Fetch one file (or the whole repository when `file` is `None`) and
    /// return its local path.
    fn fetch(
        &self,
        repo_id: &str,
        file: Option<&str>,
        options: FetchOptions,
        token: Option<&str>,
    ) -> Result<PathBuf, HfstageError>;

    /// Upload the contents of `folder` to the root of dataset `repo_id` as a
    /// single commit.
    fn push(
        &self,
        folder: &Path,
        repo_id: &str,
        commit_message: &str,
        token: &str,
    ) -> Result<(), HfstageError>;
}
