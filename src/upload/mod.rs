//! Dataset upload pipeline: pack, index, push with bounded retry, clean up.
//!
//! A run stages its artifacts under `<staging base>/dataset-upload/<id>/`:
//!
//! ```text
//! images/<id>.tar
//! index/<id>.json
//! ```
//!
//! The whole root is pushed as one commit. The root is removed only after a
//! successful push; on failure it is left in place for inspection.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::archive::{pack_directory, write_index, TarIndex};
use crate::config::HubConfig;
use crate::error::HfstageError;
use crate::hf::RemoteRepository;

/// Directory under the staging base that holds per-dataset roots.
pub const PIPELINE_DIR: &str = "dataset-upload";
const ID_LEN: usize = 4;

/// Returns true when `name` is exactly four ASCII digits.
pub fn is_valid_identifier(name: &str) -> bool {
    name.len() == ID_LEN && name.bytes().all(|b| b.is_ascii_digit())
}

/// Four-digit dataset identifier taken from the uploaded directory's name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn parse(name: &str) -> Result<Self, HfstageError> {
        if is_valid_identifier(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(HfstageError::InvalidIdentifier {
                name: name.to_string(),
            })
        }
    }

    /// Identifier from the basename of `dir`. Does not touch the filesystem.
    pub fn from_dir(dir: &Path) -> Result<Self, HfstageError> {
        let name = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::parse(&name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk layout of one upload run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingLayout {
    pub root: PathBuf,
    pub archive_path: PathBuf,
    pub index_path: PathBuf,
}

impl StagingLayout {
    pub fn new(base: &Path, id: &DatasetId) -> Self {
        let root = base.join(PIPELINE_DIR).join(id.as_str());
        Self {
            archive_path: root.join("images").join(format!("{id}.tar")),
            index_path: root.join("index").join(format!("{id}.json")),
            root,
        }
    }
}

/// Blocking wait between push attempts.
pub trait Sleeper {
    fn sleep(&self, delay: Duration);
}

/// [`Sleeper`] backed by `std::thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Inputs for one [`upload_dataset`] call.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub local_dir: PathBuf,
    pub repo_id: String,
    pub commit_message: Option<String>,
    /// Explicit token; falls back to the config and the environment.
    pub token: Option<String>,
}

impl UploadRequest {
    pub fn new(local_dir: impl Into<PathBuf>, repo_id: impl Into<String>) -> Self {
        Self {
            local_dir: local_dir.into(),
            repo_id: repo_id.into(),
            commit_message: None,
            token: None,
        }
    }
}

/// Result of a successful upload.
#[derive(Clone, Debug)]
pub struct UploadOutcome {
    pub dataset_id: DatasetId,
    /// Number of push attempts made, including the successful one.
    pub attempts: u32,
    pub index: TarIndex,
}

/// Pack `request.local_dir`, index it, and push both to dataset
/// `request.repo_id`, retrying failed pushes per `config.retry`.
///
/// Credential and identifier checks happen before any I/O. Local archive
/// and index failures are returned immediately, as are push errors that
/// are not [retryable](HfstageError::is_retryable). When every push attempt
/// fails, the last push error is returned and the staging root is kept.
pub fn upload_dataset<R, S>(
    remote: &R,
    request: &UploadRequest,
    config: &HubConfig,
    sleeper: &S,
) -> Result<UploadOutcome, HfstageError>
where
    R: RemoteRepository + ?Sized,
    S: Sleeper + ?Sized,
{
    let token = config
        .resolve_token(request.token.as_deref())
        .ok_or(HfstageError::MissingCredential)?;
    let id = DatasetId::from_dir(&request.local_dir)?;

    let layout = StagingLayout::new(&config.staging_base(), &id);

    tracing::info!(
        dataset = %id,
        source = %request.local_dir.display(),
        archive = %layout.archive_path.display(),
        "packing dataset"
    );
    let summary = pack_directory(&request.local_dir, &layout.archive_path)?;

    let index = write_index(&layout.archive_path, &layout.index_path)?;
    tracing::info!(
        dataset = %id,
        files = summary.files,
        bytes = index.filesize,
        "archive indexed"
    );

    let message = request
        .commit_message
        .clone()
        .unwrap_or_else(|| format!("Upload {id}"));

    let attempts = push_with_retry(
        remote,
        &layout.root,
        request,
        &message,
        &token,
        config,
        sleeper,
    )?;

    // The commit has landed, so a leftover staging root is only logged.
    if let Err(err) = cleanup(&layout.root) {
        tracing::warn!(
            dataset = %id,
            staging = %layout.root.display(),
            error = %err,
            "failed to remove staging root after upload"
        );
    }
    tracing::info!(dataset = %id, repo = %request.repo_id, attempts, "upload complete");

    Ok(UploadOutcome {
        dataset_id: id,
        attempts,
        index,
    })
}

fn push_with_retry<R, S>(
    remote: &R,
    root: &Path,
    request: &UploadRequest,
    message: &str,
    token: &str,
    config: &HubConfig,
    sleeper: &S,
) -> Result<u32, HfstageError>
where
    R: RemoteRepository + ?Sized,
    S: Sleeper + ?Sized,
{
    let policy = config.retry;
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match remote.push(root, &request.repo_id, message, token) {
            Ok(()) => return Ok(attempt),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff.delay_after(attempt);
                tracing::warn!(
                    repo = %request.repo_id,
                    attempt,
                    max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    error = %err,
                    "upload failed, retrying"
                );
                sleeper.sleep(delay);
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(
                    repo = %request.repo_id,
                    attempts = attempt,
                    staging = %root.display(),
                    error = %err,
                    "upload failed, giving up"
                );
                return Err(err);
            }
        }
    }
}

/// Recursively remove a staging root. A missing root is not an error.
pub fn cleanup(root: &Path) -> Result<(), HfstageError> {
    match std::fs::remove_dir_all(root) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
