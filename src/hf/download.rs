use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::HfstageError;

use super::resolve::{has_relative_segment, resolve_reference};
use super::{FetchOptions, RemoteReference, RemoteRepository};

/// What part of a referenced repository to download.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DownloadMode {
    /// Every file in the repository.
    #[default]
    Repo,
    /// Only the file named by the reference.
    File,
}

/// Resolve `reference`, fetch it, and copy the result into `local_dir`.
///
/// Returns the local path of the copied repository root (`Repo`) or file
/// (`File`). Relative paths inside the repository are preserved.
pub fn download_reference<R>(
    remote: &R,
    reference: &str,
    mode: DownloadMode,
    local_dir: &Path,
    options: FetchOptions,
    token: Option<&str>,
) -> Result<PathBuf, HfstageError>
where
    R: RemoteRepository + ?Sized,
{
    let resolved = resolve_reference(reference)?;
    download_resolved(remote, &resolved, mode, local_dir, options, token)
}

/// Same as [`download_reference`] for an already-resolved reference.
pub fn download_resolved<R>(
    remote: &R,
    reference: &RemoteReference,
    mode: DownloadMode,
    local_dir: &Path,
    options: FetchOptions,
    token: Option<&str>,
) -> Result<PathBuf, HfstageError>
where
    R: RemoteRepository + ?Sized,
{
    match mode {
        DownloadMode::Repo => {
            tracing::info!(repo = %reference.repository, "downloading repository");
            let snapshot = remote.fetch(&reference.repository, None, options, token)?;
            copy_tree(&snapshot, local_dir)?;
            Ok(local_dir.to_path_buf())
        }
        DownloadMode::File => {
            let file = reference
                .file_in_repo()
                .ok_or_else(|| HfstageError::InvalidReference {
                    input: reference.canonical(),
                    message: "reference does not name a file".to_string(),
                })?;
            if has_relative_segment(file) {
                return Err(HfstageError::InvalidReference {
                    input: reference.canonical(),
                    message: "file path may not contain '.' or '..' segments".to_string(),
                });
            }
            tracing::info!(repo = %reference.repository, file, "downloading file");
            let fetched = remote.fetch(&reference.repository, Some(file), options, token)?;
            let target = local_dir.join(file);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&fetched, &target)?;
            Ok(target)
        }
    }
}

/// Copy the regular files below `from` into `to`, following symlinks so
/// cache-linked blobs are materialized.
fn copy_tree(from: &Path, to: &Path) -> Result<(), HfstageError> {
    fs::create_dir_all(to)?;
    for entry in WalkDir::new(from).min_depth(1).follow_links(true) {
        let entry = entry.map_err(|source| HfstageError::Io(source.into()))?;
        let rel = match entry.path().strip_prefix(from) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let target = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
