use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Component, Path};

use tar::{Builder, HeaderMode};
use walkdir::WalkDir;

use super::ensure_parent_dir;
use crate::error::HfstageError;

/// Counts describing what went into an archive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackSummary {
    pub files: usize,
    pub directories: usize,
    /// Sum of file payload sizes, excluding tar headers and padding.
    pub payload_bytes: u64,
}

/// Pack every directory and regular file below `source` into a tar file at
/// `archive`, using paths relative to `source` as member names.
///
/// Entries are visited in file-name order and written with deterministic
/// headers, so packing an unchanged tree twice yields identical bytes.
/// Symlinks and special files are skipped. An empty `source` produces a
/// valid archive with no members.
///
/// # Errors
/// Returns [`HfstageError::ArchiveWrite`] if `source` cannot be traversed or
/// the archive cannot be created or written.
pub fn pack_directory(source: &Path, archive: &Path) -> Result<PackSummary, HfstageError> {
    let write_err = |source: std::io::Error| HfstageError::ArchiveWrite {
        path: archive.to_path_buf(),
        source,
    };

    let meta = std::fs::metadata(source).map_err(write_err)?;
    if !meta.is_dir() {
        return Err(write_err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("source '{}' is not a directory", source.display()),
        )));
    }

    ensure_parent_dir(archive).map_err(write_err)?;
    let file = File::create(archive).map_err(write_err)?;

    let mut builder = Builder::new(BufWriter::new(file));
    builder.mode(HeaderMode::Deterministic);
    builder.follow_symlinks(false);

    let mut summary = PackSummary::default();

    for entry in WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .follow_links(false)
    {
        let entry = entry.map_err(|source| write_err(source.into()))?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| {
                write_err(std::io::Error::other(format!(
                    "'{}' escaped the source directory",
                    entry.path().display()
                )))
            })?;
        let name = member_name(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            builder
                .append_dir(&name, entry.path())
                .map_err(write_err)?;
            summary.directories += 1;
        } else if file_type.is_file() {
            let mut reader = File::open(entry.path()).map_err(write_err)?;
            builder
                .append_file(&name, &mut reader)
                .map_err(write_err)?;
            summary.files += 1;
            summary.payload_bytes += entry.metadata().map_err(|e| write_err(e.into()))?.len();
        } else {
            tracing::warn!(path = %entry.path().display(), "skipping non-regular file");
        }
    }

    let mut writer = builder.into_inner().map_err(write_err)?;
    writer.flush().map_err(write_err)?;

    tracing::debug!(
        archive = %archive.display(),
        files = summary.files,
        directories = summary.directories,
        "packed directory"
    );

    Ok(summary)
}

/// Member name for a relative path, always `/`-separated.
fn member_name(rel: &Path) -> String {
    rel.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
