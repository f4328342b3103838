//! Tar packing and the random-access index that sits beside each archive.
//!
//! - [`pack_directory`] turns a directory into a deterministic tar file.
//! - [`build_index`] / [`write_index`] record where every file member's
//!   bytes live inside that tar.
//! - [`read_member`] uses an index entry to pull one member out with a
//!   ranged read instead of a full scan.

pub mod index;
pub mod pack;

pub use index::{build_index, read_index, read_member, write_index, IndexEntry, TarIndex};
pub use pack::{pack_directory, PackSummary};

use std::fs;
use std::path::Path;

/// Create the parent directory of `path` if it is missing.
pub(crate) fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
