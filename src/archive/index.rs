use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ensure_parent_dir;
use crate::error::HfstageError;

/// Random-access index for one tar archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TarIndex {
    /// Size of the archive file in bytes.
    pub filesize: u64,
    /// Hex sha256 of the whole archive.
    pub hash: String,
    /// Regular-file members keyed by member name.
    pub files: BTreeMap<String, IndexEntry>,
}

/// Byte range of one member's payload inside the archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub offset: u64,
    pub length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Scan `archive` and record the payload range of every regular file.
///
/// Member contents are streamed through a hasher, never written to disk.
/// Directory and link members are not indexed.
///
/// # Errors
/// Returns [`HfstageError::ArchiveRead`] if the archive cannot be opened or
/// is not a readable tar file.
pub fn build_index(archive: &Path) -> Result<TarIndex, HfstageError> {
    let read_err = |source: io::Error| HfstageError::ArchiveRead {
        path: archive.to_path_buf(),
        source,
    };

    let file = File::open(archive).map_err(read_err)?;
    let filesize = file.metadata().map_err(read_err)?.len();

    let mut reader = tar::Archive::new(BufReader::new(file));
    let mut files = BTreeMap::new();

    for entry in reader.entries().map_err(read_err)? {
        let mut entry = entry.map_err(read_err)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = entry.path().map_err(read_err)?.to_string_lossy().into_owned();
        let offset = entry.raw_file_position();
        let length = entry.size();

        let mut hasher = Sha256::new();
        io::copy(&mut entry, &mut hasher).map_err(read_err)?;

        files.insert(
            name,
            IndexEntry {
                offset,
                length,
                sha256: Some(format!("{:x}", hasher.finalize())),
            },
        );
    }

    let hash = hash_file(archive).map_err(read_err)?;

    Ok(TarIndex {
        filesize,
        hash,
        files,
    })
}

/// Build the index for `archive` and write it as pretty JSON to
/// `index_path`, creating parent directories.
pub fn write_index(archive: &Path, index_path: &Path) -> Result<TarIndex, HfstageError> {
    let index = build_index(archive)?;

    ensure_parent_dir(index_path)?;
    let file = File::create(index_path)?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, &index).map_err(|source| {
        HfstageError::IndexWrite {
            path: index_path.to_path_buf(),
            source,
        }
    })?;
    writer.flush()?;

    Ok(index)
}

/// Read an index document written by [`write_index`].
pub fn read_index(index_path: &Path) -> Result<TarIndex, HfstageError> {
    let file = File::open(index_path)?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|source| HfstageError::IndexParse {
        path: index_path.to_path_buf(),
        source,
    })
}

/// Fetch one member's bytes with a ranged read.
///
/// The recorded sha256, when present, is checked against the bytes read.
pub fn read_member(
    archive: &Path,
    index: &TarIndex,
    member: &str,
) -> Result<Vec<u8>, HfstageError> {
    let entry = index
        .files
        .get(member)
        .ok_or_else(|| HfstageError::MemberNotFound {
            member: member.to_string(),
        })?;

    let read_err = |source: io::Error| HfstageError::ArchiveRead {
        path: archive.to_path_buf(),
        source,
    };

    let mut file = File::open(archive).map_err(read_err)?;
    file.seek(SeekFrom::Start(entry.offset)).map_err(read_err)?;

    let mut bytes = Vec::new();
    file.take(entry.length)
        .read_to_end(&mut bytes)
        .map_err(read_err)?;

    if bytes.len() as u64 != entry.length {
        return Err(HfstageError::IndexMismatch {
            member: member.to_string(),
            message: format!(
                "expected {} bytes at offset {}, archive ended after {}",
                entry.length,
                entry.offset,
                bytes.len()
            ),
        });
    }

    if let Some(expected) = entry.sha256.as_deref() {
        let actual = format!("{:x}", Sha256::digest(&bytes));
        if actual != expected {
            return Err(HfstageError::IndexMismatch {
                member: member.to_string(),
                message: format!("sha256 {actual} does not match indexed {expected}"),
            });
        }
    }

    Ok(bytes)
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::pack_directory;
    use std::fs;

    fn packed(files: &[(&str, &str)]) -> (tempfile::TempDir, std::path::PathBuf) {
        let temp = tempfile::tempdir().expect("create temp dir");
        let src = temp.path().join("src");
        fs::create_dir(&src).expect("create src");
        for (name, contents) in files {
            let path = src.join(name);
            fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
            fs::write(&path, contents).expect("write file");
        }
        let archive = temp.path().join("data.tar");
        pack_directory(&src, &archive).expect("pack");
        (temp, archive)
    }

    #[test]
    fn index_records_file_ranges() {
        let (_temp, archive) = packed(&[("a.txt", "hi"), ("sub/b.txt", "yo")]);
        let index = build_index(&archive).expect("index");

        let names: Vec<&str> = index.files.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["a.txt", "sub/b.txt"]);

        let bytes = fs::read(&archive).expect("read archive");
        assert_eq!(index.filesize, bytes.len() as u64);
        for (name, expected) in [("a.txt", "hi"), ("sub/b.txt", "yo")] {
            let entry = &index.files[name];
            assert_eq!(entry.length, expected.len() as u64);
            let start = entry.offset as usize;
            assert_eq!(&bytes[start..start + expected.len()], expected.as_bytes());
        }
    }

    #[test]
    fn read_member_uses_ranged_read() {
        let (_temp, archive) = packed(&[("x/y/z.bin", "payload")]);
        let index = build_index(&archive).expect("index");

        assert_eq!(
            read_member(&archive, &index, "x/y/z.bin").expect("read member"),
            b"payload"
        );
        assert!(matches!(
            read_member(&archive, &index, "missing"),
            Err(HfstageError::MemberNotFound { .. })
        ));
    }

    #[test]
    fn tampered_archive_is_detected() {
        let (_temp, archive) = packed(&[("a.txt", "hello")]);
        let index = build_index(&archive).expect("index");

        let mut bytes = fs::read(&archive).expect("read archive");
        bytes[index.files["a.txt"].offset as usize] = b'j';
        fs::write(&archive, bytes).expect("rewrite archive");

        assert!(matches!(
            read_member(&archive, &index, "a.txt"),
            Err(HfstageError::IndexMismatch { .. })
        ));
    }

    #[test]
    fn index_written_and_read_back() {
        let (temp, archive) = packed(&[("a.txt", "hi")]);
        let index_path = temp.path().join("index/nested/data.json");

        let written = write_index(&archive, &index_path).expect("write index");
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&index_path).expect("read json"))
                .expect("parse json");
        assert_eq!(json["files"]["a.txt"]["length"], 2);

        assert_eq!(read_index(&index_path).expect("read index"), written);
    }

    #[test]
    fn non_tar_input_is_archive_error() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let bogus = temp.path().join("bogus.tar");
        fs::write(&bogus, vec![b'x'; 1024]).expect("write bogus");

        assert!(matches!(
            build_index(&bogus),
            Err(HfstageError::ArchiveRead { .. })
        ));
        assert!(matches!(
            build_index(&temp.path().join("missing.tar")),
            Err(HfstageError::ArchiveRead { .. })
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_final_flush_is_reported() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let (_temp, archive) = packed(&[("a.txt", "hi")]);

        assert!(matches!(
            write_index(&archive, full),
            Err(HfstageError::Io(_))
        ));
    }
}
