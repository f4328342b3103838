#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hfstage::hf::{FetchOptions, RemoteRepository};
use hfstage::upload::Sleeper;
use hfstage::HfstageError;

/// Write `files` (relative path, contents) below `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(root).expect("create root");
    for (name, contents) in files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write file");
    }
}

/// What a push call observed on disk.
#[derive(Clone, Debug)]
pub struct PushCall {
    pub folder: PathBuf,
    pub repo_id: String,
    pub message: String,
    pub token: String,
    /// Relative paths of the files present in the folder at push time.
    pub files: Vec<String>,
}

/// Remote that fails the first `failures` pushes, then succeeds.
pub struct FlakyRemote {
    failures: Cell<u32>,
    pub pushes: RefCell<Vec<PushCall>>,
}

impl FlakyRemote {
    pub fn failing(failures: u32) -> Self {
        Self {
            failures: Cell::new(failures),
            pushes: RefCell::new(Vec::new()),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing(u32::MAX)
    }

    pub fn push_count(&self) -> usize {
        self.pushes.borrow().len()
    }
}

impl RemoteRepository for FlakyRemote {
    fn fetch(
        &self,
        _repo_id: &str,
        _file: Option<&str>,
        _options: FetchOptions,
        _token: Option<&str>,
    ) -> Result<PathBuf, HfstageError> {
        unreachable!("upload tests never fetch")
    }

    fn push(
        &self,
        folder: &Path,
        repo_id: &str,
        commit_message: &str,
        token: &str,
    ) -> Result<(), HfstageError> {
        let mut files: Vec<String> = walkdir::WalkDir::new(folder)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                entry
                    .path()
                    .strip_prefix(folder)
                    .expect("inside folder")
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        files.sort();

        self.pushes.borrow_mut().push(PushCall {
            folder: folder.to_path_buf(),
            repo_id: repo_id.to_string(),
            message: commit_message.to_string(),
            token: token.to_string(),
            files,
        });

        let remaining = self.failures.get();
        if remaining == 0 {
            return Ok(());
        }
        self.failures.set(remaining - 1);
        Err(HfstageError::RemotePush {
            repo_id: repo_id.to_string(),
            message: format!("simulated failure #{}", self.push_count()),
        })
    }
}

/// Sleeper that records requested delays instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    pub delays: RefCell<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) {
        self.delays.borrow_mut().push(delay);
    }
}
