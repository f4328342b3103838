//! Production [`RemoteRepository`] backed by the Hugging Face Hub.
//!
//! Downloads go through `hf-hub`. Uploads use the Hub commit API directly:
//! `preupload` classifies each file, LFS files are sent through the git-lfs
//! batch API, and a single NDJSON `commit` call publishes everything.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hf_hub::api::sync::{Api, ApiBuilder};
use hf_hub::{Repo, RepoType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::config::HubConfig;
use crate::error::HfstageError;

use super::{FetchOptions, RemoteRepository};

const REVISION: &str = "main";
const SAMPLE_LEN: usize = 512;
const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";
/// Largest file sent base64-inline in a commit; the Hub routes bigger
/// files through LFS.
const MAX_INLINE_BYTES: u64 = 10 * 1024 * 1024;

/// Hub client built from a [`HubConfig`].
#[derive(Clone, Debug)]
pub struct HubClient {
    endpoint: String,
    cache_dir: PathBuf,
    timeout: Duration,
}

impl HubClient {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            cache_dir: config.hub_cache_dir(),
            timeout: config.http_timeout,
        }
    }

    fn api(&self, repo_id: &str, token: Option<&str>) -> Result<Api, HfstageError> {
        ApiBuilder::new()
            .with_progress(false)
            .with_endpoint(self.endpoint.clone())
            .with_cache_dir(self.cache_dir.clone())
            .with_token(token.map(str::to_string))
            .build()
            .map_err(|source| HfstageError::HfApiError {
                repo_id: repo_id.to_string(),
                message: source.to_string(),
            })
    }

    fn agent(&self) -> ureq::Agent {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build();
        config.into()
    }

    fn api_url(&self, path: &str) -> Result<url::Url, HfstageError> {
        url::Url::parse(&format!("{}/{}", self.endpoint, path))
            .map_err(|source| HfstageError::InvalidConfig(format!("bad Hub endpoint: {source}")))
    }
}

impl RemoteRepository for HubClient {
    fn fetch(
        &self,
        repo_id: &str,
        file: Option<&str>,
        options: FetchOptions,
        token: Option<&str>,
    ) -> Result<PathBuf, HfstageError> {
        let api = self.api(repo_id, token)?;
        let repo = api.repo(Repo::new(repo_id.to_string(), RepoType::Model));
        let api_err = |source: hf_hub::api::sync::ApiError| HfstageError::HfApiError {
            repo_id: repo_id.to_string(),
            message: source.to_string(),
        };

        let get = |name: &str| {
            if options.force {
                repo.download(name)
            } else {
                repo.get(name)
            }
        };

        if let Some(file) = file {
            return get(file).map_err(api_err);
        }

        let info = repo.info().map_err(api_err)?;
        let mut snapshot = None;
        for sibling in &info.siblings {
            let local = get(&sibling.rfilename).map_err(api_err)?;
            tracing::debug!(repo = repo_id, file = %sibling.rfilename, "fetched");
            if snapshot.is_none() {
                let depth = Path::new(&sibling.rfilename).components().count();
                snapshot = local.ancestors().nth(depth).map(Path::to_path_buf);
            }
        }

        snapshot.ok_or_else(|| HfstageError::HfApiError {
            repo_id: repo_id.to_string(),
            message: "repository has no files".to_string(),
        })
    }

    fn push(
        &self,
        folder: &Path,
        repo_id: &str,
        commit_message: &str,
        token: &str,
    ) -> Result<(), HfstageError> {
        let files = collect_files(folder)?;
        let push_err = |message: String| HfstageError::RemotePush {
            repo_id: repo_id.to_string(),
            message,
        };

        let agent = self.agent();
        let auth = format!("Bearer {token}");

        let modes = self.preupload(&agent, &auth, repo_id, &files).map_err(push_err)?;

        let mut lines = vec![json!({
            "key": "header",
            "value": {"summary": commit_message, "description": ""},
        })];

        for file in &files {
            let is_lfs = modes.get(&file.path_in_repo).map(String::as_str) == Some("lfs");
            if is_lfs {
                let oid = self
                    .upload_lfs(&agent, &auth, repo_id, file)
                    .map_err(push_err)?;
                lines.push(json!({
                    "key": "lfsFile",
                    "value": {"path": file.path_in_repo, "algo": "sha256", "oid": oid},
                }));
            } else {
                lines.push(json!({
                    "key": "file",
                    "value": {
                        "path": file.path_in_repo,
                        "content": inline_content(repo_id, file)?,
                        "encoding": "base64",
                    },
                }));
            }
        }

        let mut body = String::new();
        for line in &lines {
            body.push_str(&line.to_string());
            body.push('\n');
        }

        let url = self.api_url(&format!("api/datasets/{repo_id}/commit/{REVISION}"))?;
        tracing::debug!(repo = repo_id, files = files.len(), "sending commit");
        agent
            .post(url.as_str())
            .header("Authorization", &auth)
            .header("Content-Type", "application/x-ndjson")
            .send(body.as_bytes())
            .map_err(|source| push_err(format!("commit failed: {source}")))?;

        Ok(())
    }
}

/// A file under the pushed folder.
#[derive(Clone, Debug)]
struct LocalFile {
    path_in_repo: String,
    local_path: PathBuf,
    size: u64,
}

/// Base64 body for a regular (non-LFS) commit entry. Files over
/// [`MAX_INLINE_BYTES`] are refused rather than loaded into memory.
fn inline_content(repo_id: &str, file: &LocalFile) -> Result<String, HfstageError> {
    if file.size > MAX_INLINE_BYTES {
        return Err(HfstageError::HfApiError {
            repo_id: repo_id.to_string(),
            message: format!(
                "'{}' is {} bytes but was not routed through LFS",
                file.path_in_repo, file.size
            ),
        });
    }
    let bytes = std::fs::read(&file.local_path)?;
    Ok(BASE64.encode(bytes))
}

fn collect_files(folder: &Path) -> Result<Vec<LocalFile>, HfstageError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(folder).sort_by_file_name() {
        let entry = entry.map_err(|source| HfstageError::Io(source.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(folder)
            .map_err(|_| io::Error::other("walked outside upload folder"))?;
        let path_in_repo = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(LocalFile {
            path_in_repo,
            local_path: entry.path().to_path_buf(),
            size: entry.metadata().map_err(|source| HfstageError::Io(source.into()))?.len(),
        });
    }
    Ok(files)
}

#[derive(Serialize)]
struct PreuploadFile {
    path: String,
    sample: String,
    size: u64,
}

#[derive(Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadMode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadMode {
    path: String,
    upload_mode: String,
}

#[derive(Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsObject>,
}

#[derive(Deserialize)]
struct LfsObject {
    #[serde(default)]
    actions: Option<LfsActions>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct LfsActions {
    upload: Option<LfsAction>,
    verify: Option<LfsAction>,
}

#[derive(Deserialize)]
struct LfsAction {
    href: String,
    #[serde(default)]
    header: BTreeMap<String, String>,
}

impl HubClient {
    /// Ask the Hub which files must go through LFS. Returns path -> mode.
    fn preupload(
        &self,
        agent: &ureq::Agent,
        auth: &str,
        repo_id: &str,
        files: &[LocalFile],
    ) -> Result<BTreeMap<String, String>, String> {
        let payload = files
            .iter()
            .map(|file| {
                Ok(PreuploadFile {
                    path: file.path_in_repo.clone(),
                    sample: BASE64.encode(read_sample(&file.local_path)?),
                    size: file.size,
                })
            })
            .collect::<Result<Vec<_>, io::Error>>()
            .map_err(|source| format!("failed reading upload sample: {source}"))?;

        let url = self
            .api_url(&format!("api/datasets/{repo_id}/preupload/{REVISION}"))
            .map_err(|source| source.to_string())?;
        let mut response = agent
            .post(url.as_str())
            .header("Authorization", auth)
            .send_json(json!({ "files": payload }))
            .map_err(|source| format!("preupload failed: {source}"))?;
        let parsed: PreuploadResponse = response
            .body_mut()
            .read_json()
            .map_err(|source| format!("bad preupload response: {source}"))?;

        Ok(parsed
            .files
            .into_iter()
            .map(|mode| (mode.path, mode.upload_mode))
            .collect())
    }

    /// Upload one file through the git-lfs batch API and return its oid.
    fn upload_lfs(
        &self,
        agent: &ureq::Agent,
        auth: &str,
        repo_id: &str,
        file: &LocalFile,
    ) -> Result<String, String> {
        let oid = sha256_file(&file.local_path)
            .map_err(|source| format!("failed hashing {}: {source}", file.path_in_repo))?;

        let url = self
            .api_url(&format!("datasets/{repo_id}.git/info/lfs/objects/batch"))
            .map_err(|source| source.to_string())?;
        let request = json!({
            "operation": "upload",
            "transfers": ["basic"],
            "objects": [{"oid": oid, "size": file.size}],
            "hash_algo": "sha256",
        });
        let mut response = agent
            .post(url.as_str())
            .header("Authorization", auth)
            .header("Accept", LFS_MEDIA_TYPE)
            .header("Content-Type", LFS_MEDIA_TYPE)
            .send(request.to_string().as_bytes())
            .map_err(|source| format!("LFS batch failed: {source}"))?;
        let batch: LfsBatchResponse = response
            .body_mut()
            .read_json()
            .map_err(|source| format!("bad LFS batch response: {source}"))?;

        let object = batch
            .objects
            .into_iter()
            .next()
            .ok_or_else(|| "LFS batch response has no objects".to_string())?;
        if let Some(error) = object.error {
            return Err(format!("LFS batch rejected {}: {error}", file.path_in_repo));
        }

        // No actions means the server already has this object.
        let Some(actions) = object.actions else {
            tracing::debug!(file = %file.path_in_repo, "LFS object already present");
            return Ok(oid);
        };

        if let Some(upload) = actions.upload {
            if upload.header.contains_key("chunk_size") {
                return Err(format!(
                    "{} requires a multipart LFS upload, which is not supported",
                    file.path_in_repo
                ));
            }
            tracing::debug!(file = %file.path_in_repo, size = file.size, "uploading LFS object");
            let body = File::open(&file.local_path)
                .map_err(|source| format!("failed opening {}: {source}", file.path_in_repo))?;
            let mut request = agent.put(upload.href.as_str());
            for (name, value) in &upload.header {
                request = request.header(name, value);
            }
            request
                .header("Content-Length", &file.size.to_string())
                .send(body)
                .map_err(|source| format!("LFS upload failed: {source}"))?;
        }

        if let Some(verify) = actions.verify {
            let mut request = agent.post(verify.href.as_str()).header("Authorization", auth);
            for (name, value) in &verify.header {
                request = request.header(name, value);
            }
            request
                .send_json(json!({"oid": oid, "size": file.size}))
                .map_err(|source| format!("LFS verify failed: {source}"))?;
        }

        Ok(oid)
    }
}

fn read_sample(path: &Path) -> io::Result<Vec<u8>> {
    let mut sample = Vec::with_capacity(SAMPLE_LEN);
    File::open(path)?
        .take(SAMPLE_LEN as u64)
        .read_to_end(&mut sample)?;
    Ok(sample)
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
