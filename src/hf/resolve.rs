use crate::error::HfstageError;

use super::{RemoteReference, CANONICAL_HOST, MIRROR_HOST};

const DOWNLOAD_QUERY: &str = "?download=true";
const FILE_MARKERS: [&str; 2] = ["/resolve/main", "/blob/main"];

/// Parse a user-supplied model reference (bare repo ID or Hub URL).
///
/// The checks run in a fixed order and must not be reordered: a bare
/// `owner/name` is recognised purely by its single `/`, before any URL
/// handling.
pub fn resolve_reference(input: &str) -> Result<RemoteReference, HfstageError> {
    let normalized = input.replace(MIRROR_HOST, CANONICAL_HOST);
    let prefix = format!("https://{CANONICAL_HOST}/");
    let slashes = normalized.matches('/').count();

    if slashes == 1 {
        return bare_reference(input, &normalized);
    }

    let body = normalized.strip_prefix(&prefix).ok_or_else(|| {
        invalid(
            input,
            "expected '<owner>/<name>' or a https://huggingface.co URL",
        )
    })?;

    if slashes == 4 {
        return bare_reference(input, body);
    }

    if slashes < 4 {
        return Err(invalid(input, "URL does not name a repository"));
    }

    let mut body = body.to_string();
    while body.contains(DOWNLOAD_QUERY) {
        body = body.replace(DOWNLOAD_QUERY, "");
    }
    let (repository, file_path) = FILE_MARKERS
        .iter()
        .find_map(|marker| body.split_once(marker))
        .ok_or_else(|| {
            invalid(
                input,
                "URL has neither a '/resolve/main' nor a '/blob/main' segment",
            )
        })?;

    let repository = checked_repository(input, repository)?;
    let file_path = Some(file_path).filter(|path| !path.trim_matches('/').is_empty());
    if let Some(path) = file_path {
        if has_relative_segment(path) {
            return Err(invalid(input, "file path may not contain '.' or '..' segments"));
        }
    }

    Ok(RemoteReference {
        repository,
        file_path: file_path.map(str::to_string),
    })
}

fn bare_reference(input: &str, repository: &str) -> Result<RemoteReference, HfstageError> {
    Ok(RemoteReference {
        repository: checked_repository(input, repository)?,
        file_path: None,
    })
}

/// Trim `repository` and require at least `owner/name` with no empty,
/// `.` or `..` segments, so every accepted form renders back to itself.
fn checked_repository(input: &str, repository: &str) -> Result<String, HfstageError> {
    let repository = repository.trim();
    let segments: Vec<&str> = repository.split('/').collect();
    let well_formed = segments.len() >= 2
        && segments
            .iter()
            .all(|segment| !segment.trim().is_empty() && *segment != "." && *segment != "..");
    if !well_formed {
        return Err(invalid(input, "expected repo id in '<owner>/<name>' form"));
    }
    Ok(repository.to_string())
}

/// True when any segment of `path` (split on `/` or `\`) is `.` or `..`.
pub(crate) fn has_relative_segment(path: &str) -> bool {
    path.split(['/', '\\'])
        .any(|segment| segment == "." || segment == "..")
}

fn invalid(input: &str, message: &str) -> HfstageError {
    HfstageError::InvalidReference {
        input: input.to_string(),
        message: message.to_string(),
    }
}
