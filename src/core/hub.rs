//! HuggingFace artifact fetching with a local disk cache.
//!
//! The tokenizer core never touches the network itself; it consumes local
//! file paths. This module bridges the two: given `(repo, revision,
//! filename)` it returns a path under `<cache_dir>/<revision>/`,
//! downloading the file on first use. Downloads go to a temporary sibling
//! and are renamed into place so a crashed fetch never leaves a truncated
//! artifact behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Base URL for HuggingFace artifact resolution.
pub const HF_BASE_URL: &str = "https://huggingface.co";

/// Request timeout for artifact downloads.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors raised while fetching tokenizer artifacts.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET {url} returned HTTP {status}")]
    Http { url: String, status: u16 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the `resolve` URL for a file in a HuggingFace repository at a
/// specific revision.
pub fn resolve_url(repo: &str, revision: &str, filename: &str) -> String {
    format!("{HF_BASE_URL}/{repo}/resolve/{revision}/{filename}")
}

/// Default artifact cache directory.
///
/// Honors the `KIMITOK_CACHE_DIR` environment variable, otherwise uses a
/// `kimitok` directory under the OS temp dir.
pub fn default_cache_dir() -> PathBuf {
    match std::env::var_os("KIMITOK_CACHE_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => std::env::temp_dir().join("kimitok"),
    }
}

/// Fetch an artifact, downloading it into the cache if not present.
///
/// The on-disk layout is `<cache_dir>/<revision>/<filename>`; an existing
/// file short-circuits without any network traffic.
pub fn fetch(
    repo: &str,
    revision: &str,
    filename: &str,
    cache_dir: &Path,
) -> Result<PathBuf, HubError> {
    let target = cache_dir.join(revision).join(filename);
    if target.exists() {
        debug!(path = %target.display(), "artifact already cached");
        return Ok(target);
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let url = resolve_url(repo, revision, filename);
    debug!(%url, "downloading artifact");

    let temp_path = target.with_file_name(format!("{filename}.tmp"));
    let result = download_to(&url, &temp_path).and_then(|()| {
        fs::rename(&temp_path, &target)?;
        Ok(())
    });

    // Never leave a partial download behind.
    if result.is_err() && temp_path.exists() {
        let _ = fs::remove_file(&temp_path);
    }
    result?;

    Ok(target)
}

fn download_to(url: &str, path: &Path) -> Result<(), HubError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| HubError::Request {
            url: url.to_string(),
            source: e,
        })?;

    let response = client.get(url).send().map_err(|e| HubError::Request {
        url: url.to_string(),
        source: e,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(HubError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.bytes().map_err(|e| HubError::Request {
        url: url.to_string(),
        source: e,
    })?;
    fs::write(path, &body)?;
    Ok(())
}
