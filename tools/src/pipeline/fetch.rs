//! Remote resource downloads for `wget`.
//!
//! Downloads are content-addressed: the local file name is the MD5 of the
//! remote reference followed by a caller-chosen suffix, and an existing file
//! is never fetched again.

use once_cell::unsync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::FetchError;

/// Timeout for a single download
const FETCH_TIMEOUT_SECS: u64 = 60;

/// Retrieves the bytes behind a remote reference.
pub trait Fetcher {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP fetcher. The client is built on first use.
#[derive(Default)]
pub struct HttpFetcher {
    client: OnceCell<reqwest::blocking::Client>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, FetchError> {
        self.client.get_or_try_init(|| {
            reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
                .build()
                .map_err(|e| FetchError::Http(e.to_string()))
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client()?
            .get(reference)
            .send()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: reference.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Local path for a reference: `<dir>/<md5(reference)><suffix>`.
pub fn local_path(dir: &Path, reference: &str, suffix: &str) -> PathBuf {
    let hash = format!("{:x}", md5::compute(reference));
    dir.join(format!("{}{}", hash, suffix))
}

/// Download `reference` into `dir` unless already present.
pub fn download(
    fetcher: &dyn Fetcher,
    reference: &str,
    dir: &Path,
    suffix: &str,
) -> Result<PathBuf, FetchError> {
    let path = local_path(dir, reference, suffix);
    if path.exists() {
        return Ok(path);
    }

    let bytes = fetcher.fetch(reference)?;
    fs::create_dir_all(dir)?;

    // Only complete files ever appear under the final name.
    let partial = path.with_extension(partial_extension(&path));
    if let Err(e) = fs::write(&partial, bytes).and_then(|()| fs::rename(&partial, &path)) {
        let _ = fs::remove_file(&partial);
        return Err(e.into());
    }
    Ok(path)
}

fn partial_extension(path: &Path) -> String {
    match path.extension() {
        Some(ext) => format!("{}.part", ext.to_string_lossy()),
        None => "part".to_string(),
    }
}
