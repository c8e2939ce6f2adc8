use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode cache file {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// JSON document cache rooted at a working directory.
///
/// Every load failure (missing file, unreadable bytes, or a payload
/// that no longer matches the expected type) is uniformly a miss. The
/// caller re-pulls; corruption never surfaces to the end user.
#[derive(Debug, Clone)]
pub struct Cache {
    root: PathBuf,
}

impl Cache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    pub fn load<T: DeserializeOwned>(&self, rel: &str) -> Option<T> {
        let path = self.path(rel);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) => {
                tracing::debug!(path = %path.display(), %error, "cache miss");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::debug!(
                    path = %path.display(),
                    %error,
                    "cache file unreadable, treating as miss"
                );
                None
            }
        }
    }

    pub fn store<T: Serialize + ?Sized>(&self, rel: &str, value: &T) -> Result<PathBuf, CacheError> {
        let path = self.path(rel);
        let text = serde_json::to_string_pretty(value).map_err(|source| CacheError::Encode {
            path: path.clone(),
            source,
        })?;
        self.write_bytes(path, text.as_bytes())
    }

    pub fn load_text(&self, rel: &str) -> Option<String> {
        let path = self.path(rel);
        match fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(error) => {
                tracing::debug!(path = %path.display(), %error, "cache miss");
                None
            }
        }
    }

    pub fn store_text(&self, rel: &str, text: &str) -> Result<PathBuf, CacheError> {
        self.write_bytes(self.path(rel), text.as_bytes())
    }

    /// ISO timestamp of the file's last modification; used as the
    /// `datePulled` stamp for data served from disk.
    pub fn modified_iso(&self, rel: &str) -> Option<String> {
        let modified = fs::metadata(self.path(rel)).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(modified).to_rfc3339())
    }

    fn write_bytes(&self, path: PathBuf, bytes: &[u8]) -> Result<PathBuf, CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CacheError::Write {
                path: path.clone(),
                source,
            })?;
        }
        fs::write(&path, bytes).map_err(|source| CacheError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
