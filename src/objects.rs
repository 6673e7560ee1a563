//! Blob storage for cover images.
//!
//! Objects are files under a root directory, published at
//! `<base_url>/<path>`. The HTTP server mounts the same directory at `/blobs`.

use crate::api::ApiError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid object path: {0}")]
    InvalidPath(String),
    #[error("error decoding base64 image: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("object store I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::Decode(_) => {
                let mut errors = BTreeMap::new();
                errors.insert(
                    "coverImage".to_string(),
                    "must be a base64 encoded image".to_string(),
                );
                ApiError::FailedValidation(errors)
            }
            other => ApiError::internal(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
    base_url: String,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL of the object at `path`.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Writes `contents` to `destination`, replacing any existing object.
    pub fn upload(&self, contents: &[u8], destination: &str) -> Result<String, BlobError> {
        let target = self.resolve(destination)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, contents)?;
        debug!(path = destination, bytes = contents.len(), "Uploaded object");
        Ok(self.url_for(destination))
    }

    pub fn read(&self, path: &str) -> Result<Vec<u8>, BlobError> {
        Ok(fs::read(self.resolve(path)?)?)
    }

    /// Removes the object at `path`. Missing objects are not an error.
    pub fn delete(&self, path: &str) -> Result<(), BlobError> {
        match fs::remove_file(self.resolve(path)?) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        let is_plain = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

/// Decodes a base64 image (optionally a `data:` URL) and uploads it.
/// An empty input uploads nothing and yields an empty URL.
pub fn upload_cover_image(
    store: &ObjectStore,
    encoded: &str,
    destination: &str,
) -> Result<String, BlobError> {
    if encoded.is_empty() {
        return Ok(String::new());
    }

    let data = match encoded.find(',') {
        Some(comma) => &encoded[comma + 1..],
        None => encoded,
    };
    let bytes = STANDARD.decode(data.trim())?;
    store.upload(&bytes, destination)
}
