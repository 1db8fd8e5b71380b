//! Remote object storage for release uploads.

mod filesystem;
mod s3;
pub mod sigv4;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

pub use filesystem::FilesystemStore;
pub use s3::S3Store;

use crate::error::{Error, Result};
use crate::options::RemoteOptions;

use super::credentials::Credentials;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `body` under `key`, replacing any existing object.
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    /// Human readable location, for logs.
    fn describe(&self) -> String;
}

/// Opens the store named by `remote_endpoint`.
///
/// An `http(s)://` endpoint selects the S3-compatible store, which needs
/// credentials; anything else is a directory, relative to `project_root`.
pub fn open_store(
    remote: &RemoteOptions,
    project_root: &Path,
    credentials: impl FnOnce() -> Result<Credentials>,
) -> Result<Arc<dyn ObjectStore>> {
    if remote.endpoint.is_empty() {
        return Err(Error::Config("remote_endpoint is not configured".to_string()));
    }
    if remote.is_http() {
        if remote.bucket.is_empty() {
            return Err(Error::Config("remote_bucket is not configured".to_string()));
        }
        Ok(Arc::new(S3Store::new(remote, credentials()?)?))
    } else {
        let mut root = project_root.join(&remote.endpoint);
        if !remote.bucket.is_empty() {
            root = root.join(&remote.bucket);
        }
        Ok(Arc::new(FilesystemStore::new(root)))
    }
}
