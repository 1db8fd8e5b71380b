//! Filesystem object store, for staging directories and tests.
//!
//! Objects are written as given: content type is not recorded and
//! `remote_gzip` does not apply.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::ObjectStore;

pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in key.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(Error::Config(format!("invalid object key '{}'", key)));
            }
            path.push(part);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    async fn put_object(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.object_path(key)?;
        let parent = path
            .parent()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);

        tokio::task::spawn_blocking(move || write_atomic(&parent, &path, &body))
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("object write for '{}' did not complete: {}", key, e),
                ))
            })?
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

fn write_atomic(parent: &Path, path: &Path, body: &[u8]) -> Result<()> {
    fs::create_dir_all(parent)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(body)?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_object_overwrites() {
        let temp = TempDir::new().unwrap();
        let store = FilesystemStore::new(temp.path());
        store
            .put_object("v1/js/lib.js", b"one".to_vec(), "application/javascript")
            .await
            .unwrap();
        store
            .put_object("v1/js/lib.js", b"two".to_vec(), "application/javascript")
            .await
            .unwrap();
        assert_eq!(fs::read(temp.path().join("v1/js/lib.js")).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let store = FilesystemStore::new(temp.path());
        assert!(store.put_object("../escape", Vec::new(), "text/plain").await.is_err());
    }
}
