//! Release manifest: the artifact list of one publish run.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::content_type::ContentTypeTable;
use crate::error::{Error, Result};
use crate::path_utils::relative_slash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the output directory, with forward slashes.
    pub path: String,
    pub remote_key: String,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
}

/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    version: String,
    built_at: DateTime<Utc>,
    output_dir: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl ReleaseManifest {
    /// Walks `output_dir` and builds one entry per file, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing, empty, or unreadable.
    pub fn build(
        output_dir: &Path,
        version: &str,
        content_types: &ContentTypeTable,
        remote_prefix: &str,
    ) -> Result<Self> {
        if !output_dir.is_dir() {
            return Err(Error::Config(format!(
                "output directory {} does not exist",
                output_dir.display()
            )));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(output_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "failed to walk {}: {}",
                    output_dir.display(),
                    e
                )))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(path) = relative_slash(output_dir, entry.path()) else {
                continue;
            };
            let size = entry.metadata().map_err(|e| Error::Io(e.into()))?.len();
            entries.push(ManifestEntry {
                remote_key: remote_key(remote_prefix, version, &path),
                content_type: content_types.resolve(entry.path()).to_string(),
                sha256: sha256_file(entry.path())?,
                size,
                path,
            });
        }

        if entries.is_empty() {
            return Err(Error::Config(format!(
                "output directory {} contains no artifacts",
                output_dir.display()
            )));
        }

        Ok(Self {
            version: version.to_string(),
            built_at: Utc::now(),
            output_dir: output_dir.to_path_buf(),
            entries,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Absolute path of an entry's source file.
    pub fn source_path(&self, entry: &ManifestEntry) -> PathBuf {
        entry
            .path
            .split('/')
            .fold(self.output_dir.clone(), |acc, part| acc.join(part))
    }

    /// Writes the manifest as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize manifest: {}", e)))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

/// Version-qualified key: `{prefix}/{version}/{path}`, without an empty prefix.
pub fn remote_key(prefix: &str, version: &str, path: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}/{}", version, path)
    } else {
        format!("{}/{}/{}", prefix, version, path)
    }
}

pub(crate) fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
