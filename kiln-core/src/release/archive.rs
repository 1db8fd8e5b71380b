//! tar + zstd archive of the output directory.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tar::{Archive, Builder, HeaderMode};

use crate::error::{Error, Result};

use super::manifest::sha256_file;

const ZSTD_LEVEL: i32 = 19;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub size: u64,
    pub sha256: String,
}

/// Archives `source_dir` into `archive_path`, replacing any previous archive.
///
/// Entries are stored under the source directory's own name with
/// deterministic headers. The archive is written to a temporary file in the
/// destination directory and renamed into place.
pub fn create_archive(source_dir: &Path, archive_path: &Path) -> Result<ArchiveInfo> {
    let prefix = source_dir
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("dist"));
    let parent = archive_path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let temp = tempfile::NamedTempFile::new_in(parent)?;
    {
        let encoder = zstd::stream::write::Encoder::new(BufWriter::new(temp.as_file()), ZSTD_LEVEL)?;
        let mut builder = Builder::new(encoder);
        builder.mode(HeaderMode::Deterministic);
        builder.follow_symlinks(true);
        builder.append_dir_all(&prefix, source_dir)?;
        let encoder = builder.into_inner()?;
        let mut writer = encoder.finish()?;
        std::io::Write::flush(&mut writer)?;
    }
    temp.as_file().sync_all()?;
    temp.persist(archive_path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.error.kind(),
            format!("Failed to move archive into {}: {}", archive_path.display(), e.error),
        ))
    })?;

    Ok(ArchiveInfo {
        path: archive_path.to_path_buf(),
        size: fs::metadata(archive_path)?.len(),
        sha256: sha256_file(archive_path)?,
    })
}

/// Lists the file paths stored in an archive.
pub fn list_archive(archive_path: &Path) -> Result<Vec<String>> {
    let decoder = zstd::stream::read::Decoder::new(File::open(archive_path)?)?;
    let mut archive = Archive::new(decoder);
    let mut files = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        if entry.header().entry_type().is_file() {
            files.push(entry.path()?.to_string_lossy().replace('\\', "/"));
        }
    }
    files.sort();
    Ok(files)
}
