//! Shared path utilities for input expansion and watch matching.

use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

use crate::error::{Error, Result};

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

/// Returns the path of `path` relative to `root` using forward slashes.
///
/// Returns `None` if `path` is not under `root`.
pub fn relative_slash(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(GLOB_META)
}

/// Compiles a pattern where `*` does not cross directory separators.
///
/// # Errors
///
/// Returns [`Error::Config`] if the pattern is not a valid glob.
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| Error::Config(format!("invalid glob pattern '{}': {}", pattern, e)))
}

/// Expands an input pattern to the files it names, sorted.
///
/// A literal file yields itself, a literal directory yields every file below
/// it, and a glob yields every matching file. Missing literals yield nothing.
///
/// # Errors
///
/// Returns [`Error::Config`] for invalid globs and [`Error::Io`] if the
/// directory walk fails.
pub fn expand_pattern(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    if !is_glob(pattern) {
        let path = root.join(pattern);
        if path.is_file() {
            return Ok(vec![path]);
        }
        if path.is_dir() {
            return walk_files(&path, |_| true);
        }
        return Ok(Vec::new());
    }

    let matcher = compile_glob(pattern)?;
    let base = root.join(literal_base(pattern));
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    walk_files(&base, |path| {
        relative_slash(root, path)
            .map(|rel| matcher.is_match(rel))
            .unwrap_or(false)
    })
}

fn literal_base(pattern: &str) -> PathBuf {
    pattern
        .split('/')
        .take_while(|segment| !is_glob(segment))
        .collect::<Vec<_>>()
        .iter()
        .fold(PathBuf::new(), |acc, segment| acc.join(segment))
}

fn walk_files(dir: &Path, mut keep: impl FnMut(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to walk {}: {}",
                dir.display(),
                e
            )))
        })?;
        if entry.file_type().is_file() && keep(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    #[test]
    fn test_relative_slash() {
        let root = Path::new("/project");
        assert_eq!(
            relative_slash(root, Path::new("/project/lib/sass/a.scss")).as_deref(),
            Some("lib/sass/a.scss")
        );
        assert_eq!(relative_slash(root, Path::new("/other/a.scss")), None);
    }

    #[test]
    fn test_literal_base() {
        assert_eq!(literal_base("lib/img/**/*.png"), PathBuf::from("lib/img"));
        assert_eq!(literal_base("*.css"), PathBuf::new());
    }

    #[test]
    fn test_expand_glob_does_not_cross_separators() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "css/a.css");
        touch(temp.path(), "css/nested/b.css");
        touch(temp.path(), "css/c.txt");

        let shallow = expand_pattern(temp.path(), "css/*.css").unwrap();
        assert_eq!(shallow, vec![temp.path().join("css/a.css")]);

        let deep = expand_pattern(temp.path(), "css/**/*.css").unwrap();
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn test_expand_literal_directory_and_missing() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "docs/index.html");
        touch(temp.path(), "docs/js/app.js");

        assert_eq!(expand_pattern(temp.path(), "docs").unwrap().len(), 2);
        assert!(expand_pattern(temp.path(), "missing.css").unwrap().is_empty());
        assert!(expand_pattern(temp.path(), "missing/**/*.css").unwrap().is_empty());
    }
}
