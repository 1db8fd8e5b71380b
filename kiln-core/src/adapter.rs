//! Project adapter trait for reading project metadata.

use std::path::Path;

use crate::error::Result;

/// Project metadata extracted from an ecosystem manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectMetadata {
    pub name: String,
    /// Project version, if the manifest declares one.
    pub version: Option<String>,
    pub homepage: Option<String>,
}

/// Trait for ecosystem-specific metadata readers.
///
/// Adapters only read metadata (name, version, homepage) used for banners
/// and release versioning. They never modify the manifest.
pub trait ProjectAdapter: Send + Sync {
    fn ecosystem(&self) -> &'static str;
    fn detect(&self, path: &Path) -> bool;
    fn read_metadata(&self, path: &Path) -> Result<ProjectMetadata>;
}
