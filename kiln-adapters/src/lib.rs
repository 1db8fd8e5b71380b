pub mod js;
pub mod rust;

pub use js::JsAdapter;
pub use rust::RustAdapter;

use std::path::Path;

use kiln_core::adapter::{ProjectAdapter, ProjectMetadata};
use kiln_core::error::Result;
use tracing::debug;

/// Adapters in detection order: `package.json` wins over `Cargo.toml`.
pub fn all_adapters() -> Vec<Box<dyn ProjectAdapter>> {
    vec![Box::new(JsAdapter), Box::new(RustAdapter)]
}

pub fn detect_adapter(path: &Path) -> Option<Box<dyn ProjectAdapter>> {
    all_adapters().into_iter().find(|adapter| adapter.detect(path))
}

/// Reads project metadata from the first manifest found in `path`.
///
/// Without a manifest, the project is named after its directory and has no
/// version.
pub fn read_project_metadata(path: &Path) -> Result<ProjectMetadata> {
    match detect_adapter(path) {
        Some(adapter) => {
            debug!(ecosystem = adapter.ecosystem(), "reading project metadata");
            adapter.read_metadata(path)
        }
        None => Ok(ProjectMetadata {
            name: dir_name(path),
            ..Default::default()
        }),
    }
}

pub(crate) fn dir_name(path: &Path) -> String {
    path.canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("project")
        .to_string()
}
