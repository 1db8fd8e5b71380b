use std::fs;
use std::path::Path;

use kiln_core::adapter::{ProjectAdapter, ProjectMetadata};
use kiln_core::error::{Error, Result};
use serde::Deserialize;

pub struct JsAdapter;

#[derive(Deserialize)]
struct PackageJson {
    name: Option<String>,
    version: Option<String>,
    homepage: Option<String>,
}

impl ProjectAdapter for JsAdapter {
    fn ecosystem(&self) -> &'static str {
        "js"
    }

    fn detect(&self, path: &Path) -> bool {
        path.join("package.json").is_file()
    }

    fn read_metadata(&self, path: &Path) -> Result<ProjectMetadata> {
        let package_json_path = path.join("package.json");
        let content = fs::read_to_string(&package_json_path).map_err(|e| Error::Adapter {
            project: path.display().to_string(),
            message: format!("Failed to read {}: {}", package_json_path.display(), e),
        })?;

        let package: PackageJson = serde_json::from_str(&content).map_err(|e| Error::Adapter {
            project: path.display().to_string(),
            message: format!("Failed to parse package.json: {}", e),
        })?;

        Ok(ProjectMetadata {
            name: package
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| crate::dir_name(path)),
            version: package.version,
            homepage: package.homepage,
        })
    }
}
