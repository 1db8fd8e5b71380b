use std::fs;
use std::path::Path;

use kiln_core::adapter::{ProjectAdapter, ProjectMetadata};
use kiln_core::error::{Error, Result};
use toml::Value;

pub struct RustAdapter;

impl ProjectAdapter for RustAdapter {
    fn ecosystem(&self) -> &'static str {
        "rust"
    }

    fn detect(&self, path: &Path) -> bool {
        path.join("Cargo.toml").is_file()
    }

    fn read_metadata(&self, path: &Path) -> Result<ProjectMetadata> {
        let cargo_toml_path = path.join("Cargo.toml");
        let content = fs::read_to_string(&cargo_toml_path).map_err(|e| Error::Adapter {
            project: path.display().to_string(),
            message: format!(
                "Failed to read Cargo.toml at {}: {}",
                cargo_toml_path.display(),
                e
            ),
        })?;

        let toml: Value = content.parse().map_err(|e| Error::Adapter {
            project: path.display().to_string(),
            message: format!(
                "Failed to parse Cargo.toml at {}: {}. File may be malformed.",
                cargo_toml_path.display(),
                e
            ),
        })?;

        let package = toml.get("package");
        // `version.workspace = true` is a table, not a string, and reads as undeclared.
        let field = |key: &str| {
            package
                .and_then(|p| p.get(key))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };

        Ok(ProjectMetadata {
            name: field("name").unwrap_or_else(|| crate::dir_name(path)),
            version: field("version"),
            homepage: field("homepage").or_else(|| field("repository")),
        })
    }
}
