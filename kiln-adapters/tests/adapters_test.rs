use std::fs;

use kiln_adapters::{detect_adapter, read_project_metadata, JsAdapter, RustAdapter};
use kiln_core::adapter::ProjectAdapter;
use kiln_core::Error;
use tempfile::TempDir;

#[test]
fn test_package_json_metadata() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("package.json"),
        r#"{
  "name": "calcite-web",
  "version": "3.2.0",
  "homepage": "https://example.com/calcite-web",
  "scripts": { "start": "kiln dev" }
}"#,
    )
    .unwrap();

    let metadata = JsAdapter.read_metadata(temp.path()).unwrap();
    assert_eq!(metadata.name, "calcite-web");
    assert_eq!(metadata.version.as_deref(), Some("3.2.0"));
    assert_eq!(
        metadata.homepage.as_deref(),
        Some("https://example.com/calcite-web")
    );
}

#[test]
fn test_malformed_package_json() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("package.json"), "{ not json").unwrap();

    let err = JsAdapter.read_metadata(temp.path()).unwrap_err();
    assert!(matches!(err, Error::Adapter { .. }));
}

#[test]
fn test_cargo_toml_metadata() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("Cargo.toml"),
        "[package]\nname = \"site\"\nversion = \"0.4.1\"\nrepository = \"https://example.com/site\"\n",
    )
    .unwrap();

    let metadata = RustAdapter.read_metadata(temp.path()).unwrap();
    assert_eq!(metadata.name, "site");
    assert_eq!(metadata.version.as_deref(), Some("0.4.1"));
    assert_eq!(metadata.homepage.as_deref(), Some("https://example.com/site"));
}

#[test]
fn test_workspace_inherited_version_is_undeclared() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("Cargo.toml"),
        "[package]\nname = \"site\"\nversion.workspace = true\n",
    )
    .unwrap();

    let metadata = RustAdapter.read_metadata(temp.path()).unwrap();
    assert_eq!(metadata.version, None);
}

#[test]
fn test_package_json_detected_first() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("package.json"), r#"{"name": "js-side"}"#).unwrap();
    fs::write(temp.path().join("Cargo.toml"), "[package]\nname = \"rust-side\"\n").unwrap();

    assert_eq!(detect_adapter(temp.path()).unwrap().ecosystem(), "js");
    assert_eq!(read_project_metadata(temp.path()).unwrap().name, "js-side");
}

#[test]
fn test_no_manifest_falls_back_to_directory_name() {
    let temp = TempDir::new().unwrap();
    let project = temp.path().join("my-site");
    fs::create_dir(&project).unwrap();

    assert!(detect_adapter(&project).is_none());
    let metadata = read_project_metadata(&project).unwrap();
    assert_eq!(metadata.name, "my-site");
    assert_eq!(metadata.version, None);
}
