use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

const PIPELINE: &str = r#"
[options]
remote_endpoint = "remote"

[actions.css]
kind = "transform"
command = "echo run >> runs.log && mkdir -p dist && cp src/a.css dist/a.css"
inputs = ["src/*.css"]
outputs = ["dist/a.css"]

[actions.js]
kind = "command"
command = "mkdir -p dist && printf 'var a;' > dist/app.js"

[actions.lint]
kind = "command"
command = "echo 'lint: 2 problems' >&2; exit 2"

[tasks]
prepublish = [["css", "js"]]
test = ["lint"]
default = { steps = ["prepublish"], description = "Build everything" }

[[watch]]
name = "css"
files = ["src/**/*.css"]
tasks = ["css"]
"#;

fn create_project() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("src")).unwrap();
    fs::write(temp.path().join("src/a.css"), "a { color: red; }").unwrap();
    fs::write(temp.path().join("kiln.toml"), PIPELINE).unwrap();
    fs::write(
        temp.path().join("package.json"),
        r#"{"name": "demo-site", "version": "1.4.0"}"#,
    )
    .unwrap();
    temp
}

fn kiln(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_kiln"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_list_json() {
    let project = create_project();
    let output = kiln(project.path(), &["list", "--json"]);
    assert!(output.status.success());

    let listing = stdout_json(&output);
    let tasks = listing["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[0]["name"], "prepublish");
    assert_eq!(tasks[0]["steps"], "{css, js}");
    assert_eq!(tasks[2]["description"], "Build everything");
    assert_eq!(listing["actions"].as_array().unwrap().len(), 3);
    assert_eq!(listing["watch"][0]["name"], "css");
}

#[test]
fn test_plan_json() {
    let project = create_project();
    let output = kiln(project.path(), &["plan", "default", "--json"]);
    assert!(output.status.success());

    let tree = stdout_json(&output);
    assert_eq!(tree["task"], "default");
    let prepublish = &tree["steps"][0];
    assert_eq!(prepublish["task"], "prepublish");
    assert_eq!(prepublish["steps"][0]["parallel"][0]["action"], "css");
    assert_eq!(prepublish["steps"][0]["parallel"][0]["kind"], "transform");
}

#[test]
fn test_plan_unknown_task_fails() {
    let project = create_project();
    let output = kiln(project.path(), &["plan", "deploy"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("deploy"));
}

#[test]
fn test_run_skips_unchanged_transform() {
    let project = create_project();

    assert!(kiln(project.path(), &["run", "prepublish"]).status.success());
    assert!(kiln(project.path(), &["run", "prepublish"]).status.success());

    let runs = fs::read_to_string(project.path().join("runs.log")).unwrap();
    assert_eq!(runs.lines().count(), 1);
    assert!(project.path().join("dist/app.js").exists());
    assert!(project.path().join(".kiln/change-cache.bin").exists());

    fs::write(project.path().join("src/a.css"), "a { color: blue; }").unwrap();
    assert!(kiln(project.path(), &["run", "prepublish"]).status.success());
    let runs = fs::read_to_string(project.path().join("runs.log")).unwrap();
    assert_eq!(runs.lines().count(), 2);
}

#[test]
fn test_run_no_cache_forces_transform() {
    let project = create_project();
    assert!(kiln(project.path(), &["run", "prepublish"]).status.success());
    assert!(kiln(project.path(), &["run", "prepublish", "--no-cache"])
        .status
        .success());

    let runs = fs::read_to_string(project.path().join("runs.log")).unwrap();
    assert_eq!(runs.lines().count(), 2);
}

#[test]
fn test_failing_action_exits_non_zero() {
    let project = create_project();
    let output = kiln(project.path(), &["run", "test"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("lint failed"), "{}", stderr);
    assert!(stderr.contains("lint: 2 problems"), "{}", stderr);
}

#[test]
fn test_clean_removes_cache() {
    let project = create_project();
    assert!(kiln(project.path(), &["run", "prepublish"]).status.success());
    let cache = project.path().join(".kiln/change-cache.bin");
    assert!(cache.exists());

    assert!(kiln(project.path(), &["clean"]).status.success());
    assert!(!cache.exists());
}

#[test]
fn test_release_dry_run_uses_package_version() {
    let project = create_project();
    let output = kiln(project.path(), &["release", "--dry-run"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let archive = project
        .path()
        .join(".kiln/release/1.4.0/demo-site-1.4.0.tar.zst");
    assert!(archive.exists());
    assert!(project.path().join(".kiln/release/1.4.0/manifest.json").exists());
    assert!(!project.path().join("remote").exists());
}

#[test]
fn test_upload_copies_output() {
    let project = create_project();
    assert!(kiln(project.path(), &["run", "prepublish"]).status.success());

    let output = kiln(project.path(), &["upload", "--version", "2.0.0"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        fs::read_to_string(project.path().join("remote/2.0.0/app.js")).unwrap(),
        "var a;"
    );
}

#[test]
fn test_missing_config_fails() {
    let temp = TempDir::new().unwrap();
    let output = kiln(temp.path(), &["list"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("kiln.toml"));
}

#[test]
fn test_config_flag_selects_project_root() {
    let project = create_project();
    let elsewhere = TempDir::new().unwrap();
    let config = project.path().join("kiln.toml");

    let output = kiln(
        elsewhere.path(),
        &["--config", config.to_str().unwrap(), "run", "prepublish"],
    );
    assert!(output.status.success());
    assert!(project.path().join("dist/a.css").exists());
    assert!(!elsewhere.path().join("dist").exists());
}

#[test]
fn test_var_overrides_configured_placeholder() {
    let project = create_project();
    fs::write(
        project.path().join("kiln.toml"),
        r#"
[options.vars]
message = "Update documentation"

[actions.notes]
kind = "command"
command = "printf '%s' '${message}' > notes.txt"
"#,
    )
    .unwrap();

    assert!(kiln(project.path(), &["run", "notes"]).status.success());
    assert_eq!(
        fs::read_to_string(project.path().join("notes.txt")).unwrap(),
        "Update documentation"
    );

    let output = kiln(project.path(), &["run", "notes", "--var", "message=Fix nav"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        fs::read_to_string(project.path().join("notes.txt")).unwrap(),
        "Fix nav"
    );

    let output = kiln(project.path(), &["run", "notes", "--var", "message"]);
    assert!(!output.status.success());
}
