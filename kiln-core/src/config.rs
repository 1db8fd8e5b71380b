//! TOML configuration parsing for `kiln.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::options::SignalMode;

/// Default configuration file name looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "kiln.toml";

/// A reference to a task, an action, or a parallel group of references.
///
/// In TOML a string is a reference by name and an array is a parallel group:
///
/// ```toml
/// prepublish = ["icons", ["scss", "uglify", "copy"]]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepSpec {
    Name(String),
    Parallel(Vec<StepSpec>),
}

impl StepSpec {
    pub fn parallel<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepSpec>,
    {
        StepSpec::Parallel(members.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for StepSpec {
    fn from(name: &str) -> Self {
        StepSpec::Name(name.to_string())
    }
}

impl From<String> for StepSpec {
    fn from(name: String) -> Self {
        StepSpec::Name(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskValue {
    Simple(Vec<StepSpec>),
    Complex {
        steps: Vec<StepSpec>,
        #[serde(default)]
        description: Option<String>,
    },
}

impl TaskValue {
    pub fn steps(&self) -> &[StepSpec] {
        match self {
            TaskValue::Simple(steps) => steps,
            TaskValue::Complex { steps, .. } => steps,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            TaskValue::Simple(_) => None,
            TaskValue::Complex { description, .. } => description.as_deref(),
        }
    }
}

/// How an action is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// External transform over declared inputs, gated by the change cache.
    Transform,
    /// External command, always run.
    Command,
    /// Detached background process that is started and never awaited.
    #[serde(alias = "process")]
    LongRunning,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Transform => "transform",
            ActionKind::Command => "command",
            ActionKind::LongRunning => "long-running",
        }
    }
}

/// Action definition as written in `[actions.<name>]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub kind: ActionKind,
    pub command: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Watch group as written in `[[watch]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub name: String,
    pub files: Vec<String>,
    pub tasks: Vec<StepSpec>,
}

/// Raw values of the `[options]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    pub banner_template: String,
    pub output_mangle: bool,
    pub output_dir: PathBuf,
    pub remote_region: String,
    pub remote_bucket: String,
    pub remote_endpoint: String,
    pub remote_prefix: String,
    pub remote_acl: Option<String>,
    /// Gzip object bodies and send `Content-Encoding: gzip` to http stores.
    pub remote_gzip: bool,
    pub content_type_table: BTreeMap<String, String>,
    pub debounce_window_ms: u64,
    pub signal: SignalMode,
    pub cache_file: PathBuf,
    pub credentials_file: Option<PathBuf>,
    pub archive_name: Option<String>,
    /// Run after the manifest is written and before the archive is created.
    pub pre_archive_command: Option<String>,
    pub release_command: Option<String>,
    pub build_task: String,
    /// Extra `${name}` placeholder values; the CLI may override them.
    pub vars: BTreeMap<String, String>,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            banner_template: "/* {name} - v{version} - {date}\n*  {homepage}\n*  Copyright (c) {year} */\n"
                .to_string(),
            output_mangle: false,
            output_dir: PathBuf::from("dist"),
            remote_region: "us-east-1".to_string(),
            remote_bucket: String::new(),
            remote_endpoint: String::new(),
            remote_prefix: String::new(),
            remote_acl: None,
            remote_gzip: false,
            content_type_table: BTreeMap::new(),
            debounce_window_ms: crate::options::DEFAULT_DEBOUNCE_MS,
            signal: SignalMode::default(),
            cache_file: PathBuf::from(".kiln/change-cache.bin"),
            credentials_file: None,
            archive_name: None,
            pre_archive_command: None,
            release_command: None,
            build_task: "prepublish".to_string(),
            vars: BTreeMap::new(),
        }
    }
}

/// Complete contents of `kiln.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub options: OptionsConfig,
    #[serde(default)]
    pub actions: IndexMap<String, ActionConfig>,
    #[serde(default)]
    pub tasks: IndexMap<String, TaskValue>,
    #[serde(default)]
    pub watch: Vec<WatchConfig>,
}

impl Config {
    /// Loads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigNotFound`] if the file does not exist and
    /// [`Error::Toml`] if it cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parses configuration from a TOML string. `context` names the source
    /// in error messages.
    pub fn parse(content: &str, context: &str) -> Result<Self> {
        toml::from_str(content).map_err(|error| Error::Toml {
            error,
            context: context.to_string(),
        })
    }
}
