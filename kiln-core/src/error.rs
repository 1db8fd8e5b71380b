//! Error types and result aliases.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Stage of the publish pipeline, used to tag publish failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishStage {
    Build,
    Manifest,
    PreArchive,
    Archive,
    Release,
    Upload,
}

impl PublishStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStage::Build => "build",
            PublishStage::Manifest => "manifest",
            PublishStage::PreArchive => "pre-archive",
            PublishStage::Archive => "archive",
            PublishStage::Release => "release",
            PublishStage::Upload => "upload",
        }
    }
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error in {context}: {error}")]
    Toml {
        error: toml::de::Error,
        context: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown task or action: {name}. Available: {available}")]
    UnknownStep { name: String, available: String },

    #[error("Circular task reference detected: {}. Use 'kiln plan' to inspect the task tree.", path.join(" -> "))]
    CircularReference { task: String, path: Vec<String> },

    #[error("Config file not found: {0}. Expected 'kiln.toml' in the project root.")]
    ConfigNotFound(PathBuf),

    #[error("Action '{action}' failed: {message}")]
    ActionFailed { action: String, message: String },

    #[error("Action '{action}' has an unresolvable input: '{pattern}' matched no files")]
    StaleInputUnresolvable { action: String, pattern: String },

    #[error("Publish failed at {stage} stage: {message}")]
    Publish { stage: PublishStage, message: String },

    #[error("Credentials missing: {0}")]
    CredentialMissing(String),

    #[error("Adapter error for {project}: {message}")]
    Adapter { project: String, message: String },

    #[error("Change cache error: {0}")]
    Cache(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Mutex lock error: {0}")]
    MutexLock(String),
}

impl Error {
    /// Returns true for errors raised while validating configuration,
    /// before any action has been started.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::UnknownStep { .. }
                | Error::CircularReference { .. }
                | Error::ConfigNotFound(_)
                | Error::Toml { .. }
        )
    }

    /// Name of the task or action that raised this error, if any.
    pub fn origin(&self) -> Option<&str> {
        match self {
            Error::ActionFailed { action, .. } | Error::StaleInputUnresolvable { action, .. } => {
                Some(action)
            }
            Error::UnknownStep { name, .. } => Some(name),
            Error::CircularReference { task, .. } => Some(task),
            Error::Publish { stage, .. } => Some(stage.as_str()),
            _ => None,
        }
    }

    /// Cycle found while expanding `name` with `stack` as the tasks being
    /// expanded, outermost first.
    pub(crate) fn revisited(stack: &[String], name: &str) -> Self {
        let start = stack.iter().position(|n| n == name).unwrap_or(0);
        let mut path = stack[start..].to_vec();
        path.push(name.to_string());
        Error::CircularReference {
            task: name.to_string(),
            path,
        }
    }

    pub(crate) fn publish(stage: PublishStage, message: impl Into<String>) -> Self {
        Error::Publish {
            stage,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
