//! Immutable run options resolved once at startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Datelike, Local};
use globset::Glob;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::adapter::ProjectMetadata;
use crate::config::{OptionsConfig, StepSpec, WatchConfig};
use crate::content_type::ContentTypeTable;
use crate::error::{Error, Result};

pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Placeholder names filled from the options themselves, in the order
/// [`Options::placeholders`] fills them.
const BUILTIN_PLACEHOLDERS: [&str; 8] = [
    "banner",
    "mangle",
    "name",
    "version",
    "output_dir",
    "region",
    "bucket",
    "endpoint",
];

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Signal used by the change cache to detect modified inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalMode {
    /// File modification time plus length.
    #[default]
    Mtime,
    /// BLAKE3 digest of the file contents.
    Hash,
}

/// A set of glob patterns bound to a chain of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchGroup {
    pub name: String,
    pub patterns: Vec<String>,
    pub steps: Vec<StepSpec>,
}

/// Remote storage settings for the upload stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOptions {
    pub region: String,
    pub bucket: String,
    pub endpoint: String,
    pub prefix: String,
    pub acl: Option<String>,
    pub gzip: bool,
}

impl RemoteOptions {
    pub fn is_http(&self) -> bool {
        self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")
    }
}

/// Options record shared by every component for the lifetime of a run.
///
/// Built once from `[options]` and project metadata, then only ever handed
/// out behind a shared reference.
#[derive(Debug, Clone)]
pub struct Options {
    project_root: PathBuf,
    project: ProjectMetadata,
    banner: String,
    output_mangle: bool,
    output_dir: PathBuf,
    remote: RemoteOptions,
    content_types: ContentTypeTable,
    debounce_window: Duration,
    watch_groups: Vec<WatchGroup>,
    signal: SignalMode,
    cache_file: PathBuf,
    credentials_file: Option<PathBuf>,
    archive_name: String,
    pre_archive_command: Option<String>,
    release_command: Option<String>,
    build_task: String,
    vars: BTreeMap<String, String>,
}

impl Options {
    /// Resolves options against the project root and metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed values: a zero debounce window,
    /// an empty or invalid watch group, an empty build task name, or a var
    /// that is not a valid placeholder name or shadows a built-in one.
    pub fn resolve(
        raw: &OptionsConfig,
        watch: &[WatchConfig],
        project_root: impl Into<PathBuf>,
        project: ProjectMetadata,
    ) -> Result<Self> {
        Self::resolve_at(raw, watch, project_root, project, Local::now())
    }

    /// Like [`Options::resolve`], rendering the banner for a fixed instant.
    pub fn resolve_at(
        raw: &OptionsConfig,
        watch: &[WatchConfig],
        project_root: impl Into<PathBuf>,
        project: ProjectMetadata,
        now: DateTime<Local>,
    ) -> Result<Self> {
        let project_root = project_root.into();

        if raw.debounce_window_ms == 0 {
            return Err(Error::Config(
                "debounce_window_ms must be greater than zero".to_string(),
            ));
        }
        if raw.build_task.trim().is_empty() {
            return Err(Error::Config("build_task cannot be empty".to_string()));
        }

        let mut watch_groups = Vec::with_capacity(watch.len());
        for group in watch {
            if group.files.is_empty() {
                return Err(Error::Config(format!(
                    "watch group '{}' has no file patterns",
                    group.name
                )));
            }
            if group.tasks.is_empty() {
                return Err(Error::Config(format!(
                    "watch group '{}' has no tasks",
                    group.name
                )));
            }
            for pattern in &group.files {
                Glob::new(pattern).map_err(|e| {
                    Error::Config(format!(
                        "watch group '{}' has invalid pattern '{}': {}",
                        group.name, pattern, e
                    ))
                })?;
            }
            watch_groups.push(WatchGroup {
                name: group.name.clone(),
                patterns: group.files.clone(),
                steps: group.tasks.clone(),
            });
        }

        for name in raw.vars.keys() {
            if !is_placeholder_name(name) {
                return Err(Error::Config(format!("invalid var name '{}'", name)));
            }
            if BUILTIN_PLACEHOLDERS.contains(&name.as_str()) {
                return Err(Error::Config(format!(
                    "var '{}' shadows a built-in placeholder",
                    name
                )));
            }
        }

        let banner = render_banner(&raw.banner_template, &project, now);
        let archive_name = raw
            .archive_name
            .clone()
            .unwrap_or_else(|| project.name.clone());

        Ok(Self {
            output_dir: project_root.join(&raw.output_dir),
            cache_file: project_root.join(&raw.cache_file),
            credentials_file: raw.credentials_file.as_ref().map(|p| project_root.join(p)),
            project_root,
            project,
            banner,
            output_mangle: raw.output_mangle,
            remote: RemoteOptions {
                region: raw.remote_region.clone(),
                bucket: raw.remote_bucket.clone(),
                endpoint: raw.remote_endpoint.trim_end_matches('/').to_string(),
                prefix: raw.remote_prefix.trim_matches('/').to_string(),
                acl: raw.remote_acl.clone(),
                gzip: raw.remote_gzip,
            },
            content_types: ContentTypeTable::with_overrides(raw.content_type_table.clone()),
            debounce_window: Duration::from_millis(raw.debounce_window_ms),
            watch_groups,
            signal: raw.signal,
            archive_name,
            pre_archive_command: raw.pre_archive_command.clone(),
            release_command: raw.release_command.clone(),
            build_task: raw.build_task.clone(),
            vars: raw.vars.clone(),
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn project(&self) -> &ProjectMetadata {
        &self.project
    }

    pub fn banner(&self) -> &str {
        &self.banner
    }

    pub fn output_mangle(&self) -> bool {
        self.output_mangle
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn remote(&self) -> &RemoteOptions {
        &self.remote
    }

    pub fn content_types(&self) -> &ContentTypeTable {
        &self.content_types
    }

    pub fn debounce_window(&self) -> Duration {
        self.debounce_window
    }

    pub fn watch_groups(&self) -> &[WatchGroup] {
        &self.watch_groups
    }

    pub fn signal(&self) -> SignalMode {
        self.signal
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    pub fn credentials_file(&self) -> Option<&Path> {
        self.credentials_file.as_deref()
    }

    pub fn archive_name(&self) -> &str {
        &self.archive_name
    }

    pub fn pre_archive_command(&self) -> Option<&str> {
        self.pre_archive_command.as_deref()
    }

    pub fn release_command(&self) -> Option<&str> {
        self.release_command.as_deref()
    }

    pub fn build_task(&self) -> &str {
        &self.build_task
    }

    /// Values available to `${name}` placeholders in action commands.
    pub fn placeholders(&self) -> BTreeMap<&str, String> {
        let builtin = [
            self.banner.clone(),
            self.output_mangle.to_string(),
            self.project.name.clone(),
            self.project.version.clone().unwrap_or_default(),
            self.output_dir.display().to_string(),
            self.remote.region.clone(),
            self.remote.bucket.clone(),
            self.remote.endpoint.clone(),
        ];
        let mut values: BTreeMap<&str, String> =
            BUILTIN_PLACEHOLDERS.iter().copied().zip(builtin).collect();
        for (name, value) in &self.vars {
            values.insert(name.as_str(), value.clone());
        }
        values
    }

    /// Replaces `${name}` placeholders in `template`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first unknown placeholder.
    pub fn interpolate(&self, template: &str) -> Result<String> {
        let values = self.placeholders();
        if let Some(unknown) = PLACEHOLDER
            .captures_iter(template)
            .map(|c| c[1].to_string())
            .find(|name| !values.contains_key(name.as_str()))
        {
            return Err(Error::Config(format!(
                "unknown placeholder '${{{}}}'. Available: {}",
                unknown,
                values.keys().copied().collect::<Vec<_>>().join(", ")
            )));
        }

        Ok(PLACEHOLDER
            .replace_all(template, |caps: &regex::Captures<'_>| {
                values.get(&caps[1]).cloned().unwrap_or_default()
            })
            .into_owned())
    }
}

fn is_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn render_banner(template: &str, project: &ProjectMetadata, now: DateTime<Local>) -> String {
    template
        .replace("{name}", &project.name)
        .replace("{version}", project.version.as_deref().unwrap_or("0.0.0"))
        .replace("{homepage}", project.homepage.as_deref().unwrap_or(""))
        .replace("{date}", &now.format("%Y-%m-%d").to_string())
        .replace("{year}", &now.year().to_string())
}
