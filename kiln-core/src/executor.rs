//! Leaf action execution: the uniform contract wrapped around external tools.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::change_cache::ChangeCache;
use crate::config::ActionKind;
use crate::error::{Error, Result};
use crate::path_utils::expand_pattern;
use crate::process::{CommandSpec, ProcessRunner, SystemProcessRunner};
use crate::registry::ActionDef;

/// What happened to one action during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Ran,
    /// Every input was unchanged and every output present.
    Skipped,
    /// Long-running process started in the background.
    Started { pid: u32 },
}

impl ActionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOutcome::Ran => "ran",
            ActionOutcome::Skipped => "skipped",
            ActionOutcome::Started { .. } => "started",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub name: String,
    pub kind: ActionKind,
    pub outcome: ActionOutcome,
    pub duration: Duration,
}

pub struct ActionExecutor {
    project_root: PathBuf,
    cache: Option<Arc<ChangeCache>>,
    process: Arc<dyn ProcessRunner>,
    force: bool,
}

impl ActionExecutor {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            cache: None,
            process: Arc::new(SystemProcessRunner),
            force: false,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ChangeCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_process_runner(mut self, process: Arc<dyn ProcessRunner>) -> Self {
        self.process = process;
        self
    }

    /// Runs transforms even when fresh. Successful runs still update the cache.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn cache(&self) -> Option<&Arc<ChangeCache>> {
        self.cache.as_ref()
    }

    pub fn process_runner(&self) -> &Arc<dyn ProcessRunner> {
        &self.process
    }

    /// Executes one action.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleInputUnresolvable`] if an input pattern matches
    /// nothing and [`Error::ActionFailed`] if the command fails. Failed runs
    /// commit nothing to the change cache.
    pub fn execute(&self, action: &ActionDef) -> Result<ActionReport> {
        let start = Instant::now();
        let outcome = match action.kind {
            ActionKind::Transform => self.execute_transform(action)?,
            ActionKind::Command => {
                self.run_command(action)?;
                ActionOutcome::Ran
            }
            ActionKind::LongRunning => {
                let pid = self.process.spawn_detached(&self.command_spec(action))?;
                info!(action = %action.name, pid, "started background process");
                ActionOutcome::Started { pid }
            }
        };

        Ok(ActionReport {
            name: action.name.clone(),
            kind: action.kind,
            outcome,
            duration: start.elapsed(),
        })
    }

    fn execute_transform(&self, action: &ActionDef) -> Result<ActionOutcome> {
        let cache = match &self.cache {
            Some(cache) if !action.inputs.is_empty() => cache,
            _ => {
                self.run_command(action)?;
                return Ok(ActionOutcome::Ran);
            }
        };

        let inputs = self.resolve_inputs(action)?;
        let outputs: Vec<PathBuf> = action
            .outputs
            .iter()
            .map(|o| self.project_root.join(o))
            .collect();

        let signals = cache.snapshot(&inputs)?;
        if !self.force && !cache.is_stale(&action.name, &signals, &outputs)? {
            debug!(action = %action.name, inputs = inputs.len(), "fresh, skipping");
            return Ok(ActionOutcome::Skipped);
        }

        self.run_command(action)?;
        cache.commit(&action.name, signals)?;
        Ok(ActionOutcome::Ran)
    }

    /// Expands every input pattern to files, deduplicated and sorted.
    pub fn resolve_inputs(&self, action: &ActionDef) -> Result<Vec<PathBuf>> {
        let mut files = BTreeSet::new();
        for pattern in &action.inputs {
            let matched = expand_pattern(&self.project_root, pattern)?;
            if matched.is_empty() {
                return Err(Error::StaleInputUnresolvable {
                    action: action.name.clone(),
                    pattern: pattern.clone(),
                });
            }
            files.extend(matched);
        }
        Ok(files.into_iter().collect())
    }

    fn command_spec(&self, action: &ActionDef) -> CommandSpec {
        let cwd = action
            .cwd
            .as_ref()
            .map(|cwd| self.project_root.join(cwd))
            .unwrap_or_else(|| self.project_root.clone());
        CommandSpec::new(action.name.clone(), action.command.clone(), cwd)
    }

    fn run_command(&self, action: &ActionDef) -> Result<()> {
        info!(action = %action.name, kind = action.kind.as_str(), "running");
        let output = self.process.run(&self.command_spec(action))?;
        if !output.success {
            return Err(Error::ActionFailed {
                action: action.name.clone(),
                message: output.failure_message(),
            });
        }
        Ok(())
    }
}
