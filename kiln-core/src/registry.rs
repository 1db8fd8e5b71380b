//! Read-only registry of task and action descriptors.
//!
//! The registry is built once, before anything executes. Every step reference
//! is resolved to a task or an action at build time and the reference graph is
//! checked for cycles, so lookups during a run are pure.

use std::path::PathBuf;

use indexmap::IndexMap;
use tracing::debug;

use crate::config::{ActionKind, Config, StepSpec};
use crate::error::{Error, Result};
use crate::graph::TaskGraph;
use crate::options::Options;

/// A resolved step reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Task(String),
    Action(String),
    /// Members run concurrently; the group completes when all members do.
    Parallel(Vec<Step>),
}

impl Step {
    /// Names referenced by this step, flattening parallel groups.
    pub fn referenced_names(&self) -> Vec<&str> {
        match self {
            Step::Task(name) | Step::Action(name) => vec![name.as_str()],
            Step::Parallel(members) => members.iter().flat_map(Step::referenced_names).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDef {
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<Step>,
}

/// Leaf unit of work, opaque to the engine apart from its kind and paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDef {
    pub name: String,
    pub kind: ActionKind,
    /// Shell command line with placeholders already interpolated.
    pub command: String,
    /// Input path patterns, relative to the project root.
    pub inputs: Vec<String>,
    /// Declared outputs, relative to the project root.
    pub outputs: Vec<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub description: Option<String>,
}

impl ActionDef {
    pub fn new(name: impl Into<String>, kind: ActionKind, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            command: command.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            cwd: None,
            description: None,
        }
    }

    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn outputs<I, P>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug)]
pub struct Registry {
    tasks: IndexMap<String, TaskDef>,
    actions: IndexMap<String, ActionDef>,
    graph: TaskGraph,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Builds the registry from parsed configuration.
    ///
    /// Action commands are interpolated against `options` here, once.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for empty commands, unknown placeholders,
    /// names used for both a task and an action, unknown step references,
    /// watch groups that reference unknown steps, and cycles.
    pub fn from_config(config: &Config, options: &Options) -> Result<Self> {
        let mut builder = RegistryBuilder::default();

        for (name, action) in &config.actions {
            let command = options.interpolate(&action.command).map_err(|e| {
                Error::Config(format!("action '{}': {}", name, strip_config_prefix(&e)))
            })?;
            let mut def = ActionDef::new(name.clone(), action.kind, command)
                .inputs(action.inputs.iter().cloned())
                .outputs(action.outputs.iter().map(PathBuf::from));
            def.cwd = action.cwd.clone();
            def.description = action.description.clone();
            builder = builder.action(def);
        }

        for (name, task) in &config.tasks {
            builder = builder.task_with_description(
                name.clone(),
                task.steps().to_vec(),
                task.description().map(str::to_string),
            );
        }

        let registry = builder.build()?;

        for group in options.watch_groups() {
            registry.resolve_chain(&group.steps).map_err(|e| match e {
                Error::UnknownStep { name, available } => Error::Config(format!(
                    "watch group '{}' references unknown task or action '{}'. Available: {}",
                    group.name, name, available
                )),
                other => other,
            })?;
        }

        Ok(registry)
    }

    pub fn task(&self, name: &str) -> Option<&TaskDef> {
        self.tasks.get(name)
    }

    pub fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name) || self.actions.contains_key(name)
    }

    /// Tasks in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskDef> {
        self.tasks.values()
    }

    /// Actions in declaration order.
    pub fn actions(&self) -> impl Iterator<Item = &ActionDef> {
        self.actions.values()
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Resolves a single name to a step.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStep`] if the name is neither a task nor an action.
    pub fn resolve(&self, name: &str) -> Result<Step> {
        resolve_name(name, &self.tasks, &self.actions)
    }

    /// Resolves an ad-hoc chain, such as a watch group's step list.
    pub fn resolve_chain(&self, steps: &[StepSpec]) -> Result<Vec<Step>> {
        steps
            .iter()
            .map(|spec| resolve_spec(spec, &self.tasks, &self.actions))
            .collect()
    }

    /// Comma-separated list of every known name, for error messages.
    pub fn available(&self) -> String {
        available_names(&self.tasks, &self.actions)
    }
}

/// Builder for [`Registry`]; references are resolved in [`RegistryBuilder::build`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    actions: IndexMap<String, ActionDef>,
    tasks: IndexMap<String, (Vec<StepSpec>, Option<String>)>,
}

impl RegistryBuilder {
    pub fn action(mut self, action: ActionDef) -> Self {
        self.actions.insert(action.name.clone(), action);
        self
    }

    pub fn task<I, S>(self, name: impl Into<String>, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepSpec>,
    {
        let steps = steps.into_iter().map(Into::into).collect();
        self.task_with_description(name, steps, None)
    }

    pub fn task_with_description(
        mut self,
        name: impl Into<String>,
        steps: Vec<StepSpec>,
        description: Option<String>,
    ) -> Self {
        self.tasks.insert(name.into(), (steps, description));
        self
    }

    /// Resolves every step reference and validates the reference graph.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on invalid actions, duplicate names,
    /// unknown references, empty parallel groups, or cycles.
    pub fn build(self) -> Result<Registry> {
        for action in self.actions.values() {
            if action.command.trim().is_empty() {
                return Err(Error::Config(format!(
                    "action '{}' has an empty command",
                    action.name
                )));
            }
            if action.kind == ActionKind::Transform && action.outputs.is_empty() {
                debug!(action = %action.name, "transform declares no outputs");
            }
        }

        if let Some(name) = self.tasks.keys().find(|n| self.actions.contains_key(*n)) {
            return Err(Error::Config(format!(
                "'{}' is defined as both a task and an action",
                name
            )));
        }

        // Placeholder definitions so references between tasks resolve
        // regardless of declaration order.
        let mut tasks: IndexMap<String, TaskDef> = self
            .tasks
            .keys()
            .map(|name| {
                (
                    name.clone(),
                    TaskDef {
                        name: name.clone(),
                        description: None,
                        steps: Vec::new(),
                    },
                )
            })
            .collect();

        let mut resolved = Vec::with_capacity(self.tasks.len());
        for (name, (specs, description)) in &self.tasks {
            let steps = specs
                .iter()
                .map(|spec| resolve_spec(spec, &tasks, &self.actions))
                .collect::<Result<Vec<_>>>()?;
            if steps.iter().any(is_empty_group) {
                return Err(Error::Config(format!(
                    "task '{}' contains an empty parallel group",
                    name
                )));
            }
            resolved.push((name.clone(), description.clone(), steps));
        }

        for (name, description, steps) in resolved {
            if let Some(task) = tasks.get_mut(&name) {
                task.description = description;
                task.steps = steps;
            }
        }

        let graph = TaskGraph::new(&tasks, &self.actions)?;
        debug!(
            tasks = tasks.len(),
            actions = self.actions.len(),
            "registry built"
        );

        Ok(Registry {
            tasks,
            actions: self.actions,
            graph,
        })
    }
}

fn is_empty_group(step: &Step) -> bool {
    match step {
        Step::Parallel(members) => members.is_empty() || members.iter().any(is_empty_group),
        _ => false,
    }
}

fn resolve_name(
    name: &str,
    tasks: &IndexMap<String, TaskDef>,
    actions: &IndexMap<String, ActionDef>,
) -> Result<Step> {
    if tasks.contains_key(name) {
        Ok(Step::Task(name.to_string()))
    } else if actions.contains_key(name) {
        Ok(Step::Action(name.to_string()))
    } else {
        Err(Error::UnknownStep {
            name: name.to_string(),
            available: available_names(tasks, actions),
        })
    }
}

fn resolve_spec(
    spec: &StepSpec,
    tasks: &IndexMap<String, TaskDef>,
    actions: &IndexMap<String, ActionDef>,
) -> Result<Step> {
    match spec {
        StepSpec::Name(name) => resolve_name(name, tasks, actions),
        StepSpec::Parallel(members) => members
            .iter()
            .map(|m| resolve_spec(m, tasks, actions))
            .collect::<Result<Vec<_>>>()
            .map(Step::Parallel),
    }
}

fn available_names(
    tasks: &IndexMap<String, TaskDef>,
    actions: &IndexMap<String, ActionDef>,
) -> String {
    tasks
        .keys()
        .chain(actions.keys())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn strip_config_prefix(error: &Error) -> String {
    match error {
        Error::Config(message) => message.clone(),
        other => other.to_string(),
    }
}
