//! Task execution engine and orchestration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::config::StepSpec;
use crate::error::{Error, Result};
use crate::executor::{ActionExecutor, ActionOutcome, ActionReport};
use crate::registry::{Registry, Step};

/// Outcome of one `run` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub task: String,
    /// Action reports in completion order.
    pub actions: Vec<ActionReport>,
    pub duration: Duration,
}

impl RunReport {
    pub fn ran(&self) -> usize {
        self.count(|o| matches!(o, ActionOutcome::Ran))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ActionOutcome::Skipped))
    }

    pub fn started(&self) -> usize {
        self.count(|o| matches!(o, ActionOutcome::Started { .. }))
    }

    pub fn outcome(&self, action: &str) -> Option<ActionOutcome> {
        self.actions
            .iter()
            .find(|r| r.name == action)
            .map(|r| r.outcome)
    }

    fn count(&self, predicate: impl Fn(&ActionOutcome) -> bool) -> usize {
        self.actions.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

enum StepError {
    Failed(Error),
    /// Suppressed because another branch already failed.
    Aborted,
}

impl From<Error> for StepError {
    fn from(error: Error) -> Self {
        StepError::Failed(error)
    }
}

type StepResult = std::result::Result<(), StepError>;

/// State shared by every branch of a single invocation.
#[derive(Default)]
struct Invocation {
    /// `None` while running, then whether the action succeeded.
    actions: DashMap<String, Arc<Mutex<Option<bool>>>>,
    reports: Mutex<Vec<ActionReport>>,
    aborted: AtomicBool,
    /// Action whose failure was observed first.
    first_failure: OnceCell<String>,
}

/// Executes tasks from a registry.
///
/// Sequential steps run in order on the calling thread. Every member of a
/// parallel group is spawned onto a dedicated rayon pool and always starts;
/// after a failure only later sequential steps are suppressed.
pub struct TaskRunner {
    registry: Arc<Registry>,
    executor: Arc<ActionExecutor>,
    max_parallel: Option<usize>,
    thread_pool: Option<Arc<rayon::ThreadPool>>,
}

impl TaskRunner {
    pub fn new(registry: Arc<Registry>, executor: ActionExecutor) -> Self {
        Self {
            registry,
            executor: Arc::new(executor),
            max_parallel: None,
            thread_pool: build_pool(None),
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: Option<usize>) -> Self {
        self.max_parallel = max_parallel;
        self.thread_pool = build_pool(max_parallel);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn executor(&self) -> &Arc<ActionExecutor> {
        &self.executor
    }

    /// Runs a task or action by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStep`] for unknown names,
    /// [`Error::CircularReference`] if expansion revisits a task on the call
    /// stack, or the first action failure, tagged with the action's name.
    pub fn run(&self, name: &str) -> Result<RunReport> {
        let step = self.registry.resolve(name)?;
        self.run_steps(name, std::slice::from_ref(&step))
    }

    /// Runs an anonymous sequential chain, such as a watch group's steps.
    pub fn run_chain(&self, label: &str, steps: &[StepSpec]) -> Result<RunReport> {
        let steps = self.registry.resolve_chain(steps)?;
        self.run_steps(label, &steps)
    }

    fn run_steps(&self, label: &str, steps: &[Step]) -> Result<RunReport> {
        let start = Instant::now();
        info!(task = label, "starting");

        let invocation = Invocation::default();
        let mut stack = Vec::new();
        let result = self.run_sequence(steps, &mut stack, &invocation);

        let actions = invocation
            .reports
            .into_inner()
            .map_err(|e| Error::MutexLock(format!("run report lock poisoned: {}", e)))?;

        match result {
            Ok(()) => {
                let report = RunReport {
                    task: label.to_string(),
                    actions,
                    duration: start.elapsed(),
                };
                info!(
                    task = label,
                    ran = report.ran(),
                    skipped = report.skipped(),
                    duration_ms = report.duration.as_millis() as u64,
                    "finished"
                );
                Ok(report)
            }
            Err(StepError::Failed(error)) => Err(error),
            Err(StepError::Aborted) => Err(Error::ActionFailed {
                action: label.to_string(),
                message: "aborted after an earlier failure".to_string(),
            }),
        }
    }

    fn run_sequence(&self, steps: &[Step], stack: &mut Vec<String>, inv: &Invocation) -> StepResult {
        for (index, step) in steps.iter().enumerate() {
            // The first step of a dispatched group member always starts.
            if index > 0 && inv.aborted.load(Ordering::SeqCst) {
                debug!(step = ?step, "suppressed after an earlier failure");
                return Err(StepError::Aborted);
            }
            self.run_step(step, stack, inv)?;
        }
        Ok(())
    }

    fn run_step(&self, step: &Step, stack: &mut Vec<String>, inv: &Invocation) -> StepResult {
        match step {
            Step::Action(name) => self.run_action(name, inv),
            Step::Task(name) => {
                if stack.iter().any(|n| n == name) {
                    return Err(Error::revisited(stack, name).into());
                }
                let task = self.registry.task(name).ok_or_else(|| Error::UnknownStep {
                    name: name.clone(),
                    available: self.registry.available(),
                })?;
                debug!(task = %name, depth = stack.len(), "expanding");
                stack.push(name.clone());
                let result = self.run_sequence(&task.steps, stack, inv);
                stack.pop();
                result
            }
            Step::Parallel(members) => self.run_parallel(members, stack, inv),
        }
    }

    fn run_parallel(&self, members: &[Step], stack: &[String], inv: &Invocation) -> StepResult {
        let mut results: Vec<Option<StepResult>> = members.iter().map(|_| None).collect();
        self.install(|| {
            rayon::scope(|scope| {
                for (member, slot) in members.iter().zip(results.iter_mut()) {
                    let mut branch_stack = stack.to_vec();
                    scope.spawn(move |_| {
                        *slot = Some(self.run_step(member, &mut branch_stack, inv));
                    });
                }
            })
        });

        let mut failures = Vec::new();
        let mut aborted = false;
        for result in results.into_iter().flatten() {
            match result {
                Ok(()) => {}
                Err(StepError::Failed(error)) => failures.push(error),
                Err(StepError::Aborted) => aborted = true,
            }
        }

        if failures.is_empty() {
            return if aborted { Err(StepError::Aborted) } else { Ok(()) };
        }
        let first = inv
            .first_failure
            .get()
            .and_then(|name| failures.iter().position(|e| e.origin() == Some(name.as_str())))
            .unwrap_or(0);
        Err(StepError::Failed(failures.swap_remove(first)))
    }

    fn run_action(&self, name: &str, inv: &Invocation) -> StepResult {
        let slot = inv
            .actions
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        // Held while the action runs, so concurrent requests wait for it.
        let mut state = slot
            .lock()
            .map_err(|e| Error::MutexLock(format!("action slot for '{}' poisoned: {}", name, e)))?;

        match *state {
            Some(true) => return Ok(()),
            Some(false) => {
                return Err(Error::ActionFailed {
                    action: name.to_string(),
                    message: "failed earlier in this run".to_string(),
                }
                .into())
            }
            None => {}
        }

        let action = self.registry.action(name).ok_or_else(|| Error::UnknownStep {
            name: name.to_string(),
            available: self.registry.available(),
        })?;

        match self.executor.execute(action) {
            Ok(report) => {
                *state = Some(true);
                if let ActionOutcome::Skipped = report.outcome {
                    info!(action = name, "up to date");
                }
                inv.reports
                    .lock()
                    .map_err(|e| Error::MutexLock(format!("run report lock poisoned: {}", e)))?
                    .push(report);
                Ok(())
            }
            Err(error) => {
                *state = Some(false);
                let _ = inv.first_failure.set(name.to_string());
                inv.aborted.store(true, Ordering::SeqCst);
                Err(error.into())
            }
        }
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.thread_pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

fn build_pool(max_parallel: Option<usize>) -> Option<Arc<rayon::ThreadPool>> {
    let threads = max_parallel
        .filter(|n| *n > 0)
        .unwrap_or_else(rayon::current_num_threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("kiln-worker-{}", i))
        .build()
        .map(Arc::new)
        .ok()
}
