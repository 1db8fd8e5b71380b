//! File watching and per-group re-triggering for incremental rebuilds.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use notify::Config as NotifyConfig;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::config::StepSpec;
use crate::error::{Error, Result};
use crate::options::WatchGroup;
use crate::path_utils::relative_slash;
use crate::runner::TaskRunner;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Recursive file-system watcher over the project root.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    receiver: Receiver<notify::Result<Event>>,
    root: PathBuf,
}

impl FileWatcher {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|e| Error::Watch(format!("Failed to resolve {}: {}", root.as_ref().display(), e)))?;
        let (tx, rx) = channel::unbounded();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                // The receiver is gone only during shutdown.
                let _ = tx.send(res);
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::Watch(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| Error::Watch(format!("Failed to watch {}: {}", root.display(), e)))?;

        Ok(Self {
            _watcher: watcher,
            receiver: rx,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Waits up to `timeout` for the next event.
    pub fn next_event(&self, timeout: Duration) -> Result<Option<Event>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(Ok(event)) => Ok(Some(event)),
            Ok(Err(e)) => Err(Error::Watch(format!("Watcher error: {}", e))),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Watch("Watcher channel disconnected".to_string()))
            }
        }
    }
}

/// Compiled glob patterns of one watch group.
#[derive(Clone)]
pub struct WatchGroupProfile {
    name: String,
    patterns: GlobSet,
    steps: Vec<StepSpec>,
}

impl fmt::Debug for WatchGroupProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchGroupProfile")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl WatchGroupProfile {
    pub fn compile(group: &WatchGroup) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &group.patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    Error::Config(format!(
                        "watch group '{}' has invalid pattern '{}': {}",
                        group.name, pattern, e
                    ))
                })?;
            builder.add(glob);
        }
        let patterns = builder
            .build()
            .map_err(|e| Error::Config(format!("watch group '{}': {}", group.name, e)))?;

        Ok(Self {
            name: group.name.clone(),
            patterns,
            steps: group.steps.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    /// Matches a path relative to the project root, e.g. `"lib/img/a.png"`.
    pub fn matches(&self, rel_path: &str) -> bool {
        self.patterns.is_match(rel_path)
    }
}

/// Runs the step chain bound to a watch group.
pub trait ChainRunner: Send + Sync {
    fn run_chain(&self, group: &str, steps: &[StepSpec]) -> Result<()>;
}

impl ChainRunner for TaskRunner {
    fn run_chain(&self, group: &str, steps: &[StepSpec]) -> Result<()> {
        TaskRunner::run_chain(self, group, steps).map(|_| ())
    }
}

struct GroupWorker {
    profile: Arc<WatchGroupProfile>,
    trigger: Sender<()>,
    handle: JoinHandle<()>,
}

/// One debounced worker thread per watch group.
///
/// Groups never block each other. A trigger arriving while a group's chain is
/// running queues exactly one follow-up run.
pub struct WatchLoop {
    root: PathBuf,
    workers: Vec<GroupWorker>,
    stop: Arc<AtomicBool>,
}

impl WatchLoop {
    pub fn start(
        root: impl Into<PathBuf>,
        profiles: Vec<WatchGroupProfile>,
        runner: Arc<dyn ChainRunner>,
        debounce: Duration,
        stop: Arc<AtomicBool>,
    ) -> Result<Self> {
        let mut workers = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let profile = Arc::new(profile);
            let (trigger, triggers) = channel::unbounded();
            let worker_profile = Arc::clone(&profile);
            let worker_runner = Arc::clone(&runner);
            let worker_stop = Arc::clone(&stop);
            let handle = thread::Builder::new()
                .name(format!("kiln-watch-{}", profile.name()))
                .spawn(move || {
                    group_worker(&worker_profile, worker_runner.as_ref(), &triggers, debounce, &worker_stop)
                })?;
            workers.push(GroupWorker {
                profile,
                trigger,
                handle,
            });
        }

        Ok(Self {
            root: root.into(),
            workers,
            stop,
        })
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.workers.iter().map(|w| w.profile.name()).collect()
    }

    /// Triggers every group whose patterns match `path`. Returns how many.
    pub fn dispatch(&self, path: &Path) -> usize {
        let rel = if path.is_absolute() {
            match relative_slash(&self.root, path) {
                Some(rel) => rel,
                None => return 0,
            }
        } else {
            path.to_string_lossy().replace('\\', "/")
        };
        self.dispatch_relative(&rel)
    }

    pub fn dispatch_relative(&self, rel_path: &str) -> usize {
        let mut triggered = 0;
        for worker in &self.workers {
            if worker.profile.matches(rel_path) && worker.trigger.send(()).is_ok() {
                debug!(group = worker.profile.name(), path = rel_path, "triggered");
                triggered += 1;
            }
        }
        triggered
    }

    /// Feeds watcher events to the groups until the stop flag is set.
    pub fn run(&self, watcher: &FileWatcher) -> Result<()> {
        while !self.stop.load(Ordering::SeqCst) {
            match watcher.next_event(STOP_POLL_INTERVAL) {
                Ok(Some(event)) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        continue;
                    }
                    for path in &event.paths {
                        self.dispatch(path);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "watcher error"),
            }
        }
        Ok(())
    }

    /// Stops new runs and waits for running chains to finish.
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::SeqCst);
        for worker in self.workers {
            drop(worker.trigger);
            if worker.handle.join().is_err() {
                warn!(group = worker.profile.name(), "watch worker panicked");
            }
        }
    }
}

fn group_worker(
    profile: &WatchGroupProfile,
    runner: &dyn ChainRunner,
    triggers: &Receiver<()>,
    debounce: Duration,
    stop: &AtomicBool,
) {
    loop {
        match triggers.recv_timeout(STOP_POLL_INTERVAL) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }

        // Collapse the burst: wait until no trigger arrives for a full window.
        loop {
            match triggers.recv_timeout(debounce) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        if stop.load(Ordering::SeqCst) {
            return;
        }

        info!(group = profile.name(), "change detected");
        if let Err(e) = runner.run_chain(profile.name(), profile.steps()) {
            warn!(group = profile.name(), error = %e, "watch chain failed");
        }
    }
}
