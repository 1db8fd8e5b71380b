//! Command implementations for the CLI.

mod execution;
mod info;
mod release;
mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use kiln_core::{ActionExecutor, ChangeCache, Config, Options, Registry, TaskRunner};

pub use execution::{cmd_dev, cmd_run};
pub use info::{cmd_clean, cmd_list, cmd_plan};
pub use release::{cmd_release, cmd_upload};
pub use watch::cmd_watch;

/// Everything resolved from `kiln.toml` before a command runs.
pub struct Session {
    pub options: Arc<Options>,
    pub registry: Arc<Registry>,
    pub cache: Arc<ChangeCache>,
}

impl Session {
    pub fn load(config_path: &Path) -> Result<Self> {
        Self::load_with_vars(config_path, &[])
    }

    /// Loads the session with `vars` taking precedence over `[options.vars]`.
    pub fn load_with_vars(config_path: &Path, vars: &[(String, String)]) -> Result<Self> {
        let mut config = Config::load(config_path)?;
        config.options.vars.extend(vars.iter().cloned());
        let project_root = project_root(config_path)?;
        let metadata = kiln_adapters::read_project_metadata(&project_root)
            .with_context(|| format!("Failed to read project metadata in {}", project_root.display()))?;

        let options = Arc::new(Options::resolve(
            &config.options,
            &config.watch,
            &project_root,
            metadata,
        )?);
        let registry = Arc::new(Registry::from_config(&config, &options)?);
        let cache = Arc::new(ChangeCache::load(options.cache_file(), options.signal())?);

        Ok(Self {
            options,
            registry,
            cache,
        })
    }

    pub fn runner(&self, no_cache: bool, parallel: Option<usize>) -> Arc<TaskRunner> {
        let executor = ActionExecutor::new(self.options.project_root())
            .with_cache(Arc::clone(&self.cache))
            .force(no_cache);
        Arc::new(TaskRunner::new(Arc::clone(&self.registry), executor).with_max_parallel(parallel))
    }
}

fn project_root(config_path: &Path) -> Result<PathBuf> {
    let dir = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    dir.canonicalize()
        .with_context(|| format!("Failed to resolve project directory {}", dir.display()))
}
