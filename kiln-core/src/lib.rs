//! Core library for asset pipeline orchestration.

pub mod adapter;
pub mod change_cache;
pub mod config;
pub mod content_type;
pub mod error;
pub mod executor;
pub mod graph;
pub mod options;
pub mod path_utils;
pub mod process;
pub mod registry;
pub mod release;
pub mod runner;
pub mod watcher;

pub use adapter::{ProjectAdapter, ProjectMetadata};
pub use change_cache::{ChangeCache, Signal, Signals};
pub use config::{ActionKind, Config, StepSpec, CONFIG_FILE_NAME};
pub use content_type::{ContentTypeTable, GENERIC_CONTENT_TYPE};
pub use error::{Error, PublishStage, Result};
pub use executor::{ActionExecutor, ActionOutcome, ActionReport};
pub use graph::{plan, PlanNode, TaskGraph};
pub use options::{Options, RemoteOptions, SignalMode, WatchGroup};
pub use process::{CommandSpec, ProcessOutput, ProcessRunner, SystemProcessRunner};
pub use registry::{ActionDef, Registry, Step, TaskDef};
pub use release::{PublishOutcome, PublishPipeline, PublishReporter, ReleaseManifest};
pub use runner::{RunReport, TaskRunner};
pub use watcher::{ChainRunner, FileWatcher, WatchGroupProfile, WatchLoop};
