//! Trait for reporting publish progress.

use tracing::info;

use crate::error::PublishStage;

use super::manifest::ManifestEntry;

/// Lets the core report publish progress without writing to the terminal
/// itself.
pub trait PublishReporter: Send + Sync {
    fn stage_started(&self, stage: PublishStage);

    /// `detail` is a short human readable summary of what the stage produced.
    fn stage_finished(&self, stage: PublishStage, detail: &str);

    /// A stage that was not run, such as the release command when none is set.
    fn stage_skipped(&self, stage: PublishStage, reason: &str);

    /// Called after each object is stored; `index` is 1-based.
    fn entry_uploaded(&self, entry: &ManifestEntry, index: usize, total: usize);
}

/// Reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl PublishReporter for LogReporter {
    fn stage_started(&self, stage: PublishStage) {
        info!(stage = stage.as_str(), "publish stage started");
    }

    fn stage_finished(&self, stage: PublishStage, detail: &str) {
        info!(stage = stage.as_str(), detail, "publish stage finished");
    }

    fn stage_skipped(&self, stage: PublishStage, reason: &str) {
        info!(stage = stage.as_str(), reason, "publish stage skipped");
    }

    fn entry_uploaded(&self, entry: &ManifestEntry, index: usize, total: usize) {
        info!(key = %entry.remote_key, content_type = %entry.content_type, index, total, "uploaded");
    }
}
