//! Publish pipeline: build, manifest, pre-archive command, archive, release
//! command, upload.
//!
//! Stages run strictly in order and the first failure stops the pipeline.
//! Nothing is rolled back: the archive and manifest stay on disk after a
//! failed release command, and objects already uploaded stay uploaded.

pub mod archive;
pub mod credentials;
pub mod manifest;
pub mod reporter;
pub mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use semver::Version;
use tracing::debug;

use crate::error::{Error, PublishStage, Result};
use crate::options::Options;
use crate::process::{CommandSpec, ProcessRunner};
use crate::runner::TaskRunner;

pub use archive::{create_archive, list_archive, ArchiveInfo};
pub use credentials::{
    CredentialChain, CredentialProvider, Credentials, EnvProvider, FileProvider, PromptProvider,
};
pub use manifest::{remote_key, ManifestEntry, ReleaseManifest};
pub use reporter::{LogReporter, PublishReporter};
pub use storage::{open_store, FilesystemStore, ObjectStore, S3Store};

/// Directory under the project root holding archives and manifests.
pub const RELEASE_DIR: &str = ".kiln/release";

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub manifest: ReleaseManifest,
    pub manifest_path: PathBuf,
    /// `None` in upload-only mode.
    pub archive: Option<ArchiveInfo>,
    /// Objects stored; zero for a dry run.
    pub uploaded: usize,
}

pub struct PublishPipeline {
    options: Arc<Options>,
    runner: Arc<TaskRunner>,
    process: Arc<dyn ProcessRunner>,
    credentials: CredentialChain,
    reporter: Arc<dyn PublishReporter>,
    store: Option<Arc<dyn ObjectStore>>,
    dry_run: bool,
}

impl PublishPipeline {
    pub fn new(options: Arc<Options>, runner: Arc<TaskRunner>) -> Self {
        let process = Arc::clone(runner.executor().process_runner());
        let credentials = CredentialChain::standard(options.credentials_file());
        Self {
            options,
            runner,
            process,
            credentials,
            reporter: Arc::new(LogReporter),
            store: None,
            dry_run: false,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn PublishReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialChain) -> Self {
        self.credentials = credentials;
        self
    }

    /// Uses `store` instead of the one named by `remote_endpoint`.
    pub fn with_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_process_runner(mut self, process: Arc<dyn ProcessRunner>) -> Self {
        self.process = process;
        self
    }

    /// Stops after the archive stage.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Version to publish: `requested`, else the project version. Must be semver.
    pub fn resolve_version(&self, requested: Option<&str>) -> Result<String> {
        let version = requested
            .map(str::to_string)
            .or_else(|| self.options.project().version.clone())
            .ok_or_else(|| {
                Error::Config(
                    "no version given and the project manifest declares none".to_string(),
                )
            })?;
        let version = version.trim().trim_start_matches('v').to_string();
        Version::parse(&version)
            .map_err(|e| Error::Config(format!("invalid release version '{}': {}", version, e)))?;
        Ok(version)
    }

    pub fn release_dir(&self, version: &str) -> PathBuf {
        self.options.project_root().join(RELEASE_DIR).join(version)
    }

    pub fn archive_path(&self, version: &str) -> PathBuf {
        self.release_dir(version)
            .join(format!("{}-{}.tar.zst", self.options.archive_name(), version))
    }

    pub fn manifest_path(&self, version: &str) -> PathBuf {
        self.release_dir(version).join("manifest.json")
    }

    /// Runs every stage for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Publish`] tagged with the failing stage, or
    /// [`Error::CredentialMissing`] if upload credentials cannot be resolved.
    pub fn publish(&self, version: Option<&str>) -> Result<PublishOutcome> {
        let version = self.resolve_version(version)?;

        self.stage(PublishStage::Build, || {
            let report = self.runner.run(self.options.build_task())?;
            Ok(format!(
                "{}: {} ran, {} up to date",
                report.task,
                report.ran(),
                report.skipped()
            ))
        })?;

        let manifest = self.build_manifest(&version)?;
        let manifest_path = self.manifest_path(&version);

        self.run_pre_archive_command(&version)?;

        let archive_path = self.archive_path(&version);
        let archive = self.stage(PublishStage::Archive, || {
            let info = create_archive(self.options.output_dir(), &archive_path)?;
            manifest.write_json(&manifest_path)?;
            Ok(info)
        })?;

        if self.dry_run {
            self.reporter
                .stage_skipped(PublishStage::Release, "dry run");
            self.reporter.stage_skipped(PublishStage::Upload, "dry run");
            return Ok(PublishOutcome {
                manifest,
                manifest_path,
                archive: Some(archive),
                uploaded: 0,
            });
        }

        self.run_release_command(&version, &archive)?;
        let uploaded = self.upload(&manifest)?;

        Ok(PublishOutcome {
            manifest,
            manifest_path,
            archive: Some(archive),
            uploaded,
        })
    }

    /// Builds the manifest from the current output directory and uploads it.
    pub fn upload_only(&self, version: Option<&str>) -> Result<PublishOutcome> {
        let version = self.resolve_version(version)?;
        let manifest = self.build_manifest(&version)?;
        let manifest_path = self.manifest_path(&version);
        manifest
            .write_json(&manifest_path)
            .map_err(|e| Error::publish(PublishStage::Manifest, e.to_string()))?;
        let uploaded = if self.dry_run {
            self.reporter.stage_skipped(PublishStage::Upload, "dry run");
            0
        } else {
            self.upload(&manifest)?
        };
        Ok(PublishOutcome {
            manifest,
            manifest_path,
            archive: None,
            uploaded,
        })
    }

    fn build_manifest(&self, version: &str) -> Result<ReleaseManifest> {
        self.stage(PublishStage::Manifest, || {
            ReleaseManifest::build(
                self.options.output_dir(),
                version,
                self.options.content_types(),
                &self.options.remote().prefix,
            )
        })
    }

    /// Runs `pre_archive_command` with the version, so it can record
    /// release metadata that ends up in the archive.
    fn run_pre_archive_command(&self, version: &str) -> Result<()> {
        let Some(command) = self.options.pre_archive_command() else {
            self.reporter
                .stage_skipped(PublishStage::PreArchive, "no pre_archive_command configured");
            return Ok(());
        };

        let spec = CommandSpec::new("pre-archive", command, self.options.project_root())
            .env("KILN_VERSION", version)
            .arg(version);
        self.stage(PublishStage::PreArchive, || self.run_command(spec))?;
        Ok(())
    }

    fn run_release_command(&self, version: &str, archive: &ArchiveInfo) -> Result<()> {
        let Some(command) = self.options.release_command() else {
            self.reporter
                .stage_skipped(PublishStage::Release, "no release_command configured");
            return Ok(());
        };

        let archive_location = archive.path.display().to_string();
        let spec = CommandSpec::new("release", command, self.options.project_root())
            .env("KILN_VERSION", version)
            .env("KILN_ARCHIVE", archive_location.clone())
            .arg(version)
            .arg(archive_location);
        self.stage(PublishStage::Release, || self.run_command(spec))?;
        Ok(())
    }

    fn run_command(&self, spec: CommandSpec) -> Result<String> {
        let output = self.process.run(&spec)?;
        if !output.success {
            return Err(Error::ActionFailed {
                action: spec.label.clone(),
                message: output.failure_message(),
            });
        }
        Ok(format!("{} {}", spec.command, spec.args.join(" ")))
    }

    fn upload(&self, manifest: &ReleaseManifest) -> Result<usize> {
        self.reporter.stage_started(PublishStage::Upload);

        let store = match &self.store {
            Some(store) => Arc::clone(store),
            None => open_store(self.options.remote(), self.options.project_root(), || {
                self.credentials.resolve()
            })
            .map_err(|e| match e {
                Error::CredentialMissing(_) => e,
                other => Error::publish(PublishStage::Upload, other.to_string()),
            })?,
        };
        debug!(store = %store.describe(), entries = manifest.entries().len(), "uploading");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::publish(PublishStage::Upload, format!("Failed to start runtime: {}", e)))?;

        let total = manifest.entries().len();
        let uploaded = runtime.block_on(async {
            for (index, entry) in manifest.entries().iter().enumerate() {
                let body = tokio::fs::read(manifest.source_path(entry)).await.map_err(|e| {
                    Error::publish(PublishStage::Upload, format!("{}: {}", entry.path, e))
                })?;
                store
                    .put_object(&entry.remote_key, body, &entry.content_type)
                    .await
                    .map_err(|e| Error::publish(PublishStage::Upload, e.to_string()))?;
                self.reporter.entry_uploaded(entry, index + 1, total);
            }
            Ok::<usize, Error>(total)
        })?;

        self.reporter.stage_finished(
            PublishStage::Upload,
            &format!("{} objects to {}", uploaded, store.describe()),
        );
        Ok(uploaded)
    }

    /// Runs one stage, tagging failures with it and reporting progress.
    fn stage<T: StageDetail>(&self, stage: PublishStage, run: impl FnOnce() -> Result<T>) -> Result<T> {
        self.reporter.stage_started(stage);
        match run() {
            Ok(value) => {
                self.reporter.stage_finished(stage, &value.detail());
                Ok(value)
            }
            Err(Error::Publish { stage, message }) => Err(Error::Publish { stage, message }),
            Err(e) => Err(Error::publish(stage, e.to_string())),
        }
    }
}

trait StageDetail {
    fn detail(&self) -> String;
}

impl StageDetail for String {
    fn detail(&self) -> String {
        self.clone()
    }
}

impl StageDetail for ReleaseManifest {
    fn detail(&self) -> String {
        format!("{} artifacts, {} bytes", self.entries().len(), self.total_size())
    }
}

impl StageDetail for ArchiveInfo {
    fn detail(&self) -> String {
        format!("{} ({} bytes)", self.path.display(), self.size)
    }
}
