//! Release and upload commands.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use indicatif::ProgressBar;
use kiln_core::release::ManifestEntry;
use kiln_core::{PublishOutcome, PublishPipeline, PublishReporter, PublishStage};

use crate::formatting::{
    create_progress_bar, format_bytes, print_artifact_table, print_section_header,
    print_separator_with_spacing, print_status, print_success, print_summary_box, SectionStyle,
    Status,
};

use super::Session;

/// Prints stage progress and drives an upload progress bar.
#[derive(Default)]
struct CliPublishReporter {
    upload_bar: Mutex<Option<ProgressBar>>,
}

impl PublishReporter for CliPublishReporter {
    fn stage_started(&self, stage: PublishStage) {
        print_status(Status::Running, &format!("{}...", stage));
    }

    fn stage_finished(&self, stage: PublishStage, detail: &str) {
        if let Ok(mut bar) = self.upload_bar.lock() {
            if let Some(bar) = bar.take() {
                bar.finish_and_clear();
            }
        }
        print_success(&format!("{}: {}", stage, detail));
    }

    fn stage_skipped(&self, stage: PublishStage, reason: &str) {
        print_status(Status::Skipped, &format!("{} skipped ({})", stage, reason));
    }

    fn entry_uploaded(&self, entry: &ManifestEntry, index: usize, total: usize) {
        if let Ok(mut bar) = self.upload_bar.lock() {
            let bar = bar.get_or_insert_with(|| {
                let bar = create_progress_bar(total as u64);
                bar.set_message("Uploading...");
                bar
            });
            bar.set_position(index as u64);
            bar.set_message(entry.remote_key.clone());
        }
    }
}

fn pipeline(session: &Session, dry_run: bool) -> PublishPipeline {
    PublishPipeline::new(Arc::clone(&session.options), session.runner(false, None))
        .with_reporter(Arc::new(CliPublishReporter::default()))
        .dry_run(dry_run)
}

fn print_outcome(outcome: &PublishOutcome) {
    println!();
    print_artifact_table(outcome.manifest.entries());
    print_separator_with_spacing();

    let artifacts = outcome.manifest.entries().len().to_string();
    let total_size = format_bytes(outcome.manifest.total_size());
    let manifest = outcome.manifest_path.display().to_string();
    let uploaded = outcome.uploaded.to_string();
    let mut items = vec![
        ("Version", outcome.manifest.version()),
        ("Artifacts", artifacts.as_str()),
        ("Total size", total_size.as_str()),
        ("Manifest", manifest.as_str()),
    ];
    let archive = outcome
        .archive
        .as_ref()
        .map(|a| format!("{} ({})", a.path.display(), format_bytes(a.size)));
    if let Some(archive) = &archive {
        items.push(("Archive", archive.as_str()));
    }
    items.push(("Uploaded", uploaded.as_str()));
    print_summary_box("Summary", &items);
    println!();
}

pub fn cmd_release(config: &Path, version: Option<&str>, dry_run: bool) -> Result<()> {
    let session = Session::load(config)?;
    let pipeline = pipeline(&session, dry_run);
    let version = pipeline.resolve_version(version)?;

    let title = if dry_run {
        format!("Release {} (Dry Run)", version)
    } else {
        format!("Release {}", version)
    };
    print_section_header(&title, SectionStyle::Primary);

    let outcome = pipeline.publish(Some(&version))?;
    print_outcome(&outcome);
    if !dry_run {
        print_success(&format!("Released {}", version));
    }
    Ok(())
}

pub fn cmd_upload(config: &Path, version: Option<&str>) -> Result<()> {
    let session = Session::load(config)?;
    let pipeline = pipeline(&session, false);
    let version = pipeline.resolve_version(version)?;

    print_section_header(&format!("Upload {}", version), SectionStyle::Primary);
    let outcome = pipeline.upload_only(Some(&version))?;
    print_outcome(&outcome);
    print_success(&format!("Uploaded {} objects", outcome.uploaded));
    Ok(())
}
