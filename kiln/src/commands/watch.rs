//! Watch mode command.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use kiln_core::{FileWatcher, WatchGroupProfile, WatchLoop};

use crate::formatting::{
    print_key_value, print_section_header, print_status, print_success, SectionStyle, Status,
};

use super::Session;

pub fn cmd_watch(config: &Path, no_cache: bool) -> Result<()> {
    let session = Session::load(config)?;
    watch_session(&session, no_cache)
}

pub(super) fn watch_session(session: &Session, no_cache: bool) -> Result<()> {
    let groups = session.options.watch_groups();
    if groups.is_empty() {
        print_status(Status::Skipped, "No watch groups configured");
        return Ok(());
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let profiles = groups
        .iter()
        .map(WatchGroupProfile::compile)
        .collect::<kiln_core::Result<Vec<_>>>()?;

    let watcher = FileWatcher::new(session.options.project_root())?;
    let runner = session.runner(no_cache, None);
    let watch_loop = WatchLoop::start(
        watcher.root(),
        profiles,
        runner,
        session.options.debounce_window(),
        Arc::clone(&stop),
    )?;

    print_section_header("Watch Mode", SectionStyle::Primary);
    print_key_value("Watching", &watcher.root().display().to_string());
    print_key_value("Groups", &watch_loop.group_names().join(", "));
    print_key_value(
        "Debounce",
        &format!("{}ms", session.options.debounce_window().as_millis()),
    );
    println!("  Press Ctrl+C to stop");
    println!();

    let result = watch_loop.run(&watcher);

    println!();
    print_status(Status::Running, "Stopping watch mode...");
    watch_loop.shutdown();
    result?;
    print_success("Watch mode stopped");
    Ok(())
}
