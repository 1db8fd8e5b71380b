//! Task execution commands.

use std::path::Path;

use anyhow::Result;
use kiln_core::RunReport;

use crate::formatting::{
    create_spinner, format_duration, print_report_table, print_section_header,
    print_separator_with_spacing, print_success, print_summary_box, SectionStyle,
};

use super::{watch, Session};

const DEFAULT_TASK: &str = "default";

fn run_task(session: &Session, task: &str, no_cache: bool, parallel: Option<usize>) -> Result<RunReport> {
    let runner = session.runner(no_cache, parallel);

    print_section_header(&format!("Running {}", task), SectionStyle::Primary);
    let spinner = create_spinner(&format!("{}...", task));
    let result = runner.run(task);
    spinner.finish_and_clear();
    let report = result?;

    print_report_table(&report.actions);
    print_separator_with_spacing();
    print_summary_box(
        "Summary",
        &[
            ("Duration", &format_duration(report.duration.as_secs_f64())),
            ("Ran", &report.ran().to_string()),
            ("Up to date", &report.skipped().to_string()),
            ("Started", &report.started().to_string()),
        ],
    );
    println!();
    Ok(report)
}

pub fn cmd_run(
    config: &Path,
    task: &str,
    no_cache: bool,
    parallel: Option<usize>,
    vars: &[(String, String)],
) -> Result<()> {
    let session = Session::load_with_vars(config, vars)?;
    run_task(&session, task, no_cache, parallel)?;
    print_success(&format!("{} finished", task));
    Ok(())
}

pub fn cmd_dev(config: &Path, no_cache: bool) -> Result<()> {
    let session = Session::load(config)?;
    run_task(&session, DEFAULT_TASK, no_cache, None)?;
    watch::watch_session(&session, no_cache)
}
