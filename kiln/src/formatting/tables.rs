//! Table formatting utilities using comfy-table.

use comfy_table::{Cell, Table};
use kiln_core::release::ManifestEntry;
use kiln_core::{ActionDef, ActionOutcome, ActionReport, Step, TaskDef};
use owo_colors::OwoColorize;

use super::output::{format_bytes, format_duration};
use super::status::Status;

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(*h).add_attribute(comfy_table::Attribute::Bold))
                .collect::<Vec<_>>(),
        )
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .set_content_arrangement(comfy_table::ContentArrangement::Dynamic);
    table
}

/// Renders steps as `a → {b, c} → d`.
pub fn describe_steps(steps: &[Step]) -> String {
    steps
        .iter()
        .map(|step| match step {
            Step::Task(name) | Step::Action(name) => name.clone(),
            Step::Parallel(members) => {
                let members: Vec<String> = members
                    .iter()
                    .map(|m| describe_steps(std::slice::from_ref(m)))
                    .collect();
                format!("{{{}}}", members.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Prints one row per executed action, in completion order.
pub fn print_report_table(reports: &[ActionReport]) {
    if reports.is_empty() {
        println!("  {} {}", "→".cyan(), "(no actions)".bright_black());
        return;
    }

    let mut table = new_table(&["Status", "Action", "Kind", "Result", "Duration"]);
    for report in reports {
        let status = Status::of(&report.outcome);
        let color = status.table_color();
        let result = match report.outcome {
            ActionOutcome::Started { pid } => format!("started (pid {})", pid),
            other => other.as_str().to_string(),
        };
        table.add_row(vec![
            Cell::new(status.symbol()).fg(color),
            Cell::new(&report.name).fg(comfy_table::Color::White),
            Cell::new(report.kind.as_str()).fg(comfy_table::Color::DarkGrey),
            Cell::new(result).fg(color),
            Cell::new(format_duration(report.duration.as_secs_f64())),
        ]);
    }

    println!("{}", table);
}

pub fn print_task_table(tasks: &[&TaskDef]) {
    let mut table = new_table(&["Task", "Steps", "Description"]);
    for task in tasks {
        table.add_row(vec![
            Cell::new(&task.name).fg(comfy_table::Color::White),
            Cell::new(describe_steps(&task.steps)),
            Cell::new(task.description.as_deref().unwrap_or("")).fg(comfy_table::Color::DarkGrey),
        ]);
    }
    println!("{}", table);
}

pub fn print_action_table(actions: &[&ActionDef]) {
    let mut table = new_table(&["Action", "Kind", "Command"]);
    for action in actions {
        table.add_row(vec![
            Cell::new(&action.name).fg(comfy_table::Color::White),
            Cell::new(action.kind.as_str()).fg(comfy_table::Color::DarkGrey),
            Cell::new(&action.command),
        ]);
    }
    println!("{}", table);
}

pub fn print_artifact_table(entries: &[ManifestEntry]) {
    let mut table = new_table(&["Artifact", "Content Type", "Size", "Remote Key"]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(&entry.path).fg(comfy_table::Color::White),
            Cell::new(&entry.content_type).fg(comfy_table::Color::DarkGrey),
            Cell::new(format_bytes(entry.size)),
            Cell::new(&entry.remote_key).fg(comfy_table::Color::Cyan),
        ]);
    }
    println!("{}", table);
}
