//! Inspection and maintenance commands.

use std::path::Path;

use anyhow::Result;
use kiln_core::{plan, PlanNode};
use owo_colors::OwoColorize;
use serde_json::{json, Value};

use crate::formatting::{
    describe_steps, print_action_table, print_key_value, print_section_header, print_status,
    print_success, print_task_table, SectionStyle, Status,
};

use super::Session;

fn plan_json(node: &PlanNode) -> Value {
    match node {
        PlanNode::Task { name, children } => json!({
            "task": name,
            "steps": children.iter().map(plan_json).collect::<Vec<_>>(),
        }),
        PlanNode::Action { name, kind } => json!({ "action": name, "kind": kind.as_str() }),
        PlanNode::Parallel(members) => {
            json!({ "parallel": members.iter().map(plan_json).collect::<Vec<_>>() })
        }
    }
}

fn print_plan_node(node: &PlanNode, depth: usize) {
    let indent = "  ".repeat(depth + 1);
    match node {
        PlanNode::Task { name, children } => {
            println!("{}{} {}", indent, "▸".cyan(), name.bold().cyan());
            for child in children {
                print_plan_node(child, depth + 1);
            }
        }
        PlanNode::Action { name, kind } => {
            println!(
                "{}{} {} {}",
                indent,
                "→".bright_black(),
                name.bold().white(),
                format!("({})", kind.as_str()).bright_black()
            );
        }
        PlanNode::Parallel(members) => {
            println!("{}{}", indent, "parallel".yellow());
            for member in members {
                print_plan_node(member, depth + 1);
            }
        }
    }
}

pub fn cmd_plan(config: &Path, task: &str, json: bool) -> Result<()> {
    let session = Session::load(config)?;
    let tree = plan(&session.registry, task)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan_json(&tree))?);
        return Ok(());
    }

    print_section_header(&format!("Plan for {}", task), SectionStyle::Primary);
    print_plan_node(&tree, 0);
    println!();
    print_key_value("Actions", &tree.actions().len().to_string());
    println!();
    Ok(())
}

pub fn cmd_list(config: &Path, json: bool) -> Result<()> {
    let session = Session::load(config)?;
    let registry = &session.registry;

    if json {
        let tasks: Vec<Value> = registry
            .tasks()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "steps": describe_steps(&t.steps),
                })
            })
            .collect();
        let actions: Vec<Value> = registry
            .actions()
            .map(|a| json!({ "name": a.name, "kind": a.kind.as_str(), "command": a.command }))
            .collect();
        let watch: Vec<Value> = session
            .options
            .watch_groups()
            .iter()
            .map(|g| json!({ "name": g.name, "files": g.patterns }))
            .collect();
        let listing = json!({ "tasks": tasks, "actions": actions, "watch": watch });
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    print_section_header("Tasks", SectionStyle::Primary);
    let tasks: Vec<_> = registry.tasks().collect();
    if tasks.is_empty() {
        print_status(Status::Skipped, "No tasks defined");
    } else {
        print_task_table(&tasks);
    }
    println!();

    print_section_header("Actions", SectionStyle::Primary);
    let actions: Vec<_> = registry.actions().collect();
    if actions.is_empty() {
        print_status(Status::Skipped, "No actions defined");
    } else {
        print_action_table(&actions);
    }
    println!();

    let groups = session.options.watch_groups();
    if !groups.is_empty() {
        print_section_header("Watch Groups", SectionStyle::Secondary);
        for group in groups {
            print_key_value(&group.name, &group.patterns.join(", "));
        }
        println!();
    }
    Ok(())
}

pub fn cmd_clean(config: &Path) -> Result<()> {
    let session = Session::load(config)?;
    let scopes = session.cache.scopes().len();
    session.cache.clear()?;
    print_success(&format!(
        "Cleared change cache ({} actions) at {}",
        scopes,
        session.options.cache_file().display()
    ));
    Ok(())
}
