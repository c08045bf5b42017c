//! `tctx resource` subcommands.
//!
//! Resources are addressed by numeric id, tasks by code.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use task_context_core::models::{AssignmentReport, AssignmentStatus, NewResource, ResourceId, TaskId};

use crate::config::Config;
use crate::engine::{open_engine, SqliteEngine};
use crate::output::{format_ts, preview, print_json};

pub async fn run_add(
    config: &Config,
    text: Option<String>,
    file: Option<PathBuf>,
    source: &str,
    source_type: &str,
    summary: Option<String>,
    json: bool,
) -> Result<()> {
    let text = match (text, file) {
        (Some(text), None) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (Some(_), Some(_)) => bail!("Pass either TEXT or --file, not both"),
        (None, None) => bail!("Resource text is required (TEXT or --file)"),
    };
    if text.trim().is_empty() {
        bail!("Resource text is empty");
    }

    let engine = open_engine(config).await?;
    let mut new = NewResource::new(text, source);
    new.source_type = source_type.to_string();
    if let Some(summary) = summary {
        new = new.summary(summary);
    }

    let resource = engine.add_resource(&new).await?;

    if json {
        print_json(&resource)?;
    } else {
        println!("Added resource #{} from {}", resource.id, resource.source);
    }
    Ok(())
}

async fn resolve_codes(engine: &SqliteEngine, codes: &[String]) -> Result<Vec<TaskId>> {
    let mut ids = Vec::with_capacity(codes.len());
    for code in codes {
        ids.push(engine.get_task_by_code(code).await?.id);
    }
    Ok(ids)
}

fn print_report(report: &AssignmentReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    println!(
        "{} assignment{} created, {} skipped",
        report.created.len(),
        if report.created.len() == 1 { "" } else { "s" },
        report.skipped.len()
    );
    Ok(())
}

pub async fn run_assign(
    config: &Config,
    resource_id: ResourceId,
    codes: Vec<String>,
    by: Option<String>,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let task_ids = resolve_codes(&engine, &codes).await?;
    let report = engine
        .assign_resource(resource_id, &task_ids, by.as_deref())
        .await?;
    print_report(&report, json)
}

pub async fn run_bulk_assign(
    config: &Config,
    code: &str,
    resource_ids: Vec<ResourceId>,
    by: Option<String>,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let task = engine.get_task_by_code(code).await?;
    let report = engine
        .bulk_assign(&resource_ids, task.id, by.as_deref())
        .await?;
    print_report(&report, json)
}

pub async fn run_unassign(
    config: &Config,
    resource_id: ResourceId,
    code: &str,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let task = engine.get_task_by_code(code).await?;
    let removed = engine.unassign_resource(resource_id, task.id).await?;

    if json {
        return print_json(&serde_json::json!({ "removed": removed }));
    }
    if removed {
        println!("Unassigned #{} from {}", resource_id, task.code);
    } else {
        println!("#{} was not assigned to {}", resource_id, task.code);
    }
    Ok(())
}

pub async fn run_list(
    config: &Config,
    status: Option<String>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let status = status.map(|s| s.parse::<AssignmentStatus>()).transpose()?;
    let resources = engine.list_resources(status, limit).await?;

    if json {
        return print_json(&resources);
    }
    if resources.is_empty() {
        println!("No resources.");
        return Ok(());
    }

    println!(
        "{:<7} {:<11} {:>5}  {:<16} {}",
        "ID", "STATUS", "TASKS", "ADDED", "PREVIEW"
    );
    println!("{}", "-".repeat(80));
    for r in &resources {
        let label = r.resource.summary.as_deref().unwrap_or(&r.resource.text);
        println!(
            "{:<7} {:<11} {:>5}  {:<16} {}",
            r.resource.id,
            r.resource.assignment_status.as_str(),
            r.task_count,
            format_ts(r.resource.created_at),
            preview(label, 40)
        );
    }
    Ok(())
}

pub async fn run_tasks(config: &Config, resource_id: ResourceId, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let resource = engine.get_resource(resource_id).await?;
    let tasks = engine.get_resource_tasks(resource_id).await?;

    if json {
        return print_json(&serde_json::json!({
            "resource": resource,
            "tasks": tasks,
        }));
    }

    println!("#{} [{}] {}", resource.id, resource.assignment_status, resource.source);
    if tasks.is_empty() {
        println!("  Not assigned to any task.");
        return Ok(());
    }
    for rt in &tasks {
        let edge = if rt.assignment.edge.is_inherited() {
            "inherited"
        } else {
            "direct"
        };
        println!(
            "  {:<12} {:<9} {}  {}",
            rt.task.code,
            edge,
            format_ts(rt.assignment.assigned_at),
            rt.task.title
        );
    }
    Ok(())
}

pub async fn run_inherit(
    config: &Config,
    code: &str,
    by: Option<String>,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let task = engine.get_task_by_code(code).await?;
    let report = engine.inherit_parent_resources(task.id, by.as_deref()).await?;

    if json {
        return print_json(&report);
    }
    println!(
        "{} inherited {} resource{}",
        task.code,
        report.inherited_count,
        if report.inherited_count == 1 { "" } else { "s" }
    );
    for r in &report.resources {
        println!("  #{:<6} from {}", r.resource.id, r.source_task_code);
    }
    Ok(())
}

pub async fn run_set_archived(
    config: &Config,
    resource_id: ResourceId,
    archived: bool,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let resource = if archived {
        engine.archive_resource(resource_id).await?
    } else {
        engine.restore_resource(resource_id).await?
    };

    if json {
        print_json(&resource)?;
    } else {
        println!("#{} is now {}", resource.id, resource.assignment_status);
    }
    Ok(())
}
