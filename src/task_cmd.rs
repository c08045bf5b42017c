//! `tctx task` subcommands.
//!
//! Tasks are addressed by code. Every command opens the engine, runs one
//! operation (one transaction), and prints the result as text or JSON.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;

use task_context_core::models::{
    AssignedResource, NewTask, Priority, Task, TaskFilter, TaskPatch, TaskStatus, TreeNode,
};

use crate::config::Config;
use crate::engine::open_engine;
use crate::output::{format_ts, print_json, print_task_table, task_line};

#[derive(Args, Debug)]
pub struct TaskAddArgs {
    /// Task title.
    pub title: String,

    /// Explicit code (e.g. `API-001`). Generated from `[tasks]` when omitted.
    #[arg(long)]
    pub code: Option<String>,

    /// Code of the parent task.
    #[arg(long)]
    pub parent: Option<String>,

    /// low | medium | high | urgent
    #[arg(long, default_value = "medium")]
    pub priority: String,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub owner: Option<String>,

    /// Due date (YYYY-MM-DD).
    #[arg(long)]
    pub due: Option<String>,
}

#[derive(Args, Debug)]
pub struct TaskUpdateArgs {
    /// Code of the task to update.
    pub code: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// new | in_progress | blocked | done
    #[arg(long)]
    pub status: Option<String>,

    /// low | medium | high | urgent
    #[arg(long)]
    pub priority: Option<String>,

    #[arg(long)]
    pub owner: Option<String>,

    /// Due date (YYYY-MM-DD).
    #[arg(long)]
    pub due: Option<String>,
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

pub async fn run_add(config: &Config, args: TaskAddArgs, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;

    let mut new = NewTask::new(args.title).priority(args.priority.parse::<Priority>()?);
    if let Some(code) = args.code {
        new = new.code(code);
    }
    if let Some(parent_code) = args.parent {
        let parent = engine.get_task_by_code(&parent_code).await?;
        new = new.parent(parent.id);
    }
    if let Some(description) = args.description {
        new = new.description(description);
    }
    if let Some(owner) = args.owner {
        new = new.owner(owner);
    }
    if let Some(due) = args.due {
        new = new.due_date(parse_date(&due)?);
    }

    let task = engine.create_task(new).await?;

    if json {
        print_json(&task)?;
    } else {
        println!("Created {} (level {}, path {})", task.code, task.level, task.path);
    }
    Ok(())
}

#[derive(Serialize)]
struct TaskShow {
    task: Task,
    ancestors: Vec<Task>,
    children: Vec<Task>,
    siblings: Vec<Task>,
    prerequisites: Vec<Task>,
    dependents: Vec<Task>,
    resources: Vec<AssignedResource>,
}

pub async fn run_show(config: &Config, code: &str, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let task = engine.get_task_by_code(code).await?;

    let full = engine.get_task_full_context(task.id).await?;
    let show = TaskShow {
        children: engine.get_children(task.id).await?,
        prerequisites: engine.get_prerequisites(task.id).await?,
        dependents: engine.get_dependents(task.id).await?,
        resources: engine.get_task_resources(task.id, true).await?,
        ancestors: full.ancestors,
        siblings: full.siblings,
        task: full.task,
    };

    if json {
        return print_json(&show);
    }

    let t = &show.task;
    println!("{} {}", t.code, t.title);
    println!("{}", "=".repeat(t.code.len() + t.title.len() + 1));
    if !show.ancestors.is_empty() {
        let trail: Vec<&str> = show.ancestors.iter().map(|a| a.code.as_str()).collect();
        println!("  Parents:     {}", trail.join(" > "));
    }
    println!("  Status:      {}", t.status);
    println!("  Priority:    {}", t.priority);
    println!("  Progress:    {}%", t.progress);
    println!("  Level:       {}", t.level);
    if let Some(owner) = &t.owner {
        println!("  Owner:       {}", owner);
    }
    if let Some(due) = t.due_date {
        println!("  Due:         {}", due);
    }
    println!("  Updated:     {}", format_ts(t.updated_at));
    if let Some(description) = &t.description {
        println!();
        println!("{}", description);
    }

    let sections: [(&str, &Vec<Task>); 4] = [
        ("Subtasks", &show.children),
        ("Siblings", &show.siblings),
        ("Depends on", &show.prerequisites),
        ("Blocks", &show.dependents),
    ];
    for (label, tasks) in sections {
        if !tasks.is_empty() {
            println!();
            println!("{} ({}):", label, tasks.len());
            for task in tasks {
                println!("  {}", task_line(task));
            }
        }
    }

    if !show.resources.is_empty() {
        println!();
        println!("Resources ({}):", show.resources.len());
        for r in &show.resources {
            let label = r.resource.summary.as_deref().unwrap_or(&r.resource.source);
            let edge = if r.assignment.edge.is_inherited() {
                " (inherited)"
            } else {
                ""
            };
            println!("  #{:<6} {}{}", r.resource.id, label, edge);
        }
    }

    Ok(())
}

pub async fn run_list(
    config: &Config,
    status: Option<String>,
    owner: Option<String>,
    roots: bool,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let filter = TaskFilter {
        status: status.map(|s| s.parse::<TaskStatus>()).transpose()?,
        owner,
        roots_only: roots,
    };
    let tasks = engine.list_tasks(&filter).await?;

    if json {
        return print_json(&tasks);
    }
    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    print_task_table(&tasks);
    Ok(())
}

pub async fn run_tree(config: &Config, root: Option<String>, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let root_id = match root {
        Some(code) => Some(engine.get_task_by_code(&code).await?.id),
        None => None,
    };
    let tree = engine.get_task_tree(root_id).await?;

    if json {
        return print_json(&tree);
    }
    if tree.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    for node in &tree {
        print_node(node, 0);
    }
    Ok(())
}

fn print_node(node: &TreeNode, depth: usize) {
    println!(
        "{}{} {} [{}] {}%",
        "  ".repeat(depth),
        node.task.code,
        node.task.title,
        node.task.status,
        node.task.progress
    );
    for child in &node.children {
        print_node(child, depth + 1);
    }
}

pub async fn run_move(
    config: &Config,
    code: &str,
    parent: Option<String>,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let task = engine.get_task_by_code(code).await?;
    let parent_id = match parent {
        Some(parent_code) => Some(engine.get_task_by_code(&parent_code).await?.id),
        None => None,
    };

    let moved = engine.move_task(task.id, parent_id).await?;

    if json {
        print_json(&moved)?;
    } else {
        println!("Moved {} to {} (level {})", moved.code, moved.path, moved.level);
    }
    Ok(())
}

pub async fn run_progress(config: &Config, code: &str, progress: i64, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let task = engine.get_task_by_code(code).await?;
    let updated = engine.update_progress(task.id, progress).await?;
    let ancestors = engine.get_ancestors(updated.id).await?;

    if json {
        return print_json(&serde_json::json!({
            "task": updated,
            "ancestors": ancestors,
        }));
    }

    println!("{} is now {}%", updated.code, updated.progress);
    for ancestor in ancestors.iter().rev() {
        println!("  {} rolled up to {}%", ancestor.code, ancestor.progress);
    }
    Ok(())
}

pub async fn run_update(config: &Config, args: TaskUpdateArgs, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let task = engine.get_task_by_code(&args.code).await?;

    let patch = TaskPatch {
        title: args.title,
        description: args.description,
        status: args.status.map(|s| s.parse::<TaskStatus>()).transpose()?,
        priority: args.priority.map(|p| p.parse::<Priority>()).transpose()?,
        owner: args.owner,
        due_date: args.due.as_deref().map(parse_date).transpose()?,
    };
    if patch.is_empty() {
        anyhow::bail!("Nothing to update. Pass at least one of --title, --description, --status, --priority, --owner, --due.");
    }

    let updated = engine.update_task(task.id, patch).await?;

    if json {
        print_json(&updated)?;
    } else {
        println!("Updated {}", updated.code);
        println!("  {}", task_line(&updated));
    }
    Ok(())
}

pub async fn run_delete(config: &Config, code: &str, cascade: bool, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let task = engine.get_task_by_code(code).await?;
    let removed = if cascade {
        engine.get_descendants(task.id).await?.len() + 1
    } else {
        1
    };

    let deleted = engine.delete_task(task.id, cascade).await?;
    let tasks_removed = if deleted { removed } else { 0 };

    if json {
        return print_json(&serde_json::json!({
            "code": task.code,
            "deleted": deleted,
            "tasks_removed": tasks_removed,
        }));
    }
    if deleted {
        println!("Deleted {} ({} task{})", task.code, removed, if removed == 1 { "" } else { "s" });
    } else {
        println!("{} was already gone.", task.code);
    }
    Ok(())
}
