//! `tctx dep` subcommands.
//!
//! Edges read "dependent depends on prerequisite": `tctx dep add B A`
//! means B cannot finish before A.

use anyhow::Result;

use task_context_core::graph::{DependencyGraph, RecommendationLevel};
use task_context_core::models::{DependencyType, NewDependency, TaskId};

use crate::config::Config;
use crate::engine::{open_engine, SqliteEngine};
use crate::output::{print_json, task_line};

async fn resolve_codes(engine: &SqliteEngine, codes: &[String]) -> Result<Vec<TaskId>> {
    let mut ids = Vec::with_capacity(codes.len());
    for code in codes {
        ids.push(engine.get_task_by_code(code).await?.id);
    }
    Ok(ids)
}

pub async fn run_add(
    config: &Config,
    dependent: &str,
    prerequisite: &str,
    kind: &str,
    description: Option<String>,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let kind: DependencyType = kind.parse()?;
    let dependent_task = engine.get_task_by_code(dependent).await?;
    let prerequisite_task = engine.get_task_by_code(prerequisite).await?;

    let mut dep = NewDependency::new(dependent_task.id, prerequisite_task.id, kind);
    dep.description = description;
    dep.created_by = Some("cli".to_string());

    let ok = engine.add_dependency(&dep).await?;

    if json {
        return print_json(&serde_json::json!({
            "dependent": dependent_task.code,
            "prerequisite": prerequisite_task.code,
            "type": kind,
            "ok": ok,
        }));
    }
    if ok {
        println!(
            "{} now depends on {} ({})",
            dependent_task.code, prerequisite_task.code, kind
        );
    } else {
        anyhow::bail!(
            "Cannot add dependency {} -> {}: a task cannot depend on itself",
            dependent_task.code,
            prerequisite_task.code
        );
    }
    Ok(())
}

pub async fn run_remove(
    config: &Config,
    dependent: &str,
    prerequisite: &str,
    json: bool,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let dependent_task = engine.get_task_by_code(dependent).await?;
    let prerequisite_task = engine.get_task_by_code(prerequisite).await?;

    let removed = engine
        .remove_dependency(dependent_task.id, prerequisite_task.id)
        .await?;

    if json {
        return print_json(&serde_json::json!({ "removed": removed }));
    }
    if removed {
        println!("Removed {} -> {}", dependent_task.code, prerequisite_task.code);
    } else {
        println!("No such dependency.");
    }
    Ok(())
}

pub async fn run_list(config: &Config, code: Option<String>, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;

    let Some(code) = code else {
        let graph = engine.build_graph(None).await?;
        if json {
            return print_json(&graph.edges);
        }
        print_edges(&graph);
        return Ok(());
    };

    let task = engine.get_task_by_code(&code).await?;
    let prerequisites = engine.get_prerequisites(task.id).await?;
    let dependents = engine.get_dependents(task.id).await?;

    if json {
        return print_json(&serde_json::json!({
            "task": task,
            "prerequisites": prerequisites,
            "dependents": dependents,
        }));
    }

    println!("{} {}", task.code, task.title);
    println!();
    println!("Depends on ({}):", prerequisites.len());
    for t in &prerequisites {
        println!("  {}", task_line(t));
    }
    println!();
    println!("Blocks ({}):", dependents.len());
    for t in &dependents {
        println!("  {}", task_line(t));
    }
    Ok(())
}

fn print_edges(graph: &DependencyGraph) {
    if graph.edges.is_empty() {
        println!("No dependencies.");
        return;
    }
    for edge in &graph.edges {
        println!(
            "  {:<12} depends on {:<12} ({})",
            graph.code_of(edge.to),
            graph.code_of(edge.from),
            edge.kind
        );
    }
}

pub async fn run_graph(config: &Config, codes: Vec<String>, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let ids = resolve_codes(&engine, &codes).await?;
    let filter = if ids.is_empty() { None } else { Some(ids.as_slice()) };

    let graph = engine.build_graph(filter).await?;

    if json {
        return print_json(&graph);
    }

    println!(
        "Graph: {} nodes, {} edges",
        graph.nodes.len(),
        graph.edges.len()
    );
    let codes_of = |ids: &[TaskId]| -> String {
        ids.iter()
            .map(|id| graph.code_of(*id))
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("  Roots:  {}", codes_of(&graph.roots));
    println!("  Leaves: {}", codes_of(&graph.leaves));
    println!();
    print_edges(&graph);
    if graph.has_cycles() {
        println!();
        println!("Cycles:");
        for cycle in &graph.cycles {
            let path: Vec<String> = cycle.iter().map(|id| graph.code_of(*id)).collect();
            if let Some(first) = path.first() {
                println!("  {} -> {}", path.join(" -> "), first);
            }
        }
    }
    Ok(())
}

pub async fn run_analyze(config: &Config, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let analysis = engine.analyze_dependencies().await?;

    if json {
        return print_json(&analysis);
    }

    let s = &analysis.summary;
    println!("Dependency analysis");
    println!("===================");
    println!();
    println!("  Nodes:          {}", s.nodes);
    println!("  Edges:          {}", s.edges);
    println!("  Roots:          {}", s.roots);
    println!("  Leaves:         {}", s.leaves);
    println!("  Cycles:         {}", s.cycles);
    println!("  Longest chain:  {}", s.longest_chain);

    if !analysis.recommendations.is_empty() {
        println!();
        for rec in &analysis.recommendations {
            let tag = match rec.level {
                RecommendationLevel::Warning => "WARN",
                RecommendationLevel::Info => "INFO",
            };
            println!("  [{}] {}", tag, rec.message);
            println!("         {}", rec.action);
        }
    }
    Ok(())
}
