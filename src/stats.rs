//! Database statistics and health overview.
//!
//! Used by `tctx stats`: task counts by status, assignment coverage, and
//! dependency graph health in one screen.

use anyhow::Result;
use serde::Serialize;
use sqlx::Row;
use std::collections::BTreeMap;

use task_context_core::graph::AnalysisSummary;
use task_context_core::models::AssignmentStats;

use crate::config::Config;
use crate::engine::open_engine;
use crate::output::print_json;

#[derive(Serialize)]
struct Stats {
    database: String,
    size_bytes: u64,
    tasks_by_status: BTreeMap<String, i64>,
    max_depth: i64,
    assignments: AssignmentStats,
    dependencies: AnalysisSummary,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let engine = open_engine(config).await?;
    let pool = engine.store().pool();

    let status_rows = sqlx::query("SELECT status, COUNT(*) AS n FROM tasks GROUP BY status")
        .fetch_all(pool)
        .await?;
    let mut tasks_by_status = BTreeMap::new();
    for row in &status_rows {
        tasks_by_status.insert(row.get::<String, _>("status"), row.get::<i64, _>("n"));
    }

    let max_depth: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(level), -1) + 1 FROM tasks")
        .fetch_one(pool)
        .await?;

    let stats = Stats {
        database: config.db.path.display().to_string(),
        size_bytes: std::fs::metadata(&config.db.path)
            .map(|m| m.len())
            .unwrap_or(0),
        tasks_by_status,
        max_depth,
        assignments: engine.get_assignment_stats().await?,
        dependencies: engine.analyze_dependencies().await?.summary,
    };

    if json {
        print_json(&stats)?;
        pool.close().await;
        return Ok(());
    }

    let a = &stats.assignments;
    let d = &stats.dependencies;

    println!("Task Context Database Stats");
    println!("===========================");
    println!();
    println!("  Database:    {}", stats.database);
    println!("  Size:        {}", format_bytes(stats.size_bytes));
    println!();
    println!("  Tasks:       {} (depth {})", a.total_tasks, stats.max_depth);
    for (status, n) in &stats.tasks_by_status {
        println!("    {:<12} {:>6}", status, n);
    }
    println!(
        "  With docs:   {} / {} ({}%)",
        a.tasks_with_resources,
        a.total_tasks,
        percent(a.tasks_with_resources, a.total_tasks)
    );
    println!();
    println!("  Resources:   {}", a.total_resources);
    for (status, n) in &a.resources_by_status {
        println!("    {:<12} {:>6}", status, n);
    }
    println!(
        "  Assignments: {} ({} direct, {} inherited)",
        a.total_assignments, a.direct_assignments, a.inherited_assignments
    );
    println!();
    println!(
        "  Dependencies: {} edges, {} cycle{}, longest chain {}",
        d.edges,
        d.cycles,
        if d.cycles == 1 { "" } else { "s" },
        d.longest_chain
    );
    println!();

    pool.close().await;
    Ok(())
}

fn percent(part: i64, whole: i64) -> i64 {
    if whole > 0 {
        (part * 100) / whole
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_percent_of_zero() {
        assert_eq!(percent(3, 0), 0);
        assert_eq!(percent(1, 4), 25);
    }
}
