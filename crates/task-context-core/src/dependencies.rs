//! Dependency edge CRUD.
//!
//! Edges connect any two tasks regardless of where they sit in the
//! hierarchy. Creation never checks for cycles; [`build_graph`] reports
//! them instead.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::graph::{analyze, DependencyAnalysis, DependencyGraph};
use crate::hierarchy::get_task;
use crate::models::{now_millis, DependencyEdge, NewDependency, Task, TaskId};
use crate::store::StoreTx;

/// Create `prerequisite → dependent`.
///
/// Returns `false` for a self-loop or when either endpoint is missing.
/// An already existing edge counts as success and is left untouched.
pub async fn add_dependency<T: StoreTx>(tx: &mut T, dep: &NewDependency) -> Result<bool> {
    Ok(try_add(tx, dep).await?.is_ok())
}

/// Outcome of one add: `Ok(created)` or `Err(reason)` for a rejected pair.
async fn try_add<T: StoreTx>(
    tx: &mut T,
    dep: &NewDependency,
) -> Result<std::result::Result<bool, String>> {
    if dep.dependent_id == dep.prerequisite_id {
        debug!(task_id = dep.dependent_id, "self-dependency rejected");
        return Ok(Err("a task cannot depend on itself".to_string()));
    }
    for id in [dep.dependent_id, dep.prerequisite_id] {
        if tx.task(id).await?.is_none() {
            debug!(task_id = id, "dependency endpoint missing");
            return Ok(Err(format!("task {} not found", id)));
        }
    }

    let created = tx.insert_dependency(dep, now_millis()).await?;
    if created {
        info!(
            dependent = dep.dependent_id,
            prerequisite = dep.prerequisite_id,
            kind = %dep.kind,
            "dependency added"
        );
    }
    Ok(Ok(created))
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDependency {
    pub dependent_id: TaskId,
    pub prerequisite_id: TaskId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// `(dependent, prerequisite)` pairs that now exist, new or not.
    pub created: Vec<(TaskId, TaskId)>,
    pub failed: Vec<FailedDependency>,
}

/// Add several edges in the caller's transaction, collecting per-pair
/// failures instead of stopping at the first.
pub async fn add_dependencies<T: StoreTx>(tx: &mut T, batch: &[NewDependency]) -> Result<BatchReport> {
    let mut report = BatchReport::default();
    for dep in batch {
        match try_add(tx, dep).await? {
            Ok(_) => report
                .created
                .push((dep.dependent_id, dep.prerequisite_id)),
            Err(reason) => report.failed.push(FailedDependency {
                dependent_id: dep.dependent_id,
                prerequisite_id: dep.prerequisite_id,
                reason,
            }),
        }
    }
    Ok(report)
}

/// Remove one edge; `false` when it did not exist.
pub async fn remove_dependency<T: StoreTx>(
    tx: &mut T,
    dependent: TaskId,
    prerequisite: TaskId,
) -> Result<bool> {
    let removed = tx.delete_dependency(dependent, prerequisite).await?;
    if removed {
        info!(dependent, prerequisite, "dependency removed");
    }
    Ok(removed)
}

/// Tasks `task_id` waits on.
pub async fn get_prerequisites<T: StoreTx>(tx: &mut T, task_id: TaskId) -> Result<Vec<Task>> {
    get_task(tx, task_id).await?;
    Ok(tx.prerequisites(task_id).await?)
}

/// Tasks waiting on `task_id`.
pub async fn get_dependents<T: StoreTx>(tx: &mut T, task_id: TaskId) -> Result<Vec<Task>> {
    get_task(tx, task_id).await?;
    Ok(tx.dependents(task_id).await?)
}

/// Raw edges touching `task_ids`, or every edge.
pub async fn list_dependencies<T: StoreTx>(
    tx: &mut T,
    task_ids: Option<&[TaskId]>,
) -> Result<Vec<DependencyEdge>> {
    Ok(tx.dependencies(task_ids).await?)
}

/// Build the graph over every edge, or over edges with at least one
/// endpoint in `task_ids`.
pub async fn build_graph<T: StoreTx>(
    tx: &mut T,
    task_ids: Option<&[TaskId]>,
) -> Result<DependencyGraph> {
    let edges = tx.dependencies(task_ids).await?;
    let mut ids: BTreeSet<TaskId> = edges
        .iter()
        .flat_map(|e| [e.dependent_id, e.prerequisite_id])
        .collect();
    if let Some(filter) = task_ids {
        ids.extend(filter.iter().copied());
    }
    let ids: Vec<TaskId> = ids.into_iter().collect();
    let tasks = tx.tasks_by_ids(&ids).await?;

    let graph = DependencyGraph::build(&tasks, &edges);
    debug!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        cycles = graph.cycles.len(),
        "dependency graph built"
    );
    Ok(graph)
}

pub async fn analyze_dependencies<T: StoreTx>(tx: &mut T) -> Result<DependencyAnalysis> {
    let graph = build_graph(tx, None).await?;
    let analysis = analyze(&graph);
    info!(
        nodes = analysis.summary.nodes,
        cycles = analysis.summary.cycles,
        recommendations = analysis.recommendations.len(),
        "dependency analysis completed"
    );
    Ok(analysis)
}
