//! Resource assignment: the many-to-many edge set between documents and
//! tasks, plus explicit inheritance from ancestors.
//!
//! A resource's `assignment_status` is derived from its edge count after
//! every edge change (see [`AssignmentStatus::derive`]); `archived` is
//! sticky until [`restore_resource`].
//!
//! Inheritance is never implicit. A descendant sees ancestor resources
//! only through [`get_inherited_resources`] (computed on read) or after
//! [`inherit_parent_resources`] materialized them as
//! [`ResourceEdge::Inherited`] edges.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::hierarchy::{ancestors_of, get_task};
use crate::models::{
    now_millis, AssignedResource, Assignment, AssignmentReport, AssignmentStats,
    AssignmentStatus, InheritReport, InheritedResource, NewResource, Resource, ResourceEdge,
    ResourceId, ResourceSummary, ResourceTask, TaskId,
};
use crate::store::StoreTx;

/// Record a new resource, as the ingestion pipeline would.
pub async fn add_resource<T: StoreTx>(tx: &mut T, new: &NewResource) -> Result<Resource> {
    if new.text.trim().is_empty() {
        return Err(EngineError::InvalidArgument(
            "resource text must not be empty".to_string(),
        ));
    }
    let resource = tx.insert_resource(new, now_millis()).await?;
    debug!(resource_id = resource.id, source = %resource.source, "resource added");
    Ok(resource)
}

pub async fn get_resource<T: StoreTx>(tx: &mut T, id: ResourceId) -> Result<Resource> {
    tx.resource(id)
        .await?
        .ok_or_else(|| EngineError::resource_not_found(id))
}

/// Re-derive `assignment_status` from the current edge count.
pub(crate) async fn refresh_assignment_status<T: StoreTx>(tx: &mut T, id: ResourceId) -> Result<()> {
    let Some(resource) = tx.resource(id).await? else {
        return Ok(());
    };
    let edges = tx.assignment_count(id).await?;
    let status = AssignmentStatus::derive(resource.assignment_status, edges);
    if status != resource.assignment_status {
        tx.set_assignment_status(id, status).await?;
        debug!(resource_id = id, status = %status, "assignment status changed");
    }
    Ok(())
}

fn dedup<I: Copy + Eq + std::hash::Hash>(ids: &[I]) -> Vec<I> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

async fn ensure_tasks_exist<T: StoreTx>(tx: &mut T, ids: &[TaskId]) -> Result<()> {
    let found: HashSet<TaskId> = tx.tasks_by_ids(ids).await?.iter().map(|t| t.id).collect();
    match ids.iter().find(|id| !found.contains(id)) {
        Some(missing) => Err(EngineError::task_not_found(missing)),
        None => Ok(()),
    }
}

/// Attach one resource to several tasks.
///
/// Every id is checked before any edge is written. Pairs that already have
/// an edge are reported in `skipped`. The report's ids are task ids.
pub async fn assign_resource<T: StoreTx>(
    tx: &mut T,
    resource_id: ResourceId,
    task_ids: &[TaskId],
    assigned_by: Option<&str>,
) -> Result<AssignmentReport> {
    get_resource(tx, resource_id).await?;
    let task_ids = dedup(task_ids);
    ensure_tasks_exist(tx, &task_ids).await?;

    let now = now_millis();
    let mut report = AssignmentReport::default();
    for task_id in task_ids {
        let assignment = Assignment {
            resource_id,
            task_id,
            edge: ResourceEdge::Direct,
            assigned_by: assigned_by.map(str::to_string),
            assigned_at: now,
        };
        if tx.insert_assignment(&assignment).await? {
            report.created.push(task_id);
        } else {
            report.skipped.push(task_id);
        }
    }
    if !report.created.is_empty() {
        refresh_assignment_status(tx, resource_id).await?;
    }

    info!(
        resource_id,
        created = report.created.len(),
        skipped = report.skipped.len(),
        "resource assigned"
    );
    Ok(report)
}

/// Attach several resources to one task. The report's ids are resource ids.
pub async fn bulk_assign<T: StoreTx>(
    tx: &mut T,
    resource_ids: &[ResourceId],
    task_id: TaskId,
    assigned_by: Option<&str>,
) -> Result<AssignmentReport> {
    get_task(tx, task_id).await?;
    let resource_ids = dedup(resource_ids);
    let found: HashSet<ResourceId> = tx
        .resources_by_ids(&resource_ids)
        .await?
        .iter()
        .map(|r| r.id)
        .collect();
    if let Some(missing) = resource_ids.iter().find(|id| !found.contains(id)) {
        return Err(EngineError::resource_not_found(missing));
    }

    let now = now_millis();
    let mut report = AssignmentReport::default();
    for resource_id in resource_ids {
        let assignment = Assignment {
            resource_id,
            task_id,
            edge: ResourceEdge::Direct,
            assigned_by: assigned_by.map(str::to_string),
            assigned_at: now,
        };
        if tx.insert_assignment(&assignment).await? {
            refresh_assignment_status(tx, resource_id).await?;
            report.created.push(resource_id);
        } else {
            report.skipped.push(resource_id);
        }
    }

    info!(
        task_id,
        created = report.created.len(),
        skipped = report.skipped.len(),
        "resources bulk-assigned"
    );
    Ok(report)
}

/// Remove one edge; `false` when the pair had none.
pub async fn unassign_resource<T: StoreTx>(
    tx: &mut T,
    resource_id: ResourceId,
    task_id: TaskId,
) -> Result<bool> {
    let removed = tx.delete_assignment(resource_id, task_id).await?;
    if removed {
        refresh_assignment_status(tx, resource_id).await?;
        info!(resource_id, task_id, "resource unassigned");
    }
    Ok(removed)
}

/// Resources attached to a task, newest assignment first.
pub async fn get_task_resources<T: StoreTx>(
    tx: &mut T,
    task_id: TaskId,
    include_inherited: bool,
) -> Result<Vec<AssignedResource>> {
    get_task(tx, task_id).await?;
    Ok(tx.task_resources(task_id, include_inherited).await?)
}

/// Direct resources of every strict ancestor, deduplicated by resource id.
///
/// Ancestors are visited nearest first, so a resource held by several
/// ancestors is attributed to the closest one.
pub async fn get_inherited_resources<T: StoreTx>(
    tx: &mut T,
    task_id: TaskId,
) -> Result<Vec<InheritedResource>> {
    let task = get_task(tx, task_id).await?;
    let ancestors = ancestors_of(tx, &task).await?;

    let mut seen = HashSet::new();
    let mut inherited = Vec::new();
    for ancestor in ancestors.iter().rev() {
        for held in tx.task_resources(ancestor.id, false).await? {
            if seen.insert(held.resource.id) {
                inherited.push(InheritedResource {
                    resource: held.resource,
                    source_task_id: ancestor.id,
                    source_task_code: ancestor.code.clone(),
                    assigned_by: held.assignment.assigned_by,
                    assigned_at: held.assignment.assigned_at,
                });
            }
        }
    }
    Ok(inherited)
}

/// Recorded as `assigned_by` on inherited edges when no caller is given.
pub const AUTO_INHERIT: &str = "auto-inherit";

/// Materialize every inherited resource as an `Inherited` edge on the task.
///
/// Pairs that already have an edge of either kind are left alone; the
/// report lists only the newly created ones.
pub async fn inherit_parent_resources<T: StoreTx>(
    tx: &mut T,
    task_id: TaskId,
    assigned_by: Option<&str>,
) -> Result<InheritReport> {
    let candidates = get_inherited_resources(tx, task_id).await?;
    let now = now_millis();

    let mut resources = Vec::new();
    for candidate in candidates {
        let assignment = Assignment {
            resource_id: candidate.resource.id,
            task_id,
            edge: ResourceEdge::Inherited,
            assigned_by: Some(assigned_by.unwrap_or(AUTO_INHERIT).to_string()),
            assigned_at: now,
        };
        if tx.insert_assignment(&assignment).await? {
            resources.push(candidate);
        }
    }

    info!(task_id, inherited = resources.len(), "parent resources inherited");
    Ok(InheritReport {
        task_id,
        inherited_count: resources.len(),
        resources,
    })
}

pub async fn get_resource_tasks<T: StoreTx>(
    tx: &mut T,
    resource_id: ResourceId,
) -> Result<Vec<ResourceTask>> {
    get_resource(tx, resource_id).await?;
    Ok(tx.resource_tasks(resource_id).await?)
}

pub async fn list_resources<T: StoreTx>(
    tx: &mut T,
    status: Option<AssignmentStatus>,
    limit: usize,
) -> Result<Vec<ResourceSummary>> {
    Ok(tx.list_resources(status, limit).await?)
}

pub async fn get_unassigned_resources<T: StoreTx>(
    tx: &mut T,
    limit: usize,
) -> Result<Vec<ResourceSummary>> {
    list_resources(tx, Some(AssignmentStatus::Unassigned), limit).await
}

pub async fn archive_resource<T: StoreTx>(tx: &mut T, id: ResourceId) -> Result<Resource> {
    let mut resource = get_resource(tx, id).await?;
    if resource.assignment_status != AssignmentStatus::Archived {
        tx.set_assignment_status(id, AssignmentStatus::Archived).await?;
        resource.assignment_status = AssignmentStatus::Archived;
        info!(resource_id = id, "resource archived");
    }
    Ok(resource)
}

/// Lift the archive flag and re-derive the status from the edge count.
pub async fn restore_resource<T: StoreTx>(tx: &mut T, id: ResourceId) -> Result<Resource> {
    let mut resource = get_resource(tx, id).await?;
    if resource.assignment_status == AssignmentStatus::Archived {
        let edges = tx.assignment_count(id).await?;
        let status = AssignmentStatus::derive(AssignmentStatus::Unassigned, edges);
        tx.set_assignment_status(id, status).await?;
        resource.assignment_status = status;
        info!(resource_id = id, status = %status, "resource restored");
    }
    Ok(resource)
}

pub async fn get_assignment_stats<T: StoreTx>(tx: &mut T) -> Result<AssignmentStats> {
    Ok(tx.assignment_stats().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence_order() {
        assert_eq!(dedup(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
        assert!(dedup::<i64>(&[]).is_empty());
    }
}
