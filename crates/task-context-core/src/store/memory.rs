//! In-memory [`Store`] implementation for tests and embedding.
//!
//! All state lives behind one `tokio::sync::Mutex`. A transaction holds the
//! lock for its whole lifetime and works on a private copy of the state;
//! `commit` swaps the copy in, dropping the transaction throws it away.
//! Transactions are therefore fully serialized.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::{
    AssignedResource, Assignment, AssignmentStats, AssignmentStatus, DependencyEdge,
    NewDependency, NewResource, Resource, ResourceEdge, ResourceId, ResourceSummary,
    ResourceTask, Task, TaskDraft, TaskFilter, TaskId,
};

use super::{Store, StoreTx};

#[derive(Debug, Clone)]
struct StoredAssignment {
    seq: i64,
    assignment: Assignment,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tasks: BTreeMap<TaskId, Task>,
    dependencies: Vec<DependencyEdge>,
    resources: BTreeMap<ResourceId, Resource>,
    assignments: Vec<StoredAssignment>,
    next_task_id: i64,
    next_dependency_id: i64,
    next_resource_id: i64,
    next_assignment_seq: i64,
}

/// In-memory store for testing and embedding.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Unit of work over [`InMemoryStore`].
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx { guard, working })
    }
}

impl MemoryTx {
    fn assigned(&self, stored: &StoredAssignment) -> Option<AssignedResource> {
        let resource = self.working.resources.get(&stored.assignment.resource_id)?;
        Some(AssignedResource {
            resource: resource.clone(),
            assignment: stored.assignment.clone(),
        })
    }

    fn tasks_where(&self, pred: impl Fn(&Task) -> bool) -> Vec<Task> {
        self.working
            .tasks
            .values()
            .filter(|t| pred(t))
            .cloned()
            .collect()
    }

    fn has_assignment(&self, resource: ResourceId, task: TaskId) -> bool {
        self.working
            .assignments
            .iter()
            .any(|a| a.assignment.resource_id == resource && a.assignment.task_id == task)
    }
}

/// Newest assignment first; ties broken by insertion order, newest first.
fn newest_first(a: &StoredAssignment, b: &StoredAssignment) -> std::cmp::Ordering {
    b.assignment
        .assigned_at
        .cmp(&a.assignment.assigned_at)
        .then(b.seq.cmp(&a.seq))
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn task(&mut self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.working.tasks.get(&id).cloned())
    }

    async fn task_by_code(&mut self, code: &str) -> Result<Option<Task>> {
        Ok(self.working.tasks.values().find(|t| t.code == code).cloned())
    }

    async fn tasks_by_codes(&mut self, codes: &[&str]) -> Result<Vec<Task>> {
        Ok(self.tasks_where(|t| codes.contains(&t.code.as_str())))
    }

    async fn tasks_by_ids(&mut self, ids: &[TaskId]) -> Result<Vec<Task>> {
        Ok(self.tasks_where(|t| ids.contains(&t.id)))
    }

    async fn list_tasks(&mut self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut tasks = self.tasks_where(|t| {
            filter.status.map_or(true, |s| t.status == s)
                && filter
                    .owner
                    .as_deref()
                    .map_or(true, |o| t.owner.as_deref() == Some(o))
                && (!filter.roots_only || t.parent_id.is_none())
        });
        tasks.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(tasks)
    }

    async fn count_tasks(&mut self) -> Result<i64> {
        Ok(self.working.tasks.len() as i64)
    }

    async fn children(&mut self, parent: Option<TaskId>) -> Result<Vec<Task>> {
        Ok(self.tasks_where(|t| t.parent_id == parent))
    }

    async fn tasks_under_path(&mut self, prefix: &str) -> Result<Vec<Task>> {
        let mut tasks = self.tasks_where(|t| t.path.starts_with(prefix));
        tasks.sort_by(|a, b| a.level.cmp(&b.level).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn insert_task(&mut self, draft: &TaskDraft) -> Result<Task> {
        if self.working.tasks.values().any(|t| t.code == draft.code) {
            bail!("UNIQUE constraint failed: tasks.code ({})", draft.code);
        }
        self.working.next_task_id += 1;
        let task = Task {
            id: self.working.next_task_id,
            title: draft.title.clone(),
            code: draft.code.clone(),
            parent_id: draft.parent_id,
            level: draft.level,
            path: draft.path.clone(),
            status: draft.status,
            priority: draft.priority,
            progress: draft.progress,
            description: draft.description.clone(),
            owner: draft.owner.clone(),
            due_date: draft.due_date,
            created_at: draft.created_at,
            updated_at: draft.created_at,
        };
        self.working.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update_task(&mut self, task: &Task) -> Result<()> {
        match self.working.tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => bail!("task {} does not exist", task.id),
        }
    }

    async fn delete_task(&mut self, id: TaskId) -> Result<()> {
        if self.working.tasks.values().any(|t| t.parent_id == Some(id)) {
            bail!("FOREIGN KEY constraint failed: task {} still has children", id);
        }
        self.working.tasks.remove(&id);
        self.working
            .dependencies
            .retain(|d| d.dependent_id != id && d.prerequisite_id != id);
        self.working
            .assignments
            .retain(|a| a.assignment.task_id != id);
        Ok(())
    }

    async fn insert_dependency(&mut self, dep: &NewDependency, created_at: i64) -> Result<bool> {
        let exists = self.working.dependencies.iter().any(|d| {
            d.dependent_id == dep.dependent_id && d.prerequisite_id == dep.prerequisite_id
        });
        if exists {
            return Ok(false);
        }
        self.working.next_dependency_id += 1;
        self.working.dependencies.push(DependencyEdge {
            id: self.working.next_dependency_id,
            dependent_id: dep.dependent_id,
            prerequisite_id: dep.prerequisite_id,
            kind: dep.kind,
            description: dep.description.clone(),
            created_by: dep.created_by.clone(),
            created_at,
        });
        Ok(true)
    }

    async fn delete_dependency(
        &mut self,
        dependent: TaskId,
        prerequisite: TaskId,
    ) -> Result<bool> {
        let before = self.working.dependencies.len();
        self.working
            .dependencies
            .retain(|d| !(d.dependent_id == dependent && d.prerequisite_id == prerequisite));
        Ok(self.working.dependencies.len() < before)
    }

    async fn dependencies(&mut self, touching: Option<&[TaskId]>) -> Result<Vec<DependencyEdge>> {
        Ok(self
            .working
            .dependencies
            .iter()
            .filter(|d| {
                touching.map_or(true, |ids| {
                    ids.contains(&d.dependent_id) || ids.contains(&d.prerequisite_id)
                })
            })
            .cloned()
            .collect())
    }

    async fn prerequisites(&mut self, task: TaskId) -> Result<Vec<Task>> {
        let ids: BTreeSet<TaskId> = self
            .working
            .dependencies
            .iter()
            .filter(|d| d.dependent_id == task)
            .map(|d| d.prerequisite_id)
            .collect();
        Ok(self.tasks_where(|t| ids.contains(&t.id)))
    }

    async fn dependents(&mut self, task: TaskId) -> Result<Vec<Task>> {
        let ids: BTreeSet<TaskId> = self
            .working
            .dependencies
            .iter()
            .filter(|d| d.prerequisite_id == task)
            .map(|d| d.dependent_id)
            .collect();
        Ok(self.tasks_where(|t| ids.contains(&t.id)))
    }

    async fn resource(&mut self, id: ResourceId) -> Result<Option<Resource>> {
        Ok(self.working.resources.get(&id).cloned())
    }

    async fn resources_by_ids(&mut self, ids: &[ResourceId]) -> Result<Vec<Resource>> {
        Ok(self
            .working
            .resources
            .values()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect())
    }

    async fn insert_resource(&mut self, new: &NewResource, created_at: i64) -> Result<Resource> {
        self.working.next_resource_id += 1;
        let resource = Resource {
            id: self.working.next_resource_id,
            text: new.text.clone(),
            summary: new.summary.clone(),
            source: new.source.clone(),
            source_type: new.source_type.clone(),
            assignment_status: AssignmentStatus::Unassigned,
            created_at,
        };
        self.working.resources.insert(resource.id, resource.clone());
        Ok(resource)
    }

    async fn set_assignment_status(
        &mut self,
        id: ResourceId,
        status: AssignmentStatus,
    ) -> Result<()> {
        match self.working.resources.get_mut(&id) {
            Some(resource) => {
                resource.assignment_status = status;
                Ok(())
            }
            None => bail!("resource {} does not exist", id),
        }
    }

    async fn list_resources(
        &mut self,
        status: Option<AssignmentStatus>,
        limit: usize,
    ) -> Result<Vec<ResourceSummary>> {
        let mut resources: Vec<&Resource> = self
            .working
            .resources
            .values()
            .filter(|r| status.map_or(true, |s| r.assignment_status == s))
            .collect();
        resources.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(resources
            .into_iter()
            .take(limit)
            .map(|r| ResourceSummary {
                resource: r.clone(),
                task_count: self
                    .working
                    .assignments
                    .iter()
                    .filter(|a| a.assignment.resource_id == r.id)
                    .count() as i64,
            })
            .collect())
    }

    async fn insert_assignment(&mut self, assignment: &Assignment) -> Result<bool> {
        if self.has_assignment(assignment.resource_id, assignment.task_id) {
            return Ok(false);
        }
        self.working.next_assignment_seq += 1;
        self.working.assignments.push(StoredAssignment {
            seq: self.working.next_assignment_seq,
            assignment: assignment.clone(),
        });
        Ok(true)
    }

    async fn delete_assignment(&mut self, resource: ResourceId, task: TaskId) -> Result<bool> {
        let before = self.working.assignments.len();
        self.working.assignments.retain(|a| {
            !(a.assignment.resource_id == resource && a.assignment.task_id == task)
        });
        Ok(self.working.assignments.len() < before)
    }

    async fn assignment_count(&mut self, resource: ResourceId) -> Result<i64> {
        Ok(self
            .working
            .assignments
            .iter()
            .filter(|a| a.assignment.resource_id == resource)
            .count() as i64)
    }

    async fn task_resources(
        &mut self,
        task: TaskId,
        include_inherited: bool,
    ) -> Result<Vec<AssignedResource>> {
        let mut edges: Vec<&StoredAssignment> = self
            .working
            .assignments
            .iter()
            .filter(|a| a.assignment.task_id == task)
            .filter(|a| include_inherited || a.assignment.edge == ResourceEdge::Direct)
            .collect();
        edges.sort_by(|a, b| newest_first(a, b));
        Ok(edges.into_iter().filter_map(|a| self.assigned(a)).collect())
    }

    async fn resource_tasks(&mut self, resource: ResourceId) -> Result<Vec<ResourceTask>> {
        let mut edges: Vec<&StoredAssignment> = self
            .working
            .assignments
            .iter()
            .filter(|a| a.assignment.resource_id == resource)
            .collect();
        edges.sort_by(|a, b| newest_first(a, b));
        Ok(edges
            .into_iter()
            .filter_map(|a| {
                let task = self.working.tasks.get(&a.assignment.task_id)?;
                Some(ResourceTask {
                    task: task.clone(),
                    assignment: a.assignment.clone(),
                })
            })
            .collect())
    }

    async fn resources_of_tasks(&mut self, tasks: &[TaskId]) -> Result<Vec<ResourceId>> {
        let ids: BTreeSet<ResourceId> = self
            .working
            .assignments
            .iter()
            .filter(|a| tasks.contains(&a.assignment.task_id))
            .map(|a| a.assignment.resource_id)
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn assignment_stats(&mut self) -> Result<AssignmentStats> {
        let state = &self.working;
        let mut resources_by_status = BTreeMap::new();
        for resource in state.resources.values() {
            *resources_by_status
                .entry(resource.assignment_status.to_string())
                .or_insert(0) += 1;
        }
        let tasks_with_resources = state
            .assignments
            .iter()
            .map(|a| a.assignment.task_id)
            .collect::<BTreeSet<_>>()
            .len() as i64;
        let inherited_assignments = state
            .assignments
            .iter()
            .filter(|a| a.assignment.edge.is_inherited())
            .count() as i64;
        let total_assignments = state.assignments.len() as i64;
        let total_tasks = state.tasks.len() as i64;

        Ok(AssignmentStats {
            total_resources: state.resources.len() as i64,
            resources_by_status,
            total_tasks,
            tasks_with_resources,
            tasks_without_resources: total_tasks - tasks_with_resources,
            total_assignments,
            direct_assignments: total_assignments - inherited_assignments,
            inherited_assignments,
        })
    }

    async fn commit(self) -> Result<()> {
        let MemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}
