//! Storage abstraction for Task Context.
//!
//! The [`Store`] trait hands out [`StoreTx`] units of work. Every top-level
//! engine operation begins one transaction, performs all of its reads and
//! writes through it, and commits at the end. A transaction that is dropped
//! without [`commit`](StoreTx::commit) must discard its changes, which is
//! what makes subtree moves, progress roll-ups, and cascading deletes
//! all-or-nothing.
//!
//! Implementations must serialize conflicting transactions (blocking is
//! fine) and must treat duplicate edge inserts as no-ops rather than errors.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    AssignedResource, Assignment, AssignmentStats, AssignmentStatus, DependencyEdge,
    NewDependency, NewResource, Resource, ResourceId, ResourceSummary, ResourceTask, Task,
    TaskDraft, TaskFilter, TaskId,
};

/// Abstract backing store.
///
/// | Implementation | Crate |
/// |----------------|-------|
/// | [`memory::InMemoryStore`] | this crate (tests, embedding) |
/// | `SqliteStore` | `task-context` app crate |
#[async_trait]
pub trait Store: Send + Sync {
    type Tx: StoreTx;

    /// Open a unit of work. May wait for a conflicting one to finish.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// Query and mutation primitives available inside one transaction.
///
/// Ordering contracts matter to callers and are documented per method.
#[async_trait]
pub trait StoreTx: Send {
    // ── tasks ──

    async fn task(&mut self, id: TaskId) -> Result<Option<Task>>;

    async fn task_by_code(&mut self, code: &str) -> Result<Option<Task>>;

    /// Tasks whose code is in `codes`, in no particular order.
    async fn tasks_by_codes(&mut self, codes: &[&str]) -> Result<Vec<Task>>;

    /// Tasks whose id is in `ids`, ordered by id.
    async fn tasks_by_ids(&mut self, ids: &[TaskId]) -> Result<Vec<Task>>;

    /// Filtered listing ordered by path.
    async fn list_tasks(&mut self, filter: &TaskFilter) -> Result<Vec<Task>>;

    async fn count_tasks(&mut self) -> Result<i64>;

    /// Direct children of `parent` (roots when `None`), ordered by id.
    async fn children(&mut self, parent: Option<TaskId>) -> Result<Vec<Task>>;

    /// Every task whose path starts with `prefix`, ordered by level then id.
    async fn tasks_under_path(&mut self, prefix: &str) -> Result<Vec<Task>>;

    async fn insert_task(&mut self, draft: &TaskDraft) -> Result<Task>;

    /// Overwrite every mutable column of an existing task.
    async fn update_task(&mut self, task: &Task) -> Result<()>;

    /// Remove a task together with its dependency and assignment edges.
    async fn delete_task(&mut self, id: TaskId) -> Result<()>;

    // ── dependencies ──

    /// Insert an edge; `false` when the ordered pair already exists.
    async fn insert_dependency(&mut self, dep: &NewDependency, created_at: i64) -> Result<bool>;

    async fn delete_dependency(&mut self, dependent: TaskId, prerequisite: TaskId)
        -> Result<bool>;

    /// All edges, or only edges with at least one endpoint in `touching`.
    /// Ordered by id.
    async fn dependencies(&mut self, touching: Option<&[TaskId]>) -> Result<Vec<DependencyEdge>>;

    /// Tasks `task` depends on, ordered by id.
    async fn prerequisites(&mut self, task: TaskId) -> Result<Vec<Task>>;

    /// Tasks that depend on `task`, ordered by id.
    async fn dependents(&mut self, task: TaskId) -> Result<Vec<Task>>;

    // ── resources ──

    async fn resource(&mut self, id: ResourceId) -> Result<Option<Resource>>;

    /// Resources whose id is in `ids`, ordered by id.
    async fn resources_by_ids(&mut self, ids: &[ResourceId]) -> Result<Vec<Resource>>;

    async fn insert_resource(&mut self, new: &NewResource, created_at: i64) -> Result<Resource>;

    async fn set_assignment_status(
        &mut self,
        id: ResourceId,
        status: AssignmentStatus,
    ) -> Result<()>;

    /// Newest first, with the number of task edges per resource.
    async fn list_resources(
        &mut self,
        status: Option<AssignmentStatus>,
        limit: usize,
    ) -> Result<Vec<ResourceSummary>>;

    // ── assignments ──

    /// Insert an edge; `false` when the pair already has one (of any kind).
    async fn insert_assignment(&mut self, assignment: &Assignment) -> Result<bool>;

    async fn delete_assignment(&mut self, resource: ResourceId, task: TaskId) -> Result<bool>;

    async fn assignment_count(&mut self, resource: ResourceId) -> Result<i64>;

    /// Resources attached to `task`, newest assignment first. Inherited edges
    /// are included only when `include_inherited` is set.
    async fn task_resources(
        &mut self,
        task: TaskId,
        include_inherited: bool,
    ) -> Result<Vec<AssignedResource>>;

    /// Tasks attached to `resource`, newest assignment first.
    async fn resource_tasks(&mut self, resource: ResourceId) -> Result<Vec<ResourceTask>>;

    /// Distinct resources with an edge to any of `tasks`, ordered by id.
    async fn resources_of_tasks(&mut self, tasks: &[TaskId]) -> Result<Vec<ResourceId>>;

    async fn assignment_stats(&mut self) -> Result<AssignmentStats>;

    /// Make every change in this unit of work durable.
    async fn commit(self) -> Result<()>;
}
