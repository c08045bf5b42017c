//! Transaction-scoped facade over the managers.
//!
//! Each public method on [`TaskEngine`] is one top-level operation: it
//! begins a [`StoreTx`], runs the manager function against it, and commits
//! only if that function succeeded. An error anywhere drops the
//! transaction and with it every partial write.
//!
//! ```rust,ignore
//! let engine = TaskEngine::new(InMemoryStore::new());
//! let root = engine.create_task(NewTask::new("Project").code("PROJ-001")).await?;
//! let dev = engine.create_task(NewTask::new("Dev").code("DEV-001").parent(root.id)).await?;
//! engine.move_task(dev.id, None).await?;
//! ```

use std::sync::Arc;

use crate::context::{self, AssembledContext, ContextPreview, DisabledSearch, Scope, SemanticSearch};
use crate::dependencies::{self, BatchReport};
use crate::error::Result;
use crate::graph::{DependencyAnalysis, DependencyGraph};
use crate::hierarchy::{self, CodeFormat};
use crate::models::{
    AssignedResource, AssignmentReport, AssignmentStats, AssignmentStatus, DependencyEdge,
    InheritReport, InheritedResource, NewDependency, NewResource, NewTask, Resource, ResourceId,
    ResourceSummary, ResourceTask, Task, TaskFilter, TaskFullContext, TaskId, TaskPatch, TreeNode,
};
use crate::qa::{self, AnswerGenerator, AskResponse};
use crate::resources;
use crate::store::{Store, StoreTx};

/// Begin a transaction, evaluate `$body` against it, commit, return.
macro_rules! in_tx {
    ($engine:ident, |$tx:ident| $body:expr) => {{
        let mut $tx = $engine.store.begin().await?;
        let out = $body;
        $tx.commit().await?;
        Ok(out)
    }};
}

/// Tuning knobs that are not per-call arguments.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub code_format: CodeFormat,
    /// Words kept per document snippet in rendered context.
    pub snippet_words: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            code_format: CodeFormat::default(),
            snippet_words: 40,
        }
    }
}

pub struct TaskEngine<S: Store> {
    store: S,
    options: EngineOptions,
    search: Arc<dyn SemanticSearch>,
}

impl<S: Store> TaskEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            options: EngineOptions::default(),
            search: Arc::new(DisabledSearch),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_search(mut self, search: Arc<dyn SemanticSearch>) -> Self {
        self.search = search;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── hierarchy ──

    pub async fn create_task(&self, new: NewTask) -> Result<Task> {
        in_tx!(self, |tx| hierarchy::create_task(&mut tx, new, &self.options.code_format).await?)
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task> {
        in_tx!(self, |tx| hierarchy::get_task(&mut tx, id).await?)
    }

    pub async fn get_task_by_code(&self, code: &str) -> Result<Task> {
        in_tx!(self, |tx| hierarchy::get_task_by_code(&mut tx, code).await?)
    }

    pub async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task> {
        in_tx!(self, |tx| hierarchy::update_task(&mut tx, id, patch).await?)
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        in_tx!(self, |tx| hierarchy::list_tasks(&mut tx, filter).await?)
    }

    pub async fn get_children(&self, id: TaskId) -> Result<Vec<Task>> {
        in_tx!(self, |tx| hierarchy::get_children(&mut tx, id).await?)
    }

    pub async fn get_descendants(&self, id: TaskId) -> Result<Vec<Task>> {
        in_tx!(self, |tx| hierarchy::get_descendants(&mut tx, id).await?)
    }

    pub async fn get_ancestors(&self, id: TaskId) -> Result<Vec<Task>> {
        in_tx!(self, |tx| hierarchy::get_ancestors(&mut tx, id).await?)
    }

    pub async fn get_siblings(&self, id: TaskId) -> Result<Vec<Task>> {
        in_tx!(self, |tx| hierarchy::get_siblings(&mut tx, id).await?)
    }

    pub async fn get_task_tree(&self, root: Option<TaskId>) -> Result<Vec<TreeNode>> {
        in_tx!(self, |tx| hierarchy::get_task_tree(&mut tx, root).await?)
    }

    pub async fn get_task_full_context(&self, id: TaskId) -> Result<TaskFullContext> {
        in_tx!(self, |tx| hierarchy::get_task_full_context(&mut tx, id).await?)
    }

    pub async fn move_task(&self, id: TaskId, new_parent: Option<TaskId>) -> Result<Task> {
        in_tx!(self, |tx| hierarchy::move_task(&mut tx, id, new_parent).await?)
    }

    pub async fn update_progress(&self, id: TaskId, progress: i64) -> Result<Task> {
        in_tx!(self, |tx| hierarchy::update_progress(&mut tx, id, progress).await?)
    }

    pub async fn calculate_progress(&self, id: TaskId) -> Result<u8> {
        in_tx!(self, |tx| hierarchy::calculate_progress(&mut tx, id).await?)
    }

    pub async fn delete_task(&self, id: TaskId, cascade: bool) -> Result<bool> {
        in_tx!(self, |tx| hierarchy::delete_task(&mut tx, id, cascade).await?)
    }

    // ── dependencies ──

    pub async fn add_dependency(&self, dep: &NewDependency) -> Result<bool> {
        in_tx!(self, |tx| dependencies::add_dependency(&mut tx, dep).await?)
    }

    pub async fn add_dependencies(&self, batch: &[NewDependency]) -> Result<BatchReport> {
        in_tx!(self, |tx| dependencies::add_dependencies(&mut tx, batch).await?)
    }

    pub async fn remove_dependency(&self, dependent: TaskId, prerequisite: TaskId) -> Result<bool> {
        in_tx!(self, |tx| dependencies::remove_dependency(&mut tx, dependent, prerequisite).await?)
    }

    pub async fn get_prerequisites(&self, id: TaskId) -> Result<Vec<Task>> {
        in_tx!(self, |tx| dependencies::get_prerequisites(&mut tx, id).await?)
    }

    pub async fn get_dependents(&self, id: TaskId) -> Result<Vec<Task>> {
        in_tx!(self, |tx| dependencies::get_dependents(&mut tx, id).await?)
    }

    pub async fn list_dependencies(&self, task_ids: Option<&[TaskId]>) -> Result<Vec<DependencyEdge>> {
        in_tx!(self, |tx| dependencies::list_dependencies(&mut tx, task_ids).await?)
    }

    pub async fn build_graph(&self, task_ids: Option<&[TaskId]>) -> Result<DependencyGraph> {
        in_tx!(self, |tx| dependencies::build_graph(&mut tx, task_ids).await?)
    }

    pub async fn analyze_dependencies(&self) -> Result<DependencyAnalysis> {
        in_tx!(self, |tx| dependencies::analyze_dependencies(&mut tx).await?)
    }

    // ── resources ──

    pub async fn add_resource(&self, new: &NewResource) -> Result<Resource> {
        in_tx!(self, |tx| resources::add_resource(&mut tx, new).await?)
    }

    pub async fn get_resource(&self, id: ResourceId) -> Result<Resource> {
        in_tx!(self, |tx| resources::get_resource(&mut tx, id).await?)
    }

    pub async fn assign_resource(
        &self,
        resource_id: ResourceId,
        task_ids: &[TaskId],
        assigned_by: Option<&str>,
    ) -> Result<AssignmentReport> {
        in_tx!(self, |tx| resources::assign_resource(&mut tx, resource_id, task_ids, assigned_by).await?)
    }

    pub async fn bulk_assign(
        &self,
        resource_ids: &[ResourceId],
        task_id: TaskId,
        assigned_by: Option<&str>,
    ) -> Result<AssignmentReport> {
        in_tx!(self, |tx| resources::bulk_assign(&mut tx, resource_ids, task_id, assigned_by).await?)
    }

    pub async fn unassign_resource(&self, resource_id: ResourceId, task_id: TaskId) -> Result<bool> {
        in_tx!(self, |tx| resources::unassign_resource(&mut tx, resource_id, task_id).await?)
    }

    pub async fn get_task_resources(
        &self,
        task_id: TaskId,
        include_inherited: bool,
    ) -> Result<Vec<AssignedResource>> {
        in_tx!(self, |tx| resources::get_task_resources(&mut tx, task_id, include_inherited).await?)
    }

    pub async fn get_inherited_resources(&self, task_id: TaskId) -> Result<Vec<InheritedResource>> {
        in_tx!(self, |tx| resources::get_inherited_resources(&mut tx, task_id).await?)
    }

    pub async fn inherit_parent_resources(
        &self,
        task_id: TaskId,
        assigned_by: Option<&str>,
    ) -> Result<InheritReport> {
        in_tx!(self, |tx| resources::inherit_parent_resources(&mut tx, task_id, assigned_by).await?)
    }

    pub async fn get_resource_tasks(&self, resource_id: ResourceId) -> Result<Vec<ResourceTask>> {
        in_tx!(self, |tx| resources::get_resource_tasks(&mut tx, resource_id).await?)
    }

    pub async fn list_resources(
        &self,
        status: Option<AssignmentStatus>,
        limit: usize,
    ) -> Result<Vec<ResourceSummary>> {
        in_tx!(self, |tx| resources::list_resources(&mut tx, status, limit).await?)
    }

    pub async fn get_unassigned_resources(&self, limit: usize) -> Result<Vec<ResourceSummary>> {
        in_tx!(self, |tx| resources::get_unassigned_resources(&mut tx, limit).await?)
    }

    pub async fn archive_resource(&self, id: ResourceId) -> Result<Resource> {
        in_tx!(self, |tx| resources::archive_resource(&mut tx, id).await?)
    }

    pub async fn restore_resource(&self, id: ResourceId) -> Result<Resource> {
        in_tx!(self, |tx| resources::restore_resource(&mut tx, id).await?)
    }

    pub async fn get_assignment_stats(&self) -> Result<AssignmentStats> {
        in_tx!(self, |tx| resources::get_assignment_stats(&mut tx).await?)
    }

    // ── context ──

    pub async fn assemble_context(
        &self,
        task_id: TaskId,
        scope: Scope,
        max_documents: usize,
        query: Option<&str>,
    ) -> Result<AssembledContext> {
        in_tx!(self, |tx| {
            context::assemble_context(&mut tx, self.search.as_ref(), task_id, scope, max_documents, query)
                .await?
        })
    }

    pub async fn context_preview(
        &self,
        task_code: &str,
        scope: Scope,
        max_documents: usize,
    ) -> Result<ContextPreview> {
        in_tx!(self, |tx| {
            let task = hierarchy::get_task_by_code(&mut tx, task_code).await?;
            context::context_preview(&mut tx, self.search.as_ref(), task.id, scope, max_documents)
                .await?
        })
    }

    /// Render assembled context the way it is sent to the answer generator.
    pub fn build_context_text(&self, assembled: &AssembledContext) -> String {
        qa::build_context_text(assembled, self.options.snippet_words)
    }

    /// Assemble context for the task with `task_code` (using the question
    /// as the semantic query) and ask `answerer`.
    ///
    /// The transaction is closed before the collaborator is called.
    pub async fn ask_with_task_context(
        &self,
        answerer: &dyn AnswerGenerator,
        question: &str,
        task_code: &str,
        scope: Scope,
        max_documents: usize,
    ) -> Result<AskResponse> {
        let assembled: AssembledContext = {
            let result: Result<AssembledContext> = in_tx!(self, |tx| {
                let task = hierarchy::get_task_by_code(&mut tx, task_code).await?;
                context::assemble_context(
                    &mut tx,
                    self.search.as_ref(),
                    task.id,
                    scope,
                    max_documents,
                    Some(question),
                )
                .await?
            });
            result?
        };
        qa::answer_with_context(answerer, question, &assembled, self.options.snippet_words).await
    }
}
