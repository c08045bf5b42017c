//! Scope-driven context assembly.
//!
//! Given a task and a [`Scope`], compose an ordered, deduplicated list of at
//! most `max_documents` resources, each tagged with where it came from and
//! a priority score:
//!
//! | Scope | Sources (priority) | Semantic top-up |
//! |-------|--------------------|-----------------|
//! | `self` | own direct (1.0) | yes |
//! | `subtasks` | own and direct children's direct (1.0) | no |
//! | `inherit` | own direct (1.0), ancestors' direct (0.9) | yes |
//! | `tree` | own (1.0), ancestors nearest first (0.9 minus 0.05 per extra hop, floor 0.5), descendants (0.8) | no |
//!
//! Assembly is read-only. The semantic top-up goes through the
//! [`SemanticSearch`] collaborator; its failures are logged and the
//! context is returned without the general documents.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::hierarchy::{ancestors_of, get_task};
use crate::models::{string_enum, AssignmentStatus, Resource, ResourceId, Task, TaskId, TaskStatus};
use crate::resources::get_inherited_resources;
use crate::store::StoreTx;

/// Breadth of context gathered for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    #[serde(rename = "self")]
    SelfOnly,
    Subtasks,
    Inherit,
    Tree,
}

string_enum!(Scope, "scope", {
    SelfOnly => "self",
    Subtasks => "subtasks",
    Inherit => "inherit",
    Tree => "tree",
});

impl Scope {
    fn uses_semantic_top_up(self) -> bool {
        matches!(self, Scope::SelfOnly | Scope::Inherit)
    }
}

/// Where a context document was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    /// Attached to the task itself (or, for `subtasks`/`tree`, to a task
    /// inside the requested subtree).
    Task,
    /// Attached to an ancestor.
    Inherited,
    /// Found by semantic search.
    General,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextDocument {
    pub resource_id: ResourceId,
    pub text: String,
    pub summary: Option<String>,
    /// The resource's own origin (`email`, `meeting`, ...).
    pub origin: String,
    pub source: DocumentSource,
    /// Priority for hierarchy documents, similarity for general ones.
    pub similarity: f64,
    /// Code of the task the document was reached through.
    pub task_code: Option<String>,
}

/// Compact task view used in hierarchy summaries.
#[derive(Debug, Clone, Serialize)]
pub struct TaskBrief {
    pub id: TaskId,
    pub code: String,
    pub title: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub level: u32,
}

impl From<&Task> for TaskBrief {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            code: task.code.clone(),
            title: task.title.clone(),
            status: task.status,
            progress: task.progress,
            level: task.level,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HierarchySummary {
    /// Root first.
    pub ancestors: Vec<TaskBrief>,
    /// Direct children, at most [`HIERARCHY_CHILDREN`].
    pub children: Vec<TaskBrief>,
}

pub const HIERARCHY_CHILDREN: usize = 10;
pub const RELATED_TASKS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    pub task: Task,
    pub scope: Scope,
    pub documents: Vec<ContextDocument>,
    pub hierarchy: HierarchySummary,
    /// First descendants, `tree` scope only.
    pub related_tasks: Vec<TaskBrief>,
}

impl AssembledContext {
    pub fn count(&self, source: DocumentSource) -> usize {
        self.documents.iter().filter(|d| d.source == source).count()
    }
}

// ─── Semantic search collaborator ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub resource_id: ResourceId,
    pub text: String,
    pub summary: Option<String>,
    pub origin: String,
    /// In `[0, 1]`.
    pub similarity: f64,
}

/// Similarity search over every resource, used to fill leftover budget.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    async fn search_by_similarity(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<SearchHit>>;
}

/// Search that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSearch;

#[async_trait]
impl SemanticSearch for DisabledSearch {
    async fn search_by_similarity(&self, _query: &str, _top_k: usize) -> anyhow::Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

// ─── Assembly ───────────────────────────────────────────────────────

struct DocumentCollector {
    docs: Vec<ContextDocument>,
    seen: HashSet<ResourceId>,
    limit: usize,
}

impl DocumentCollector {
    fn new(limit: usize) -> Self {
        Self {
            docs: Vec::new(),
            seen: HashSet::new(),
            limit,
        }
    }

    fn is_full(&self) -> bool {
        self.docs.len() >= self.limit
    }

    fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.docs.len())
    }

    /// Archived resources and repeats are ignored.
    fn push(&mut self, resource: Resource, source: DocumentSource, similarity: f64, task_code: &str) {
        if self.is_full() || resource.assignment_status == AssignmentStatus::Archived {
            return;
        }
        if self.seen.insert(resource.id) {
            self.docs.push(ContextDocument {
                resource_id: resource.id,
                text: resource.text,
                summary: resource.summary,
                origin: resource.source,
                source,
                similarity,
                task_code: Some(task_code.to_string()),
            });
        }
    }

    fn push_hit(&mut self, hit: SearchHit) {
        if !self.is_full() && self.seen.insert(hit.resource_id) {
            self.docs.push(ContextDocument {
                resource_id: hit.resource_id,
                text: hit.text,
                summary: hit.summary,
                origin: hit.origin,
                source: DocumentSource::General,
                similarity: hit.similarity,
                task_code: None,
            });
        }
    }
}

/// Priority of a document held by an ancestor `hops` levels up (`1` is
/// the parent).
fn ancestor_priority(hops: usize) -> f64 {
    (0.9 - 0.05 * hops.saturating_sub(1) as f64).max(0.5)
}

async fn collect_direct<T: StoreTx>(
    tx: &mut T,
    docs: &mut DocumentCollector,
    task: &Task,
    source: DocumentSource,
    similarity: f64,
) -> Result<()> {
    if docs.is_full() {
        return Ok(());
    }
    for held in tx.task_resources(task.id, false).await? {
        docs.push(held.resource, source, similarity, &task.code);
    }
    Ok(())
}

/// Compose context for `task_id`.
///
/// `query` drives the semantic top-up; without one the task's title and
/// description are used.
pub async fn assemble_context<T: StoreTx>(
    tx: &mut T,
    search: &dyn SemanticSearch,
    task_id: TaskId,
    scope: Scope,
    max_documents: usize,
    query: Option<&str>,
) -> Result<AssembledContext> {
    if max_documents == 0 {
        return Err(EngineError::InvalidArgument(
            "max_documents must be at least 1".to_string(),
        ));
    }
    let task = get_task(tx, task_id).await?;
    let ancestors = ancestors_of(tx, &task).await?;
    let children = tx.children(Some(task.id)).await?;
    let mut docs = DocumentCollector::new(max_documents);
    let mut related_tasks = Vec::new();

    collect_direct(tx, &mut docs, &task, DocumentSource::Task, 1.0).await?;

    match scope {
        Scope::SelfOnly => {}
        Scope::Subtasks => {
            for child in &children {
                collect_direct(tx, &mut docs, child, DocumentSource::Task, 1.0).await?;
            }
        }
        Scope::Inherit => {
            for inherited in get_inherited_resources(tx, task.id).await? {
                docs.push(
                    inherited.resource,
                    DocumentSource::Inherited,
                    0.9,
                    &inherited.source_task_code,
                );
            }
        }
        Scope::Tree => {
            for (hops, ancestor) in ancestors.iter().rev().enumerate() {
                let priority = ancestor_priority(hops + 1);
                collect_direct(tx, &mut docs, ancestor, DocumentSource::Inherited, priority).await?;
            }
            let descendants = tx
                .tasks_under_path(&crate::path::descendant_prefix(&task.path))
                .await?;
            for descendant in &descendants {
                collect_direct(tx, &mut docs, descendant, DocumentSource::Task, 0.8).await?;
            }
            related_tasks = descendants.iter().take(RELATED_TASKS).map(TaskBrief::from).collect();
        }
    }

    if scope.uses_semantic_top_up() && !docs.is_full() {
        let fallback = match &task.description {
            Some(description) => format!("{} {}", task.title, description),
            None => task.title.clone(),
        };
        let query = query.map(str::trim).filter(|q| !q.is_empty()).unwrap_or(fallback.as_str());
        let top_k = docs.remaining() + docs.seen.len();
        match search.search_by_similarity(query, top_k).await {
            Ok(hits) => {
                for hit in hits {
                    docs.push_hit(hit);
                }
            }
            Err(e) => warn!(task_id, error = %e, "semantic top-up failed; continuing without it"),
        }
    }

    let hierarchy = HierarchySummary {
        ancestors: ancestors.iter().map(TaskBrief::from).collect(),
        children: children.iter().take(HIERARCHY_CHILDREN).map(TaskBrief::from).collect(),
    };

    let assembled = AssembledContext {
        task,
        scope,
        documents: docs.docs,
        hierarchy,
        related_tasks,
    };
    debug!(
        task_id,
        scope = %scope,
        documents = assembled.documents.len(),
        task_docs = assembled.count(DocumentSource::Task),
        inherited = assembled.count(DocumentSource::Inherited),
        general = assembled.count(DocumentSource::General),
        "context assembled"
    );
    Ok(assembled)
}

// ─── Preview ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SourceCounts {
    pub task: usize,
    pub inherited: usize,
    pub general: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestedScope {
    pub scope: Scope,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextPreview {
    pub task: TaskBrief,
    pub scope: Scope,
    pub counts: SourceCounts,
    pub hierarchy: HierarchySummary,
    pub suggested_scopes: Vec<SuggestedScope>,
}

/// What a question about `task_id` would see, without asking one.
pub async fn context_preview<T: StoreTx>(
    tx: &mut T,
    search: &dyn SemanticSearch,
    task_id: TaskId,
    scope: Scope,
    max_documents: usize,
) -> Result<ContextPreview> {
    let assembled = assemble_context(tx, search, task_id, scope, max_documents, None).await?;
    let child_count = tx.children(Some(task_id)).await?.len();
    let suggested_scopes = suggest_scopes(child_count, assembled.hierarchy.ancestors.len());

    Ok(ContextPreview {
        task: TaskBrief::from(&assembled.task),
        scope,
        counts: SourceCounts {
            task: assembled.count(DocumentSource::Task),
            inherited: assembled.count(DocumentSource::Inherited),
            general: assembled.count(DocumentSource::General),
            total: assembled.documents.len(),
        },
        hierarchy: assembled.hierarchy,
        suggested_scopes,
    })
}

/// `self` always; `subtasks` with children; `inherit` with ancestors;
/// `tree` with either.
pub fn suggest_scopes(child_count: usize, ancestor_count: usize) -> Vec<SuggestedScope> {
    let mut scopes = vec![SuggestedScope {
        scope: Scope::SelfOnly,
        description: "Only this task's documents".to_string(),
    }];
    if child_count > 0 {
        scopes.push(SuggestedScope {
            scope: Scope::Subtasks,
            description: format!("This task and its {} subtask(s)", child_count),
        });
    }
    if ancestor_count > 0 {
        scopes.push(SuggestedScope {
            scope: Scope::Inherit,
            description: format!("Include documents from {} parent task(s)", ancestor_count),
        });
    }
    if child_count > 0 || ancestor_count > 0 {
        scopes.push(SuggestedScope {
            scope: Scope::Tree,
            description: "Every task in the surrounding hierarchy".to_string(),
        });
    }
    scopes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parsing() {
        assert_eq!("self".parse::<Scope>().unwrap(), Scope::SelfOnly);
        assert_eq!("TREE".parse::<Scope>().unwrap(), Scope::Tree);
        let err = "everything".parse::<Scope>().unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_scope_serializes_as_self() {
        assert_eq!(serde_json::to_value(Scope::SelfOnly).unwrap(), "self");
        assert_eq!(serde_json::to_value(Scope::Subtasks).unwrap(), "subtasks");
    }

    #[test]
    fn test_ancestor_priority_decays_to_floor() {
        assert!((ancestor_priority(1) - 0.9).abs() < 1e-9);
        assert!((ancestor_priority(2) - 0.85).abs() < 1e-9);
        assert!((ancestor_priority(20) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_suggest_scopes() {
        let leaf_root: Vec<Scope> = suggest_scopes(0, 0).iter().map(|s| s.scope).collect();
        assert_eq!(leaf_root, vec![Scope::SelfOnly]);

        let middle: Vec<Scope> = suggest_scopes(2, 1).iter().map(|s| s.scope).collect();
        assert_eq!(
            middle,
            vec![Scope::SelfOnly, Scope::Subtasks, Scope::Inherit, Scope::Tree]
        );
    }

    #[test]
    fn test_collector_dedups_and_caps() {
        let resource = |id: ResourceId| Resource {
            id,
            text: format!("doc {}", id),
            summary: None,
            source: "note".to_string(),
            source_type: "web".to_string(),
            assignment_status: AssignmentStatus::Assigned,
            created_at: 0,
        };
        let mut docs = DocumentCollector::new(2);
        docs.push(resource(1), DocumentSource::Task, 1.0, "A-1");
        docs.push(resource(1), DocumentSource::Inherited, 0.9, "P-1");
        docs.push_hit(SearchHit {
            resource_id: 1,
            text: String::new(),
            summary: None,
            origin: String::new(),
            similarity: 0.4,
        });
        assert_eq!(docs.docs.len(), 1);
        docs.push(resource(2), DocumentSource::Task, 1.0, "A-1");
        docs.push(resource(3), DocumentSource::Task, 1.0, "A-1");
        assert_eq!(docs.docs.len(), 2);
        assert!(docs.is_full());
    }
}
