//! Task hierarchy: creation, navigation, subtree moves, progress roll-up,
//! and deletion.
//!
//! Every function takes the caller's open [`StoreTx`]; none of them commit.
//! Structural invariants maintained here:
//!
//! - `path == parent.path + "/" + code` (roots: `path == code`)
//! - `level == segments(path) - 1`
//! - a non-leaf task's progress is the floored mean of its children's

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::models::{
    now_millis, NewTask, Task, TaskDraft, TaskFilter, TaskFullContext, TaskId, TaskPatch,
    TaskStatus, TreeNode,
};
use crate::path::{ancestor_codes, child_path, descendant_prefix, level_of, rebase, validate_code};
use crate::resources::refresh_assignment_status;
use crate::store::StoreTx;

/// Shape of generated task codes: `{prefix}-{n}` with `n` zero-padded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFormat {
    pub prefix: String,
    pub width: usize,
}

impl Default for CodeFormat {
    fn default() -> Self {
        Self {
            prefix: "TASK".to_string(),
            width: 3,
        }
    }
}

impl CodeFormat {
    pub fn format(&self, n: i64) -> String {
        format!("{}-{:0width$}", self.prefix, n, width = self.width)
    }
}

// ─── Lookup ─────────────────────────────────────────────────────────

pub async fn get_task<T: StoreTx>(tx: &mut T, id: TaskId) -> Result<Task> {
    tx.task(id)
        .await?
        .ok_or_else(|| EngineError::task_not_found(id))
}

pub async fn get_task_by_code<T: StoreTx>(tx: &mut T, code: &str) -> Result<Task> {
    tx.task_by_code(code)
        .await?
        .ok_or_else(|| EngineError::task_not_found(code))
}

pub async fn list_tasks<T: StoreTx>(tx: &mut T, filter: &TaskFilter) -> Result<Vec<Task>> {
    Ok(tx.list_tasks(filter).await?)
}

// ─── Create / update ────────────────────────────────────────────────

/// Create a task under `new.parent_id` (or as a root).
///
/// An explicit code must be unused; otherwise one is generated from
/// `format`, starting at the current task count plus one and stepping
/// forward until a free code is found.
pub async fn create_task<T: StoreTx>(tx: &mut T, new: NewTask, format: &CodeFormat) -> Result<Task> {
    if new.title.trim().is_empty() {
        return Err(EngineError::InvalidArgument(
            "task title must not be empty".to_string(),
        ));
    }

    let parent = match new.parent_id {
        Some(parent_id) => Some(get_task(tx, parent_id).await?),
        None => None,
    };

    let code = match new.code {
        Some(code) => {
            let code = code.trim().to_string();
            validate_code(&code)?;
            if tx.task_by_code(&code).await?.is_some() {
                return Err(EngineError::Conflict(format!(
                    "task code '{}' already exists",
                    code
                )));
            }
            code
        }
        None => generate_code(tx, format).await?,
    };

    let path = child_path(parent.as_ref().map(|p| p.path.as_str()), &code);
    let draft = TaskDraft {
        title: new.title,
        code,
        parent_id: parent.as_ref().map(|p| p.id),
        level: level_of(&path),
        path,
        status: TaskStatus::New,
        priority: new.priority,
        progress: 0,
        description: new.description,
        owner: new.owner,
        due_date: new.due_date,
        created_at: now_millis(),
    };
    let task = tx.insert_task(&draft).await?;

    if let Some(parent) = &parent {
        roll_up_progress(tx, Some(parent.id)).await?;
    }

    info!(task_id = task.id, code = %task.code, path = %task.path, "task created");
    Ok(task)
}

async fn generate_code<T: StoreTx>(tx: &mut T, format: &CodeFormat) -> Result<String> {
    let mut n = tx.count_tasks().await? + 1;
    loop {
        let candidate = format.format(n);
        if tx.task_by_code(&candidate).await?.is_none() {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Apply a partial update of descriptive fields.
pub async fn update_task<T: StoreTx>(tx: &mut T, id: TaskId, patch: TaskPatch) -> Result<Task> {
    let mut task = get_task(tx, id).await?;
    if patch.is_empty() {
        return Ok(task);
    }

    if let Some(title) = patch.title {
        if title.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "task title must not be empty".to_string(),
            ));
        }
        task.title = title;
    }
    if let Some(description) = patch.description {
        task.description = Some(description);
    }
    if let Some(status) = patch.status {
        task.status = status;
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(owner) = patch.owner {
        task.owner = Some(owner);
    }
    if let Some(due_date) = patch.due_date {
        task.due_date = Some(due_date);
    }
    task.updated_at = now_millis();
    tx.update_task(&task).await?;

    debug!(task_id = task.id, "task updated");
    Ok(task)
}

// ─── Navigation ─────────────────────────────────────────────────────

pub async fn get_children<T: StoreTx>(tx: &mut T, id: TaskId) -> Result<Vec<Task>> {
    get_task(tx, id).await?;
    Ok(tx.children(Some(id)).await?)
}

/// All tasks strictly below `id`, by path prefix. Ordered by level, then id.
pub async fn get_descendants<T: StoreTx>(tx: &mut T, id: TaskId) -> Result<Vec<Task>> {
    let task = get_task(tx, id).await?;
    descendants_of(tx, &task).await
}

async fn descendants_of<T: StoreTx>(tx: &mut T, task: &Task) -> Result<Vec<Task>> {
    Ok(tx.tasks_under_path(&descendant_prefix(&task.path)).await?)
}

/// Strict ancestors of `id`, root first.
pub async fn get_ancestors<T: StoreTx>(tx: &mut T, id: TaskId) -> Result<Vec<Task>> {
    let task = get_task(tx, id).await?;
    ancestors_of(tx, &task).await
}

/// Fetch every ancestor named in the path in one query, then follow
/// `parent_id` links upward through the fetched set.
pub(crate) async fn ancestors_of<T: StoreTx>(tx: &mut T, task: &Task) -> Result<Vec<Task>> {
    let codes = ancestor_codes(&task.path);
    if codes.is_empty() {
        return Ok(Vec::new());
    }
    let mut by_id: HashMap<TaskId, Task> = tx
        .tasks_by_codes(&codes)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    let mut chain = Vec::with_capacity(codes.len());
    let mut next = task.parent_id;
    while let Some(id) = next {
        let Some(ancestor) = by_id.remove(&id) else {
            warn!(task_id = task.id, missing = id, "ancestor chain broken");
            break;
        };
        next = ancestor.parent_id;
        chain.push(ancestor);
    }
    chain.reverse();
    Ok(chain)
}

/// Other children of the same parent; for a root, the other roots.
pub async fn get_siblings<T: StoreTx>(tx: &mut T, id: TaskId) -> Result<Vec<Task>> {
    let task = get_task(tx, id).await?;
    let mut siblings = tx.children(task.parent_id).await?;
    siblings.retain(|t| t.id != task.id);
    Ok(siblings)
}

pub async fn get_task_full_context<T: StoreTx>(tx: &mut T, id: TaskId) -> Result<TaskFullContext> {
    let task = get_task(tx, id).await?;
    let ancestors = ancestors_of(tx, &task).await?;
    let descendants = descendants_of(tx, &task).await?;
    let siblings = get_siblings(tx, id).await?;
    Ok(TaskFullContext {
        task,
        ancestors,
        descendants,
        siblings,
    })
}

/// Nested tree under `root`, or under every root task when `None`.
pub async fn get_task_tree<T: StoreTx>(tx: &mut T, root: Option<TaskId>) -> Result<Vec<TreeNode>> {
    let roots = match root {
        Some(id) => vec![get_task(tx, id).await?],
        None => tx.children(None).await?,
    };

    let mut trees = Vec::with_capacity(roots.len());
    for root in roots {
        let descendants = descendants_of(tx, &root).await?;
        let mut by_parent: HashMap<TaskId, Vec<Task>> = HashMap::new();
        for task in descendants {
            if let Some(parent_id) = task.parent_id {
                by_parent.entry(parent_id).or_default().push(task);
            }
        }
        for children in by_parent.values_mut() {
            children.sort_by_key(|t| t.id);
        }
        trees.push(attach_children(root, &mut by_parent));
    }
    Ok(trees)
}

fn attach_children(task: Task, by_parent: &mut HashMap<TaskId, Vec<Task>>) -> TreeNode {
    let children = by_parent
        .remove(&task.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| attach_children(child, by_parent))
        .collect();
    TreeNode { task, children }
}

// ─── Move ───────────────────────────────────────────────────────────

/// Re-parent `id` (and its whole subtree) under `new_parent`, or make it a
/// root when `None`.
///
/// Fails with `InvalidOperation` when the target is the task itself or one
/// of its descendants. Every descendant's path is rewritten by swapping the
/// old prefix for the new one; the caller's transaction makes the rewrite
/// all-or-nothing.
pub async fn move_task<T: StoreTx>(tx: &mut T, id: TaskId, new_parent: Option<TaskId>) -> Result<Task> {
    let mut task = get_task(tx, id).await?;

    if new_parent == Some(id) {
        return Err(EngineError::InvalidOperation(format!(
            "cannot move task {} under itself",
            task.code
        )));
    }
    let parent = match new_parent {
        Some(parent_id) => Some(get_task(tx, parent_id).await?),
        None => None,
    };

    let descendants = descendants_of(tx, &task).await?;
    if let Some(parent) = &parent {
        if descendants.iter().any(|d| d.id == parent.id) {
            return Err(EngineError::InvalidOperation(format!(
                "cannot move task {} under its own descendant {}",
                task.code, parent.code
            )));
        }
    }

    if task.parent_id == new_parent {
        debug!(task_id = id, "move is a no-op");
        return Ok(task);
    }

    let old_parent = task.parent_id;
    let old_path = task.path.clone();
    let old_level = task.level;
    let new_path = child_path(parent.as_ref().map(|p| p.path.as_str()), &task.code);
    let now = now_millis();

    task.parent_id = new_parent;
    task.level = level_of(&new_path);
    task.path = new_path.clone();
    task.updated_at = now;
    tx.update_task(&task).await?;

    for mut descendant in descendants.iter().cloned() {
        let rebased = rebase(&descendant.path, &old_path, &new_path).ok_or_else(|| {
            anyhow::anyhow!(
                "descendant path '{}' does not start with '{}'",
                descendant.path,
                old_path
            )
        })?;
        descendant.level = level_of(&rebased);
        descendant.path = rebased;
        descendant.updated_at = now;
        tx.update_task(&descendant).await?;
    }

    roll_up_progress(tx, old_parent).await?;
    roll_up_progress(tx, new_parent).await?;

    info!(
        task_id = id,
        from = %old_path,
        to = %new_path,
        level_delta = task.level as i64 - old_level as i64,
        descendants = descendants.len(),
        "task moved"
    );
    get_task(tx, id).await
}

// ─── Progress ───────────────────────────────────────────────────────

/// Set a task's progress and recompute every ancestor.
///
/// A value set on a task that has children is stored but immediately
/// replaced by the mean of its children.
pub async fn update_progress<T: StoreTx>(tx: &mut T, id: TaskId, progress: i64) -> Result<Task> {
    if !(0..=100).contains(&progress) {
        return Err(EngineError::InvalidArgument(format!(
            "progress must be between 0 and 100, got {}",
            progress
        )));
    }
    let mut task = get_task(tx, id).await?;
    task.progress = progress as u8;
    task.updated_at = now_millis();
    tx.update_task(&task).await?;

    let has_children = !tx.children(Some(id)).await?.is_empty();
    if has_children {
        warn!(
            task_id = id,
            requested = progress,
            "progress of a task with children is derived from them"
        );
        roll_up_progress(tx, Some(id)).await?;
    } else {
        roll_up_progress(tx, task.parent_id).await?;
    }

    get_task(tx, id).await
}

/// Stored progress for a leaf, floored mean of direct children otherwise.
pub async fn calculate_progress<T: StoreTx>(tx: &mut T, id: TaskId) -> Result<u8> {
    let task = get_task(tx, id).await?;
    let children = tx.children(Some(id)).await?;
    Ok(children_mean(&children).unwrap_or(task.progress))
}

fn children_mean(children: &[Task]) -> Option<u8> {
    if children.is_empty() {
        return None;
    }
    let sum: u32 = children.iter().map(|c| c.progress as u32).sum();
    Some((sum / children.len() as u32) as u8)
}

/// Recompute progress from `start` up to its root. Tasks without children
/// keep their stored value.
pub(crate) async fn roll_up_progress<T: StoreTx>(tx: &mut T, start: Option<TaskId>) -> Result<()> {
    let mut current = start;
    while let Some(id) = current {
        let Some(mut task) = tx.task(id).await? else {
            break;
        };
        let children = tx.children(Some(id)).await?;
        if let Some(mean) = children_mean(&children) {
            if mean != task.progress {
                debug!(task_id = id, from = task.progress, to = mean, "progress rolled up");
                task.progress = mean;
                task.updated_at = now_millis();
                tx.update_task(&task).await?;
            }
        }
        current = task.parent_id;
    }
    Ok(())
}

// ─── Delete ─────────────────────────────────────────────────────────

/// Delete a task; `false` when it does not exist.
///
/// Without `cascade`, a task with children is rejected. With it, the whole
/// subtree goes, deepest level first. Dependency and assignment edges of
/// every removed task go with it, and resources left without any edge
/// revert to `unassigned`.
pub async fn delete_task<T: StoreTx>(tx: &mut T, id: TaskId, cascade: bool) -> Result<bool> {
    let Some(task) = tx.task(id).await? else {
        return Ok(false);
    };
    let mut doomed = descendants_of(tx, &task).await?;
    if !doomed.is_empty() && !cascade {
        return Err(EngineError::InvalidOperation(format!(
            "task {} has {} descendant(s); pass cascade to delete them",
            task.code,
            doomed.len()
        )));
    }

    doomed.sort_by(|a, b| b.level.cmp(&a.level).then(b.id.cmp(&a.id)));
    let mut ids: Vec<TaskId> = doomed.iter().map(|t| t.id).collect();
    ids.push(task.id);

    let touched_resources = tx.resources_of_tasks(&ids).await?;
    for doomed_id in &ids {
        tx.delete_task(*doomed_id).await?;
    }
    for resource_id in touched_resources {
        refresh_assignment_status(tx, resource_id).await?;
    }
    roll_up_progress(tx, task.parent_id).await?;

    info!(task_id = id, code = %task.code, removed = ids.len(), "task deleted");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_format() {
        let format = CodeFormat::default();
        assert_eq!(format.format(7), "TASK-007");
        assert_eq!(format.format(1234), "TASK-1234");
        let wide = CodeFormat {
            prefix: "PROJ".to_string(),
            width: 5,
        };
        assert_eq!(wide.format(42), "PROJ-00042");
    }

    #[test]
    fn test_children_mean_floors() {
        let make = |progress: u8| Task {
            id: 0,
            title: String::new(),
            code: String::new(),
            parent_id: None,
            level: 0,
            path: String::new(),
            status: TaskStatus::New,
            priority: Default::default(),
            progress,
            description: None,
            owner: None,
            due_date: None,
            created_at: 0,
            updated_at: 0,
        };
        assert_eq!(children_mean(&[]), None);
        assert_eq!(children_mean(&[make(50), make(25)]), Some(37));
        assert_eq!(children_mean(&[make(100), make(100), make(99)]), Some(99));
    }
}
