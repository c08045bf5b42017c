//! Core data models: tasks, dependency edges, resources, and assignments.
//!
//! Identifiers are plain integers assigned by the backing store.
//! Timestamps are unix milliseconds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type TaskId = i64;
pub type ResourceId = i64;

/// Current wall-clock time in unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Declares the string form of a unit enum once and derives `as_str`,
/// `Display`, and `FromStr` (which fails with `InvalidArgument`).
macro_rules! string_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::error::EngineError;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::error::EngineError::InvalidArgument(format!(
                        "unknown {}: '{}' (expected one of: {})",
                        $label,
                        other,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }
    };
}
pub(crate) use string_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    New,
    InProgress,
    Blocked,
    Done,
}

string_enum!(TaskStatus, "task status", {
    New => "new",
    InProgress => "in_progress",
    Blocked => "blocked",
    Done => "done",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

string_enum!(Priority, "priority", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

/// A unit of work: one node of the task forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    /// Globally unique short code, e.g. `API-001`.
    pub code: String,
    pub parent_id: Option<TaskId>,
    /// `0` for roots; always `path` segment count minus one.
    pub level: u32,
    /// Ancestor codes down to and including this task, `/`-separated.
    pub path: String,
    pub status: TaskStatus,
    pub priority: Priority,
    /// `0..=100`. Derived from children for non-leaf tasks.
    pub progress: u8,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Caller-facing request for `CreateTask`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub parent_id: Option<TaskId>,
    pub code: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub owner: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn parent(mut self, parent_id: TaskId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn due_date(mut self, due: NaiveDate) -> Self {
        self.due_date = Some(due);
        self
    }
}

/// A fully computed task row, ready for insertion. The store assigns `id`.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub title: String,
    pub code: String,
    pub parent_id: Option<TaskId>,
    pub level: u32,
    pub path: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub progress: u8,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub created_at: i64,
}

/// Partial update of a task's descriptive fields.
///
/// Structural fields (`parent_id`, `level`, `path`) change only through
/// `MoveTask`, and `progress` only through `UpdateProgress`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub owner: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.owner.is_none()
            && self.due_date.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub owner: Option<String>,
    pub roots_only: bool,
}

/// A task with its nested children, as returned by `GetTaskTree`.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub task: Task,
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskFullContext {
    pub task: Task,
    pub ancestors: Vec<Task>,
    pub descendants: Vec<Task>,
    pub siblings: Vec<Task>,
}

// ─── Dependencies ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    #[default]
    Blocks,
    Related,
    Subtask,
}

string_enum!(DependencyType, "dependency type", {
    Blocks => "blocks",
    Related => "related",
    Subtask => "subtask",
});

/// Directed edge `prerequisite → dependent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub id: i64,
    pub dependent_id: TaskId,
    pub prerequisite_id: TaskId,
    #[serde(rename = "type")]
    pub kind: DependencyType,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDependency {
    pub dependent_id: TaskId,
    pub prerequisite_id: TaskId,
    #[serde(default, rename = "type")]
    pub kind: DependencyType,
    pub description: Option<String>,
    pub created_by: Option<String>,
}

impl NewDependency {
    pub fn new(dependent_id: TaskId, prerequisite_id: TaskId, kind: DependencyType) -> Self {
        Self {
            dependent_id,
            prerequisite_id,
            kind,
            description: None,
            created_by: None,
        }
    }
}

// ─── Resources ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    #[default]
    Unassigned,
    Assigned,
    Archived,
}

string_enum!(AssignmentStatus, "assignment status", {
    Unassigned => "unassigned",
    Assigned => "assigned",
    Archived => "archived",
});

impl AssignmentStatus {
    /// Status implied by a resource's edge count, unless it is archived.
    pub fn derive(current: AssignmentStatus, edge_count: i64) -> AssignmentStatus {
        match current {
            AssignmentStatus::Archived => AssignmentStatus::Archived,
            _ if edge_count > 0 => AssignmentStatus::Assigned,
            _ => AssignmentStatus::Unassigned,
        }
    }
}

/// A supporting document. Created by the ingestion pipeline; the engine
/// only reads and assigns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub text: String,
    pub summary: Option<String>,
    /// Where the text came from: `email`, `meeting`, `note`, ...
    pub source: String,
    /// Channel it arrived through: `web`, `telegram`, ...
    pub source_type: String,
    pub assignment_status: AssignmentStatus,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewResource {
    pub text: String,
    pub summary: Option<String>,
    pub source: String,
    #[serde(default = "default_source_type")]
    pub source_type: String,
}

fn default_source_type() -> String {
    "web".to_string()
}

impl NewResource {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            summary: None,
            source: source.into(),
            source_type: default_source_type(),
        }
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

/// How a resource-task edge came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceEdge {
    /// Assigned by a user or caller.
    Direct,
    /// Materialized from an ancestor by `InheritParentResources`.
    Inherited,
}

impl ResourceEdge {
    pub fn is_inherited(self) -> bool {
        matches!(self, ResourceEdge::Inherited)
    }
}

/// One `(resource, task)` edge. Unique per pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub resource_id: ResourceId,
    pub task_id: TaskId,
    pub edge: ResourceEdge,
    pub assigned_by: Option<String>,
    pub assigned_at: i64,
}

/// A resource seen through one of its task edges.
#[derive(Debug, Clone, Serialize)]
pub struct AssignedResource {
    pub resource: Resource,
    pub assignment: Assignment,
}

/// A resource visible to a task because a strict ancestor holds it directly.
#[derive(Debug, Clone, Serialize)]
pub struct InheritedResource {
    pub resource: Resource,
    pub source_task_id: TaskId,
    pub source_task_code: String,
    pub assigned_by: Option<String>,
    pub assigned_at: i64,
}

/// A task seen through one of a resource's edges.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceTask {
    pub task: Task,
    pub assignment: Assignment,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceSummary {
    pub resource: Resource,
    pub task_count: i64,
}

/// Outcome of an assign call: ids whose edge was created vs. already present.
///
/// For `AssignResource` the ids are task ids; for `BulkAssign` they are
/// resource ids.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssignmentReport {
    pub created: Vec<i64>,
    pub skipped: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InheritReport {
    pub task_id: TaskId,
    pub inherited_count: usize,
    pub resources: Vec<InheritedResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssignmentStats {
    pub total_resources: i64,
    pub resources_by_status: std::collections::BTreeMap<String, i64>,
    pub total_tasks: i64,
    pub tasks_with_resources: i64,
    pub tasks_without_resources: i64,
    pub total_assignments: i64,
    pub direct_assignments: i64,
    pub inherited_assignments: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), *status);
        }
        assert_eq!("In_Progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
    }

    #[test]
    fn test_unknown_value_is_invalid_argument() {
        let err = "someday".parse::<Priority>().unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        assert!(err.to_string().contains("low, medium, high, urgent"));
    }

    #[test]
    fn test_derive_assignment_status() {
        use AssignmentStatus::*;
        assert_eq!(AssignmentStatus::derive(Unassigned, 1), Assigned);
        assert_eq!(AssignmentStatus::derive(Assigned, 0), Unassigned);
        assert_eq!(AssignmentStatus::derive(Archived, 0), Archived);
        assert_eq!(AssignmentStatus::derive(Archived, 3), Archived);
    }

    #[test]
    fn test_dependency_edge_serializes_type_field() {
        let edge = DependencyEdge {
            id: 1,
            dependent_id: 2,
            prerequisite_id: 3,
            kind: DependencyType::Related,
            description: None,
            created_by: None,
            created_at: 0,
        };
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["type"], "related");
    }
}
