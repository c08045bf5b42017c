//! SQLite-backed [`Store`] implementation.
//!
//! Each [`StoreTx`] wraps one `sqlx` transaction opened with
//! `BEGIN IMMEDIATE`, so the database write lock is held from the first
//! read. Another process waits on `busy_timeout` instead of failing with
//! `SQLITE_BUSY_SNAPSHOT` when it writes after a concurrent commit. Within
//! one process an async writer lock taken in [`Store::begin`] queues
//! transactions before they reach the pool. Dropping a [`SqliteTx`]
//! without committing rolls the `sqlx` transaction back.
//!
//! Descendant lookups compare `substr(path, 1, length(prefix))` instead of
//! using `LIKE`, because task codes may contain `_` and `%`.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};

use task_context_core::models::{
    AssignedResource, Assignment, AssignmentStats, AssignmentStatus, DependencyEdge,
    NewDependency, NewResource, Resource, ResourceEdge, ResourceId, ResourceSummary, ResourceTask,
    Task, TaskDraft, TaskFilter, TaskId,
};
use task_context_core::store::{Store, StoreTx};

const TASK_COLUMNS: &str = "t.id, t.title, t.code, t.parent_id, t.level, t.path, t.status, \
     t.priority, t.progress, t.description, t.owner, t.due_date, t.created_at, t.updated_at";

const DOCUMENT_COLUMNS: &str =
    "d.id, d.text, d.summary, d.source, d.source_type, d.assignment_status, d.created_at";

const DEPENDENCY_COLUMNS: &str =
    "id, dependent_id, prerequisite_id, type, description, created_by, created_at";

/// SQLite implementation of the [`Store`] trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// One unit of work against SQLite.
pub struct SqliteTx {
    tx: Transaction<'static, Sqlite>,
    _writer: OwnedMutexGuard<()>,
}

#[async_trait]
impl Store for SqliteStore {
    type Tx = SqliteTx;

    async fn begin(&self) -> Result<SqliteTx> {
        let writer = self.writer.clone().lock_owned().await;
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .context("Failed to begin transaction")?;
        Ok(SqliteTx {
            tx,
            _writer: writer,
        })
    }
}

// ─── Row mapping ────────────────────────────────────────────────────

fn task_from_row(row: &SqliteRow) -> Result<Task> {
    let due_date: Option<String> = row.try_get("due_date")?;
    let due_date = due_date
        .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
        .transpose()
        .context("Invalid due_date in tasks table")?;
    let level: i64 = row.try_get("level")?;
    let progress: i64 = row.try_get("progress")?;

    Ok(Task {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        code: row.try_get("code")?,
        parent_id: row.try_get("parent_id")?,
        level: u32::try_from(level).context("Negative task level")?,
        path: row.try_get("path")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        priority: row.try_get::<String, _>("priority")?.parse()?,
        progress: u8::try_from(progress).context("Task progress out of range")?,
        description: row.try_get("description")?,
        owner: row.try_get("owner")?,
        due_date,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn resource_from_row(row: &SqliteRow) -> Result<Resource> {
    Ok(Resource {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        summary: row.try_get("summary")?,
        source: row.try_get("source")?,
        source_type: row.try_get("source_type")?,
        assignment_status: row.try_get::<String, _>("assignment_status")?.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

fn dependency_from_row(row: &SqliteRow) -> Result<DependencyEdge> {
    Ok(DependencyEdge {
        id: row.try_get("id")?,
        dependent_id: row.try_get("dependent_id")?,
        prerequisite_id: row.try_get("prerequisite_id")?,
        kind: row.try_get::<String, _>("type")?.parse()?,
        description: row.try_get("description")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Assignment columns selected as `a_task_id`, `a_document_id`, ...
fn assignment_from_row(row: &SqliteRow) -> Result<Assignment> {
    let inherited: i64 = row.try_get("a_inherited")?;
    Ok(Assignment {
        resource_id: row.try_get("a_document_id")?,
        task_id: row.try_get("a_task_id")?,
        edge: if inherited != 0 {
            ResourceEdge::Inherited
        } else {
            ResourceEdge::Direct
        },
        assigned_by: row.try_get("a_assigned_by")?,
        assigned_at: row.try_get("a_assigned_at")?,
    })
}

const ASSIGNMENT_COLUMNS: &str = "dt.document_id AS a_document_id, dt.task_id AS a_task_id, \
     dt.assigned_by AS a_assigned_by, dt.inherited AS a_inherited, dt.assigned_at AS a_assigned_at";

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl SqliteTx {
    async fn fetch_tasks(&mut self, sql: &str, ids: &[i64]) -> Result<Vec<Task>> {
        let mut query = sqlx::query::<Sqlite>(sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&mut *self.tx).await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn count(&mut self, sql: &str) -> Result<i64> {
        Ok(sqlx::query_scalar(sql).fetch_one(&mut *self.tx).await?)
    }
}

#[async_trait]
impl StoreTx for SqliteTx {
    async fn task(&mut self, id: TaskId) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {} FROM tasks t WHERE t.id = ?", TASK_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn task_by_code(&mut self, code: &str) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {} FROM tasks t WHERE t.code = ?", TASK_COLUMNS))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn tasks_by_codes(&mut self, codes: &[&str]) -> Result<Vec<Task>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM tasks t WHERE t.code IN ({})",
            TASK_COLUMNS,
            placeholders(codes.len())
        );
        let mut query = sqlx::query::<Sqlite>(&sql);
        for code in codes {
            query = query.bind(*code);
        }
        let rows = query.fetch_all(&mut *self.tx).await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn tasks_by_ids(&mut self, ids: &[TaskId]) -> Result<Vec<Task>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM tasks t WHERE t.id IN ({}) ORDER BY t.id",
            TASK_COLUMNS,
            placeholders(ids.len())
        );
        self.fetch_tasks(&sql, ids).await
    }

    async fn list_tasks(&mut self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let status = filter.status.map(|s| s.as_str());
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM tasks t
            WHERE (? IS NULL OR t.status = ?)
              AND (? IS NULL OR t.owner = ?)
              AND (? = 0 OR t.parent_id IS NULL)
            ORDER BY t.path
            "#,
            TASK_COLUMNS
        ))
        .bind(status)
        .bind(status)
        .bind(filter.owner.as_deref())
        .bind(filter.owner.as_deref())
        .bind(filter.roots_only)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn count_tasks(&mut self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM tasks").await
    }

    async fn children(&mut self, parent: Option<TaskId>) -> Result<Vec<Task>> {
        match parent {
            Some(parent_id) => {
                let sql = format!(
                    "SELECT {} FROM tasks t WHERE t.parent_id = ? ORDER BY t.id",
                    TASK_COLUMNS
                );
                self.fetch_tasks(&sql, &[parent_id]).await
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM tasks t WHERE t.parent_id IS NULL ORDER BY t.id",
                    TASK_COLUMNS
                );
                self.fetch_tasks(&sql, &[]).await
            }
        }
    }

    async fn tasks_under_path(&mut self, prefix: &str) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks t WHERE substr(t.path, 1, length(?)) = ? ORDER BY t.level, t.id",
            TASK_COLUMNS
        ))
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn insert_task(&mut self, draft: &TaskDraft) -> Result<Task> {
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (title, code, parent_id, level, path, status, priority, progress,
                               description, owner, due_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.code)
        .bind(draft.parent_id)
        .bind(draft.level as i64)
        .bind(&draft.path)
        .bind(draft.status.as_str())
        .bind(draft.priority.as_str())
        .bind(draft.progress as i64)
        .bind(&draft.description)
        .bind(&draft.owner)
        .bind(draft.due_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(draft.created_at)
        .bind(draft.created_at)
        .execute(&mut *self.tx)
        .await
        .with_context(|| format!("Failed to insert task {}", draft.code))?;

        Ok(Task {
            id: result.last_insert_rowid(),
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
        })
    }

    async fn update_task(&mut self, task: &Task) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tasks SET
                title = ?, parent_id = ?, level = ?, path = ?, status = ?, priority = ?,
                progress = ?, description = ?, owner = ?, due_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.title)
        .bind(task.parent_id)
        .bind(task.level as i64)
        .bind(&task.path)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.progress as i64)
        .bind(&task.description)
        .bind(&task.owner)
        .bind(task.due_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(task.updated_at)
        .bind(task.id)
        .execute(&mut *self.tx)
        .await
        .with_context(|| format!("Failed to update task {}", task.code))?;
        Ok(())
    }

    async fn delete_task(&mut self, id: TaskId) -> Result<()> {
        sqlx::query("DELETE FROM task_dependencies WHERE dependent_id = ? OR prerequisite_id = ?")
            .bind(id)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM document_tasks WHERE task_id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_dependency(&mut self, dep: &NewDependency, created_at: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO task_dependencies (dependent_id, prerequisite_id, type, description,
                                           created_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(dependent_id, prerequisite_id) DO NOTHING
            "#,
        )
        .bind(dep.dependent_id)
        .bind(dep.prerequisite_id)
        .bind(dep.kind.as_str())
        .bind(&dep.description)
        .bind(&dep.created_by)
        .bind(created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_dependency(&mut self, dependent: TaskId, prerequisite: TaskId) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM task_dependencies WHERE dependent_id = ? AND prerequisite_id = ?")
                .bind(dependent)
                .bind(prerequisite)
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn dependencies(&mut self, touching: Option<&[TaskId]>) -> Result<Vec<DependencyEdge>> {
        let rows = match touching {
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM task_dependencies ORDER BY id",
                    DEPENDENCY_COLUMNS
                ))
                .fetch_all(&mut *self.tx)
                .await?
            }
            Some([]) => return Ok(Vec::new()),
            Some(ids) => {
                let list = placeholders(ids.len());
                let sql = format!(
                    "SELECT {} FROM task_dependencies \
                     WHERE dependent_id IN ({}) OR prerequisite_id IN ({}) ORDER BY id",
                    DEPENDENCY_COLUMNS, list, list
                );
                let mut query = sqlx::query::<Sqlite>(&sql);
                for id in ids.iter().chain(ids.iter()) {
                    query = query.bind(*id);
                }
                query.fetch_all(&mut *self.tx).await?
            }
        };
        rows.iter().map(dependency_from_row).collect()
    }

    async fn prerequisites(&mut self, task: TaskId) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks t JOIN task_dependencies dep ON dep.prerequisite_id = t.id \
             WHERE dep.dependent_id = ? ORDER BY t.id",
            TASK_COLUMNS
        );
        self.fetch_tasks(&sql, &[task]).await
    }

    async fn dependents(&mut self, task: TaskId) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks t JOIN task_dependencies dep ON dep.dependent_id = t.id \
             WHERE dep.prerequisite_id = ? ORDER BY t.id",
            TASK_COLUMNS
        );
        self.fetch_tasks(&sql, &[task]).await
    }

    async fn resource(&mut self, id: ResourceId) -> Result<Option<Resource>> {
        let row = sqlx::query(&format!("SELECT {} FROM documents d WHERE d.id = ?", DOCUMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(resource_from_row).transpose()
    }

    async fn resources_by_ids(&mut self, ids: &[ResourceId]) -> Result<Vec<Resource>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM documents d WHERE d.id IN ({}) ORDER BY d.id",
            DOCUMENT_COLUMNS,
            placeholders(ids.len())
        );
        let mut query = sqlx::query::<Sqlite>(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&mut *self.tx).await?;
        rows.iter().map(resource_from_row).collect()
    }

    async fn insert_resource(&mut self, new: &NewResource, created_at: i64) -> Result<Resource> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (text, summary, source, source_type, assignment_status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.text)
        .bind(&new.summary)
        .bind(&new.source)
        .bind(&new.source_type)
        .bind(AssignmentStatus::Unassigned.as_str())
        .bind(created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(Resource {
            id: result.last_insert_rowid(),
            text: new.text.clone(),
            summary: new.summary.clone(),
            source: new.source.clone(),
            source_type: new.source_type.clone(),
            assignment_status: AssignmentStatus::Unassigned,
            created_at,
        })
    }

    async fn set_assignment_status(&mut self, id: ResourceId, status: AssignmentStatus) -> Result<()> {
        sqlx::query("UPDATE documents SET assignment_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn list_resources(
        &mut self,
        status: Option<AssignmentStatus>,
        limit: usize,
    ) -> Result<Vec<ResourceSummary>> {
        let status = status.map(|s| s.as_str());
        let rows = sqlx::query(&format!(
            r#"
            SELECT {},
                   (SELECT COUNT(*) FROM document_tasks dt WHERE dt.document_id = d.id) AS task_count
            FROM documents d
            WHERE (? IS NULL OR d.assignment_status = ?)
            ORDER BY d.created_at DESC, d.id DESC
            LIMIT ?
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(status)
        .bind(status)
        .bind(limit as i64)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ResourceSummary {
                    resource: resource_from_row(row)?,
                    task_count: row.try_get("task_count")?,
                })
            })
            .collect()
    }

    async fn insert_assignment(&mut self, assignment: &Assignment) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO document_tasks (document_id, task_id, assigned_by, inherited, assigned_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(document_id, task_id) DO NOTHING
            "#,
        )
        .bind(assignment.resource_id)
        .bind(assignment.task_id)
        .bind(&assignment.assigned_by)
        .bind(assignment.edge.is_inherited())
        .bind(assignment.assigned_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_assignment(&mut self, resource: ResourceId, task: TaskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM document_tasks WHERE document_id = ? AND task_id = ?")
            .bind(resource)
            .bind(task)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn assignment_count(&mut self, resource: ResourceId) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM document_tasks WHERE document_id = ?")
                .bind(resource)
                .fetch_one(&mut *self.tx)
                .await?,
        )
    }

    async fn task_resources(
        &mut self,
        task: TaskId,
        include_inherited: bool,
    ) -> Result<Vec<AssignedResource>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}, {}
            FROM document_tasks dt
            JOIN documents d ON d.id = dt.document_id
            WHERE dt.task_id = ? AND (? OR dt.inherited = 0)
            ORDER BY dt.assigned_at DESC, dt.id DESC
            "#,
            DOCUMENT_COLUMNS, ASSIGNMENT_COLUMNS
        ))
        .bind(task)
        .bind(include_inherited)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AssignedResource {
                    resource: resource_from_row(row)?,
                    assignment: assignment_from_row(row)?,
                })
            })
            .collect()
    }

    async fn resource_tasks(&mut self, resource: ResourceId) -> Result<Vec<ResourceTask>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}, {}
            FROM document_tasks dt
            JOIN tasks t ON t.id = dt.task_id
            WHERE dt.document_id = ?
            ORDER BY dt.assigned_at DESC, dt.id DESC
            "#,
            TASK_COLUMNS, ASSIGNMENT_COLUMNS
        ))
        .bind(resource)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ResourceTask {
                    task: task_from_row(row)?,
                    assignment: assignment_from_row(row)?,
                })
            })
            .collect()
    }

    async fn resources_of_tasks(&mut self, tasks: &[TaskId]) -> Result<Vec<ResourceId>> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT DISTINCT document_id FROM document_tasks WHERE task_id IN ({}) ORDER BY document_id",
            placeholders(tasks.len())
        );
        let mut query = sqlx::query_scalar::<Sqlite, ResourceId>(&sql);
        for id in tasks {
            query = query.bind(*id);
        }
        Ok(query.fetch_all(&mut *self.tx).await?)
    }

    async fn assignment_stats(&mut self) -> Result<AssignmentStats> {
        let status_rows = sqlx::query(
            "SELECT assignment_status, COUNT(*) AS n FROM documents GROUP BY assignment_status",
        )
        .fetch_all(&mut *self.tx)
        .await?;
        let mut resources_by_status = BTreeMap::new();
        for row in &status_rows {
            resources_by_status.insert(
                row.try_get::<String, _>("assignment_status")?,
                row.try_get::<i64, _>("n")?,
            );
        }

        let total_resources = self.count("SELECT COUNT(*) FROM documents").await?;
        let total_tasks = self.count("SELECT COUNT(*) FROM tasks").await?;
        let tasks_with_resources = self
            .count("SELECT COUNT(DISTINCT task_id) FROM document_tasks")
            .await?;
        let total_assignments = self.count("SELECT COUNT(*) FROM document_tasks").await?;
        let inherited_assignments = self
            .count("SELECT COUNT(*) FROM document_tasks WHERE inherited != 0")
            .await?;

        Ok(AssignmentStats {
            total_resources,
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
        self.tx.commit().await.context("Failed to commit transaction")?;
        Ok(())
    }
}
