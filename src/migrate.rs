//! Idempotent schema setup for `tctx init`.
//!
//! Tables: `tasks`, `task_dependencies`, `documents`, `document_tasks`, and
//! the `documents_fts` FTS5 index, which mirrors `documents.text` and
//! `documents.summary` through triggers. Timestamps are unix milliseconds.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an open pool. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Create tasks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            parent_id INTEGER REFERENCES tasks(id),
            level INTEGER NOT NULL DEFAULT 0,
            path TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'new',
            priority TEXT NOT NULL DEFAULT 'medium',
            progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
            description TEXT,
            owner TEXT,
            due_date TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create dependency edges table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_dependencies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dependent_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            prerequisite_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            type TEXT NOT NULL DEFAULT 'blocks',
            description TEXT,
            created_by TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE(dependent_id, prerequisite_id),
            CHECK (dependent_id != prerequisite_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create documents table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            text TEXT NOT NULL,
            summary TEXT,
            source TEXT NOT NULL,
            source_type TEXT NOT NULL DEFAULT 'web',
            assignment_status TEXT NOT NULL DEFAULT 'unassigned',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create assignment edges table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            assigned_by TEXT,
            inherited INTEGER NOT NULL DEFAULT 0,
            assigned_at INTEGER NOT NULL,
            UNIQUE(document_id, task_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='documents_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE documents_fts USING fts5(
                text,
                summary,
                content='documents',
                content_rowid='id'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    for trigger in [
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_fts_insert AFTER INSERT ON documents BEGIN
            INSERT INTO documents_fts(rowid, text, summary)
            VALUES (new.id, new.text, coalesce(new.summary, ''));
        END
        "#,
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_fts_delete AFTER DELETE ON documents BEGIN
            INSERT INTO documents_fts(documents_fts, rowid, text, summary)
            VALUES ('delete', old.id, old.text, coalesce(old.summary, ''));
        END
        "#,
        r#"
        CREATE TRIGGER IF NOT EXISTS documents_fts_update AFTER UPDATE OF text, summary ON documents BEGIN
            INSERT INTO documents_fts(documents_fts, rowid, text, summary)
            VALUES ('delete', old.id, old.text, coalesce(old.summary, ''));
            INSERT INTO documents_fts(rowid, text, summary)
            VALUES (new.id, new.text, coalesce(new.summary, ''));
        END
        "#,
    ] {
        sqlx::query(trigger).execute(pool).await?;
    }

    // Create indexes
    for index in [
        "CREATE INDEX IF NOT EXISTS idx_tasks_parent_id ON tasks(parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_tasks_path ON tasks(path)",
        "CREATE INDEX IF NOT EXISTS idx_document_tasks_task_id ON document_tasks(task_id)",
        "CREATE INDEX IF NOT EXISTS idx_task_dependencies_prerequisite ON task_dependencies(prerequisite_id)",
        "CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(assignment_status)",
    ] {
        sqlx::query(index).execute(pool).await?;
    }

    Ok(())
}
