//! Engine construction from configuration.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use task_context_core::context::{DisabledSearch, SemanticSearch};
use task_context_core::TaskEngine;

use crate::config::Config;
use crate::db;
use crate::search::KeywordSearch;
use crate::sqlite_store::SqliteStore;

pub type SqliteEngine = TaskEngine<SqliteStore>;

/// Connect to the configured database and build an engine over it.
///
/// The schema must already exist (`tctx init`).
pub async fn open_engine(config: &Config) -> Result<SqliteEngine> {
    let pool = db::connect(config).await?;
    Ok(engine_for_pool(config, pool))
}

/// Build an engine over an already-open pool.
pub fn engine_for_pool(config: &Config, pool: SqlitePool) -> SqliteEngine {
    let search: Arc<dyn SemanticSearch> = match config.search.provider.as_str() {
        "keyword" => Arc::new(KeywordSearch::new(pool.clone())),
        _ => Arc::new(DisabledSearch),
    };

    TaskEngine::new(SqliteStore::new(pool))
        .with_options(config.engine_options())
        .with_search(search)
}
