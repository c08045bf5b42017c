//! Engine behavior against a real SQLite database.
//!
//! Each test gets its own database file in a `TempDir`, migrated the same
//! way `tctx init` does it.

use std::fs;

use task_context::config::{self, Config};
use task_context::db;
use task_context::engine::{open_engine, SqliteEngine};
use task_context::migrate;
use task_context::search::KeywordSearch;
use task_context::sqlite_store::SqliteStore;
use task_context_core::context::{DocumentSource, Scope, SemanticSearch};
use task_context_core::store::{Store, StoreTx};
use task_context_core::{dependencies, hierarchy};
use task_context_core::models::{AssignmentStatus, DependencyType, NewDependency, NewResource, NewTask, Task};
use task_context_core::EngineError;
use tempfile::TempDir;

async fn setup() -> (TempDir, Config, SqliteEngine) {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("tctx.toml");
    fs::write(
        &config_path,
        format!(
            "[db]\npath = \"{}/data/tctx.sqlite\"\n\n[tasks]\ncode_prefix = \"T\"\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let cfg = config::load_config(&config_path).unwrap();
    migrate::run_migrations(&cfg).await.unwrap();
    let engine = open_engine(&cfg).await.unwrap();
    (tmp, cfg, engine)
}

async fn task(engine: &SqliteEngine, code: &str, parent: Option<&Task>) -> Task {
    let mut new = NewTask::new(format!("Task {}", code)).code(code);
    if let Some(parent) = parent {
        new = new.parent(parent.id);
    }
    engine.create_task(new).await.unwrap()
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let (_tmp, cfg, _engine) = setup().await;
    migrate::run_migrations(&cfg).await.unwrap();
    migrate::run_migrations(&cfg).await.unwrap();
}

#[tokio::test]
async fn test_paths_levels_and_generated_codes() {
    let (_tmp, _cfg, engine) = setup().await;

    let root = task(&engine, "ROOT", None).await;
    let child = task(&engine, "CHILD", Some(&root)).await;
    let generated = engine
        .create_task(NewTask::new("Generated").parent(child.id))
        .await
        .unwrap();

    assert_eq!(root.path, "ROOT");
    assert_eq!(child.path, "ROOT/CHILD");
    assert_eq!(child.level, 1);
    assert_eq!(generated.code, "T-003");
    assert_eq!(generated.path, "ROOT/CHILD/T-003");
    assert_eq!(generated.level, 2);

    let fetched = engine.get_task_by_code("T-003").await.unwrap();
    assert_eq!(fetched, generated);

    let ancestors = engine.get_ancestors(generated.id).await.unwrap();
    let codes: Vec<&str> = ancestors.iter().map(|t| t.code.as_str()).collect();
    assert_eq!(codes, vec!["ROOT", "CHILD"]);
}

#[tokio::test]
async fn test_duplicate_code_is_conflict() {
    let (_tmp, _cfg, engine) = setup().await;
    task(&engine, "DUP", None).await;

    let err = engine
        .create_task(NewTask::new("Again").code("DUP"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_descendant_prefix_treats_wildcards_literally() {
    let (_tmp, _cfg, engine) = setup().await;

    // With LIKE, `A_1/%` would also match `AX1/...`.
    let a = task(&engine, "A_1", None).await;
    let b = task(&engine, "AX1", None).await;
    task(&engine, "A_1-CHILD", Some(&a)).await;
    task(&engine, "AX1-CHILD", Some(&b)).await;

    let descendants = engine.get_descendants(a.id).await.unwrap();
    let codes: Vec<&str> = descendants.iter().map(|t| t.code.as_str()).collect();
    assert_eq!(codes, vec!["A_1-CHILD"]);
}

#[tokio::test]
async fn test_move_rebases_whole_subtree() {
    let (_tmp, _cfg, engine) = setup().await;

    let a = task(&engine, "A", None).await;
    let b = task(&engine, "B", None).await;
    let b1 = task(&engine, "B1", Some(&b)).await;
    let b2 = task(&engine, "B2", Some(&b1)).await;

    let moved = engine.move_task(b.id, Some(a.id)).await.unwrap();
    assert_eq!(moved.path, "A/B");
    assert_eq!(moved.level, 1);

    let b1 = engine.get_task(b1.id).await.unwrap();
    let b2 = engine.get_task(b2.id).await.unwrap();
    assert_eq!(b1.path, "A/B/B1");
    assert_eq!(b1.level, 2);
    assert_eq!(b2.path, "A/B/B1/B2");
    assert_eq!(b2.level, 3);

    let descendants = engine.get_descendants(a.id).await.unwrap();
    assert_eq!(descendants.len(), 3);

    let err = engine.move_task(a.id, Some(b2.id)).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidOperation(_)));
}

#[tokio::test]
async fn test_failed_move_leaves_every_path_unchanged() {
    let (_tmp, _cfg, engine) = setup().await;

    let a = task(&engine, "A", None).await;
    let b = task(&engine, "B", None).await;
    let c1 = task(&engine, "C1", Some(&b)).await;
    let c2 = task(&engine, "C2", Some(&c1)).await;

    // Fail the last write of the move, after B and C1 were already rewritten.
    sqlx::query(
        "CREATE TRIGGER fail_c2 BEFORE UPDATE ON tasks WHEN new.code = 'C2' \
         BEGIN SELECT RAISE(ABORT, 'boom'); END",
    )
    .execute(engine.store().pool())
    .await
    .unwrap();

    let err = engine.move_task(b.id, Some(a.id)).await.unwrap_err();
    assert!(matches!(err, EngineError::Store(_)), "got {:?}", err);

    for (id, path, level) in [(b.id, "B", 0), (c1.id, "B/C1", 1), (c2.id, "B/C1/C2", 2)] {
        let t = engine.get_task(id).await.unwrap();
        assert_eq!(t.path, path);
        assert_eq!(t.level, level);
    }
    assert_eq!(engine.get_task(b.id).await.unwrap().parent_id, None);
    assert!(engine.get_children(a.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_progress_rolls_up_through_sqlite() {
    let (_tmp, _cfg, engine) = setup().await;

    let root = task(&engine, "R", None).await;
    let left = task(&engine, "L", Some(&root)).await;
    let right = task(&engine, "RT", Some(&root)).await;
    let leaf = task(&engine, "LL", Some(&left)).await;

    engine.update_progress(leaf.id, 80).await.unwrap();
    engine.update_progress(right.id, 40).await.unwrap();

    assert_eq!(engine.get_task(left.id).await.unwrap().progress, 80);
    assert_eq!(engine.get_task(root.id).await.unwrap().progress, 60);

    let err = engine.update_progress(leaf.id, 101).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_concurrent_duplicate_edges_create_one_row() {
    let (_tmp, _cfg, engine) = setup().await;
    let a = task(&engine, "A", None).await;
    let b = task(&engine, "B", None).await;

    let dep = NewDependency::new(b.id, a.id, DependencyType::Blocks);
    let (first, second, third) = tokio::join!(
        engine.add_dependency(&dep),
        engine.add_dependency(&dep),
        engine.add_dependency(&dep),
    );
    assert!(first.unwrap() && second.unwrap() && third.unwrap());

    let edges = engine.list_dependencies(None).await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].dependent_id, b.id);
    assert_eq!(edges[0].prerequisite_id, a.id);
}

#[tokio::test]
async fn test_second_connection_waits_for_open_writer() {
    let (_tmp, cfg, engine) = setup().await;
    let a = task(&engine, "A", None).await;
    let b = task(&engine, "B", None).await;
    let dep = NewDependency::new(b.id, a.id, DependencyType::Blocks);

    // A separate pool stands in for another tctx process.
    let other = SqliteStore::new(db::connect(&cfg).await.unwrap());
    let mut tx = other.begin().await.unwrap();
    assert_eq!(hierarchy::get_task(&mut tx, a.id).await.unwrap().code, "A");

    let (from_engine, from_other) = tokio::join!(engine.add_dependency(&dep), async {
        let added = dependencies::add_dependency(&mut tx, &dep).await;
        tx.commit().await.unwrap();
        added
    });
    assert!(from_engine.unwrap());
    assert!(from_other.unwrap());

    let edges = engine.list_dependencies(None).await.unwrap();
    assert_eq!(edges.len(), 1);
}

#[tokio::test]
async fn test_moves_from_two_connections_both_apply() {
    let (_tmp, cfg, engine) = setup().await;
    let root = task(&engine, "ROOT", None).await;
    let left = task(&engine, "LEFT", None).await;
    let leaf = task(&engine, "LEAF", Some(&root)).await;

    let other = open_engine(&cfg).await.unwrap();
    let (first, second) = tokio::join!(
        engine.move_task(leaf.id, Some(left.id)),
        other.move_task(left.id, Some(root.id)),
    );
    first.unwrap();
    second.unwrap();

    let leaf = engine.get_task(leaf.id).await.unwrap();
    assert_eq!(leaf.path, "ROOT/LEFT/LEAF");
    assert_eq!(leaf.level, 2);
}

#[tokio::test]
async fn test_cycle_detection_and_cleanup_on_delete() {
    let (_tmp, _cfg, engine) = setup().await;
    let a = task(&engine, "A", None).await;
    let b = task(&engine, "B", None).await;
    let c = task(&engine, "C", None).await;

    for (dependent, prerequisite) in [(&b, &a), (&c, &b), (&a, &c)] {
        let dep = NewDependency::new(dependent.id, prerequisite.id, DependencyType::Blocks);
        assert!(engine.add_dependency(&dep).await.unwrap());
    }

    let graph = engine.build_graph(None).await.unwrap();
    assert!(graph.has_cycles());
    assert_eq!(graph.cycles.len(), 1);
    assert_eq!(graph.cycles[0].len(), 3);

    assert!(engine.delete_task(c.id, false).await.unwrap());
    let graph = engine.build_graph(None).await.unwrap();
    assert!(!graph.has_cycles());
    assert_eq!(graph.edges.len(), 1);
}

#[tokio::test]
async fn test_assignment_status_follows_edges() {
    let (_tmp, _cfg, engine) = setup().await;
    let parent = task(&engine, "P", None).await;
    let child = task(&engine, "C", Some(&parent)).await;

    let doc = engine
        .add_resource(&NewResource::new("Deployment checklist", "wiki"))
        .await
        .unwrap();
    assert_eq!(doc.assignment_status, AssignmentStatus::Unassigned);

    engine.assign_resource(doc.id, &[parent.id], Some("tester")).await.unwrap();
    assert_eq!(
        engine.get_resource(doc.id).await.unwrap().assignment_status,
        AssignmentStatus::Assigned
    );

    let report = engine.inherit_parent_resources(child.id, None).await.unwrap();
    assert_eq!(report.inherited_count, 1);
    let direct = engine.get_task_resources(child.id, false).await.unwrap();
    let all = engine.get_task_resources(child.id, true).await.unwrap();
    assert!(direct.is_empty());
    assert_eq!(all.len(), 1);
    assert!(all[0].assignment.edge.is_inherited());

    engine.delete_task(parent.id, true).await.unwrap();
    assert_eq!(
        engine.get_resource(doc.id).await.unwrap().assignment_status,
        AssignmentStatus::Unassigned
    );

    let stats = engine.get_assignment_stats().await.unwrap();
    assert_eq!(stats.total_tasks, 0);
    assert_eq!(stats.total_assignments, 0);
}

#[tokio::test]
async fn test_keyword_search_ranks_and_skips_archived() {
    let (_tmp, _cfg, engine) = setup().await;

    let oauth = engine
        .add_resource(&NewResource::new("OAuth token refresh and OAuth scopes", "a"))
        .await
        .unwrap();
    let mixed = engine
        .add_resource(&NewResource::new("Session cookies and one oauth mention", "b"))
        .await
        .unwrap();
    let archived = engine
        .add_resource(&NewResource::new("OAuth OAuth OAuth legacy notes", "c"))
        .await
        .unwrap();
    engine
        .add_resource(&NewResource::new("Unrelated gardening tips", "d"))
        .await
        .unwrap();
    engine.archive_resource(archived.id).await.unwrap();

    let search = KeywordSearch::new(engine.store().pool().clone());
    let hits = search.search_by_similarity("oauth", 10).await.unwrap();

    let ids: Vec<i64> = hits.iter().map(|h| h.resource_id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&oauth.id));
    assert!(ids.contains(&mixed.id));
    assert!(!ids.contains(&archived.id));
    assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.similarity)));
    assert!((hits[0].similarity - 1.0).abs() < 1e-9);

    assert!(search.search_by_similarity("  ", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_inherit_scope_with_keyword_top_up() {
    let (_tmp, _cfg, engine) = setup().await;

    let proj = task(&engine, "PROJ", None).await;
    let api = engine
        .create_task(
            NewTask::new("Authentication API")
                .code("API")
                .parent(proj.id)
                .description("OAuth login for the public API"),
        )
        .await
        .unwrap();

    let own = engine
        .add_resource(&NewResource::new("API endpoint list", "spec"))
        .await
        .unwrap();
    let inherited = engine
        .add_resource(&NewResource::new("Project charter", "wiki"))
        .await
        .unwrap();
    let general = engine
        .add_resource(&NewResource::new("OAuth login provider comparison", "blog"))
        .await
        .unwrap();
    engine.assign_resource(own.id, &[api.id], None).await.unwrap();
    engine.assign_resource(inherited.id, &[proj.id], None).await.unwrap();

    let ctx = engine
        .assemble_context(api.id, Scope::Inherit, 5, None)
        .await
        .unwrap();

    let ids: Vec<i64> = ctx.documents.iter().map(|d| d.resource_id).collect();
    assert_eq!(ids, vec![own.id, inherited.id, general.id]);
    assert_eq!(ctx.documents[0].source, DocumentSource::Task);
    assert_eq!(ctx.documents[1].source, DocumentSource::Inherited);
    assert!((ctx.documents[1].similarity - 0.9).abs() < 1e-9);
    assert_eq!(ctx.documents[2].source, DocumentSource::General);
    assert_eq!(ctx.hierarchy.ancestors.len(), 1);

    let text = engine.build_context_text(&ctx);
    assert!(text.contains("Authentication API (API)"));
    assert!(text.contains("- From parent tasks:"));
}
