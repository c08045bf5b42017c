//! Dependency graph behavior against the in-memory store.

use std::collections::BTreeSet;

use task_context_core::models::{DependencyType, NewDependency, NewTask, Task};
use task_context_core::store::memory::InMemoryStore;
use task_context_core::TaskEngine;

type Engine = TaskEngine<InMemoryStore>;

async fn tasks(engine: &Engine, codes: &[&str]) -> Vec<Task> {
    let mut out = Vec::new();
    for code in codes {
        out.push(
            engine
                .create_task(NewTask::new(*code).code(*code))
                .await
                .unwrap(),
        );
    }
    out
}

fn blocks(dependent: &Task, prerequisite: &Task) -> NewDependency {
    NewDependency::new(dependent.id, prerequisite.id, DependencyType::Blocks)
}

#[tokio::test]
async fn test_add_dependency_is_idempotent() {
    let engine = TaskEngine::new(InMemoryStore::new());
    let t = tasks(&engine, &["A-1", "B-1"]).await;

    assert!(engine.add_dependency(&blocks(&t[1], &t[0])).await.unwrap());
    assert!(engine.add_dependency(&blocks(&t[1], &t[0])).await.unwrap());
    assert_eq!(engine.list_dependencies(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_self_and_dangling_dependencies_fail() {
    let engine = TaskEngine::new(InMemoryStore::new());
    let t = tasks(&engine, &["A-1"]).await;

    assert!(!engine.add_dependency(&blocks(&t[0], &t[0])).await.unwrap());
    let dangling = NewDependency::new(t[0].id, 404, DependencyType::Related);
    assert!(!engine.add_dependency(&dangling).await.unwrap());
    assert!(engine.list_dependencies(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_prerequisites_dependents_and_remove() {
    let engine = TaskEngine::new(InMemoryStore::new());
    let t = tasks(&engine, &["A-1", "B-1", "C-1"]).await;
    engine.add_dependency(&blocks(&t[2], &t[0])).await.unwrap();
    engine.add_dependency(&blocks(&t[2], &t[1])).await.unwrap();

    let prereqs = engine.get_prerequisites(t[2].id).await.unwrap();
    assert_eq!(prereqs.len(), 2);
    let dependents = engine.get_dependents(t[0].id).await.unwrap();
    assert_eq!(dependents[0].code, "C-1");

    assert!(engine.remove_dependency(t[2].id, t[0].id).await.unwrap());
    assert!(!engine.remove_dependency(t[2].id, t[0].id).await.unwrap());
    assert_eq!(engine.get_prerequisites(t[2].id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cycle_is_reported_not_rejected() {
    let engine = TaskEngine::new(InMemoryStore::new());
    let t = tasks(&engine, &["A-1", "B-1", "C-1"]).await;
    // A -> B -> C -> A (prerequisite -> dependent)
    assert!(engine.add_dependency(&blocks(&t[1], &t[0])).await.unwrap());
    assert!(engine.add_dependency(&blocks(&t[2], &t[1])).await.unwrap());
    assert!(engine.add_dependency(&blocks(&t[0], &t[2])).await.unwrap());

    let graph = engine.build_graph(None).await.unwrap();
    let expected: BTreeSet<i64> = t.iter().map(|t| t.id).collect();
    assert!(graph
        .cycles
        .iter()
        .any(|c| c.iter().copied().collect::<BTreeSet<_>>() == expected));
    assert_eq!(graph.nodes.len(), 3);
    assert_eq!(graph.nodes[0].code, "A-1");

    let analysis = engine.analyze_dependencies().await.unwrap();
    assert_eq!(analysis.summary.cycles, 1);
    assert!(analysis.recommendations[0].message.contains("A-1"));
}

#[tokio::test]
async fn test_filtered_graph_roots_and_leaves() {
    let engine = TaskEngine::new(InMemoryStore::new());
    let t = tasks(&engine, &["A-1", "B-1", "C-1", "X-1", "Y-1"]).await;
    engine.add_dependency(&blocks(&t[1], &t[0])).await.unwrap();
    engine.add_dependency(&blocks(&t[2], &t[1])).await.unwrap();
    engine.add_dependency(&blocks(&t[4], &t[3])).await.unwrap();

    let full = engine.build_graph(None).await.unwrap();
    assert_eq!(full.roots, vec![t[0].id, t[3].id]);
    assert_eq!(full.leaves, vec![t[2].id, t[4].id]);

    let filter = [t[1].id];
    let partial = engine.build_graph(Some(&filter)).await.unwrap();
    assert_eq!(partial.edges.len(), 2);
    assert_eq!(partial.roots, vec![t[0].id]);
    assert_eq!(partial.leaves, vec![t[2].id]);

    let analysis = engine.analyze_dependencies().await.unwrap();
    assert_eq!(analysis.summary.longest_chain, 2);
    assert!(analysis.recommendations.is_empty());
}

#[tokio::test]
async fn test_batch_reports_failures_per_pair() {
    let engine = TaskEngine::new(InMemoryStore::new());
    let t = tasks(&engine, &["A-1", "B-1"]).await;
    let report = engine
        .add_dependencies(&[
            blocks(&t[1], &t[0]),
            blocks(&t[0], &t[0]),
            NewDependency::new(t[0].id, 77, DependencyType::Blocks),
        ])
        .await
        .unwrap();
    assert_eq!(report.created, vec![(t[1].id, t[0].id)]);
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed[1].reason.contains("77"));
}

#[tokio::test]
async fn test_deleting_a_task_drops_its_edges() {
    let engine = TaskEngine::new(InMemoryStore::new());
    let t = tasks(&engine, &["A-1", "B-1"]).await;
    engine.add_dependency(&blocks(&t[1], &t[0])).await.unwrap();
    engine.delete_task(t[0].id, false).await.unwrap();
    assert!(engine.list_dependencies(None).await.unwrap().is_empty());
}
