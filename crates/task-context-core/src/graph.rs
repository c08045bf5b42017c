//! Dependency graph construction and analysis.
//!
//! Pure functions over task and edge lists; no store access. The graph is
//! an arbitrary digraph whose edges point `prerequisite → dependent`.
//! Cycles are expected and reported as data, never rejected.
//!
//! # Cycle search
//!
//! Depth-first traversal from every unvisited node (ascending id), keeping
//! the current path as a recursion stack. When a neighbor that is still on
//! the stack is reached again, the slice of the path from that neighbor to
//! the current node is one cycle, and the edge that closed it is a back
//! edge. Removing every back edge leaves a DAG, which is what
//! [`DependencyGraph::longest_chain`] measures.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::models::{DependencyEdge, DependencyType, Task, TaskId, TaskStatus};

/// A task as it appears in a rendered dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: TaskId,
    pub code: String,
    pub title: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    /// Prerequisite task.
    pub from: TaskId,
    /// Dependent task.
    pub to: TaskId,
    #[serde(rename = "type")]
    pub kind: DependencyType,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyGraph {
    /// Nodes ordered by id.
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Prerequisites that are never a dependent.
    pub roots: Vec<TaskId>,
    /// Dependents that are never a prerequisite.
    pub leaves: Vec<TaskId>,
    /// Each cycle as a node sequence; the last node points back to the first.
    pub cycles: Vec<Vec<TaskId>>,
    #[serde(skip)]
    back_edges: BTreeSet<(TaskId, TaskId)>,
}

impl DependencyGraph {
    /// Assemble a graph from the edge set and the tasks it mentions.
    ///
    /// `tasks` should contain every endpoint of `edges`; extra tasks become
    /// isolated nodes. Endpoints without a task row are still graph nodes
    /// (with an empty code) so cycles through them are not lost.
    pub fn build(tasks: &[Task], edges: &[DependencyEdge]) -> Self {
        let mut nodes: BTreeMap<TaskId, GraphNode> = tasks
            .iter()
            .map(|t| {
                (
                    t.id,
                    GraphNode {
                        id: t.id,
                        code: t.code.clone(),
                        title: t.title.clone(),
                        status: t.status,
                    },
                )
            })
            .collect();
        for edge in edges {
            for id in [edge.prerequisite_id, edge.dependent_id] {
                nodes.entry(id).or_insert_with(|| GraphNode {
                    id,
                    code: String::new(),
                    title: String::new(),
                    status: TaskStatus::default(),
                });
            }
        }

        let graph_edges: Vec<GraphEdge> = edges
            .iter()
            .map(|e| GraphEdge {
                from: e.prerequisite_id,
                to: e.dependent_id,
                kind: e.kind,
                description: e.description.clone(),
            })
            .collect();

        let prerequisites: BTreeSet<TaskId> = edges.iter().map(|e| e.prerequisite_id).collect();
        let dependents: BTreeSet<TaskId> = edges.iter().map(|e| e.dependent_id).collect();
        let roots = prerequisites.difference(&dependents).copied().collect();
        let leaves = dependents.difference(&prerequisites).copied().collect();

        let adjacency = adjacency(&graph_edges);
        let (cycles, back_edges) = find_cycles(nodes.keys().copied(), &adjacency);

        Self {
            nodes: nodes.into_values().collect(),
            edges: graph_edges,
            roots,
            leaves,
            cycles,
            back_edges,
        }
    }

    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Number of edges on the longest prerequisite chain, ignoring the
    /// edges that close cycles.
    pub fn longest_chain(&self) -> usize {
        let acyclic: Vec<&GraphEdge> = self
            .edges
            .iter()
            .filter(|e| !self.back_edges.contains(&(e.from, e.to)))
            .collect();

        let mut indegree: BTreeMap<TaskId, usize> =
            self.nodes.iter().map(|n| (n.id, 0)).collect();
        let mut outgoing: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();
        for edge in &acyclic {
            *indegree.entry(edge.to).or_insert(0) += 1;
            outgoing.entry(edge.from).or_default().push(edge.to);
        }

        let mut depth: BTreeMap<TaskId, usize> = BTreeMap::new();
        let mut queue: VecDeque<TaskId> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut longest = 0;

        while let Some(node) = queue.pop_front() {
            let here = depth.get(&node).copied().unwrap_or(0);
            longest = longest.max(here);
            for next in outgoing.get(&node).into_iter().flatten() {
                let slot = depth.entry(*next).or_insert(0);
                *slot = (*slot).max(here + 1);
                if let Some(d) = indegree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }
        longest
    }

    /// Display code for a node id, falling back to `#id`.
    pub fn code_of(&self, id: TaskId) -> String {
        self.nodes
            .binary_search_by_key(&id, |n| n.id)
            .ok()
            .map(|i| self.nodes[i].code.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| format!("#{}", id))
    }
}

fn adjacency(edges: &[GraphEdge]) -> BTreeMap<TaskId, Vec<TaskId>> {
    let mut adjacency: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();
    for edge in edges {
        adjacency.entry(edge.from).or_default().push(edge.to);
    }
    for targets in adjacency.values_mut() {
        targets.sort_unstable();
        targets.dedup();
    }
    adjacency
}

type Cycles = (Vec<Vec<TaskId>>, BTreeSet<(TaskId, TaskId)>);

fn find_cycles(
    nodes: impl Iterator<Item = TaskId>,
    adjacency: &BTreeMap<TaskId, Vec<TaskId>>,
) -> Cycles {
    let mut visited: HashSet<TaskId> = HashSet::new();
    let mut on_stack: HashSet<TaskId> = HashSet::new();
    let mut cycles = Vec::new();
    let mut back_edges = BTreeSet::new();

    for start in nodes {
        if visited.contains(&start) {
            continue;
        }
        // (node, index of the next neighbor to try)
        let mut frames: Vec<(TaskId, usize)> = vec![(start, 0)];
        let mut path: Vec<TaskId> = vec![start];
        visited.insert(start);
        on_stack.insert(start);

        while let Some(&(node, next_index)) = frames.last() {
            let neighbor = adjacency
                .get(&node)
                .and_then(|targets| targets.get(next_index))
                .copied();

            match neighbor {
                Some(next) => {
                    if let Some(frame) = frames.last_mut() {
                        frame.1 += 1;
                    }
                    if on_stack.contains(&next) {
                        if let Some(pos) = path.iter().position(|&n| n == next) {
                            cycles.push(path[pos..].to_vec());
                        }
                        back_edges.insert((node, next));
                    } else if visited.insert(next) {
                        on_stack.insert(next);
                        path.push(next);
                        frames.push((next, 0));
                    }
                }
                None => {
                    frames.pop();
                    path.pop();
                    on_stack.remove(&node);
                }
            }
        }
    }

    (cycles, back_edges)
}

// ─── Analysis ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationLevel {
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub level: RecommendationLevel,
    pub message: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub nodes: usize,
    pub edges: usize,
    pub roots: usize,
    pub leaves: usize,
    pub cycles: usize,
    pub longest_chain: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyAnalysis {
    pub summary: AnalysisSummary,
    pub roots: Vec<TaskId>,
    pub leaves: Vec<TaskId>,
    pub cycles: Vec<Vec<TaskId>>,
    pub recommendations: Vec<Recommendation>,
}

/// Summarize a graph and flag structural problems.
pub fn analyze(graph: &DependencyGraph) -> DependencyAnalysis {
    let summary = AnalysisSummary {
        nodes: graph.nodes.len(),
        edges: graph.edges.len(),
        roots: graph.roots.len(),
        leaves: graph.leaves.len(),
        cycles: graph.cycles.len(),
        longest_chain: graph.longest_chain(),
    };

    let mut recommendations = Vec::new();
    if summary.cycles > 0 {
        let shown: Vec<String> = graph
            .cycles
            .iter()
            .map(|cycle| {
                cycle
                    .iter()
                    .map(|id| graph.code_of(*id))
                    .collect::<Vec<_>>()
                    .join(" -> ")
            })
            .collect();
        recommendations.push(Recommendation {
            level: RecommendationLevel::Warning,
            message: format!(
                "Found {} circular dependencies: {}",
                summary.cycles,
                shown.join("; ")
            ),
            action: "Remove one edge from each cycle so the work can be ordered".to_string(),
        });
    }
    if summary.nodes > 0 && summary.roots == 0 {
        recommendations.push(Recommendation {
            level: RecommendationLevel::Info,
            message: "Every task has a prerequisite; there is no starting point".to_string(),
            action: "Identify tasks that can begin independently".to_string(),
        });
    }
    if summary.nodes > 0 && summary.leaves == 0 {
        recommendations.push(Recommendation {
            level: RecommendationLevel::Info,
            message: "Every task is a prerequisite of another; there is no end point".to_string(),
            action: "Check that the dependency chain leads to a completion task".to_string(),
        });
    }

    DependencyAnalysis {
        summary,
        roots: graph.roots.clone(),
        leaves: graph.leaves.clone(),
        cycles: graph.cycles.clone(),
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(prerequisite: TaskId, dependent: TaskId) -> DependencyEdge {
        DependencyEdge {
            id: 0,
            dependent_id: dependent,
            prerequisite_id: prerequisite,
            kind: DependencyType::Blocks,
            description: None,
            created_by: None,
            created_at: 0,
        }
    }

    #[test]
    fn test_chain_roots_and_leaves() {
        let graph = DependencyGraph::build(&[], &[edge(1, 2), edge(2, 3)]);
        assert_eq!(graph.roots, vec![1]);
        assert_eq!(graph.leaves, vec![3]);
        assert!(!graph.has_cycles());
        assert_eq!(graph.longest_chain(), 2);
        assert_eq!(graph.nodes.len(), 3);
    }

    #[test]
    fn test_three_cycle_is_reported() {
        let graph = DependencyGraph::build(&[], &[edge(1, 2), edge(2, 3), edge(3, 1)]);
        assert_eq!(graph.cycles.len(), 1);
        let members: BTreeSet<TaskId> = graph.cycles[0].iter().copied().collect();
        assert_eq!(members, BTreeSet::from([1, 2, 3]));
        assert!(graph.roots.is_empty());
        assert!(graph.leaves.is_empty());
    }

    #[test]
    fn test_disjoint_cycles_are_both_reported() {
        let graph = DependencyGraph::build(
            &[],
            &[edge(1, 2), edge(2, 1), edge(5, 6), edge(6, 7), edge(7, 5)],
        );
        assert_eq!(graph.cycles.len(), 2);
        assert_eq!(graph.cycles[0], vec![1, 2]);
        assert_eq!(graph.cycles[1], vec![5, 6, 7]);
    }

    #[test]
    fn test_longest_chain_ignores_back_edges() {
        // 1 -> 2 -> 3 -> 4, with 4 -> 2 closing a cycle.
        let graph =
            DependencyGraph::build(&[], &[edge(1, 2), edge(2, 3), edge(3, 4), edge(4, 2)]);
        assert!(graph.has_cycles());
        assert_eq!(graph.longest_chain(), 3);
    }

    #[test]
    fn test_diamond_has_no_cycle() {
        let graph =
            DependencyGraph::build(&[], &[edge(1, 2), edge(1, 3), edge(2, 4), edge(3, 4)]);
        assert!(!graph.has_cycles());
        assert_eq!(graph.longest_chain(), 2);
    }

    #[test]
    fn test_analyze_recommendations() {
        let cyclic = DependencyGraph::build(&[], &[edge(1, 2), edge(2, 1)]);
        let analysis = analyze(&cyclic);
        assert_eq!(analysis.summary.cycles, 1);
        assert_eq!(analysis.recommendations.len(), 3);
        assert_eq!(
            analysis.recommendations[0].level,
            RecommendationLevel::Warning
        );
        assert!(analysis.recommendations[0].message.contains("#1 -> #2"));

        let empty = analyze(&DependencyGraph::default());
        assert!(empty.recommendations.is_empty());
        assert_eq!(empty.summary.longest_chain, 0);
    }
}
