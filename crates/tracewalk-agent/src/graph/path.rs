use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use tracewalk_core::error::{Result, TracewalkError};
use tracewalk_core::traits::DecisionOracle;
use tracewalk_core::types::{Node, NodeId};

use super::action_graph::ActionGraph;
use crate::deadline;

/// Why a walk stopped before reaching the end node because of the oracle's answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum Rejection {
    /// The oracle's response could not be read as a node id.
    Unparseable(String),
    /// The chosen id is not a node of the graph.
    UnknownNode(NodeId),
    /// The chosen node exists but is not reachable from the current node.
    NotANeighbor(NodeId),
    /// The chosen node is already on the path.
    AlreadyVisited(NodeId),
}

/// How a walk ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PathOutcome {
    /// The end node was reached.
    Complete,
    /// The last node on the path has no outgoing edges.
    DeadEnd,
    /// The oracle's choice was refused; the refused node is not on the path.
    Rejected(Rejection),
}

/// Node ids visited from the start node, in order, plus how the walk ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedPath {
    pub nodes: Vec<NodeId>,
    pub outcome: PathOutcome,
}

impl GeneratedPath {
    pub fn is_complete(&self) -> bool {
        self.outcome == PathOutcome::Complete
    }

    /// Content of the path's action nodes, skipping the start and end nodes.
    pub fn steps(&self, graph: &ActionGraph) -> Result<Vec<String>> {
        let mut steps = Vec::new();
        for id in &self.nodes {
            if graph.is_reserved(*id) {
                continue;
            }
            if let Some(content) = &graph.node(*id)?.content {
                steps.push(content.clone());
            }
        }
        Ok(steps)
    }
}

/// Greedy, oracle-guided walk from the start node toward the end node.
///
/// At each node the decision oracle picks one neighbor. There is no
/// backtracking: a dead end or a refused choice ends the walk. Because no
/// node may be visited twice, a walk takes at most `node_count` steps.
pub struct PathGenerator<'g> {
    graph: &'g ActionGraph,
    oracle: Arc<dyn DecisionOracle>,
    oracle_timeout: Option<Duration>,
}

impl<'g> PathGenerator<'g> {
    pub fn new(graph: &'g ActionGraph, oracle: Arc<dyn DecisionOracle>) -> Self {
        Self {
            graph,
            oracle,
            oracle_timeout: None,
        }
    }

    /// Bound every decision call; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    /// Walk the graph for `query`.
    ///
    /// Transport failures of the oracle are returned as errors; everything
    /// else ends in a [`GeneratedPath`] whose outcome says why it stopped.
    pub async fn generate(&self, query: &str) -> Result<GeneratedPath> {
        let end = self.graph.end_node()?.id;
        let mut current = self.graph.start_node()?;
        let mut path = vec![current.id];
        let mut visited = HashSet::from([current.id]);

        info!(start = %current.id, end = %end, query, "Generating path");

        let outcome = loop {
            if current.id == end {
                break PathOutcome::Complete;
            }

            let candidates: Vec<Node> = self
                .graph
                .neighbors(current.id)?
                .into_iter()
                .cloned()
                .collect();
            if candidates.is_empty() {
                debug!(node_id = %current.id, "Dead end");
                break PathOutcome::DeadEnd;
            }

            let call = self.oracle.choose_next(current, &candidates, query);
            let choice = match deadline::within("decision", self.oracle_timeout, call).await {
                Ok(choice) => choice,
                Err(TracewalkError::OracleParse { message, .. }) => {
                    break PathOutcome::Rejected(Rejection::Unparseable(message));
                }
                Err(e) => return Err(e),
            };

            let next = match self.check(&choice.id, &candidates, &visited) {
                Ok(next) => next,
                Err(rejection) => {
                    warn!(node_id = %current.id, chosen = %choice.id, ?rejection, "Rejected oracle choice");
                    break PathOutcome::Rejected(rejection);
                }
            };

            debug!(
                from = %current.id,
                to = %next.id,
                reason = choice.reason.as_deref().unwrap_or(""),
                "Advancing"
            );
            path.push(next.id);
            visited.insert(next.id);
            current = next;
        };

        info!(len = path.len(), ?outcome, "Path generation finished");
        Ok(GeneratedPath {
            nodes: path,
            outcome,
        })
    }

    fn check(
        &self,
        chosen: &NodeId,
        candidates: &[Node],
        visited: &HashSet<NodeId>,
    ) -> std::result::Result<&'g Node, Rejection> {
        let node = self
            .graph
            .node(*chosen)
            .map_err(|_| Rejection::UnknownNode(*chosen))?;
        if visited.contains(chosen) {
            return Err(Rejection::AlreadyVisited(*chosen));
        }
        if !candidates.iter().any(|c| c.id == *chosen) {
            return Err(Rejection::NotANeighbor(*chosen));
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{initialize_graph, SequenceIngester};
    use tracewalk_core::config::GraphConfig;
    use tracewalk_core::types::Choice;
    use tracewalk_test_utils::{sequences, PickNth, ScriptedDecisions, Silent, Unreachable};

    fn build(raw: &[&[&str]]) -> ActionGraph {
        let mut graph = initialize_graph(&GraphConfig::default()).unwrap();
        SequenceIngester::new(&mut graph)
            .ingest(&sequences(raw))
            .unwrap();
        graph
    }

    fn ids(raw: &[i64]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId).collect()
    }

    #[tokio::test]
    async fn test_complete_walk() {
        // a=1, b=2, c=3
        let graph = build(&[&["a", "b"], &["a", "c"]]);
        let oracle = ScriptedDecisions::ids(&[1, 3, -1]);
        let calls = oracle.calls();

        let path = PathGenerator::new(&graph, Arc::new(oracle))
            .generate("fold laundry")
            .await
            .unwrap();

        assert_eq!(path.outcome, PathOutcome::Complete);
        assert_eq!(path.nodes, ids(&[0, 1, 3, -1]));
        assert_eq!(path.steps(&graph).unwrap(), vec!["a", "c"]);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].current, NodeId(1));
        assert_eq!(calls[1].candidates, ids(&[2, 3]));
        assert!(calls.iter().all(|c| c.query == "fold laundry"));
    }

    #[tokio::test]
    async fn test_parallel_edges_repeat_candidates() {
        let graph = build(&[&["x", "y"], &["x", "y"]]);
        let oracle = ScriptedDecisions::ids(&[1, 2, -1]);
        let calls = oracle.calls();

        let path = PathGenerator::new(&graph, Arc::new(oracle))
            .generate("q")
            .await
            .unwrap();
        assert!(path.is_complete());
        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].candidates, ids(&[1, 1]));
        assert_eq!(calls[1].candidates, ids(&[2, 2]));
    }

    #[tokio::test]
    async fn test_dead_end_keeps_partial_path() {
        let mut graph = build(&[&["a"]]);
        graph.add_node(NodeId(10), Some("stuck".into())).unwrap();
        graph.add_edge(NodeId(1), NodeId(10)).unwrap();

        let path = PathGenerator::new(&graph, Arc::new(ScriptedDecisions::ids(&[1, 10])))
            .generate("q")
            .await
            .unwrap();
        assert_eq!(path.outcome, PathOutcome::DeadEnd);
        assert_eq!(path.nodes, ids(&[0, 1, 10]));
    }

    #[tokio::test]
    async fn test_revisit_is_rejected() {
        // a -> b -> a loop
        let graph = build(&[&["a", "b", "a"]]);
        let oracle = ScriptedDecisions::ids(&[1, 2, 1]);

        let path = PathGenerator::new(&graph, Arc::new(oracle))
            .generate("q")
            .await
            .unwrap();
        assert_eq!(path.outcome, PathOutcome::Rejected(Rejection::AlreadyVisited(NodeId(1))));
        assert_eq!(path.nodes, ids(&[0, 1, 2]));
    }

    #[tokio::test]
    async fn test_unknown_and_non_neighbor_choices() {
        let graph = build(&[&["a", "b"]]);

        let path = PathGenerator::new(&graph, Arc::new(ScriptedDecisions::ids(&[99])))
            .generate("q")
            .await
            .unwrap();
        assert_eq!(path.outcome, PathOutcome::Rejected(Rejection::UnknownNode(NodeId(99))));
        assert_eq!(path.nodes, ids(&[0]));

        let path = PathGenerator::new(&graph, Arc::new(ScriptedDecisions::ids(&[2])))
            .generate("q")
            .await
            .unwrap();
        assert_eq!(path.outcome, PathOutcome::Rejected(Rejection::NotANeighbor(NodeId(2))));
    }

    #[tokio::test]
    async fn test_unparseable_choice_ends_walk() {
        let graph = build(&[&["a"]]);
        let oracle = ScriptedDecisions::new(vec![
            Ok(Choice::new(1)),
            Err(TracewalkError::parse("decision", "no id in 'hmm'")),
        ]);

        let path = PathGenerator::new(&graph, Arc::new(oracle))
            .generate("q")
            .await
            .unwrap();
        assert!(matches!(path.outcome, PathOutcome::Rejected(Rejection::Unparseable(_))));
        assert_eq!(path.nodes, ids(&[0, 1]));
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let graph = build(&[&["a"]]);
        let err = PathGenerator::new(&graph, Arc::new(Unreachable))
            .generate("q")
            .await
            .unwrap_err();
        assert!(matches!(err, TracewalkError::OracleUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_decision_timeout() {
        let graph = build(&[&["a"]]);
        let err = PathGenerator::new(&graph, Arc::new(Silent))
            .with_timeout(Some(Duration::from_secs(5)))
            .generate("q")
            .await
            .unwrap_err();
        assert!(matches!(err, TracewalkError::OracleTimeout { timeout_secs: 5, .. }));
    }

    #[tokio::test]
    async fn test_walks_never_repeat_and_stay_bounded() {
        let graph = build(&[
            &["a", "b", "c", "a"],
            &["c", "b", "d"],
            &["d", "a", "e"],
            &["b", "e", "c"],
        ]);

        for nth in 0..4 {
            let path = PathGenerator::new(&graph, Arc::new(PickNth(nth)))
                .generate("q")
                .await
                .unwrap();
            let unique: HashSet<_> = path.nodes.iter().collect();
            assert_eq!(unique.len(), path.nodes.len(), "repeat in {:?}", path.nodes);
            assert!(path.nodes.len() <= graph.node_count());
        }
    }

    #[tokio::test]
    async fn test_missing_roles() {
        let graph = ActionGraph::new();
        let err = PathGenerator::new(&graph, Arc::new(PickNth(0)))
            .generate("q")
            .await
            .unwrap_err();
        assert!(matches!(err, TracewalkError::UndefinedRole(_)));
    }
}
