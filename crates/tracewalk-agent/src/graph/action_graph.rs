use std::collections::BTreeMap;
use std::fmt;

use tracewalk_core::error::{NodeRole, Result, TracewalkError};
use tracewalk_core::types::{Edge, Node, NodeId};

/// Directed action graph with one start and one end node.
///
/// Edges are stored twice: as an ordered edge list and as per-node
/// adjacency lists. Both views are updated together by [`add_edge`]
/// and never diverge. Parallel edges are kept, so a neighbor may appear
/// in an adjacency list more than once.
///
/// [`add_edge`]: ActionGraph::add_edge
#[derive(Debug, Clone, Default)]
pub struct ActionGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: Vec<Edge>,
    adjacency: BTreeMap<NodeId, Vec<NodeId>>,
    start: Option<NodeId>,
    end: Option<NodeId>,
}

impl ActionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an ordinary node.
    pub fn add_node(&mut self, id: NodeId, content: Option<String>) -> Result<()> {
        self.insert(id, content, false, false)
    }

    /// Add the node every path starts from. Allowed once per graph.
    pub fn add_start_node(&mut self, id: NodeId, content: Option<String>) -> Result<()> {
        self.insert(id, content, true, false)
    }

    /// Add the node every complete path ends at. Allowed once per graph.
    pub fn add_end_node(&mut self, id: NodeId, content: Option<String>) -> Result<()> {
        self.insert(id, content, false, true)
    }

    /// Insert a node, optionally claiming the start and/or end role.
    ///
    /// All checks run before anything is written, so a rejected insert
    /// leaves the graph untouched.
    pub fn insert(
        &mut self,
        id: NodeId,
        content: Option<String>,
        is_start: bool,
        is_end: bool,
    ) -> Result<()> {
        if self.nodes.contains_key(&id) {
            return Err(TracewalkError::DuplicateNode(id));
        }
        if is_start && self.start.is_some() {
            return Err(TracewalkError::DuplicateRole(NodeRole::Start));
        }
        if is_end && self.end.is_some() {
            return Err(TracewalkError::DuplicateRole(NodeRole::End));
        }

        self.nodes.insert(id, Node { id, content });
        self.adjacency.insert(id, Vec::new());
        if is_start {
            self.start = Some(id);
        }
        if is_end {
            self.end = Some(id);
        }
        Ok(())
    }

    /// Append a directed edge. Both endpoints must already exist.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        if !self.nodes.contains_key(&to) {
            return Err(TracewalkError::UnknownNode(to));
        }
        let neighbors = self
            .adjacency
            .get_mut(&from)
            .ok_or(TracewalkError::UnknownNode(from))?;

        neighbors.push(to);
        self.edges.push(Edge::new(from, to));
        Ok(())
    }

    /// Neighbor nodes of `id` in edge-insertion order, duplicates included.
    pub fn neighbors(&self, id: NodeId) -> Result<Vec<&Node>> {
        let ids = self
            .adjacency
            .get(&id)
            .ok_or(TracewalkError::UnknownNode(id))?;
        Ok(ids.iter().filter_map(|n| self.nodes.get(n)).collect())
    }

    /// Every stored edge from `from` to `to`.
    pub fn edges_between(&self, from: NodeId, to: NodeId) -> Vec<Edge> {
        self.edges
            .iter()
            .filter(|e| e.from == from && e.to == to)
            .copied()
            .collect()
    }

    pub fn start_node(&self) -> Result<&Node> {
        self.start
            .and_then(|id| self.nodes.get(&id))
            .ok_or(TracewalkError::UndefinedRole(NodeRole::Start))
    }

    pub fn end_node(&self) -> Result<&Node> {
        self.end
            .and_then(|id| self.nodes.get(&id))
            .ok_or(TracewalkError::UndefinedRole(NodeRole::End))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(TracewalkError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Whether `id` holds the start or end role.
    pub fn is_reserved(&self, id: NodeId) -> bool {
        self.start == Some(id) || self.end == Some(id)
    }

    /// Nodes ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Largest id currently in the graph.
    pub fn max_id(&self) -> Option<NodeId> {
        self.nodes.keys().next_back().copied()
    }
}

impl fmt::Display for ActionGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = |id: Option<NodeId>| id.map_or_else(|| "undefined".to_string(), |id| id.to_string());

        writeln!(f, "Start Node: {}", role(self.start))?;
        writeln!(f, "End Node: {}", role(self.end))?;
        writeln!(f, "Edges:")?;
        for edge in &self.edges {
            writeln!(f, "  Node {} -> Node {}", edge.from, edge.to)?;
        }
        writeln!(f, "Adjacency List:")?;
        for (id, neighbors) in &self.adjacency {
            let list: Vec<String> = neighbors.iter().map(NodeId::to_string).collect();
            writeln!(f, "  Node {}: [{}]", id, list.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i64) -> NodeId {
        NodeId(n)
    }

    fn seeded() -> ActionGraph {
        let mut graph = ActionGraph::new();
        graph.add_start_node(id(0), Some("Start Node".into())).unwrap();
        graph.add_end_node(id(-1), Some("End Node".into())).unwrap();
        graph
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = seeded();
        graph.add_node(id(2), Some("wash".into())).unwrap();
        let err = graph.add_node(id(2), Some("dry".into())).unwrap_err();
        assert!(matches!(err, TracewalkError::DuplicateNode(NodeId(2))));
        assert_eq!(graph.node(id(2)).unwrap().text(), "wash");
    }

    #[test]
    fn test_duplicate_role_leaves_graph_untouched() {
        let mut graph = seeded();
        let err = graph.add_start_node(id(9), None).unwrap_err();
        assert!(matches!(err, TracewalkError::DuplicateRole(NodeRole::Start)));
        assert!(!graph.contains(id(9)));

        let err = graph.insert(id(10), None, false, true).unwrap_err();
        assert!(matches!(err, TracewalkError::DuplicateRole(NodeRole::End)));
        assert!(!graph.contains(id(10)));
    }

    #[test]
    fn test_node_may_hold_both_roles() {
        let mut graph = ActionGraph::new();
        graph.insert(id(0), None, true, true).unwrap();
        assert_eq!(graph.start_node().unwrap().id, graph.end_node().unwrap().id);
    }

    #[test]
    fn test_undefined_roles() {
        let graph = ActionGraph::new();
        assert!(matches!(
            graph.start_node(),
            Err(TracewalkError::UndefinedRole(NodeRole::Start))
        ));
        assert!(matches!(
            graph.end_node(),
            Err(TracewalkError::UndefinedRole(NodeRole::End))
        ));
    }

    #[test]
    fn test_edge_requires_both_endpoints() {
        let mut graph = seeded();
        assert!(matches!(
            graph.add_edge(id(0), id(5)),
            Err(TracewalkError::UnknownNode(NodeId(5)))
        ));
        assert!(matches!(
            graph.add_edge(id(5), id(0)),
            Err(TracewalkError::UnknownNode(NodeId(5)))
        ));
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.neighbors(id(0)).unwrap().is_empty());
    }

    #[test]
    fn test_edge_list_and_adjacency_move_together() {
        let mut graph = seeded();
        graph.add_node(id(2), Some("a".into())).unwrap();

        for round in 1..=3 {
            graph.add_edge(id(0), id(2)).unwrap();
            let hits = graph
                .neighbors(id(0))
                .unwrap()
                .iter()
                .filter(|n| n.id == id(2))
                .count();
            assert_eq!(hits, round);
            assert_eq!(graph.edges_between(id(0), id(2)).len(), round);
        }
    }

    #[test]
    fn test_neighbors_in_insertion_order() {
        let mut graph = seeded();
        graph.add_node(id(2), Some("a".into())).unwrap();
        graph.add_node(id(3), Some("b".into())).unwrap();
        graph.add_edge(id(0), id(3)).unwrap();
        graph.add_edge(id(0), id(2)).unwrap();
        graph.add_edge(id(0), id(3)).unwrap();

        let ids: Vec<_> = graph.neighbors(id(0)).unwrap().iter().map(|n| n.id.0).collect();
        assert_eq!(ids, vec![3, 2, 3]);
        assert!(matches!(
            graph.neighbors(id(42)),
            Err(TracewalkError::UnknownNode(NodeId(42)))
        ));
    }

    #[test]
    fn test_edges_between_without_match() {
        let graph = seeded();
        assert!(graph.edges_between(id(0), id(-1)).is_empty());
        assert!(graph.edges_between(id(7), id(8)).is_empty());
    }

    #[test]
    fn test_display_structure() {
        let mut graph = seeded();
        graph.add_node(id(2), Some("a".into())).unwrap();
        graph.add_edge(id(0), id(2)).unwrap();
        graph.add_edge(id(2), id(-1)).unwrap();

        let text = graph.to_string();
        assert!(text.contains("Start Node: 0"));
        assert!(text.contains("End Node: -1"));
        assert!(text.contains("Node 0 -> Node 2"));
        assert!(text.contains("Node 2: [-1]"));
        assert!(text.contains("Node -1: []"));
    }
}
