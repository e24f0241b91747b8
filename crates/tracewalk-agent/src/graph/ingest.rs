use std::collections::HashMap;

use tracing::{debug, info};

use tracewalk_core::config::GraphConfig;
use tracewalk_core::error::{Result, TracewalkError};
use tracewalk_core::types::NodeId;

use super::action_graph::ActionGraph;

/// Create an empty graph holding only the reserved start and end nodes.
pub fn initialize_graph(config: &GraphConfig) -> Result<ActionGraph> {
    let mut graph = ActionGraph::new();
    graph.add_start_node(NodeId(config.start_id), Some(config.start_content.clone()))?;
    graph.add_end_node(NodeId(config.end_id), Some(config.end_content.clone()))?;
    Ok(graph)
}

/// Labels already turned into nodes, mapped to the node that holds them.
#[derive(Debug, Default)]
pub struct LabelIndex {
    ids: HashMap<String, NodeId>,
}

impl LabelIndex {
    pub fn get(&self, label: &str) -> Option<NodeId> {
        self.ids.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Builds graph nodes and chained edges from example action sequences.
///
/// Each distinct label becomes exactly one node; repeated labels resolve
/// to the node created the first time. Edges are never deduplicated.
pub struct SequenceIngester<'g> {
    graph: &'g mut ActionGraph,
    labels: LabelIndex,
    next_id: Option<i64>,
}

impl<'g> SequenceIngester<'g> {
    /// Wrap a graph that already has its start and end nodes.
    pub fn new(graph: &'g mut ActionGraph) -> Self {
        let next_id = graph.max_id().map_or(Some(1), |max| max.0.max(0).checked_add(1));
        Self {
            graph,
            labels: LabelIndex::default(),
            next_id,
        }
    }

    pub fn labels(&self) -> &LabelIndex {
        &self.labels
    }

    /// Resolve every sequence to node ids and wire them between start and end.
    pub fn ingest(&mut self, sequences: &[Vec<String>]) -> Result<Vec<Vec<NodeId>>> {
        let resolved = self.resolve(sequences)?;
        self.connect(&resolved)?;
        info!(
            sequences = resolved.len(),
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "Ingested action sequences"
        );
        Ok(resolved)
    }

    /// Map each label to its node, creating nodes for labels not seen before.
    pub fn resolve(&mut self, sequences: &[Vec<String>]) -> Result<Vec<Vec<NodeId>>> {
        sequences
            .iter()
            .map(|seq| {
                seq.iter()
                    .map(|label| self.resolve_label(label))
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }

    fn resolve_label(&mut self, label: &str) -> Result<NodeId> {
        if let Some(id) = self.labels.get(label) {
            return Ok(id);
        }

        let id = self.allocate_id()?;
        self.graph.add_node(id, Some(label.to_string()))?;
        self.labels.ids.insert(label.to_string(), id);
        debug!(node_id = %id, label, "Created action node");
        Ok(id)
    }

    fn allocate_id(&mut self) -> Result<NodeId> {
        let exhausted = || TracewalkError::Input("node id space exhausted".into());
        let mut next = self.next_id.ok_or_else(exhausted)?;
        while self.graph.contains(NodeId(next)) {
            next = next.checked_add(1).ok_or_else(exhausted)?;
        }
        self.next_id = next.checked_add(1);
        Ok(NodeId(next))
    }

    /// Chain each resolved sequence: start -> first -> ... -> last -> end.
    ///
    /// Empty sequences add nothing.
    pub fn connect(&mut self, sequences: &[Vec<NodeId>]) -> Result<()> {
        let start = self.graph.start_node()?.id;
        let end = self.graph.end_node()?.id;

        for seq in sequences {
            let (Some(first), Some(last)) = (seq.first(), seq.last()) else {
                continue;
            };

            self.graph.add_edge(start, *first)?;
            for pair in seq.windows(2) {
                self.graph.add_edge(pair[0], pair[1])?;
            }
            self.graph.add_edge(*last, end)?;
            debug!(len = seq.len(), "Connected sequence");
        }
        Ok(())
    }
}
