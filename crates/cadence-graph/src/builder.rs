//! Fluent construction of concept graphs.
//!
//! The builder collects nodes and edges and validates the edge-endpoint
//! invariant once at build time, so a graph constructed through it can
//! never hold a dangling edge.

use std::collections::HashMap;

use cadence_core::error::Result;

use crate::graph::{ConceptEdge, ConceptGraph, ConceptNode, EdgeDirection, NodeType};

/// Accumulates nodes and edges, then builds a validated [`ConceptGraph`].
#[derive(Debug, Default)]
pub struct ConceptGraphBuilder {
    nodes: Vec<ConceptNode>,
    edges: Vec<ConceptEdge>,
}

impl ConceptGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(
        mut self,
        id: &str,
        label: &str,
        node_type: NodeType,
        domain: &str,
        synonyms: &[&str],
    ) -> Self {
        self.nodes.push(ConceptNode {
            id: id.to_string(),
            label: label.to_string(),
            node_type,
            domain: domain.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
            metadata: HashMap::new(),
        });
        self
    }

    pub fn add_node(mut self, node: ConceptNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn edge(mut self, source: &str, target: &str, edge_type: &str, strength: f64) -> Self {
        self.edges.push(ConceptEdge {
            source_id: source.to_string(),
            target_id: target.to_string(),
            edge_type: edge_type.to_string(),
            direction: EdgeDirection::Forward,
            strength,
            confidence: 1.0,
            metadata: HashMap::new(),
        });
        self
    }

    pub fn add_edge(mut self, edge: ConceptEdge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Build the graph. Fails with `MissingNode` if any edge references a
    /// node id that was never added.
    pub fn build(self) -> Result<ConceptGraph> {
        let mut graph = ConceptGraph::new();
        for node in self.nodes {
            graph.add_node(node);
        }
        for edge in self.edges {
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }
}
