//! In-memory concept graph.
//!
//! Node table keyed by id, flat edge list, and two derived indices: a
//! synonym index mapping surface tokens to node ids, and a neighbor
//! adjacency index. The neighbor index is built symmetrically at edge
//! insert, irrespective of the edge's declared direction; direction is
//! display metadata only and plays no part in traversal.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use cadence_core::error::{CadenceError, Result};

/// Role a concept plays in the narrated model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Input,
    Factor,
    Algorithm,
    Output,
}

/// Declared edge direction. Display-only: traversal treats every edge as
/// bidirectional.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeDirection {
    #[default]
    Forward,
    Backward,
    Bidirectional,
}

/// A concept in the domain being narrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptNode {
    pub id: String,
    pub label: String,
    pub node_type: NodeType,
    pub domain: String,
    /// Surface forms that map text tokens to this node. The lowercase label
    /// is always indexed as well.
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A typed relation between two concepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptEdge {
    pub source_id: String,
    pub target_id: String,
    pub edge_type: String,
    pub direction: EdgeDirection,
    pub strength: f64,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Result of mapping free text onto the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphTopics {
    /// Node ids matched directly by tokens, in first-match order.
    pub primary: Vec<String>,
    /// Neighbors of primary nodes, excluding the primaries themselves.
    pub related: Vec<String>,
    /// Pairwise shortest paths among primary nodes, where one exists.
    pub paths: Vec<Vec<String>>,
}

/// Keyed node/edge store with synonym and neighbor indices.
#[derive(Debug, Clone, Default)]
pub struct ConceptGraph {
    nodes: HashMap<String, ConceptNode>,
    edges: Vec<ConceptEdge>,
    synonyms: HashMap<String, String>,
    neighbors: HashMap<String, HashSet<String>>,
}

impl ConceptGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node(&self, id: &str) -> Option<&ConceptNode> {
        self.nodes.get(id)
    }

    pub fn edges(&self) -> &[ConceptEdge] {
        &self.edges
    }

    /// Insert a node, indexing its label and synonyms (lowercase).
    /// Re-inserting an id replaces the node but keeps existing edges.
    pub fn add_node(&mut self, node: ConceptNode) {
        self.synonyms
            .insert(node.label.to_lowercase(), node.id.clone());
        for synonym in &node.synonyms {
            self.synonyms.insert(synonym.to_lowercase(), node.id.clone());
        }
        self.neighbors.entry(node.id.clone()).or_default();
        self.nodes.insert(node.id.clone(), node);
    }

    /// Insert an edge. Both endpoints must already exist; the neighbor
    /// index is updated symmetrically regardless of declared direction.
    pub fn add_edge(&mut self, edge: ConceptEdge) -> Result<()> {
        if !self.nodes.contains_key(&edge.source_id) {
            return Err(CadenceError::MissingNode(edge.source_id.clone()));
        }
        if !self.nodes.contains_key(&edge.target_id) {
            return Err(CadenceError::MissingNode(edge.target_id.clone()));
        }
        self.neighbors
            .entry(edge.source_id.clone())
            .or_default()
            .insert(edge.target_id.clone());
        self.neighbors
            .entry(edge.target_id.clone())
            .or_default()
            .insert(edge.source_id.clone());
        self.edges.push(edge);
        Ok(())
    }

    /// Direct neighbors of a node, in no particular order.
    pub fn neighbors_of(&self, id: &str) -> Vec<String> {
        self.neighbors
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Map a token to a node id through the synonym index.
    pub fn resolve_token(&self, token: &str) -> Option<&String> {
        self.synonyms.get(&token.to_lowercase())
    }

    /// Breadth-first shortest path from `a` to `b`, bounded by `max_depth`
    /// edges. Returns the node-id path including both endpoints, or `None`
    /// if no path exists within the bound.
    pub fn find_shortest_path(&self, a: &str, b: &str, max_depth: usize) -> Option<Vec<String>> {
        if !self.nodes.contains_key(a) || !self.nodes.contains_key(b) {
            return None;
        }
        if a == b {
            return Some(vec![a.to_string()]);
        }

        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(a);
        let mut queue: VecDeque<(Vec<String>, usize)> = VecDeque::new();
        queue.push_back((vec![a.to_string()], 0));

        while let Some((path, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(last) = path.last() else {
                continue;
            };
            if let Some(adjacent) = self.neighbors.get(last.as_str()) {
                for next in adjacent {
                    if !visited.insert(next.as_str()) {
                        continue;
                    }
                    let mut extended = path.clone();
                    extended.push(next.clone());
                    if next == b {
                        return Some(extended);
                    }
                    queue.push_back((extended, depth + 1));
                }
            }
        }
        None
    }

    /// Map free text onto the graph: primary nodes via the synonym index,
    /// their neighbor set, and pairwise shortest paths among primaries.
    pub fn extract_topics_with_graph(&self, text: &str) -> GraphTopics {
        let mut primary: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 3)
        {
            if let Some(id) = self.synonyms.get(token) {
                if seen.insert(id.clone()) {
                    primary.push(id.clone());
                }
            }
        }

        let mut related: Vec<String> = Vec::new();
        let mut related_seen: HashSet<String> = HashSet::new();
        for id in &primary {
            if let Some(adjacent) = self.neighbors.get(id) {
                for neighbor in adjacent {
                    if !seen.contains(neighbor) && related_seen.insert(neighbor.clone()) {
                        related.push(neighbor.clone());
                    }
                }
            }
        }

        let mut paths: Vec<Vec<String>> = Vec::new();
        for i in 0..primary.len() {
            for j in (i + 1)..primary.len() {
                if let Some(path) = self.find_shortest_path(&primary[i], &primary[j], 3) {
                    paths.push(path);
                }
            }
        }

        GraphTopics {
            primary,
            related,
            paths,
        }
    }
}
