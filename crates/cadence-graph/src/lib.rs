pub mod builder;
pub mod graph;

pub use builder::ConceptGraphBuilder;
pub use graph::{
    ConceptEdge, ConceptGraph, ConceptNode, EdgeDirection, GraphTopics, NodeType,
};
