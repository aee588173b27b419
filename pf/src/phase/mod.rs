//! Phase and subphase progression

mod graph;

pub use graph::{GraphNode, NodeAccess, NodeStatus, PhaseGraph, recompute};
