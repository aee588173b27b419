//! Phase graph derivation
//!
//! The graph is a pure function of the catalog and the set of phase types
//! whose records are completed. Nothing here is persisted; callers recompute
//! after every confirmed deliverable write.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::catalog::Catalog;
use crate::domain::{AgentId, PhaseType};
use crate::subscription::Subscription;

/// Lock state of a phase or subphase, ordered by progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Locked,
    Active,
    Completed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One node in display order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub title: String,
    /// Enclosing phase for subphases
    pub parent: Option<String>,
    /// Bound agent; None for phases that split into subphases
    pub agent: Option<AgentId>,
    pub phase_type: Option<PhaseType>,
    pub status: NodeStatus,
}

impl GraphNode {
    pub fn is_leaf(&self) -> bool {
        self.agent.is_some()
    }
}

/// Derived lock/active/completed state for every node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseGraph {
    nodes: Vec<GraphNode>,
}

/// Recompute the graph from completed phase types
pub fn recompute(catalog: &Catalog, completed: &HashSet<PhaseType>) -> PhaseGraph {
    debug!(completed_count = completed.len(), "recompute: called");
    let mut nodes = Vec::new();
    let mut previous_completed = true;

    for phase in catalog.phases() {
        let unlocked = previous_completed;

        if phase.has_subphases() {
            let all_done = phase.subphases.iter().all(|s| completed.contains(&s.phase_type));
            let status = if all_done {
                NodeStatus::Completed
            } else if unlocked {
                NodeStatus::Active
            } else {
                NodeStatus::Locked
            };
            nodes.push(GraphNode {
                id: phase.id.clone(),
                title: phase.title.clone(),
                parent: None,
                agent: None,
                phase_type: None,
                status,
            });

            let mut prior_sub_completed = true;
            for sub in &phase.subphases {
                let done = completed.contains(&sub.phase_type);
                let status = if done {
                    NodeStatus::Completed
                } else if unlocked && prior_sub_completed {
                    NodeStatus::Active
                } else {
                    NodeStatus::Locked
                };
                nodes.push(GraphNode {
                    id: sub.id.clone(),
                    title: sub.title.clone(),
                    parent: Some(phase.id.clone()),
                    agent: Some(sub.agent),
                    phase_type: Some(sub.phase_type),
                    status,
                });
                prior_sub_completed = done;
            }
            previous_completed = all_done;
        } else {
            let done = phase.phase_type.is_some_and(|pt| completed.contains(&pt));
            let status = if done {
                NodeStatus::Completed
            } else if unlocked {
                NodeStatus::Active
            } else {
                NodeStatus::Locked
            };
            nodes.push(GraphNode {
                id: phase.id.clone(),
                title: phase.title.clone(),
                parent: None,
                agent: phase.agent,
                phase_type: phase.phase_type,
                status,
            });
            previous_completed = done;
        }
    }

    PhaseGraph { nodes }
}

impl PhaseGraph {
    /// All nodes, phases followed by their subphases
    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.nodes.iter().find(|n| n.id == node_id).map(|n| n.status)
    }

    /// Status of the node an agent drives
    pub fn status_for_agent(&self, agent: AgentId) -> Option<NodeStatus> {
        self.nodes.iter().find(|n| n.agent == Some(agent)).map(|n| n.status)
    }

    /// node_id -> status
    pub fn to_map(&self) -> BTreeMap<String, NodeStatus> {
        self.nodes.iter().map(|n| (n.id.clone(), n.status)).collect()
    }

    /// First active node that an agent works on
    pub fn current_node(&self) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.is_leaf() && n.status == NodeStatus::Active)
    }

    pub fn is_complete(&self) -> bool {
        self.nodes.iter().all(|n| n.status == NodeStatus::Completed)
    }
}

/// Whether a node may be selected, combining both kinds of lock
///
/// Only used for selection and display. Bookkeeping reads the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeAccess {
    pub status: NodeStatus,
    /// The current plan does not include the agent
    pub tier_locked: bool,
}

impl NodeAccess {
    pub fn for_agent(graph: &PhaseGraph, subscription: &dyn Subscription, agent: AgentId) -> Self {
        Self {
            status: graph.status_for_agent(agent).unwrap_or(NodeStatus::Locked),
            tier_locked: !subscription.can_use_agent(agent),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.status == NodeStatus::Locked || self.tier_locked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tier;
    use crate::subscription::LocalSubscription;
    use proptest::prelude::*;

    fn completed(types: &[PhaseType]) -> HashSet<PhaseType> {
        types.iter().copied().collect()
    }

    #[test]
    fn test_fresh_project() {
        let catalog = Catalog::builtin().unwrap();
        let graph = recompute(&catalog, &HashSet::new());

        assert_eq!(graph.status("discovery"), Some(NodeStatus::Active));
        assert_eq!(graph.status("planning"), Some(NodeStatus::Locked));
        assert_eq!(graph.status("prd"), Some(NodeStatus::Locked));
        assert_eq!(graph.status("ux-spec"), Some(NodeStatus::Locked));
        assert_eq!(graph.status("architecture"), Some(NodeStatus::Locked));
        assert_eq!(graph.status("delivery"), Some(NodeStatus::Locked));
        assert_eq!(graph.current_node().map(|n| n.id.as_str()), Some("discovery"));
        assert!(!graph.is_complete());
    }

    #[test]
    fn test_completing_phase_activates_next_and_first_subphase() {
        let catalog = Catalog::builtin().unwrap();
        let graph = recompute(&catalog, &completed(&[PhaseType::ProjectBrief]));

        assert_eq!(graph.status("discovery"), Some(NodeStatus::Completed));
        assert_eq!(graph.status("planning"), Some(NodeStatus::Active));
        assert_eq!(graph.status("prd"), Some(NodeStatus::Active));
        assert_eq!(graph.status("ux-spec"), Some(NodeStatus::Locked));
        assert_eq!(graph.current_node().map(|n| n.id.as_str()), Some("prd"));
    }

    #[test]
    fn test_partial_subphases() {
        let catalog = Catalog::builtin().unwrap();
        let graph = recompute(&catalog, &completed(&[PhaseType::ProjectBrief, PhaseType::Prd]));

        assert_eq!(graph.status("planning"), Some(NodeStatus::Active));
        assert_eq!(graph.status("prd"), Some(NodeStatus::Completed));
        assert_eq!(graph.status("ux-spec"), Some(NodeStatus::Active));
        assert_eq!(graph.status("architecture"), Some(NodeStatus::Locked));
    }

    #[test]
    fn test_all_subphases_complete_the_phase() {
        let catalog = Catalog::builtin().unwrap();
        let graph = recompute(
            &catalog,
            &completed(&[PhaseType::ProjectBrief, PhaseType::Prd, PhaseType::UxSpec]),
        );
        assert_eq!(graph.status("planning"), Some(NodeStatus::Completed));
        assert_eq!(graph.status("architecture"), Some(NodeStatus::Active));
    }

    #[test]
    fn test_completed_record_reports_completed_out_of_order() {
        let catalog = Catalog::builtin().unwrap();
        let graph = recompute(&catalog, &completed(&[PhaseType::UxSpec]));

        assert_eq!(graph.status("ux-spec"), Some(NodeStatus::Completed));
        assert_eq!(graph.status("prd"), Some(NodeStatus::Locked));
        assert_eq!(graph.status("planning"), Some(NodeStatus::Locked));
    }

    #[test]
    fn test_everything_completed() {
        let catalog = Catalog::builtin().unwrap();
        let graph = recompute(&catalog, &PhaseType::ALL.into_iter().collect());
        assert!(graph.is_complete());
        assert!(graph.current_node().is_none());
        assert_eq!(graph.to_map().len(), 6);
    }

    #[test]
    fn test_node_access_combines_tier_lock() {
        let catalog = Catalog::builtin().unwrap();
        let graph = recompute(&catalog, &completed(&[PhaseType::ProjectBrief, PhaseType::Prd]));
        let free = LocalSubscription::unlimited(Tier::Free, &catalog);

        let ux = NodeAccess::for_agent(&graph, &free, AgentId::Ux);
        assert_eq!(ux.status, NodeStatus::Active);
        assert!(ux.tier_locked);
        assert!(ux.is_locked());

        // The tier lock never leaks into the graph itself
        assert_eq!(graph.status_for_agent(AgentId::Ux), Some(NodeStatus::Active));

        let pm = NodeAccess::for_agent(&graph, &free, AgentId::Pm);
        assert!(!pm.is_locked());
    }

    proptest! {
        #[test]
        fn test_adding_completions_never_lowers_status(
            base in proptest::collection::vec(0usize..5, 0..5),
            extra in 0usize..5,
        ) {
            let catalog = Catalog::builtin().unwrap();
            let before: HashSet<_> = base.iter().map(|i| PhaseType::ALL[*i]).collect();
            let mut after = before.clone();
            after.insert(PhaseType::ALL[extra]);

            let g1 = recompute(&catalog, &before);
            let g2 = recompute(&catalog, &after);
            for (n1, n2) in g1.nodes().iter().zip(g2.nodes()) {
                prop_assert_eq!(&n1.id, &n2.id);
                prop_assert!(n1.status <= n2.status);
            }
        }
    }
}
