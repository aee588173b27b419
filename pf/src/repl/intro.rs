//! Auto-introduction bookkeeping
//!
//! Client-local and per run: an agent introduces itself the first time it is
//! visited with an empty transcript. A phase reset clears the mark so the
//! next visit introduces again.

use std::collections::HashSet;

use crate::domain::AgentId;

#[derive(Debug, Default)]
pub struct IntroductionGuard {
    triggered: HashSet<AgentId>,
}

impl IntroductionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_introduce(&self, agent: AgentId, message_count: u64) -> bool {
        message_count == 0 && !self.triggered.contains(&agent)
    }

    /// Record that the introduction was sent; returns false if it already was
    pub fn mark(&mut self, agent: AgentId) -> bool {
        self.triggered.insert(agent)
    }

    pub fn clear(&mut self, agent: AgentId) {
        self.triggered.remove(&agent);
    }
}
