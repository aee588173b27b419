//! Subscription guard
//!
//! Pure checks answered from the current plan, plus a usage notification
//! after each successful send or generation. Billing lives elsewhere; the
//! local implementation counts usage for the life of the process.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::config::SubscriptionConfig;
use crate::domain::{AgentId, Tier};

/// What a usage notification counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageKind {
    Message,
    Document,
}

/// The subscription collaborator
pub trait Subscription: Send + Sync {
    fn tier(&self) -> Tier;

    /// Whether the plan includes this agent
    fn can_use_agent(&self, agent: AgentId) -> bool;

    fn can_send_message(&self) -> bool;

    fn can_generate_document(&self) -> bool;

    /// None when unlimited
    fn messages_remaining(&self) -> Option<u32>;

    /// None when unlimited
    fn documents_remaining(&self) -> Option<u32>;

    /// Called exactly once per successful send or generation
    fn record_usage(&self, kind: UsageKind);
}

/// Plan from local config with in-process counters
#[derive(Debug)]
pub struct LocalSubscription {
    tier: Tier,
    /// Indexed by `AgentId as usize`
    agent_tiers: Vec<Tier>,
    message_quota: Option<u32>,
    document_quota: Option<u32>,
    messages_used: AtomicU32,
    documents_used: AtomicU32,
}

impl LocalSubscription {
    pub fn new(config: &SubscriptionConfig, catalog: &Catalog) -> Self {
        debug!(tier = %config.tier, ?config.message_quota, ?config.document_quota, "LocalSubscription::new: called");
        Self {
            tier: config.tier,
            agent_tiers: AgentId::ALL.iter().map(|a| catalog.agent(*a).min_tier).collect(),
            message_quota: config.message_quota,
            document_quota: config.document_quota,
            messages_used: AtomicU32::new(0),
            documents_used: AtomicU32::new(0),
        }
    }

    /// Unlimited plan at the given tier
    pub fn unlimited(tier: Tier, catalog: &Catalog) -> Self {
        let config = SubscriptionConfig {
            tier,
            message_quota: None,
            document_quota: None,
        };
        Self::new(&config, catalog)
    }

    pub fn messages_used(&self) -> u32 {
        self.messages_used.load(Ordering::SeqCst)
    }

    pub fn documents_used(&self) -> u32 {
        self.documents_used.load(Ordering::SeqCst)
    }
}

fn remaining(quota: Option<u32>, used: &AtomicU32) -> Option<u32> {
    quota.map(|q| q.saturating_sub(used.load(Ordering::SeqCst)))
}

impl Subscription for LocalSubscription {
    fn tier(&self) -> Tier {
        self.tier
    }

    fn can_use_agent(&self, agent: AgentId) -> bool {
        self.agent_tiers
            .get(agent as usize)
            .map(|required| self.tier >= *required)
            .unwrap_or(false)
    }

    fn can_send_message(&self) -> bool {
        remaining(self.message_quota, &self.messages_used).is_none_or(|r| r > 0)
    }

    fn can_generate_document(&self) -> bool {
        remaining(self.document_quota, &self.documents_used).is_none_or(|r| r > 0)
    }

    fn messages_remaining(&self) -> Option<u32> {
        remaining(self.message_quota, &self.messages_used)
    }

    fn documents_remaining(&self) -> Option<u32> {
        remaining(self.document_quota, &self.documents_used)
    }

    fn record_usage(&self, kind: UsageKind) {
        let used = match kind {
            UsageKind::Message => self.messages_used.fetch_add(1, Ordering::SeqCst) + 1,
            UsageKind::Document => self.documents_used.fetch_add(1, Ordering::SeqCst) + 1,
        };
        info!(?kind, used, "Usage recorded");
    }
}
