//! Workflow catalog
//!
//! The phase graph, agent personas, capabilities and synthesis profiles are
//! static data. The builtin catalog is embedded in the binary; a user file can
//! replace it wholesale (`catalog.path` in config).
//!
//! A catalog is validated once at load and immutable afterwards, so lookups by
//! [`AgentId`] or [`PhaseType`] never fail.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use eyre::{Context, Result, bail};
use tracing::{debug, info};

use crate::domain::{AgentId, PhaseType};

mod types;

pub use types::{AgentBinding, AgentDef, Capability, PhaseDef, SubphaseDef, SynthesisProfile, WorkflowFile};

const BUILTIN_WORKFLOW: &str = include_str!("builtin/workflow.yml");

/// Validated, immutable workflow configuration
#[derive(Debug, Clone)]
pub struct Catalog {
    phases: Vec<PhaseDef>,
    /// Indexed by `AgentId as usize`
    agents: Vec<AgentDef>,
    /// Indexed by `AgentId as usize`
    bindings: Vec<AgentBinding>,
    /// Indexed by `PhaseType as usize`
    profiles: Vec<SynthesisProfile>,
}

impl Catalog {
    /// The catalog embedded in the binary
    pub fn builtin() -> Result<Self> {
        debug!("Catalog::builtin: called");
        Self::from_yaml(BUILTIN_WORKFLOW).context("Failed to load builtin workflow")
    }

    /// Load the override file if given, else the builtin catalog
    pub fn load(path: Option<&Path>) -> Result<Self> {
        debug!(?path, "Catalog::load: called");
        match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read workflow file {}", path.display()))?;
                let catalog = Self::from_yaml(&content)
                    .with_context(|| format!("Invalid workflow file {}", path.display()))?;
                info!(path = %path.display(), "Loaded workflow catalog");
                Ok(catalog)
            }
            None => Self::builtin(),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        debug!(len = content.len(), "Catalog::from_yaml: called");
        let file: WorkflowFile = serde_yaml::from_str(content).context("Failed to parse workflow YAML")?;
        Self::from_file(file)
    }

    /// Validate a parsed workflow file and index it
    pub fn from_file(mut file: WorkflowFile) -> Result<Self> {
        debug!(phase_count = file.phases.len(), "Catalog::from_file: called");
        if file.phases.is_empty() {
            bail!("Workflow defines no phases");
        }

        let mut node_ids = HashSet::new();
        let mut bound: BTreeMap<AgentId, AgentBinding> = BTreeMap::new();
        let mut bound_types = HashSet::new();

        let mut bind = |agent: AgentId, node_id: &str, phase_id: &str, phase_type: PhaseType| -> Result<()> {
            if !bound_types.insert(phase_type) {
                bail!("Phase type {} is bound more than once", phase_type);
            }
            let binding = AgentBinding {
                agent,
                node_id: node_id.to_string(),
                phase_id: phase_id.to_string(),
                phase_type,
            };
            if bound.insert(agent, binding).is_some() {
                bail!("Agent {} is bound to more than one phase", agent);
            }
            Ok(())
        };

        for phase in &file.phases {
            if !node_ids.insert(phase.id.clone()) {
                bail!("Duplicate node id: {}", phase.id);
            }
            if phase.has_subphases() {
                if phase.agent.is_some() || phase.phase_type.is_some() {
                    bail!("Phase {} has subphases and cannot bind an agent itself", phase.id);
                }
                for sub in &phase.subphases {
                    if !node_ids.insert(sub.id.clone()) {
                        bail!("Duplicate node id: {}", sub.id);
                    }
                    bind(sub.agent, &sub.id, &phase.id, sub.phase_type)?;
                }
            } else {
                match (phase.agent, phase.phase_type) {
                    (Some(agent), Some(phase_type)) => bind(agent, &phase.id, &phase.id, phase_type)?,
                    _ => bail!("Phase {} needs either subphases or both agent and phase-type", phase.id),
                }
            }
        }

        let mut agents = Vec::with_capacity(AgentId::ALL.len());
        let mut bindings = Vec::with_capacity(AgentId::ALL.len());
        for agent in AgentId::ALL {
            let binding = bound
                .remove(&agent)
                .ok_or_else(|| eyre::eyre!("Agent {} is not bound to any phase", agent))?;
            let def = file
                .agents
                .remove(&agent)
                .ok_or_else(|| eyre::eyre!("Agent {} has no definition", agent))?;
            validate_agent(agent, &def)?;
            agents.push(def);
            bindings.push(binding);
        }

        let mut profiles = Vec::with_capacity(PhaseType::ALL.len());
        for phase_type in PhaseType::ALL {
            let profile = file
                .profiles
                .remove(&phase_type)
                .ok_or_else(|| eyre::eyre!("Phase type {} has no synthesis profile", phase_type))?;
            if profile.markers.is_empty() || profile.required_keys.is_empty() {
                bail!("Synthesis profile for {} needs markers and required-keys", phase_type);
            }
            profiles.push(profile);
        }

        debug!(node_count = node_ids.len(), "Catalog::from_file: validated");
        Ok(Self {
            phases: file.phases,
            agents,
            bindings,
            profiles,
        })
    }

    /// Top-level phases in order
    pub fn phases(&self) -> &[PhaseDef] {
        &self.phases
    }

    pub fn agent(&self, agent: AgentId) -> &AgentDef {
        &self.agents[agent as usize]
    }

    pub fn binding(&self, agent: AgentId) -> &AgentBinding {
        &self.bindings[agent as usize]
    }

    pub fn phase_type_for(&self, agent: AgentId) -> PhaseType {
        self.binding(agent).phase_type
    }

    pub fn profile(&self, phase_type: PhaseType) -> &SynthesisProfile {
        &self.profiles[phase_type as usize]
    }

    pub fn capabilities(&self, agent: AgentId) -> &[Capability] {
        &self.agent(agent).capabilities
    }

    pub fn capability(&self, agent: AgentId, capability_id: &str) -> Option<&Capability> {
        self.capabilities(agent).iter().find(|c| c.id == capability_id)
    }

    /// Every bound node in display order
    pub fn bindings_in_order(&self) -> Vec<&AgentBinding> {
        let mut ordered = Vec::with_capacity(self.bindings.len());
        for phase in &self.phases {
            if phase.has_subphases() {
                for sub in &phase.subphases {
                    ordered.extend(self.bindings.iter().find(|b| b.node_id == sub.id));
                }
            } else {
                ordered.extend(self.bindings.iter().find(|b| b.node_id == phase.id));
            }
        }
        ordered
    }
}

fn validate_agent(agent: AgentId, def: &AgentDef) -> Result<()> {
    debug!(%agent, capability_count = def.capabilities.len(), "validate_agent: called");
    let mut ids = HashSet::new();
    for cap in &def.capabilities {
        if !ids.insert(cap.id.as_str()) {
            bail!("Agent {} defines capability {} twice", agent, cap.id);
        }
        if cap.min_messages == 0 {
            bail!("Capability {}/{} needs min-messages above zero", agent, cap.id);
        }
        if cap.min_messages >= def.generation_floor {
            bail!(
                "Agent {} generation-floor ({}) must exceed capability {} min-messages ({})",
                agent,
                def.generation_floor,
                cap.id,
                cap.min_messages
            );
        }
    }
    for cap in &def.capabilities {
        if let Some(dep) = &cap.depends_on {
            if dep == &cap.id {
                bail!("Capability {}/{} depends on itself", agent, cap.id);
            }
            if !ids.contains(dep.as_str()) {
                bail!("Capability {}/{} depends on unknown capability {}", agent, cap.id, dep);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tier;

    #[test]
    fn test_builtin_parses() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.phases().len(), 4);
        assert_eq!(catalog.phases()[1].subphases.len(), 2);
    }

    #[test]
    fn test_builtin_bindings() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.phase_type_for(AgentId::Ba), PhaseType::ProjectBrief);
        assert_eq!(catalog.binding(AgentId::Ux).phase_id, "planning");
        assert_eq!(catalog.binding(AgentId::Ux).node_id, "ux-spec");
        assert_eq!(catalog.phase_type_for(AgentId::Sm), PhaseType::UserStories);

        let order: Vec<_> = catalog.bindings_in_order().iter().map(|b| b.agent).collect();
        assert_eq!(order, AgentId::ALL.to_vec());
    }

    #[test]
    fn test_builtin_market_analysis_depends_on_pain_points() {
        let catalog = Catalog::builtin().unwrap();
        let cap = catalog.capability(AgentId::Ba, "market-analysis").unwrap();
        assert_eq!(cap.min_messages, 14);
        assert_eq!(cap.depends_on.as_deref(), Some("pain-points"));
        assert_eq!(catalog.capability(AgentId::Ba, "pain-points").unwrap().min_messages, 6);
    }

    #[test]
    fn test_builtin_tiers() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.agent(AgentId::Ba).min_tier, Tier::Free);
        assert_eq!(catalog.agent(AgentId::Sm).min_tier, Tier::Pro);
    }

    #[test]
    fn test_rejects_double_binding() {
        let yaml = BUILTIN_WORKFLOW.replace("agent: architect", "agent: ba");
        let err = Catalog::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("more than one phase"));
    }

    #[test]
    fn test_rejects_unknown_dependency() {
        let yaml = BUILTIN_WORKFLOW.replace("depends-on: pain-points", "depends-on: nonexistent");
        let err = Catalog::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("unknown capability"));
    }

    #[test]
    fn test_rejects_floor_below_capability() {
        let yaml = BUILTIN_WORKFLOW.replace("generation-floor: 16", "generation-floor: 5");
        let err = Catalog::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("generation-floor"));
    }

    #[test]
    fn test_load_override_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("workflow.yml");
        let yaml = BUILTIN_WORKFLOW.replace("name: Mary", "name: Ada");
        std::fs::write(&path, yaml).unwrap();

        let catalog = Catalog::load(Some(&path)).unwrap();
        assert_eq!(catalog.agent(AgentId::Ba).name, "Ada");
    }

    #[test]
    fn test_load_missing_override_fails() {
        let result = Catalog::load(Some(Path::new("/nonexistent/workflow.yml")));
        assert!(result.is_err());
    }
}
