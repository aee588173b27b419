//! Prompt Loader
//!
//! Loads prompt templates from an override directory or falls back to the
//! embedded defaults, then renders them with Handlebars.

use std::path::PathBuf;

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;
use crate::catalog::Catalog;
use crate::domain::AgentId;

/// Variables shared by every agent-facing template
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    pub project: String,
    pub name: String,
    pub title: String,
    pub focus: String,
    pub phase_title: String,
    pub document_title: String,
    pub markers: Vec<String>,
    pub required_keys: Vec<String>,
    pub capabilities: Vec<CapabilityRef>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityRef {
    pub id: String,
    pub title: String,
}

impl PromptContext {
    /// Build the context for one agent from the catalog
    pub fn for_agent(catalog: &Catalog, project: &str, agent: AgentId) -> Self {
        debug!(%project, %agent, "PromptContext::for_agent: called");
        let def = catalog.agent(agent);
        let binding = catalog.binding(agent);
        let profile = catalog.profile(binding.phase_type);

        let phase_title = catalog
            .phases()
            .iter()
            .find(|p| p.id == binding.phase_id)
            .map(|p| {
                p.subphases
                    .iter()
                    .find(|s| s.id == binding.node_id)
                    .map(|s| format!("{} ({})", p.title, s.title))
                    .unwrap_or_else(|| p.title.clone())
            })
            .unwrap_or_else(|| binding.phase_id.clone());

        Self {
            project: project.to_string(),
            name: def.name.clone(),
            title: def.title.clone(),
            focus: def.focus.clone(),
            phase_title,
            document_title: profile.document_title.clone(),
            markers: profile.markers.clone(),
            required_keys: profile.required_keys.clone(),
            capabilities: def
                .capabilities
                .iter()
                .map(|c| CapabilityRef {
                    id: c.id.clone(),
                    title: c.title.clone(),
                })
                .collect(),
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: Option<&str>) -> Self {
        self.instructions = instructions.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        self
    }
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// Override directory holding `<name>.pmt` files
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that checks `override_dir` before the embedded prompts
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        debug!(?override_dir, "PromptLoader::new: called");
        let override_dir = override_dir.filter(|dir| {
            let exists = dir.is_dir();
            if !exists {
                debug!(?dir, "PromptLoader::new: override directory does not exist");
            }
            exists
        });
        Self {
            hbs: Self::engine(),
            override_dir,
        }
    }

    /// Create a loader that only uses embedded prompts (for testing)
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            override_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Prompts are plain text, not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name: override directory first, then embedded
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref dir) = self.override_dir {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in override directory");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render(&self, template_name: &str, context: &impl Serialize) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map(|s| s.trim().to_string())
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }

    /// System prompt for chatting with an agent
    pub fn agent_system(&self, catalog: &Catalog, project: &str, agent: AgentId) -> Result<String> {
        self.render("agent", &PromptContext::for_agent(catalog, project, agent))
    }

    /// Hidden user turn asking the agent to introduce itself
    pub fn introduction(&self, catalog: &Catalog, project: &str, agent: AgentId) -> Result<String> {
        self.render("intro", &PromptContext::for_agent(catalog, project, agent))
    }

    /// System prompt for forced document synthesis
    pub fn synthesis_system(
        &self,
        catalog: &Catalog,
        project: &str,
        agent: AgentId,
        instructions: Option<&str>,
    ) -> Result<String> {
        let context = PromptContext::for_agent(catalog, project, agent).with_instructions(instructions);
        self.render("synthesis", &context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::builtin().unwrap()
    }

    #[test]
    fn test_agent_system_prompt_renders_persona() {
        let loader = PromptLoader::embedded_only();
        let prompt = loader.agent_system(&catalog(), "acme", AgentId::Ba).unwrap();
        assert!(prompt.starts_with("You are Mary, the Business Analyst"));
        assert!(prompt.contains("project \"acme\""));
        assert!(prompt.contains("- problem statement"));
        assert!(prompt.contains("- Market Analysis"));
    }

    #[test]
    fn test_subphase_title_includes_parent() {
        let ctx = PromptContext::for_agent(&catalog(), "acme", AgentId::Ux);
        assert_eq!(ctx.phase_title, "Planning (UX Specification)");
    }

    #[test]
    fn test_synthesis_prompt_lists_keys_and_instructions() {
        let loader = PromptLoader::embedded_only();
        let prompt = loader
            .synthesis_system(&catalog(), "acme", AgentId::Pm, Some("Focus on mobile & web"))
            .unwrap();
        assert!(prompt.contains("- \"functional_requirements\""));
        assert!(prompt.contains("Focus on mobile & web"));
    }

    #[test]
    fn test_synthesis_prompt_without_instructions() {
        let loader = PromptLoader::embedded_only();
        let prompt = loader.synthesis_system(&catalog(), "acme", AgentId::Pm, Some("   ")).unwrap();
        assert!(!prompt.contains("Additional instructions"));
    }

    #[test]
    fn test_override_directory_wins() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("intro.pmt"), "Hello from {{name}}").unwrap();

        let loader = PromptLoader::new(Some(temp.path().to_path_buf()));
        let intro = loader.introduction(&catalog(), "acme", AgentId::Sm).unwrap();
        assert_eq!(intro, "Hello from Bob");

        // Templates missing from the override dir still come from the embedded set
        assert!(loader.agent_system(&catalog(), "acme", AgentId::Sm).is_ok());
    }

    #[test]
    fn test_unknown_template() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.load_template("nonexistent-template").is_err());
    }
}
