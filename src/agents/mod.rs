//! Agent descriptors: named role + model-tier combinations.

mod builtin;
mod index;
mod loader;

pub use builtin::{builtin_agents, find_builtin};
pub use index::{AgentIndex, AgentRole, ModelTier};
pub use loader::{AgentFrontmatter, AgentLoader};

use std::collections::HashMap;
use std::path::Path;

/// Registry of agent descriptors, name-keyed.
///
/// Seeded with the builtin roster; project and plugin descriptors override
/// builtins of the same name on registration.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentIndex>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for agent in builtin_agents() {
            registry.register(agent);
        }
        registry
    }

    pub fn register(&mut self, agent: AgentIndex) {
        self.agents.insert(agent.name.clone(), agent);
    }

    pub fn get(&self, name: &str) -> Option<&AgentIndex> {
        self.agents.get(name)
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentIndex> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn remove(&mut self, name: &str) -> Option<AgentIndex> {
        self.agents.remove(name)
    }

    /// Load and register every agent descriptor in a directory.
    pub async fn load_directory(&mut self, dir: &Path) -> crate::Result<usize> {
        let agents = AgentLoader::new().load_directory(dir).await?;
        let count = agents.len();
        for agent in agents {
            self.register(agent);
        }
        Ok(count)
    }

    /// Pick the default agent for a role.
    pub fn default_for_role(&self, role: AgentRole) -> Option<&AgentIndex> {
        let mut candidates: Vec<&AgentIndex> =
            self.agents.values().filter(|a| a.role == role).collect();
        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        candidates.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roster_present() {
        let registry = AgentRegistry::with_builtins();
        assert!(registry.get("dev").is_some());
        assert!(registry.get("reviewer").is_some());
        assert!(registry.len() >= 8);
    }

    #[test]
    fn test_override_replaces_builtin() {
        let mut registry = AgentRegistry::with_builtins();
        let custom = AgentIndex::new("dev", AgentRole::Dev)
            .with_model_tier(ModelTier::Heavy)
            .with_skills(["custom-style"]);
        registry.register(custom);

        assert_eq!(registry.get("dev").unwrap().model_tier, ModelTier::Heavy);
    }

    #[test]
    fn test_default_for_role_is_deterministic() {
        let mut registry = AgentRegistry::new();
        registry.register(AgentIndex::new("zed", AgentRole::Tester));
        registry.register(AgentIndex::new("amy", AgentRole::Tester));

        assert_eq!(
            registry.default_for_role(AgentRole::Tester).unwrap().name,
            "amy"
        );
        assert!(registry.default_for_role(AgentRole::Ops).is_none());
    }
}
