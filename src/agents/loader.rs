//! Agent descriptor loader - markdown files with YAML frontmatter.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::index::{AgentIndex, AgentRole, ModelTier};
use crate::skills::split_frontmatter;

/// YAML frontmatter for an agent file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFrontmatter {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub model_tier: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default)]
pub struct AgentLoader;

impl AgentLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, content: &str) -> crate::Result<AgentIndex> {
        let (frontmatter_str, body) = split_frontmatter(content)?;
        let frontmatter: AgentFrontmatter = serde_yaml_bw::from_str(frontmatter_str)
            .map_err(|e| crate::Error::invalid(format!("agent frontmatter: {}", e)))?;

        let role: AgentRole = frontmatter.role.parse()?;
        let mut agent = AgentIndex::new(frontmatter.name, role)
            .with_skills(frontmatter.skills)
            .with_tools(frontmatter.tools);

        if let Some(tier) = frontmatter.model_tier {
            agent = agent.with_model_tier(tier.parse::<ModelTier>()?);
        }
        agent = agent.with_description(frontmatter.description.unwrap_or_else(|| body.to_string()));

        Ok(agent)
    }

    pub async fn load_file(&self, path: &Path) -> crate::Result<AgentIndex> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            crate::Error::invalid(format!("failed to read agent file {}: {}", path.display(), e))
        })?;
        self.parse(&content)
    }

    /// Load every `*.agent.md` in a directory; bad files are skipped.
    pub async fn load_directory(&self, dir: &Path) -> crate::Result<Vec<AgentIndex>> {
        let mut agents = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
            crate::Error::invalid(format!("failed to read directory {}: {}", dir.display(), e))
        })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| crate::Error::external(format!("directory scan: {}", e)))?
        {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && name.ends_with(".agent.md")
            {
                match self.load_file(&path).await {
                    Ok(agent) => agents.push(agent),
                    Err(e) => {
                        tracing::warn!("failed to load agent from {}: {}", path.display(), e);
                    }
                }
            }
        }

        Ok(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agent() {
        let content = r#"---
name: migration-dev
role: dev
model_tier: heavy
skills:
  - sql-review
tools:
  - registry_update
  - registry_next
---

Implements schema migrations with extra care.
"#;
        let agent = AgentLoader::new().parse(content).unwrap();
        assert_eq!(agent.name, "migration-dev");
        assert_eq!(agent.role, AgentRole::Dev);
        assert_eq!(agent.model_tier, ModelTier::Heavy);
        assert_eq!(agent.skills, vec!["sql-review"]);
        assert!(agent.description.contains("schema migrations"));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let content = "---\nname: x\nrole: wizard\n---\nBody";
        assert!(AgentLoader::new().parse(content).is_err());
    }

    #[tokio::test]
    async fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ops.agent.md"),
            "---\nname: night-ops\nrole: ops\nmodel_tier: fast\n---\nKeeps things tidy.",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let agents = AgentLoader::new().load_directory(dir.path()).await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].name, "night-ops");
    }
}
