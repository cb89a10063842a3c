//! Agent descriptor types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Functional role an agent plays in a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Lead,
    Architect,
    Planner,
    Dev,
    Tester,
    Reviewer,
    Debug,
    Ops,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Lead => "lead",
            AgentRole::Architect => "architect",
            AgentRole::Planner => "planner",
            AgentRole::Dev => "dev",
            AgentRole::Tester => "tester",
            AgentRole::Reviewer => "reviewer",
            AgentRole::Debug => "debug",
            AgentRole::Ops => "ops",
        }
    }

    pub fn all() -> &'static [AgentRole] {
        &[
            AgentRole::Lead,
            AgentRole::Architect,
            AgentRole::Planner,
            AgentRole::Dev,
            AgentRole::Tester,
            AgentRole::Reviewer,
            AgentRole::Debug,
            AgentRole::Ops,
        ]
    }
}

impl FromStr for AgentRole {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "lead" => Ok(AgentRole::Lead),
            "architect" => Ok(AgentRole::Architect),
            "planner" => Ok(AgentRole::Planner),
            "dev" => Ok(AgentRole::Dev),
            "tester" => Ok(AgentRole::Tester),
            "reviewer" => Ok(AgentRole::Reviewer),
            "debug" => Ok(AgentRole::Debug),
            "ops" => Ok(AgentRole::Ops),
            other => Err(crate::Error::invalid(format!("unknown role '{}'", other))),
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque cost/quality tier mapped to a concrete model id by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Cheap, short-latency model.
    Fast,
    /// Balanced default.
    #[default]
    Main,
    /// High-quality, expensive model.
    Heavy,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Fast => "fast",
            ModelTier::Main => "main",
            ModelTier::Heavy => "heavy",
        }
    }
}

impl FromStr for ModelTier {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "fast" => Ok(ModelTier::Fast),
            "main" => Ok(ModelTier::Main),
            "heavy" => Ok(ModelTier::Heavy),
            other => Err(crate::Error::invalid(format!("unknown tier '{}'", other))),
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named role + tier combination with attached skills and tool access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIndex {
    pub name: String,
    pub role: AgentRole,
    #[serde(default)]
    pub model_tier: ModelTier,
    /// Skill names attached to every prompt this agent runs.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Tool names the agent may call; empty means unrestricted.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl AgentIndex {
    pub fn new(name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            name: name.into(),
            role,
            model_tier: ModelTier::default(),
            skills: Vec::new(),
            tools: Vec::new(),
            description: String::new(),
        }
    }

    pub fn with_model_tier(mut self, tier: ModelTier) -> Self {
        self.model_tier = tier;
        self
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn has_tool_restrictions(&self) -> bool {
        !self.tools.is_empty()
    }

    pub fn is_tool_allowed(&self, tool: &str) -> bool {
        self.tools.is_empty() || self.tools.iter().any(|t| t == tool)
    }

    pub fn to_summary_line(&self) -> String {
        format!(
            "- {} ({}, {}): {}",
            self.name,
            self.role,
            self.model_tier,
            self.description
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_roundtrip() {
        for role in AgentRole::all() {
            assert_eq!(role.as_str().parse::<AgentRole>().unwrap(), *role);
        }
        assert!("manager".parse::<AgentRole>().is_err());
    }

    #[test]
    fn test_tool_restrictions() {
        let open = AgentIndex::new("anything", AgentRole::Dev);
        assert!(open.is_tool_allowed("registry_update"));

        let restricted =
            AgentIndex::new("reader", AgentRole::Reviewer).with_tools(["spec_show", "spec_list"]);
        assert!(restricted.is_tool_allowed("spec_show"));
        assert!(!restricted.is_tool_allowed("registry_update"));
    }

    #[test]
    fn test_tier_default_is_main() {
        assert_eq!(ModelTier::default(), ModelTier::Main);
    }
}
