//! Builtin agent roster.
//!
//! One default descriptor per role. Projects override these by dropping an
//! agent file with the same name into their agents directory.

use super::index::{AgentIndex, AgentRole, ModelTier};

pub fn builtin_agents() -> Vec<AgentIndex> {
    vec![
        AgentIndex::new("lead", AgentRole::Lead)
            .with_model_tier(ModelTier::Heavy)
            .with_description("Coordinates multi-agent strategies and merges results"),
        AgentIndex::new("architect", AgentRole::Architect)
            .with_model_tier(ModelTier::Heavy)
            .with_description("Designs module boundaries and data flow before implementation"),
        AgentIndex::new("planner", AgentRole::Planner)
            .with_model_tier(ModelTier::Main)
            .with_description("Breaks a proposal into ordered tasks with dependencies"),
        AgentIndex::new("dev", AgentRole::Dev)
            .with_model_tier(ModelTier::Main)
            .with_description("Implements tasks from the registry"),
        AgentIndex::new("tester", AgentRole::Tester)
            .with_model_tier(ModelTier::Main)
            .with_description("Writes and runs tests for completed tasks"),
        AgentIndex::new("reviewer", AgentRole::Reviewer)
            .with_model_tier(ModelTier::Main)
            .with_description("Reviews diffs for correctness and style"),
        AgentIndex::new("debug", AgentRole::Debug)
            .with_model_tier(ModelTier::Heavy)
            .with_description("Investigates failures and narrows reproductions"),
        AgentIndex::new("ops", AgentRole::Ops)
            .with_model_tier(ModelTier::Fast)
            .with_description("Routine maintenance: syncs, archives, housekeeping"),
    ]
}

pub fn find_builtin(name: &str) -> Option<AgentIndex> {
    builtin_agents().into_iter().find(|a| a.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_agent_per_role() {
        let agents = builtin_agents();
        assert_eq!(agents.len(), AgentRole::all().len());

        for role in AgentRole::all() {
            assert!(agents.iter().any(|a| a.role == *role));
        }
    }

    #[test]
    fn test_find_builtin() {
        assert!(find_builtin("debug").is_some());
        assert!(find_builtin("nonexistent").is_none());
    }
}
