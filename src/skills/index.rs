//! Skill descriptor.

use serde::{Deserialize, Serialize};

use super::trigger::Trigger;

/// Default skill weight when the descriptor omits one.
pub const DEFAULT_SKILL_WEIGHT: f64 = 0.7;

/// Weight assigned to the trigger synthesized from a description when a
/// skill declares no explicit triggers.
pub const SYNTHESIZED_WEIGHT: f64 = 0.5;

/// A reusable instruction module attachable to an agent.
///
/// Parsed from a markdown file with YAML frontmatter; immutable while
/// loaded. The registry replaces the whole descriptor on reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillIndex {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    /// Base weight for ranking; explicit-trigger skills typically sit at
    /// 0.7-0.9, description-derived ones at 0.5.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Names of skills this one builds on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Opaque instruction text injected into the agent prompt.
    #[serde(default)]
    pub body: String,
    /// Where the descriptor was loaded from, for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

fn default_weight() -> f64 {
    DEFAULT_SKILL_WEIGHT
}

impl SkillIndex {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            triggers: Vec::new(),
            weight: DEFAULT_SKILL_WEIGHT,
            depends_on: Vec::new(),
            body: body.into(),
            location: None,
        }
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn has_explicit_triggers(&self) -> bool {
        !self.triggers.is_empty()
    }

    /// Triggers used for matching: the explicit set, or a single keyword
    /// trigger synthesized from description tokens at the fallback weight.
    pub fn effective_triggers(&self) -> Vec<Trigger> {
        if self.has_explicit_triggers() {
            return self.triggers.clone();
        }

        let keywords: Vec<String> = self
            .description
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 4)
            .map(String::from)
            .collect();

        if keywords.is_empty() {
            Vec::new()
        } else {
            vec![Trigger::keywords(keywords, SYNTHESIZED_WEIGHT)]
        }
    }

    /// One-line summary for prompt injection.
    pub fn to_summary_line(&self) -> String {
        format!("- {}: {}", self.name, self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let skill = SkillIndex::new("sql-review", "Review SQL migrations", "Check for ...")
            .with_trigger(Trigger::file_pattern("**/*.sql", 0.9))
            .with_weight(0.9)
            .with_depends_on(["code-review"]);

        assert!(skill.has_explicit_triggers());
        assert_eq!(skill.weight, 0.9);
        assert_eq!(skill.depends_on, vec!["code-review"]);
    }

    #[test]
    fn test_synthesized_trigger_from_description() {
        let skill = SkillIndex::new("debugging", "Debug failing integration tests", "...");
        let triggers = skill.effective_triggers();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].weight(), SYNTHESIZED_WEIGHT);

        let hit = triggers[0].evaluate("the integration suite is failing", &[]);
        assert!(hit.is_some());
    }

    #[test]
    fn test_empty_description_synthesizes_nothing() {
        let skill = SkillIndex::new("blank", "", "...");
        assert!(skill.effective_triggers().is_empty());
    }

    #[test]
    fn test_short_tokens_dropped() {
        // "fix" (3 chars) is below the token floor; "bugs" is kept.
        let skill = SkillIndex::new("fixer", "fix bugs", "...");
        let triggers = skill.effective_triggers();
        assert_eq!(triggers.len(), 1);
        assert!(triggers[0].evaluate("bugs everywhere", &[]).is_some());
        assert!(triggers[0].evaluate("fix it", &[]).is_none());
    }
}
