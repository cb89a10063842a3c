//! Ranked skill selection.
//!
//! Each skill's triggers are evaluated against the query and context, raw
//! contributions are normalized by the skill's total trigger weight, and
//! context boosts are applied on top. Skills scoring below the cutoff are
//! discarded.

use serde::Serialize;

use super::index::SkillIndex;
use super::registry::SkillRegistry;
use super::trigger::Trigger;

/// Minimum post-boost score a skill needs to be reported.
pub const SCORE_CUTOFF: f64 = 0.6;

/// Boost when the inferred task type appears in the skill description.
const TASK_TYPE_BOOST: f64 = 0.15;

/// Boost when a context file matches one of the skill's file patterns.
const FILE_MATCH_BOOST: f64 = 0.20;

/// Leading verbs recognized as task types.
const TASK_VERBS: &[&str] = &[
    "implement", "review", "debug", "test", "fix", "refactor", "plan", "deploy", "document",
    "optimize", "migrate",
];

/// Query-side context for matching.
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    /// Files the current task touches.
    pub files: Vec<String>,
}

impl MatchContext {
    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }
}

/// Why and how strongly a skill matched.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub skill: String,
    /// Final score in [0, 1].
    pub score: f64,
    pub reasons: Vec<MatchReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchReason {
    /// `pattern`, `keyword`, `file`, or `boost`.
    pub kind: String,
    pub value: String,
    pub weight: f64,
}

/// Ranks skills against a query and context.
pub struct SkillMatcher;

impl SkillMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Score every registered skill; results sorted by descending score,
    /// explicit-trigger skills ahead of description-derived ones on ties,
    /// then by name.
    pub fn match_skills(
        &self,
        registry: &SkillRegistry,
        query: &str,
        context: &MatchContext,
    ) -> Vec<MatchResult> {
        let task_type = infer_task_type(query);

        let mut results: Vec<(bool, MatchResult)> = registry
            .skills()
            .filter_map(|skill| {
                self.score_skill(skill, query, context, task_type)
                    .map(|r| (skill.has_explicit_triggers(), r))
            })
            .collect();

        results.sort_by(|(a_explicit, a), (b_explicit, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b_explicit.cmp(a_explicit))
                .then(a.skill.cmp(&b.skill))
        });

        results.into_iter().map(|(_, r)| r).collect()
    }

    fn score_skill(
        &self,
        skill: &SkillIndex,
        query: &str,
        context: &MatchContext,
        task_type: Option<&'static str>,
    ) -> Option<MatchResult> {
        let triggers = skill.effective_triggers();
        if triggers.is_empty() {
            return None;
        }

        let total_weight: f64 = triggers.iter().map(Trigger::weight).sum();
        if total_weight <= 0.0 {
            return None;
        }

        let mut reasons = Vec::new();
        let mut raw = 0.0;
        let mut file_hit = false;

        for trigger in &triggers {
            if let Some(hit) = trigger.evaluate(query, &context.files) {
                raw += hit.weight;
                if hit.kind == "file" {
                    file_hit = true;
                }
                reasons.push(MatchReason {
                    kind: hit.kind.to_string(),
                    value: hit.value,
                    weight: hit.weight,
                });
            }
        }

        let mut score = raw / total_weight;

        if let Some(verb) = task_type
            && skill.description.to_lowercase().contains(verb)
        {
            score += TASK_TYPE_BOOST;
            reasons.push(MatchReason {
                kind: "boost".to_string(),
                value: format!("task type '{}'", verb),
                weight: TASK_TYPE_BOOST,
            });
        }

        if file_hit {
            score += FILE_MATCH_BOOST;
            reasons.push(MatchReason {
                kind: "boost".to_string(),
                value: "context file match".to_string(),
                weight: FILE_MATCH_BOOST,
            });
        }

        score = score.min(1.0);

        (score >= SCORE_CUTOFF).then(|| MatchResult {
            skill: skill.name.clone(),
            score,
            reasons,
        })
    }
}

impl Default for SkillMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Infer the task type from the query's leading verb.
fn infer_task_type(query: &str) -> Option<&'static str> {
    let first = query.split_whitespace().next()?.to_lowercase();
    let stripped = first.trim_matches(|c: char| !c.is_alphanumeric());
    TASK_VERBS.iter().find(|v| **v == stripped).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SkillRegistry {
        let mut registry = SkillRegistry::new();
        registry.register(
            SkillIndex::new("sql-review", "Review SQL schema migrations", "...")
                .with_trigger(Trigger::keywords(["sql", "migration"], 0.8))
                .with_trigger(Trigger::file_pattern("**/*.sql", 0.9)),
        );
        registry.register(
            SkillIndex::new("frontend", "Build UI components", "...")
                .with_trigger(Trigger::keywords(["react", "component"], 0.8)),
        );
        registry.register(SkillIndex::new("tuning", "Optimize slow database queries", "..."));
        registry
    }

    #[test]
    fn test_keyword_and_file_scoring() {
        let matcher = SkillMatcher::new();
        let context = MatchContext::with_files(["migrations/007_users.sql"]);
        let results = matcher.match_skills(&registry(), "review the sql migration", &context);

        assert_eq!(results[0].skill, "sql-review");
        // Both triggers fire (raw 1.7 / 1.7 = 1.0), plus boosts, capped at 1.0.
        assert!((results[0].score - 1.0).abs() < f64::EPSILON);
        assert!(results[0].reasons.iter().any(|r| r.kind == "boost"));
    }

    #[test]
    fn test_cutoff_discards_weak_matches() {
        let matcher = SkillMatcher::new();
        let results = matcher.match_skills(
            &registry(),
            "write a react page",
            &MatchContext::default(),
        );

        // frontend fires one of one keyword triggers -> 1.0; sql-review fires
        // nothing and is discarded.
        assert!(results.iter().any(|r| r.skill == "frontend"));
        assert!(!results.iter().any(|r| r.skill == "sql-review"));
    }

    #[test]
    fn test_partial_trigger_coverage_below_cutoff() {
        let mut registry = SkillRegistry::new();
        // Only one of three equally weighted triggers will fire: 0.7/2.1 = 0.33.
        registry.register(
            SkillIndex::new("broad", "A broad skill", "...")
                .with_trigger(Trigger::keywords(["alpha"], 0.7))
                .with_trigger(Trigger::keywords(["beta"], 0.7))
                .with_trigger(Trigger::keywords(["gamma"], 0.7)),
        );

        let results =
            SkillMatcher::new().match_skills(&registry, "alpha only", &MatchContext::default());
        assert!(results.is_empty());
    }

    #[test]
    fn test_synthesized_trigger_with_boost_clears_cutoff() {
        let matcher = SkillMatcher::new();
        // "tuning" has no explicit triggers; the description-derived keyword
        // trigger fires (1.0 normalized) and the leading verb matches the
        // description for another +0.15.
        let results = matcher.match_skills(
            &registry(),
            "optimize the database layer",
            &MatchContext::default(),
        );
        let tuning = results.iter().find(|r| r.skill == "tuning").unwrap();
        assert!(tuning.score >= SCORE_CUTOFF);
    }

    #[test]
    fn test_no_triggers_no_description_yields_nothing() {
        let mut registry = SkillRegistry::new();
        registry.register(SkillIndex::new("empty", "", "..."));

        let results =
            SkillMatcher::new().match_skills(&registry, "anything at all", &MatchContext::default());
        assert!(results.is_empty());
    }

    #[test]
    fn test_infer_task_type() {
        assert_eq!(infer_task_type("review this PR"), Some("review"));
        assert_eq!(infer_task_type("Debug: the flaky test"), Some("debug"));
        assert_eq!(infer_task_type("ship it"), None);
        assert_eq!(infer_task_type(""), None);
    }

    #[test]
    fn test_deterministic_ordering_on_ties() {
        let mut registry = SkillRegistry::new();
        registry.register(
            SkillIndex::new("b-skill", "Things", "...")
                .with_trigger(Trigger::keywords(["widget"], 0.8)),
        );
        registry.register(
            SkillIndex::new("a-skill", "Things", "...")
                .with_trigger(Trigger::keywords(["widget"], 0.8)),
        );

        let results =
            SkillMatcher::new().match_skills(&registry, "widget work", &MatchContext::default());
        assert_eq!(results[0].skill, "a-skill");
        assert_eq!(results[1].skill, "b-skill");
    }
}
