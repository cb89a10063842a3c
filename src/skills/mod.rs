//! Skill system: descriptors, loading, and ranked matching.
//!
//! A skill is a markdown file with YAML frontmatter declaring weighted
//! triggers. The registry holds parsed descriptors; the matcher ranks them
//! against a query and context so the engine can attach the most relevant
//! instruction bodies to an agent prompt.

mod index;
mod loader;
mod matcher;
mod registry;
mod trigger;

pub use index::{DEFAULT_SKILL_WEIGHT, SYNTHESIZED_WEIGHT, SkillIndex};
pub use loader::{SkillFrontmatter, SkillLoader, TriggerFrontmatter};
pub use matcher::{MatchContext, MatchReason, MatchResult, SCORE_CUTOFF, SkillMatcher};
pub use registry::SkillRegistry;
pub use trigger::{DEFAULT_TRIGGER_WEIGHT, Trigger, TriggerHit};

pub(crate) use loader::split_frontmatter;
