//! Core configuration.
//!
//! A [`CoreConfig`] is assembled by the embedding binary (flag parsing is the
//! host's concern) and handed to [`crate::CoreServer::new`]. Environment
//! overrides cover the runtime-selection knobs that operators most often
//! tune; everything else is plain struct configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default directory holding the project-local spec tree.
pub const DEFAULT_SPEC_DIR: &str = ".overseer";

/// Default grace window for cooperative cancellation and shutdown drain.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// Top-level configuration for the orchestration core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Project root the spec tree lives under.
    pub project_root: PathBuf,
    /// Name of the spec directory inside the project root.
    pub spec_dir: String,
    /// Execution-engine knobs.
    pub engine: EngineConfig,
    /// Background-agent resource caps.
    pub limits: LimitsConfig,
    /// Tier label to concrete model id mapping.
    pub models: ModelTierMap,
    /// Directories scanned for plugin bundles.
    pub plugin_dirs: Vec<PathBuf>,
    /// Directories scanned for skill files.
    pub skill_dirs: Vec<PathBuf>,
    /// Directories scanned for agent descriptors.
    pub agent_dirs: Vec<PathBuf>,
}

impl CoreConfig {
    /// Configuration rooted at the given project directory, all defaults.
    pub fn for_project(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let spec_root = root.join(DEFAULT_SPEC_DIR);
        Self {
            project_root: root,
            spec_dir: DEFAULT_SPEC_DIR.to_string(),
            engine: EngineConfig::default(),
            limits: LimitsConfig::default(),
            models: ModelTierMap::default(),
            plugin_dirs: vec![spec_root.join("plugins")],
            skill_dirs: vec![spec_root.join("skills")],
            agent_dirs: vec![spec_root.join("agents")],
        }
    }

    /// Absolute path of the spec directory.
    pub fn spec_root(&self) -> PathBuf {
        self.project_root.join(&self.spec_dir)
    }

    /// Path of the embedded registry database.
    pub fn registry_db_path(&self) -> PathBuf {
        self.spec_root().join("registry.db")
    }

    pub fn with_spec_dir(mut self, dir: impl Into<String>) -> Self {
        self.spec_dir = dir.into();
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }
}

/// Execution-engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Runtime fallback order, most preferred first. Entries are runtime
    /// names: `host`, `cli`, or a subprocess binary (`opencode`,
    /// `claude-code`).
    pub runtime_order: Vec<String>,
    /// Whether fallback may cross runtime families (subprocess to cli, or
    /// either to host).
    pub allow_cross_family: bool,
    /// Bounded worker pool size for parallel strategy wavefronts.
    pub max_parallel: usize,
    /// Retry attempts for retryable runtime failures.
    pub retry_attempts: u32,
    /// Initial retry backoff delay.
    pub retry_initial: Duration,
    /// Backoff ceiling.
    pub retry_max: Duration,
    /// Grace window between terminate and kill on cancellation.
    pub cancel_grace: Duration,
    /// Default per-session budget in USD; `None` means unlimited.
    pub default_budget_usd: Option<f64>,
    /// Output-token ceiling used for projected-cost estimates.
    pub max_output_tokens: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            runtime_order: vec![
                "opencode".to_string(),
                "claude-code".to_string(),
                "cli".to_string(),
            ],
            allow_cross_family: false,
            max_parallel: 4,
            retry_attempts: 3,
            retry_initial: Duration::from_millis(200),
            retry_max: Duration::from_secs(10),
            cancel_grace: DEFAULT_GRACE,
            default_budget_usd: None,
            max_output_tokens: 8_192,
        }
    }
}

impl EngineConfig {
    /// Apply environment overrides (`OVERSEER_RUNTIME` holds a
    /// comma-separated runtime order).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(order) = std::env::var("OVERSEER_RUNTIME") {
            let parsed: Vec<String> = order
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.runtime_order = parsed;
            }
        }
        config
    }
}

/// Resource caps for background agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Wall-clock cap per agent, seconds.
    pub max_wall_secs: u64,
    /// Output buffer cap per agent, bytes.
    pub max_output_bytes: usize,
    /// Live agents allowed per session.
    pub max_agents_per_session: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_wall_secs: 600,
            max_output_bytes: 4 * 1024 * 1024,
            max_agents_per_session: 8,
        }
    }
}

/// Maps the opaque tier labels to concrete model ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTierMap {
    pub fast: String,
    pub main: String,
    pub heavy: String,
}

impl Default for ModelTierMap {
    fn default() -> Self {
        Self {
            fast: "claude-3-5-haiku".to_string(),
            main: "claude-sonnet-4-5".to_string(),
            heavy: "claude-opus-4-5".to_string(),
        }
    }
}

impl ModelTierMap {
    pub fn resolve(&self, tier: crate::agents::ModelTier) -> &str {
        match tier {
            crate::agents::ModelTier::Fast => &self.fast,
            crate::agents::ModelTier::Main => &self.main,
            crate::agents::ModelTier::Heavy => &self.heavy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_project_paths() {
        let config = CoreConfig::for_project("/tmp/proj");
        assert_eq!(config.spec_root(), PathBuf::from("/tmp/proj/.overseer"));
        assert_eq!(
            config.registry_db_path(),
            PathBuf::from("/tmp/proj/.overseer/registry.db")
        );
    }

    #[test]
    fn test_tier_resolution() {
        let map = ModelTierMap::default();
        assert!(map.resolve(crate::agents::ModelTier::Fast).contains("haiku"));
        assert!(map.resolve(crate::agents::ModelTier::Heavy).contains("opus"));
    }

    #[test]
    fn test_engine_defaults() {
        let engine = EngineConfig::default();
        assert_eq!(engine.runtime_order[0], "opencode");
        assert!(!engine.allow_cross_family);
        assert_eq!(engine.max_parallel, 4);
        assert_eq!(engine.retry_attempts, 3);
    }
}
