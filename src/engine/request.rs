//! Execution request and result types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// The kind of backend a runtime represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// The calling host is the LLM driver; we hand back a structured
    /// "execute this prompt" payload.
    Host,
    /// An external AI CLI spawned as a subprocess.
    Subprocess,
    /// Render-only: produce a command for later invocation.
    Cli,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Host => "host",
            RuntimeKind::Subprocess => "subprocess",
            RuntimeKind::Cli => "cli",
        }
    }

    /// Classify a configured runtime name.
    pub fn from_name(name: &str) -> RuntimeKind {
        match name {
            "host" => RuntimeKind::Host,
            "cli" => RuntimeKind::Cli,
            _ => RuntimeKind::Subprocess,
        }
    }

    /// Budget enforcement mode: host-integrated execution is permissive,
    /// everything else is strict.
    pub fn strict_budget(&self) -> bool {
        !matches!(self, RuntimeKind::Host)
    }
}

impl FromStr for RuntimeKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "host" => Ok(RuntimeKind::Host),
            "subprocess" => Ok(RuntimeKind::Subprocess),
            "cli" => Ok(RuntimeKind::Cli),
            other => Err(crate::Error::invalid(format!(
                "unknown runtime kind '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One prompt execution handed to a runtime.
#[derive(Debug, Clone)]
pub struct RuntimeRequest {
    pub prompt: String,
    /// Concrete model id (tier already resolved).
    pub model: String,
    pub agent: String,
    pub session: String,
    pub cancel: CancellationToken,
}

impl RuntimeRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            agent: "dev".to_string(),
            session: "default".to_string(),
            cancel: CancellationToken::new(),
        }
    }

    /// Rough prompt size used for worst-case cost projection.
    pub fn estimated_tokens_in(&self) -> u64 {
        (self.prompt.len() as u64 / 4).max(1)
    }
}

/// What a runtime reports back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeResult {
    pub output: String,
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    /// Cost reported by the backend, when it reports one; otherwise the
    /// engine computes it from token counts.
    #[serde(default)]
    pub cost_usd: Option<Decimal>,
}

/// How agents combine to produce a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// One agent, one call.
    Single,
    /// Ordered handoff; each step sees the prior step's output.
    Multi { steps: Vec<StepSpec> },
    /// Dependency-ordered fan-out over a bounded worker pool.
    Parallel { tasks: Vec<ParallelTask> },
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Single
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub agent: String,
    pub task: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelTask {
    /// Sub-task id, unique within the strategy.
    pub id: String,
    pub agent: String,
    pub task: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A request accepted by the execution engine.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub task: String,
    /// Agent name; defaults to the `dev` builtin.
    pub agent: Option<String>,
    pub strategy: Strategy,
    /// Preferred runtime name; `None` uses the configured order.
    pub runtime: Option<String>,
    /// Per-request budget override in USD.
    pub budget_usd: Option<f64>,
    pub session: String,
}

impl ExecutionRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            agent: None,
            strategy: Strategy::Single,
            runtime: None,
            budget_usd: None,
            session: "default".to_string(),
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }

    pub fn with_budget(mut self, budget_usd: f64) -> Self {
        self.budget_usd = Some(budget_usd);
        self
    }
}

/// Lifecycle of an execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Persistent (process-lifetime) record of one execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub task_description: String,
    pub agent: String,
    pub strategy: String,
    pub runtime: Option<String>,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub cost_usd: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub error: Option<String>,
}

/// Per-sub-task outcome inside a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub id: String,
    pub agent: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final result of an execution request.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub execution_id: String,
    pub status: ExecutionStatus,
    /// Merged output; per-branch order is preserved for parallel runs.
    pub output: String,
    pub cost_usd: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub steps: Vec<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_kind_classification() {
        assert_eq!(RuntimeKind::from_name("host"), RuntimeKind::Host);
        assert_eq!(RuntimeKind::from_name("cli"), RuntimeKind::Cli);
        assert_eq!(RuntimeKind::from_name("opencode"), RuntimeKind::Subprocess);
        assert_eq!(
            RuntimeKind::from_name("claude-code"),
            RuntimeKind::Subprocess
        );
    }

    #[test]
    fn test_budget_mode_by_kind() {
        assert!(!RuntimeKind::Host.strict_budget());
        assert!(RuntimeKind::Subprocess.strict_budget());
        assert!(RuntimeKind::Cli.strict_budget());
    }

    #[test]
    fn test_estimated_tokens_floor() {
        let request = RuntimeRequest::new("hi", "claude-sonnet-4-5");
        assert_eq!(request.estimated_tokens_in(), 1);

        let request = RuntimeRequest::new("a".repeat(4_000), "claude-sonnet-4-5");
        assert_eq!(request.estimated_tokens_in(), 1_000);
    }

    #[test]
    fn test_strategy_serde_tagging() {
        let strategy = Strategy::Parallel {
            tasks: vec![ParallelTask {
                id: "a".into(),
                agent: "dev".into(),
                task: "Do A".into(),
                depends_on: vec![],
            }],
        };
        let value = serde_json::to_value(&strategy).unwrap();
        assert_eq!(value["kind"], "parallel");
    }
}
