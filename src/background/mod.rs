//! Background agent manager: long-lived, concurrently running worker
//! agents.
//!
//! Each spawned agent runs on its own tokio task. The manager's shared map
//! sits behind a reader-writer lock; reads (`status`, `list`, `output`)
//! take the read side, spawn and state transitions take the write side.
//! Output buffers carry their own mutex so readers never contend with the
//! manager lock.
//!
//! Lifecycle: `pending -> running -> {completed, failed, cancelled}`;
//! terminal states are immutable. A cancelled agent's buffer stays
//! readable until `cleanup` or process exit.

mod buffer;

pub use buffer::{OutputBuffer, OutputQuery};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agents::ModelTier;
use crate::budget::decimal_to_f64;
use crate::config::{LimitsConfig, ModelTierMap};
use crate::engine::{Runtime, RuntimeRequest, select_runtime};

/// Lifecycle states of a background agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentLifecycle {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl AgentLifecycle {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentLifecycle::Completed | AgentLifecycle::Failed | AgentLifecycle::Cancelled
        )
    }
}

/// Resource caps applied to one agent.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    pub max_wall: Duration,
    pub max_output_bytes: usize,
}

impl ResourceLimits {
    fn from_config(config: &LimitsConfig) -> Self {
        Self {
            max_wall: Duration::from_secs(config.max_wall_secs),
            max_output_bytes: config.max_output_bytes,
        }
    }
}

/// Spawn parameters.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub task: String,
    pub agent: String,
    pub tier: ModelTier,
    pub session: String,
    /// Override the configured wall-clock cap, seconds.
    pub max_wall_secs: Option<u64>,
}

impl SpawnRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            agent: "dev".to_string(),
            tier: ModelTier::Fast,
            session: "default".to_string(),
            max_wall_secs: None,
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }
}

/// Point-in-time view of one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub task: String,
    pub agent: String,
    pub session: String,
    pub state: AgentLifecycle,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub bytes_produced: usize,
    pub cost_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct AgentState {
    lifecycle: AgentLifecycle,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    cost_usd: f64,
    error: Option<String>,
}

struct BackgroundAgent {
    id: String,
    task: String,
    agent: String,
    session: String,
    state: Mutex<AgentState>,
    buffer: OutputBuffer,
    cancel: CancellationToken,
}

impl BackgroundAgent {
    /// Move to a new lifecycle state. Terminal states win: once reached,
    /// later transitions are ignored.
    fn transition(&self, next: AgentLifecycle, error: Option<String>, cost: Option<f64>) {
        let mut state = self.state.lock().expect("agent state poisoned");
        if state.lifecycle.is_terminal() {
            return;
        }
        match next {
            AgentLifecycle::Running => state.start_time = Some(Utc::now()),
            _ if next.is_terminal() => state.end_time = Some(Utc::now()),
            _ => {}
        }
        state.lifecycle = next;
        if error.is_some() {
            state.error = error;
        }
        if let Some(cost) = cost {
            state.cost_usd += cost;
        }
    }

    fn summary(&self) -> AgentSummary {
        let state = self.state.lock().expect("agent state poisoned");
        AgentSummary {
            agent_id: self.id.clone(),
            task: self.task.clone(),
            agent: self.agent.clone(),
            session: self.session.clone(),
            state: state.lifecycle,
            start_time: state.start_time,
            end_time: state.end_time,
            bytes_produced: self.buffer.len(),
            cost_usd: state.cost_usd,
            error: state.error.clone(),
        }
    }

    fn lifecycle(&self) -> AgentLifecycle {
        self.state.lock().expect("agent state poisoned").lifecycle
    }
}

/// Manages the set of live background agents.
pub struct BackgroundManager {
    agents: Arc<RwLock<HashMap<String, Arc<BackgroundAgent>>>>,
    runtimes: Vec<Arc<dyn Runtime>>,
    limits: LimitsConfig,
    models: ModelTierMap,
    allow_cross_family: bool,
}

impl BackgroundManager {
    pub fn new(
        runtimes: Vec<Arc<dyn Runtime>>,
        limits: LimitsConfig,
        models: ModelTierMap,
        allow_cross_family: bool,
    ) -> Self {
        Self {
            agents: Arc::new(RwLock::new(HashMap::new())),
            runtimes,
            limits,
            models,
            allow_cross_family,
        }
    }

    /// Create an agent, enqueue its worker task, and return immediately.
    ///
    /// Spawn is refused when the session already runs the configured
    /// maximum of live agents.
    pub async fn spawn(&self, request: SpawnRequest) -> crate::Result<String> {
        {
            let agents = self.agents.read().await;
            let live = agents
                .values()
                .filter(|a| a.session == request.session && !a.lifecycle().is_terminal())
                .count();
            if live >= self.limits.max_agents_per_session {
                return Err(crate::Error::invalid(format!(
                    "session '{}' already runs {} agents (limit {})",
                    request.session, live, self.limits.max_agents_per_session
                )));
            }
        }

        let id = Uuid::new_v4().to_string();
        let limits = ResourceLimits {
            max_wall: request
                .max_wall_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| ResourceLimits::from_config(&self.limits).max_wall),
            max_output_bytes: self.limits.max_output_bytes,
        };

        let agent = Arc::new(BackgroundAgent {
            id: id.clone(),
            task: request.task.clone(),
            agent: request.agent.clone(),
            session: request.session.clone(),
            state: Mutex::new(AgentState {
                lifecycle: AgentLifecycle::Pending,
                start_time: None,
                end_time: None,
                cost_usd: 0.0,
                error: None,
            }),
            buffer: OutputBuffer::new(limits.max_output_bytes),
            cancel: CancellationToken::new(),
        });

        {
            let mut agents = self.agents.write().await;
            agents.insert(id.clone(), Arc::clone(&agent));
        }

        let runtime = select_runtime(&self.runtimes, None, self.allow_cross_family)?;
        let model = self.models.resolve(request.tier).to_string();
        tokio::spawn(run_worker(agent, runtime, model, limits));

        tracing::debug!(agent_id = %id, agent = %request.agent, "background agent spawned");
        Ok(id)
    }

    /// Current state of one agent.
    pub async fn status(&self, agent_id: &str) -> crate::Result<AgentSummary> {
        let agents = self.agents.read().await;
        agents
            .get(agent_id)
            .map(|a| a.summary())
            .ok_or_else(|| crate::Error::not_found(format!("agent '{}'", agent_id)))
    }

    /// Buffered output, optionally filtered and tailed. Safe to call while
    /// the agent is running.
    pub async fn output(&self, agent_id: &str, query: &OutputQuery) -> crate::Result<String> {
        let agents = self.agents.read().await;
        let agent = agents
            .get(agent_id)
            .ok_or_else(|| crate::Error::not_found(format!("agent '{}'", agent_id)))?;
        agent.buffer.read(query)
    }

    /// Signal cooperative cancellation.
    pub async fn cancel(&self, agent_id: &str) -> crate::Result<()> {
        let agents = self.agents.read().await;
        let agent = agents
            .get(agent_id)
            .ok_or_else(|| crate::Error::not_found(format!("agent '{}'", agent_id)))?;

        if agent.lifecycle().is_terminal() {
            return Err(crate::Error::invalid(format!(
                "agent '{}' already finished",
                agent_id
            )));
        }
        agent.cancel.cancel();
        Ok(())
    }

    /// Summaries of all agents, optionally restricted to one session.
    pub async fn list(&self, session: Option<&str>) -> Vec<AgentSummary> {
        let agents = self.agents.read().await;
        let mut summaries: Vec<AgentSummary> = agents
            .values()
            .filter(|a| session.is_none_or(|s| a.session == s))
            .map(|a| a.summary())
            .collect();
        summaries.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        summaries
    }

    /// Cancel every live agent owned by a session and free their buffers.
    pub async fn cleanup(&self, session: &str) -> usize {
        let mut agents = self.agents.write().await;
        let ids: Vec<String> = agents
            .values()
            .filter(|a| a.session == session)
            .map(|a| a.id.clone())
            .collect();

        for id in &ids {
            if let Some(agent) = agents.get(id) {
                agent.cancel.cancel();
                agent.transition(AgentLifecycle::Cancelled, None, None);
            }
            agents.remove(id);
        }
        ids.len()
    }

    /// Live (non-terminal) agent count across all sessions.
    pub async fn live_count(&self) -> usize {
        let agents = self.agents.read().await;
        agents
            .values()
            .filter(|a| !a.lifecycle().is_terminal())
            .count()
    }
}

/// Worker body: one runtime call with wall-clock and cancellation guards.
async fn run_worker(
    agent: Arc<BackgroundAgent>,
    runtime: Arc<dyn Runtime>,
    model: String,
    limits: ResourceLimits,
) {
    agent.transition(AgentLifecycle::Running, None, None);

    let mut request = RuntimeRequest::new(agent.task.clone(), model);
    request.agent = agent.agent.clone();
    request.session = agent.session.clone();
    request.cancel = agent.cancel.child_token();

    tokio::select! {
        result = runtime.execute(&request) => match result {
            Ok(result) => {
                let cost = result
                    .cost_usd
                    .map(decimal_to_f64)
                    .unwrap_or_default();
                match agent.buffer.append(&result.output) {
                    Ok(()) => {
                        agent.transition(AgentLifecycle::Completed, None, Some(cost));
                    }
                    Err(err) => {
                        agent.transition(
                            AgentLifecycle::Failed,
                            Some(err.to_string()),
                            Some(cost),
                        );
                    }
                }
            }
            Err(err) => {
                let state = if matches!(err, crate::Error::Cancelled(_)) {
                    AgentLifecycle::Cancelled
                } else {
                    AgentLifecycle::Failed
                };
                agent.transition(state, Some(err.to_string()), None);
            }
        },
        _ = agent.cancel.cancelled() => {
            agent.transition(AgentLifecycle::Cancelled, None, None);
        }
        _ = tokio::time::sleep(limits.max_wall) => {
            let err = crate::Error::TimeLimit {
                limit_secs: limits.max_wall.as_secs(),
                context: format!("background agent '{}'", agent.id),
            };
            agent.cancel.cancel();
            agent.transition(AgentLifecycle::Failed, Some(err.to_string()), None);
        }
    }
}
