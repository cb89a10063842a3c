//! Execution engine: runtime dispatch, strategy composition, budget
//! enforcement, and interrupt delivery.
//!
//! The engine owns the live execution records and the background manager;
//! it references the agent and skill registries read-only to compose
//! prompts. No locks are held across runtime calls.

mod request;
mod retry;
mod runtime;
mod strategy;
mod subprocess;

pub use request::{
    ExecutionOutcome, ExecutionRecord, ExecutionRequest, ExecutionStatus, ParallelTask,
    RuntimeKind, RuntimeRequest, RuntimeResult, StepOutcome, StepSpec, StepStatus, Strategy,
};
pub use retry::RetryPolicy;
pub use runtime::{CliRuntime, HostRuntime, Runtime, build_runtimes, select_runtime};
pub use strategy::{StepRunner, run_parallel, run_sequential, validate_dag};
pub use subprocess::SubprocessRuntime;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agents::AgentRegistry;
use crate::background::BackgroundManager;
use crate::budget::{BudgetBook, OnExceed, PricingTable, SessionBudgetSummary, decimal_to_f64};
use crate::config::CoreConfig;
use crate::skills::SkillRegistry;

/// How many matcher-selected skills join the agent's declared set.
const MATCHED_SKILL_LIMIT: usize = 2;

pub struct ExecutionEngine {
    config: crate::config::EngineConfig,
    models: crate::config::ModelTierMap,
    runtimes: Vec<Arc<dyn Runtime>>,
    budgets: BudgetBook,
    pricing: &'static PricingTable,
    records: DashMap<String, ExecutionRecord>,
    interrupts: DashMap<String, CancellationToken>,
    pool: Arc<Semaphore>,
    retry: RetryPolicy,
    agents: Arc<RwLock<AgentRegistry>>,
    skills: Arc<RwLock<SkillRegistry>>,
    background: Arc<BackgroundManager>,
}

impl ExecutionEngine {
    pub fn new(
        config: &CoreConfig,
        agents: Arc<RwLock<AgentRegistry>>,
        skills: Arc<RwLock<SkillRegistry>>,
    ) -> Self {
        let runtimes = build_runtimes(&config.engine);
        Self::with_runtimes(config, agents, skills, runtimes)
    }

    /// Construction seam for tests and embedders with custom backends.
    pub fn with_runtimes(
        config: &CoreConfig,
        agents: Arc<RwLock<AgentRegistry>>,
        skills: Arc<RwLock<SkillRegistry>>,
        runtimes: Vec<Arc<dyn Runtime>>,
    ) -> Self {
        let engine_config = config.engine.clone();
        let budgets = BudgetBook::new(engine_config.default_budget_usd);
        let background = Arc::new(BackgroundManager::new(
            runtimes.clone(),
            config.limits.clone(),
            config.models.clone(),
            engine_config.allow_cross_family,
        ));

        Self {
            retry: RetryPolicy::new(
                engine_config.retry_attempts,
                engine_config.retry_initial,
                engine_config.retry_max,
            ),
            pool: Arc::new(Semaphore::new(engine_config.max_parallel.max(1))),
            models: config.models.clone(),
            config: engine_config,
            runtimes,
            budgets,
            pricing: crate::budget::global_pricing_table(),
            records: DashMap::new(),
            interrupts: DashMap::new(),
            agents,
            skills,
            background,
        }
    }

    pub fn background(&self) -> &Arc<BackgroundManager> {
        &self.background
    }

    pub fn budgets(&self) -> &BudgetBook {
        &self.budgets
    }

    /// Execute a request to completion and return the outcome.
    ///
    /// A record is registered up front so `engine_status` and
    /// `engine_interrupt` can observe the run while it is in flight.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        let execution_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        self.interrupts
            .insert(execution_id.clone(), cancel.clone());

        if let Some(budget) = request.budget_usd {
            self.budgets.set_budget(&request.session, budget);
        }

        let agent_name = request
            .agent
            .clone()
            .unwrap_or_else(|| "dev".to_string());
        self.records.insert(
            execution_id.clone(),
            ExecutionRecord {
                execution_id: execution_id.clone(),
                task_description: request.task.clone(),
                agent: agent_name.clone(),
                strategy: strategy_label(&request.strategy).to_string(),
                runtime: request.runtime.clone(),
                status: ExecutionStatus::Running,
                start_time: Utc::now(),
                end_time: None,
                cost_usd: 0.0,
                tokens_in: 0,
                tokens_out: 0,
                error: None,
            },
        );

        let steps = self
            .run_strategy(&request, &agent_name, &execution_id, &cancel)
            .await;
        let outcome = self.finish(&execution_id, steps, &cancel);
        self.interrupts.remove(&execution_id);
        outcome
    }

    async fn run_strategy(
        &self,
        request: &ExecutionRequest,
        agent_name: &str,
        execution_id: &str,
        cancel: &CancellationToken,
    ) -> Vec<StepOutcome> {
        let runner = self.step_runner(request, execution_id);

        match &request.strategy {
            Strategy::Single => {
                let outcome = match runner(
                    agent_name.to_string(),
                    request.task.clone(),
                    None,
                    cancel.child_token(),
                )
                .await
                {
                    Ok(output) => StepOutcome {
                        id: "step-1".to_string(),
                        agent: agent_name.to_string(),
                        status: StepStatus::Succeeded,
                        output: Some(output),
                        error: None,
                    },
                    Err(err) => StepOutcome {
                        id: "step-1".to_string(),
                        agent: agent_name.to_string(),
                        status: if matches!(err, crate::Error::Cancelled(_)) {
                            StepStatus::Cancelled
                        } else {
                            StepStatus::Failed
                        },
                        output: None,
                        error: Some(err.to_string()),
                    },
                };
                vec![outcome]
            }
            Strategy::Multi { steps } => {
                run_sequential(steps, runner, cancel.clone()).await
            }
            Strategy::Parallel { tasks } => {
                match run_parallel(tasks, Arc::clone(&self.pool), runner, cancel.clone()).await {
                    Ok(outcomes) => outcomes,
                    Err(err) => vec![StepOutcome {
                        id: "dag".to_string(),
                        agent: agent_name.to_string(),
                        status: StepStatus::Failed,
                        output: None,
                        error: Some(err.to_string()),
                    }],
                }
            }
        }
    }

    /// Build the closure strategies use for one agent call.
    fn step_runner<'a>(&'a self, request: &ExecutionRequest, execution_id: &str) -> StepRunner<'a> {
        let session = request.session.clone();
        let runtime_pref = request.runtime.clone();
        let record_key = execution_id.to_string();

        Arc::new(move |agent, task, context, cancel| {
            let session = session.clone();
            let runtime_pref = runtime_pref.clone();
            let record_key = record_key.clone();
            Box::pin(async move {
                self.run_agent_call(
                    &agent,
                    &task,
                    context,
                    &session,
                    runtime_pref.as_deref(),
                    cancel,
                    &record_key,
                )
                .await
            })
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_agent_call(
        &self,
        agent_name: &str,
        task: &str,
        context: Option<String>,
        session: &str,
        runtime_pref: Option<&str>,
        cancel: CancellationToken,
        record_key: &str,
    ) -> crate::Result<String> {
        if cancel.is_cancelled() {
            return Err(crate::Error::cancelled("execution interrupted"));
        }

        let (prompt, model) = self.compose_prompt(agent_name, task, context).await?;

        let runtime = select_runtime(
            &self.runtimes,
            runtime_pref,
            self.config.allow_cross_family,
        )?;

        let mut runtime_request = RuntimeRequest::new(prompt, model.clone());
        runtime_request.agent = agent_name.to_string();
        runtime_request.session = session.to_string();
        runtime_request.cancel = cancel.clone();

        // One enforcement path: the tracker counts, the runtime kind picks
        // the mode (host permissive, subprocess/cli strict).
        let tracker = self.budgets.tracker(session);
        let projected = self.pricing.project_max(
            &model,
            runtime_request.estimated_tokens_in(),
            self.config.max_output_tokens,
        );
        let mode = if runtime.kind().strict_budget() {
            OnExceed::StopBeforeNext
        } else {
            OnExceed::WarnAndContinue
        };
        tracker.check_projected(
            projected,
            mode,
            &format!("projected ${} for agent '{}'", projected, agent_name),
        )?;

        let result = self
            .retry
            .run(|| {
                let runtime = Arc::clone(&runtime);
                let request = runtime_request.clone();
                async move { runtime.execute(&request).await }
            })
            .await?;

        let cost = result
            .cost_usd
            .unwrap_or_else(|| {
                self.pricing
                    .calculate(&model, result.tokens_in, result.tokens_out)
            });
        tracker.record_cost(cost);
        self.accumulate(record_key, &result, cost, runtime.name());

        Ok(result.output)
    }

    fn accumulate(&self, record_key: &str, result: &RuntimeResult, cost: Decimal, runtime: &str) {
        if let Some(mut record) = self.records.get_mut(record_key) {
            record.tokens_in += result.tokens_in;
            record.tokens_out += result.tokens_out;
            record.cost_usd += decimal_to_f64(cost);
            record.runtime.get_or_insert_with(|| runtime.to_string());
        }
    }

    /// Compose the agent prompt: role header, attached skill bodies, the
    /// task, and any handoff context. Returns the prompt and resolved model.
    async fn compose_prompt(
        &self,
        agent_name: &str,
        task: &str,
        context: Option<String>,
    ) -> crate::Result<(String, String)> {
        let agents = self.agents.read().await;
        let agent = agents
            .get(agent_name)
            .ok_or_else(|| crate::Error::not_found(format!("agent '{}'", agent_name)))?;

        let model = self.models.resolve(agent.model_tier).to_string();

        let mut prompt = format!(
            "You are the {} agent '{}'. {}\n",
            agent.role, agent.name, agent.description
        );

        let skills = self.skills.read().await;
        let mut attached: Vec<String> = Vec::new();
        for skill_name in &agent.skills {
            for skill in skills.resolve_with_dependencies(skill_name) {
                if !attached.contains(&skill.name) {
                    attached.push(skill.name.clone());
                }
            }
        }

        // Ranked selection tops up the agent's declared skills.
        let matcher = crate::skills::SkillMatcher::new();
        for result in matcher
            .match_skills(&skills, task, &crate::skills::MatchContext::default())
            .into_iter()
            .take(MATCHED_SKILL_LIMIT)
        {
            if !attached.contains(&result.skill) {
                attached.push(result.skill);
            }
        }

        for name in &attached {
            if let Some(skill) = skills.get(name)
                && !skill.body.is_empty()
            {
                prompt.push_str("\n## Skill: ");
                prompt.push_str(&skill.name);
                prompt.push('\n');
                prompt.push_str(&skill.body);
                prompt.push('\n');
            }
        }

        prompt.push_str("\n## Task\n");
        prompt.push_str(task);
        if let Some(context) = context {
            prompt.push_str("\n\n## Context from the previous step\n");
            prompt.push_str(&context);
        }

        Ok((prompt, model))
    }

    fn finish(
        &self,
        execution_id: &str,
        steps: Vec<StepOutcome>,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let cancelled =
            cancel.is_cancelled() || steps.iter().any(|s| s.status == StepStatus::Cancelled);
        let failed = steps.iter().any(|s| s.status == StepStatus::Failed);
        let status = if cancelled {
            ExecutionStatus::Cancelled
        } else if failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };

        let output = steps
            .iter()
            .filter_map(|s| s.output.as_deref())
            .collect::<Vec<_>>()
            .join("\n\n");
        let error = steps
            .iter()
            .filter_map(|s| s.error.as_deref())
            .next()
            .map(String::from);

        let (cost_usd, tokens_in, tokens_out) =
            if let Some(mut record) = self.records.get_mut(execution_id) {
                record.status = status;
                record.end_time = Some(Utc::now());
                record.error = error.clone();
                (record.cost_usd, record.tokens_in, record.tokens_out)
            } else {
                (0.0, 0, 0)
            };

        ExecutionOutcome {
            execution_id: execution_id.to_string(),
            status,
            output,
            cost_usd,
            tokens_in,
            tokens_out,
            steps,
            error,
        }
    }

    /// Snapshot of one execution record.
    pub fn status(&self, execution_id: &str) -> crate::Result<ExecutionRecord> {
        self.records
            .get(execution_id)
            .map(|r| r.clone())
            .ok_or_else(|| crate::Error::not_found(format!("execution '{}'", execution_id)))
    }

    /// All records, newest first.
    pub fn list_records(&self) -> Vec<ExecutionRecord> {
        let mut records: Vec<ExecutionRecord> =
            self.records.iter().map(|r| r.clone()).collect();
        records.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        records
    }

    /// Deliver cooperative cancellation to a live execution.
    pub fn interrupt(&self, execution_id: &str) -> crate::Result<()> {
        match self.interrupts.get(execution_id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => match self.records.get(execution_id) {
                Some(record) if record.status.is_terminal() => Err(crate::Error::invalid(
                    format!("execution '{}' already finished", execution_id),
                )),
                _ => Err(crate::Error::not_found(format!(
                    "execution '{}'",
                    execution_id
                ))),
            },
        }
    }

    pub fn budget_summary(&self) -> Vec<SessionBudgetSummary> {
        self.budgets.summary()
    }
}

fn strategy_label(strategy: &Strategy) -> &'static str {
    match strategy {
        Strategy::Single => "single",
        Strategy::Multi { .. } => "multi",
        Strategy::Parallel { .. } => "parallel",
    }
}
