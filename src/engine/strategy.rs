//! Execution strategies: sequential handoff and dependency-ordered
//! parallel fan-out.
//!
//! Strategies are pure orchestration: the engine supplies a step runner
//! that performs one agent call, and the functions here decide ordering,
//! concurrency, and failure propagation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::request::{ParallelTask, StepOutcome, StepSpec, StepStatus};

/// Executes one `(agent, task)` pair. `context` carries the prior step's
/// output for sequential handoff. The lifetime lets the engine hand in a
/// closure borrowing itself; strategies never outlive their caller.
pub type StepRunner<'a> = Arc<
    dyn Fn(String, String, Option<String>, CancellationToken) -> BoxFuture<'a, crate::Result<String>>
        + Send
        + Sync
        + 'a,
>;

/// Run an ordered multi-agent handoff.
///
/// Each step sees the previous step's output as context. A failing step
/// aborts the remainder; partial outputs are preserved in the outcome list.
pub async fn run_sequential<'a>(
    steps: &[StepSpec],
    runner: StepRunner<'a>,
    cancel: CancellationToken,
) -> Vec<StepOutcome> {
    let mut outcomes = Vec::with_capacity(steps.len());
    let mut context: Option<String> = None;
    let mut aborted = false;

    for (idx, step) in steps.iter().enumerate() {
        if aborted || cancel.is_cancelled() {
            outcomes.push(StepOutcome {
                id: format!("step-{}", idx + 1),
                agent: step.agent.clone(),
                status: if cancel.is_cancelled() {
                    StepStatus::Cancelled
                } else {
                    StepStatus::Skipped
                },
                output: None,
                error: None,
            });
            continue;
        }

        match runner(
            step.agent.clone(),
            step.task.clone(),
            context.clone(),
            cancel.child_token(),
        )
        .await
        {
            Ok(output) => {
                context = Some(output.clone());
                outcomes.push(StepOutcome {
                    id: format!("step-{}", idx + 1),
                    agent: step.agent.clone(),
                    status: StepStatus::Succeeded,
                    output: Some(output),
                    error: None,
                });
            }
            Err(err) => {
                aborted = true;
                outcomes.push(StepOutcome {
                    id: format!("step-{}", idx + 1),
                    agent: step.agent.clone(),
                    status: if matches!(err, crate::Error::Cancelled(_)) {
                        StepStatus::Cancelled
                    } else {
                        StepStatus::Failed
                    },
                    output: None,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    outcomes
}

/// Validate the sub-task DAG with Kahn's algorithm.
///
/// Rejects duplicate ids, references to unknown ids, and cycles. Returns
/// nothing on success - wavefront execution derives its own ready sets.
pub fn validate_dag(tasks: &[ParallelTask]) -> crate::Result<()> {
    let mut ids = HashSet::new();
    for task in tasks {
        if !ids.insert(task.id.as_str()) {
            return Err(crate::Error::invalid(format!(
                "duplicate sub-task id '{}'",
                task.id
            )));
        }
    }

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in tasks {
        in_degree.entry(task.id.as_str()).or_insert(0);
        for dep in &task.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(crate::Error::invalid(format!(
                    "sub-task '{}' depends on unknown id '{}'",
                    task.id, dep
                )));
            }
            *in_degree.entry(task.id.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(task.id.as_str());
        }
    }

    let mut queue: Vec<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut processed = 0;

    while let Some(id) = queue.pop() {
        processed += 1;
        if let Some(next) = dependents.get(id) {
            for dependent in next {
                let degree = in_degree.get_mut(dependent).expect("known id");
                *degree -= 1;
                if *degree == 0 {
                    queue.push(dependent);
                }
            }
        }
    }

    if processed != tasks.len() {
        return Err(crate::Error::invalid(
            "sub-task dependencies contain a cycle".to_string(),
        ));
    }
    Ok(())
}

/// Run a parallel strategy: wavefronts of ready sub-tasks execute
/// concurrently on the bounded pool; a failure cancels in-flight siblings
/// and skips every dependent.
pub async fn run_parallel<'a>(
    tasks: &[ParallelTask],
    pool: Arc<Semaphore>,
    runner: StepRunner<'a>,
    cancel: CancellationToken,
) -> crate::Result<Vec<StepOutcome>> {
    validate_dag(tasks)?;

    let mut outcomes: HashMap<String, StepOutcome> = HashMap::new();
    let mut completed: HashSet<String> = HashSet::new();
    let mut pending: Vec<&ParallelTask> = tasks.iter().collect();
    let mut failed = false;

    while !pending.is_empty() && !failed && !cancel.is_cancelled() {
        let (ready, waiting): (Vec<&ParallelTask>, Vec<&ParallelTask>) = pending
            .into_iter()
            .partition(|t| t.depends_on.iter().all(|d| completed.contains(d)));
        pending = waiting;

        if ready.is_empty() {
            break;
        }

        let wave_cancel = cancel.child_token();
        let wave = ready.iter().map(|task| {
            let runner = Arc::clone(&runner);
            let pool = Arc::clone(&pool);
            let token = wave_cancel.clone();
            let agent = task.agent.clone();
            let prompt = task.task.clone();
            let id = task.id.clone();
            async move {
                let _permit = pool.acquire_owned().await.map_err(|_| {
                    crate::Error::cancelled("worker pool closed")
                })?;
                let result = runner(agent, prompt, None, token).await;
                Ok::<(String, crate::Result<String>), crate::Error>((id, result))
            }
        });

        let results = futures::future::join_all(wave).await;
        for entry in results {
            let (id, result) = entry?;
            let task = ready.iter().find(|t| t.id == id).expect("id from wave");
            match result {
                Ok(output) => {
                    completed.insert(id.clone());
                    outcomes.insert(
                        id.clone(),
                        StepOutcome {
                            id,
                            agent: task.agent.clone(),
                            status: StepStatus::Succeeded,
                            output: Some(output),
                            error: None,
                        },
                    );
                }
                Err(err) => {
                    failed = true;
                    wave_cancel.cancel();
                    outcomes.insert(
                        id.clone(),
                        StepOutcome {
                            id,
                            agent: task.agent.clone(),
                            status: if matches!(err, crate::Error::Cancelled(_)) {
                                StepStatus::Cancelled
                            } else {
                                StepStatus::Failed
                            },
                            output: None,
                            error: Some(err.to_string()),
                        },
                    );
                }
            }
        }
    }

    // Whatever never ran was skipped: its dependencies failed, were
    // skipped, or the run was cancelled.
    for task in tasks {
        if !outcomes.contains_key(&task.id) {
            outcomes.insert(
                task.id.clone(),
                StepOutcome {
                    id: task.id.clone(),
                    agent: task.agent.clone(),
                    status: if cancel.is_cancelled() {
                        StepStatus::Cancelled
                    } else {
                        StepStatus::Skipped
                    },
                    output: None,
                    error: None,
                },
            );
        }
    }

    // Preserve the caller's sub-task order in the merged result.
    Ok(tasks
        .iter()
        .map(|t| outcomes.remove(&t.id).expect("all ids populated"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner_ok() -> StepRunner<'static> {
        Arc::new(|agent, task, context, _cancel| {
            Box::pin(async move {
                match context {
                    Some(ctx) => Ok(format!("{}:{} (after {})", agent, task, ctx)),
                    None => Ok(format!("{}:{}", agent, task)),
                }
            })
        })
    }

    fn runner_failing_on(failing_task: &'static str) -> StepRunner<'static> {
        Arc::new(move |agent, task, _context, _cancel| {
            Box::pin(async move {
                if task == failing_task {
                    Err(crate::Error::external("boom"))
                } else {
                    Ok(format!("{}:{}", agent, task))
                }
            })
        })
    }

    fn ptask(id: &str, deps: &[&str]) -> ParallelTask {
        ParallelTask {
            id: id.to_string(),
            agent: "dev".to_string(),
            task: format!("task {}", id),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_sequential_handoff_passes_context() {
        let steps = vec![
            StepSpec {
                agent: "planner".into(),
                task: "plan".into(),
            },
            StepSpec {
                agent: "dev".into(),
                task: "build".into(),
            },
        ];

        let outcomes =
            run_sequential(&steps, runner_ok(), CancellationToken::new()).await;
        assert_eq!(outcomes[0].status, StepStatus::Succeeded);
        assert_eq!(outcomes[1].status, StepStatus::Succeeded);
        assert!(outcomes[1].output.as_ref().unwrap().contains("after planner:plan"));
    }

    #[tokio::test]
    async fn test_sequential_abort_keeps_partial_outputs() {
        let steps = vec![
            StepSpec {
                agent: "a".into(),
                task: "one".into(),
            },
            StepSpec {
                agent: "b".into(),
                task: "bad".into(),
            },
            StepSpec {
                agent: "c".into(),
                task: "three".into(),
            },
        ];

        let outcomes =
            run_sequential(&steps, runner_failing_on("bad"), CancellationToken::new()).await;
        assert_eq!(outcomes[0].status, StepStatus::Succeeded);
        assert_eq!(outcomes[1].status, StepStatus::Failed);
        assert_eq!(outcomes[2].status, StepStatus::Skipped);
        assert!(outcomes[0].output.is_some());
    }

    #[test]
    fn test_dag_validation() {
        assert!(validate_dag(&[ptask("a", &[]), ptask("b", &["a"])]).is_ok());

        let cycle = vec![ptask("a", &["b"]), ptask("b", &["a"])];
        assert!(matches!(
            validate_dag(&cycle),
            Err(crate::Error::Invalid(_))
        ));

        let unknown = vec![ptask("a", &["ghost"])];
        assert!(validate_dag(&unknown).is_err());

        let duplicate = vec![ptask("a", &[]), ptask("a", &[])];
        assert!(validate_dag(&duplicate).is_err());
    }

    #[tokio::test]
    async fn test_parallel_happy_path_preserves_order() {
        let tasks = vec![ptask("b", &[]), ptask("a", &[]), ptask("c", &["a", "b"])];
        let outcomes = run_parallel(
            &tasks,
            Arc::new(Semaphore::new(4)),
            runner_ok(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let ids: Vec<&str> = outcomes.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!(outcomes.iter().all(|o| o.status == StepStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_parallel_failure_skips_dependents() {
        // S5: A and B independent, C depends on both; B fails.
        let tasks = vec![
            ptask("A", &[]),
            ParallelTask {
                id: "B".into(),
                agent: "dev".into(),
                task: "bad".into(),
                depends_on: vec![],
            },
            ptask("C", &["A", "B"]),
        ];

        let outcomes = run_parallel(
            &tasks,
            Arc::new(Semaphore::new(4)),
            runner_failing_on("bad"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcomes[0].status, StepStatus::Succeeded);
        assert_eq!(outcomes[1].status, StepStatus::Failed);
        assert_eq!(outcomes[2].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_parallel_bounded_pool() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let live_clone = Arc::clone(&live);
        let peak_clone = Arc::clone(&peak);
        let runner: StepRunner<'static> = Arc::new(move |_, _, _, _| {
            let live = Arc::clone(&live_clone);
            let peak = Arc::clone(&peak_clone);
            Box::pin(async move {
                let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                live.fetch_sub(1, Ordering::SeqCst);
                Ok("ok".to_string())
            })
        });

        let tasks: Vec<ParallelTask> = (0..8).map(|i| ptask(&format!("t{}", i), &[])).collect();
        run_parallel(
            &tasks,
            Arc::new(Semaphore::new(2)),
            runner,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_parallel_result_independent_of_scheduling() {
        // Two independent branches finish in either order; the merged
        // outcome list is identical.
        let tasks = vec![ptask("x", &[]), ptask("y", &[])];
        let first = run_parallel(
            &tasks,
            Arc::new(Semaphore::new(1)),
            runner_ok(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let second = run_parallel(
            &tasks,
            Arc::new(Semaphore::new(2)),
            runner_ok(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let ids_first: Vec<&str> = first.iter().map(|o| o.id.as_str()).collect();
        let ids_second: Vec<&str> = second.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids_first, ids_second);
    }
}
