//! Background agent lifecycle scenarios.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use overseer::background::{BackgroundManager, SpawnRequest};
use overseer::config::{LimitsConfig, ModelTierMap};
use overseer::engine::{Runtime, RuntimeKind, RuntimeRequest, RuntimeResult};
use overseer::{AgentLifecycle, OutputQuery};

/// Streams a fixed body after a delay, or hangs until cancelled.
struct TimedRuntime {
    delay: Duration,
    body: String,
}

#[async_trait]
impl Runtime for TimedRuntime {
    fn name(&self) -> &str {
        "timed"
    }
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Host
    }
    fn is_available(&self) -> bool {
        true
    }
    async fn execute(&self, request: &RuntimeRequest) -> overseer::Result<RuntimeResult> {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {}
            _ = request.cancel.cancelled() => {
                return Err(overseer::Error::cancelled("timed runtime"));
            }
        }
        Ok(RuntimeResult {
            output: self.body.clone(),
            tokens_in: 5,
            tokens_out: 10,
            cost_usd: None,
        })
    }
}

fn manager(delay: Duration, body: &str) -> BackgroundManager {
    BackgroundManager::new(
        vec![Arc::new(TimedRuntime {
            delay,
            body: body.to_string(),
        })],
        LimitsConfig::default(),
        ModelTierMap::default(),
        false,
    )
}

async fn wait_terminal(manager: &BackgroundManager, id: &str) -> overseer::AgentSummary {
    for _ in 0..400 {
        let summary = manager.status(id).await.unwrap();
        if summary.state.is_terminal() {
            return summary;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("agent never reached a terminal state");
}

#[tokio::test]
async fn spawn_kill_lifecycle() {
    // S6: spawn returns immediately; status is pending or running; after
    // kill the agent lands in cancelled and its output stays readable.
    let manager = manager(Duration::from_secs(30), "never emitted");
    let id = manager
        .spawn(SpawnRequest::new("long analysis"))
        .await
        .unwrap();

    let summary = manager.status(&id).await.unwrap();
    assert!(matches!(
        summary.state,
        AgentLifecycle::Pending | AgentLifecycle::Running
    ));

    manager.cancel(&id).await.unwrap();
    let summary = wait_terminal(&manager, &id).await;
    assert_eq!(summary.state, AgentLifecycle::Cancelled);

    // The buffer survives cancellation.
    let output = manager.output(&id, &OutputQuery::default()).await.unwrap();
    assert_eq!(output, "");
}

#[tokio::test]
async fn output_grows_monotonically() {
    let manager = manager(Duration::from_millis(20), "line 1\nline 2\nline 3");
    let id = manager.spawn(SpawnRequest::new("emit")).await.unwrap();

    let early = manager.output(&id, &OutputQuery::default()).await.unwrap();
    wait_terminal(&manager, &id).await;
    let late = manager.output(&id, &OutputQuery::default()).await.unwrap();

    assert!(late.starts_with(&early));
    assert!(late.contains("line 3"));
}

#[tokio::test]
async fn filtered_output_with_no_matches_is_empty_not_error() {
    let manager = manager(Duration::from_millis(10), "hello world");
    let id = manager.spawn(SpawnRequest::new("emit")).await.unwrap();
    wait_terminal(&manager, &id).await;

    let output = manager
        .output(
            &id,
            &OutputQuery {
                filter: Some("^ERROR".to_string()),
                tail: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(output, "");
}

#[tokio::test]
async fn tail_returns_last_lines() {
    let manager = manager(Duration::from_millis(10), "a\nb\nc\nd");
    let id = manager.spawn(SpawnRequest::new("emit")).await.unwrap();
    wait_terminal(&manager, &id).await;

    let output = manager
        .output(
            &id,
            &OutputQuery {
                filter: None,
                tail: Some(2),
            },
        )
        .await
        .unwrap();
    assert_eq!(output, "c\nd");
}

#[tokio::test]
async fn cleanup_cancels_and_frees_session_agents() {
    let manager = manager(Duration::from_secs(30), "never");
    let a = manager
        .spawn(SpawnRequest::new("one").with_session("sess"))
        .await
        .unwrap();
    let b = manager
        .spawn(SpawnRequest::new("two").with_session("sess"))
        .await
        .unwrap();
    let other = manager
        .spawn(SpawnRequest::new("keep").with_session("other"))
        .await
        .unwrap();

    assert_eq!(manager.cleanup("sess").await, 2);
    assert!(manager.status(&a).await.is_err());
    assert!(manager.status(&b).await.is_err());
    assert!(manager.status(&other).await.is_ok());
}

#[tokio::test]
async fn completed_agent_reports_timings_and_bytes() {
    let manager = manager(Duration::from_millis(10), "final result");
    let id = manager.spawn(SpawnRequest::new("quick")).await.unwrap();

    let summary = wait_terminal(&manager, &id).await;
    assert_eq!(summary.state, AgentLifecycle::Completed);
    assert!(summary.start_time.is_some());
    assert!(summary.end_time.is_some());
    assert_eq!(summary.bytes_produced, "final result".len());
    assert!(summary.error.is_none());
}
