//! # overseer
//!
//! Core of an AI-agent orchestration server: the process that sits between an
//! interactive coding host and a fleet of specialized agents, skills, and
//! plugins. The host speaks a JSON tool-invocation protocol; this crate
//! answers tool calls, dispatches work onto agent runtimes, tracks
//! long-running executions, enforces budgets, and persists a project-local
//! registry of changes, tasks, and their dependency graph.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use overseer::{CoreConfig, CoreServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), overseer::Error> {
//!     let server = CoreServer::new(CoreConfig::for_project("./my-project")).await?;
//!     let response = server
//!         .dispatch("registry_next", serde_json::json!({"change_id": "add-auth", "limit": 5}))
//!         .await;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Components hold references only downward: the server owns the execution
//! engine, which owns the background manager and budget books, which consult
//! the registries and the store. Long-running work (background agents,
//! parallel strategy wavefronts) runs on independent tokio tasks with
//! cooperative cancellation.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod agents;
pub mod background;
pub mod budget;
pub mod config;
pub mod engine;
pub mod observability;
pub mod plugins;
pub mod prelude;
pub mod projection;
pub mod server;
pub mod skills;
pub mod store;
pub mod tools;
pub mod workspace;

// Re-exports for convenience
pub use agents::{AgentIndex, AgentRegistry, AgentRole, ModelTier};
pub use background::{
    AgentLifecycle, AgentSummary, BackgroundManager, OutputBuffer, OutputQuery, ResourceLimits,
};
pub use budget::{
    BudgetBook, BudgetStatus, BudgetTracker, ModelPricing, OnExceed, PricingTable,
    PricingTableBuilder,
};
pub use config::{CoreConfig, EngineConfig, LimitsConfig, ModelTierMap};
pub use engine::{
    ExecutionEngine, ExecutionOutcome, ExecutionRecord, ExecutionRequest, ExecutionStatus,
    ParallelTask, Runtime, RuntimeKind, RuntimeRequest, RuntimeResult, Strategy,
};
pub use plugins::{PluginError, PluginManager, PluginManifest, PluginState};
pub use projection::StateProjector;
pub use server::{CoreServer, ToolResponse};
pub use skills::{MatchContext, MatchResult, SkillIndex, SkillMatcher, SkillRegistry, Trigger};
pub use store::{
    Change, ChangeStatus, Priority, RegistryStore, SyncReport, Task, TaskFilter, TaskId, TaskNum,
    TaskPatch, TaskStatus,
};
pub use tools::{LazyToolRegistry, ToolHandler, ToolMeta};
pub use workspace::{ProjectManifest, SpecWorkspace};

/// Error type for all orchestration operations.
///
/// Every variant carries a stable machine-readable code (see [`Error::code`])
/// that handlers embed in structured tool responses.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Resource missing.
    #[error("{0} not found")]
    NotFound(String),

    /// Idempotency violation on a create-only operation.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Malformed input, schema violation, or bad identifier shape.
    #[error("Invalid input: {0}")]
    Invalid(String),

    /// Dependency insertion would form a cycle.
    #[error("Dependency cycle: {0}")]
    CycleDetected(String),

    /// Enable or install refused due to a name clash.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Underlying file-system or subprocess refusal.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Cumulative or per-call budget exhausted.
    #[error("Budget exceeded: ${used:.4} used of ${limit:.4} limit ({context})")]
    BudgetExceeded {
        used: f64,
        limit: f64,
        context: String,
    },

    /// Background-agent wall-clock cap hit.
    #[error("Wall-clock limit exceeded after {limit_secs}s: {context}")]
    TimeLimit { limit_secs: u64, context: String },

    /// Background-agent output cap hit.
    #[error("Output limit exceeded: {produced} bytes against a {limit} byte cap")]
    OutputLimit { produced: usize, limit: usize },

    /// Cooperative cancellation.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Preferred runtime cannot be invoked; triggers fallback.
    #[error("Runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Wrapped upstream error (network, subprocess, storage).
    #[error("External error: {0}")]
    External(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Process exit codes for embedding binaries.
pub mod exit {
    pub const SUCCESS: i32 = 0;
    pub const ERROR: i32 = 1;
    pub const USAGE: i32 = 2;
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Error::Invalid(message.into())
    }

    pub fn external(message: impl Into<String>) -> Self {
        Error::External(message.into())
    }

    pub fn cancelled(context: impl Into<String>) -> Self {
        Error::Cancelled(context.into())
    }

    /// Stable code string embedded in structured tool responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::AlreadyExists(_) => "already_exists",
            Error::Invalid(_) => "invalid",
            Error::CycleDetected(_) => "cycle_detected",
            Error::Conflict(_) => "conflict",
            Error::PermissionDenied(_) => "permission_denied",
            Error::BudgetExceeded { .. } => "budget_exceeded",
            Error::TimeLimit { .. } => "time_limit",
            Error::OutputLimit { .. } => "output_limit",
            Error::Cancelled(_) => "cancelled",
            Error::RuntimeUnavailable(_) => "runtime_unavailable",
            Error::External(_) => "external",
        }
    }

    /// Whether a retry policy may re-attempt the failed operation.
    ///
    /// Only wrapped upstream failures qualify. Budget errors, cancellations,
    /// and validation failures are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::External(_) | Error::RuntimeUnavailable(_))
    }

    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            Error::BudgetExceeded { .. } | Error::TimeLimit { .. } | Error::OutputLimit { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(err.to_string()),
            _ => Error::External(format!("io: {}", err)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Invalid(format!("json: {}", err))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("row".to_string()),
            other => Error::External(format!("store: {}", other)),
        }
    }
}

impl From<serde_yaml_bw::Error> for Error {
    fn from(err: serde_yaml_bw::Error) -> Self {
        Error::Invalid(format!("yaml: {}", err))
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Invalid(format!("regex: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::not_found("task").code(), "not_found");
        assert_eq!(
            Error::CycleDetected("a -> b -> a".into()).code(),
            "cycle_detected"
        );
        assert_eq!(
            Error::BudgetExceeded {
                used: 1.5,
                limit: 1.0,
                context: "session s1".into()
            }
            .code(),
            "budget_exceeded"
        );
        assert_eq!(Error::Cancelled("interrupt".into()).code(), "cancelled");
    }

    #[test]
    fn test_retry_classification() {
        assert!(Error::external("connection reset").is_retryable());
        assert!(Error::RuntimeUnavailable("binary missing".into()).is_retryable());
        assert!(!Error::Cancelled("user".into()).is_retryable());
        assert!(!Error::CycleDetected("c".into()).is_retryable());
        assert!(
            !Error::BudgetExceeded {
                used: 2.0,
                limit: 1.0,
                context: "call".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_io_error_mapping() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert_eq!(err.code(), "not_found");

        let err: Error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.code(), "permission_denied");
    }
}
