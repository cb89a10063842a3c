//! Convenience re-exports for embedding hosts.
//!
//! ```rust,no_run
//! use overseer::prelude::*;
//! ```

pub use crate::{
    AgentIndex, AgentRole, BackgroundManager, CoreConfig, CoreServer, Error, ExecutionEngine,
    ExecutionRequest, ModelTier, Priority, RegistryStore, Result, SkillMatcher, SkillRegistry,
    Strategy, Task, TaskId, TaskStatus, ToolResponse,
};
