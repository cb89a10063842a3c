//! Runtime backends and the fallback chain.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::request::{RuntimeKind, RuntimeRequest, RuntimeResult};
use super::subprocess::SubprocessRuntime;
use crate::config::EngineConfig;

/// A backend capable of executing an agent prompt.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Configured name (`host`, `cli`, or the subprocess binary).
    fn name(&self) -> &str;

    fn kind(&self) -> RuntimeKind;

    /// Cheap availability probe; unavailable runtimes are skipped by the
    /// fallback chain.
    fn is_available(&self) -> bool;

    async fn execute(&self, request: &RuntimeRequest) -> crate::Result<RuntimeResult>;
}

/// Host-integrated runtime: the calling host is the LLM driver, so the
/// "result" is a structured instruction for the host to execute the prompt
/// itself.
pub struct HostRuntime;

#[async_trait]
impl Runtime for HostRuntime {
    fn name(&self) -> &str {
        "host"
    }

    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Host
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn execute(&self, request: &RuntimeRequest) -> crate::Result<RuntimeResult> {
        if request.cancel.is_cancelled() {
            return Err(crate::Error::cancelled("host dispatch"));
        }

        let payload = json!({
            "action": "execute_prompt",
            "agent": request.agent,
            "model": request.model,
            "prompt": request.prompt,
        });
        Ok(RuntimeResult {
            output: payload.to_string(),
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: None,
        })
    }
}

/// Render-only runtime for automation: returns the fully formed command an
/// operator (or a cron job) can run later.
pub struct CliRuntime {
    bin: String,
}

impl CliRuntime {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Default for CliRuntime {
    fn default() -> Self {
        Self::new("opencode")
    }
}

#[async_trait]
impl Runtime for CliRuntime {
    fn name(&self) -> &str {
        "cli"
    }

    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Cli
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn execute(&self, request: &RuntimeRequest) -> crate::Result<RuntimeResult> {
        if request.cancel.is_cancelled() {
            return Err(crate::Error::cancelled("cli render"));
        }

        let rendered = format!(
            "{} -p {} -f json -q",
            self.bin,
            shell_quote(&request.prompt)
        );
        Ok(RuntimeResult {
            output: rendered,
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: None,
        })
    }
}

fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// Build the ordered runtime chain from configuration.
pub fn build_runtimes(config: &EngineConfig) -> Vec<Arc<dyn Runtime>> {
    config
        .runtime_order
        .iter()
        .map(|name| match RuntimeKind::from_name(name) {
            RuntimeKind::Host => Arc::new(HostRuntime) as Arc<dyn Runtime>,
            RuntimeKind::Cli => Arc::new(CliRuntime::default()) as Arc<dyn Runtime>,
            RuntimeKind::Subprocess => {
                Arc::new(SubprocessRuntime::new(name, config.cancel_grace)) as Arc<dyn Runtime>
            }
        })
        .collect()
}

/// Pick the runtime to use, walking the fallback chain.
///
/// Fallback within the preferred runtime's family is automatic; crossing
/// into another family requires `allow_cross_family`.
pub fn select_runtime(
    runtimes: &[Arc<dyn Runtime>],
    preferred: Option<&str>,
    allow_cross_family: bool,
) -> crate::Result<Arc<dyn Runtime>> {
    if runtimes.is_empty() {
        return Err(crate::Error::RuntimeUnavailable(
            "no runtimes configured".to_string(),
        ));
    }

    let chain: Vec<&Arc<dyn Runtime>> = match preferred {
        Some(name) => {
            let start = runtimes
                .iter()
                .position(|r| r.name() == name)
                .ok_or_else(|| {
                    crate::Error::invalid(format!("runtime '{}' is not configured", name))
                })?;
            runtimes[start..].iter().collect()
        }
        None => runtimes.iter().collect(),
    };

    let family = chain[0].kind();
    let mut skipped = Vec::new();
    for runtime in chain {
        if runtime.kind() != family && !allow_cross_family {
            break;
        }
        if runtime.is_available() {
            if !skipped.is_empty() {
                tracing::warn!(
                    selected = runtime.name(),
                    skipped = ?skipped,
                    "preferred runtime unavailable, fell back"
                );
            }
            return Ok(Arc::clone(runtime));
        }
        skipped.push(runtime.name().to_string());
    }

    Err(crate::Error::RuntimeUnavailable(format!(
        "no available runtime in family '{}' (tried: {})",
        family,
        skipped.join(", ")
    )))
}
