//! Subprocess runtime: spawns an external AI CLI and parses its JSON reply.
//!
//! Contract: the binary is invoked as `BIN -p PROMPT -f json -q` and must
//! write exactly one JSON object to stdout with fields
//! `{output, tokens_in, tokens_out, cost_usd}`. A non-zero exit is a
//! (retryable) external failure; malformed JSON is a hard failure for the
//! call.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::request::{RuntimeKind, RuntimeRequest, RuntimeResult};
use super::runtime::Runtime;

#[derive(Debug, Deserialize)]
struct SubprocessReply {
    output: String,
    #[serde(default)]
    tokens_in: u64,
    #[serde(default)]
    tokens_out: u64,
    #[serde(default)]
    cost_usd: Option<rust_decimal::Decimal>,
}

pub struct SubprocessRuntime {
    bin: String,
    cancel_grace: Duration,
}

impl SubprocessRuntime {
    pub fn new(bin: impl Into<String>, cancel_grace: Duration) -> Self {
        Self {
            bin: bin.into(),
            cancel_grace,
        }
    }

    fn resolve_binary(&self) -> Option<std::path::PathBuf> {
        let candidate = Path::new(&self.bin);
        if candidate.is_absolute() {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }

        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(&self.bin))
            .find(|p| p.is_file())
    }
}

#[async_trait]
impl Runtime for SubprocessRuntime {
    fn name(&self) -> &str {
        &self.bin
    }

    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Subprocess
    }

    fn is_available(&self) -> bool {
        self.resolve_binary().is_some()
    }

    async fn execute(&self, request: &RuntimeRequest) -> crate::Result<RuntimeResult> {
        let bin = self.resolve_binary().ok_or_else(|| {
            crate::Error::RuntimeUnavailable(format!("binary '{}' not found on PATH", self.bin))
        })?;

        let mut child = tokio::process::Command::new(&bin)
            .arg("-p")
            .arg(&request.prompt)
            .arg("-f")
            .arg("json")
            .arg("-q")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    crate::Error::PermissionDenied(format!("spawning {}: {}", self.bin, e))
                }
                _ => crate::Error::external(format!("spawning {}: {}", self.bin, e)),
            })?;

        let output = tokio::select! {
            result = child.wait_with_output() => {
                result.map_err(|e| crate::Error::external(format!("waiting on {}: {}", self.bin, e)))?
            }
            _ = request.cancel.cancelled() => {
                // kill_on_drop delivers the terminate; give the child the
                // grace window to flush before we report cancellation.
                tokio::time::sleep(self.cancel_grace.min(Duration::from_millis(200))).await;
                return Err(crate::Error::cancelled(format!("{} subprocess", self.bin)));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(crate::Error::external(format!(
                "{} exited with {}: {}",
                self.bin,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reply: SubprocessReply = serde_json::from_str(stdout.trim()).map_err(|e| {
            crate::Error::invalid(format!(
                "{} produced malformed JSON output: {}",
                self.bin, e
            ))
        })?;

        Ok(RuntimeResult {
            output: reply.output,
            tokens_in: reply.tokens_in,
            tokens_out: reply.tokens_out,
            cost_usd: reply.cost_usd,
        })
    }
}
