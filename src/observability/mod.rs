//! Tracing setup and lightweight dispatch metrics.
//!
//! The embedding binary calls [`init`] once at startup. Output level comes
//! from `LOG_LEVEL` (falling back to the standard `RUST_LOG` grammar) and the
//! format from `LOG_FORMAT` (`text` or `json`).

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

/// Install the global tracing subscriber. Idempotent.
pub fn init() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env("LOG_LEVEL")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let json = std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if json {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .try_init();
        } else {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    });
}

/// Counters for the tool-dispatch surface.
///
/// Cheap atomics, readable at any time; no export pipeline.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    calls: AtomicU64,
    errors: AtomicU64,
    executions: AtomicU64,
    agents_spawned: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_execution(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_agent_spawn(&self) {
        self.agents_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn agents_spawned(&self) -> u64 {
        self.agents_spawned.load(Ordering::Relaxed)
    }
}
