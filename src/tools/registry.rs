//! Two-tier lazy tool registry.
//!
//! Metadata for every tool is present from registration time and feeds the
//! TF-IDF index; the handler behind a tool is produced by its activation
//! thunk the first time `load` names it. Activation is idempotent: the
//! thunk runs exactly once per tool, guarded by the activated-handler slot
//! under the registry's write lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use super::search::{SearchHit, TfIdfIndex};
use super::{ToolHandler, ToolMeta};

/// Thunk that performs host-facing registration and yields the handler.
pub type Activator = Box<dyn Fn() -> Arc<dyn ToolHandler> + Send + Sync>;

struct Entry {
    meta: ToolMeta,
    activator: Activator,
    handler: Option<Arc<dyn ToolHandler>>,
}

/// Outcome of a `load` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub activated: Vec<String>,
    pub already_active: Vec<String>,
    pub unknown: Vec<String>,
}

impl LoadReport {
    pub fn newly_activated(&self) -> usize {
        self.activated.len()
    }
}

/// Registry holding tool metadata eagerly and handlers lazily.
#[derive(Default)]
pub struct LazyToolRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    index: TfIdfIndex,
}

impl LazyToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register metadata and the activation thunk for a tool.
    ///
    /// Re-registering a name replaces the previous entry, dropping any
    /// already-activated handler.
    pub fn register_metadata(&self, meta: ToolMeta, activator: Activator) {
        let mut inner = self.write();
        inner.entries.insert(
            meta.name.clone(),
            Entry {
                meta,
                activator,
                handler: None,
            },
        );
        inner.rebuild_index();
    }

    /// Register and immediately activate (used for the discovery tools).
    pub fn register_eager(&self, meta: ToolMeta, handler: Arc<dyn ToolHandler>) {
        let name = meta.name.clone();
        let handler_for_thunk = Arc::clone(&handler);
        self.register_metadata(meta, Box::new(move || Arc::clone(&handler_for_thunk)));
        let mut inner = self.write();
        if let Some(entry) = inner.entries.get_mut(&name) {
            entry.handler = Some(handler);
        }
    }

    /// TF-IDF search over name + description + keywords.
    pub fn find(&self, query: &str, limit: usize) -> Vec<(ToolMeta, f64)> {
        let inner = self.read();
        let hits: Vec<SearchHit> = inner.index.search(query, limit);
        hits.into_iter()
            .filter_map(|hit| {
                inner
                    .entries
                    .get(&hit.name)
                    .map(|e| (e.meta.clone(), hit.score))
            })
            .collect()
    }

    /// Metadata plus activation state for one tool.
    pub fn describe(&self, name: &str) -> crate::Result<(ToolMeta, bool)> {
        let inner = self.read();
        inner
            .entries
            .get(name)
            .map(|e| (e.meta.clone(), e.handler.is_some()))
            .ok_or_else(|| crate::Error::not_found(format!("tool '{}'", name)))
    }

    /// Run the activation thunks for the named tools.
    ///
    /// Already-active tools are reported, not re-activated; unknown names
    /// are reported rather than failing the whole batch.
    pub fn load(&self, names: &[String]) -> LoadReport {
        let mut report = LoadReport::default();
        let mut inner = self.write();

        for name in names {
            match inner.entries.get_mut(name) {
                None => report.unknown.push(name.clone()),
                Some(entry) if entry.handler.is_some() => {
                    report.already_active.push(name.clone());
                }
                Some(entry) => {
                    entry.handler = Some((entry.activator)());
                    report.activated.push(name.clone());
                }
            }
        }

        report
    }

    /// Metadata of every currently activated tool, name-sorted.
    pub fn active(&self) -> Vec<ToolMeta> {
        let inner = self.read();
        let mut metas: Vec<ToolMeta> = inner
            .entries
            .values()
            .filter(|e| e.handler.is_some())
            .map(|e| e.meta.clone())
            .collect();
        metas.sort_by(|a, b| a.name.cmp(&b.name));
        metas
    }

    /// All registered metadata, active or not, name-sorted.
    pub fn all_metadata(&self) -> Vec<ToolMeta> {
        let inner = self.read();
        let mut metas: Vec<ToolMeta> = inner.entries.values().map(|e| e.meta.clone()).collect();
        metas.sort_by(|a, b| a.name.cmp(&b.name));
        metas
    }

    /// The activated handler for a tool, if any.
    pub fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.read().entries.get(name).and_then(|e| e.handler.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().entries.contains_key(name)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.read()
            .entries
            .get(name)
            .is_some_and(|e| e.handler.is_some())
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("tool registry poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("tool registry poisoned")
    }
}

impl Inner {
    fn rebuild_index(&mut self) {
        let mut index = TfIdfIndex::new();
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        for name in names {
            let entry = &self.entries[name];
            index.add_document(name.clone(), &entry.meta.searchable_text());
        }
        self.index = index;
    }
}
