//! In-memory schema registry.
//!
//! [`InMemorySchemaRegistry`] keeps every entry behind a `RwLock` and tracks a
//! generation counter that moves on every change, so holders of evaluation
//! results can tell when references are worth retrying.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::document::SchemaDocument;
use crate::entry::RegistryEntry;
use crate::error::{SchemaError, SchemaResult};
use crate::traits::SchemaRegistry;

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, Arc<RegistryEntry>>,
    aliases: HashMap<String, String>,
    closed: bool,
    generation: u64,
}

impl RegistryState {
    fn pid_for<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.entries.contains_key(name) {
            Some(name)
        } else {
            self.aliases.get(name).map(String::as_str)
        }
    }
}

/// A schema registry held entirely in memory.
///
/// The registry starts open. [`close`](Self::close) empties it and rejects
/// further registrations; lookups on a closed registry find nothing.
pub struct InMemorySchemaRegistry {
    state: RwLock<RegistryState>,
}

impl InMemorySchemaRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Build a registry from a decoded schema document.
    pub fn from_document(document: SchemaDocument) -> SchemaResult<Self> {
        let registry = Self::new();
        for entry in document.entries {
            registry.register(entry)?;
        }
        Ok(registry)
    }

    /// Add an entry. Fails on a duplicate pid or alias.
    pub fn register(&self, entry: RegistryEntry) -> SchemaResult<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(SchemaError::Closed);
        }
        if state.entries.contains_key(&entry.pid) {
            return Err(SchemaError::DuplicatePid(entry.pid));
        }
        if let Some(alias) = &entry.alias {
            if let Some(existing) = state.aliases.get(alias) {
                return Err(SchemaError::DuplicateAlias {
                    pid: entry.pid.clone(),
                    alias: alias.clone(),
                    existing: existing.clone(),
                });
            }
            state.aliases.insert(alias.clone(), entry.pid.clone());
        }
        debug!(pid = %entry.pid, factory = entry.factory, "registered schema entry");
        state.entries.insert(entry.pid.clone(), Arc::new(entry));
        state.generation += 1;
        Ok(())
    }

    /// Remove an entry by pid, returning it if present.
    pub fn unregister(&self, pid: &str) -> Option<Arc<RegistryEntry>> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let removed = state.entries.remove(pid)?;
        if let Some(alias) = &removed.alias {
            state.aliases.remove(alias);
        }
        state.generation += 1;
        Some(removed)
    }

    /// Close the registry, dropping every entry.
    pub fn close(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries.clear();
        state.aliases.clear();
        state.closed = true;
        state.generation += 1;
    }

    pub fn is_open(&self) -> bool {
        !self.state.read().unwrap_or_else(PoisonError::into_inner).closed
    }

    /// Counter bumped by every registration change.
    pub fn generation(&self) -> u64 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).generation
    }

    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemorySchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemorySchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySchemaRegistry")
            .field("entries", &self.len())
            .field("generation", &self.generation())
            .finish()
    }
}

impl SchemaRegistry for InMemorySchemaRegistry {
    fn entry(&self, pid: &str) -> Option<Arc<RegistryEntry>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entries.get(pid).cloned()
    }

    fn entry_by_name(&self, name: &str) -> Option<Arc<RegistryEntry>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let pid = state.pid_for(name)?;
        state.entries.get(pid).cloned()
    }

    fn entry_by_child_alias(&self, parent_pid: &str, child_alias: &str) -> Option<Arc<RegistryEntry>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .entries
            .values()
            .find(|e| {
                e.parent_pid.as_deref() == Some(parent_pid)
                    && e.child_alias.as_deref() == Some(child_alias)
            })
            .cloned()
    }

    fn extenders(&self, pid: &str) -> Vec<Arc<RegistryEntry>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = state
            .entries
            .values()
            .filter(|e| e.extends.as_deref() == Some(pid))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.pid.cmp(&b.pid));
        out
    }

    fn service_exposers(&self, service: &str) -> Vec<Arc<RegistryEntry>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = state
            .entries
            .values()
            .filter(|e| e.services.iter().any(|s| s == service))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.pid.cmp(&b.pid));
        out
    }

    fn entries(&self) -> Vec<Arc<RegistryEntry>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = state.entries.values().cloned().collect();
        out.sort_by(|a, b| a.pid.cmp(&b.pid));
        out
    }
}
