use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use strata_types::{ConfigId, Properties};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::record::StoredConfig;
use crate::traits::PersistentStore;

#[derive(Debug, Default)]
struct StoreState {
    pids: HashMap<ConfigId, String>,
    records: BTreeMap<String, StoredConfig>,
    counters: HashMap<String, u64>,
}

/// In-memory persistent store.
///
/// Top-level singletons are stored under their type name; factory instances
/// and nested elements under `<type>_<n>` with a per-type counter that never
/// reuses a number.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects, placeholders included.
    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identity a pid was created for.
    pub fn identity_of(&self, pid: &str) -> Option<ConfigId> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.records.get(pid).map(|r| r.identity.clone())
    }
}

impl PersistentStore for InMemoryStore {
    fn lookup(&self, identity: &ConfigId) -> StoreResult<Option<String>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.pids.get(identity).cloned())
    }

    fn lookup_or_create(&self, identity: &ConfigId) -> StoreResult<String> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(pid) = state.pids.get(identity) {
            return Ok(pid.clone());
        }
        let pid = if identity.is_singleton() && !identity.is_nested() {
            identity.type_name().to_string()
        } else {
            let counter = state.counters.entry(identity.type_name().to_string()).or_insert(0);
            *counter += 1;
            format!("{}_{}", identity.type_name(), counter)
        };
        debug!(identity = %identity, pid = %pid, "created persistent id");
        state.pids.insert(identity.clone(), pid.clone());
        state
            .records
            .insert(pid.clone(), StoredConfig::new(pid.clone(), identity.clone()));
        Ok(pid)
    }

    fn read_properties(&self, pid: &str) -> StoreResult<Option<StoredConfig>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.records.get(pid).cloned())
    }

    fn write_properties(&self, pid: &str, properties: &Properties, references: &BTreeSet<ConfigId>) -> StoreResult<bool> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let record = state
            .records
            .get_mut(pid)
            .ok_or_else(|| StoreError::NotFound(pid.to_string()))?;
        if !record.is_placeholder() && record.properties == *properties && record.references == *references {
            return Ok(false);
        }
        record.properties = properties.clone();
        record.references = references.clone();
        record.revision += 1;
        debug!(pid, revision = record.revision, "stored properties");
        Ok(true)
    }

    fn delete(&self, pid: &str) -> StoreResult<bool> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match state.records.remove(pid) {
            Some(record) => {
                state.pids.remove(&record.identity);
                debug!(pid, "deleted configuration");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_all(&self) -> StoreResult<Vec<StoredConfig>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.records.values().cloned().collect())
    }
}
