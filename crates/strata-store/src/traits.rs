use std::collections::BTreeSet;

use strata_types::{ConfigId, Properties};

use crate::error::StoreResult;
use crate::record::{StoreFilter, StoredConfig};

/// Persistent configuration store.
///
/// All implementations must satisfy these invariants:
/// - An identity maps to exactly one persistent id for the lifetime of the
///   store, until deleted.
/// - `write_properties` is an idempotent upsert: writing the same properties
///   twice leaves the revision unchanged.
/// - Concurrent reads are always safe.
pub trait PersistentStore: Send + Sync {
    /// Persistent id of `identity`, if one was created.
    fn lookup(&self, identity: &ConfigId) -> StoreResult<Option<String>>;

    /// Persistent id of `identity`, creating an empty placeholder when needed.
    fn lookup_or_create(&self, identity: &ConfigId) -> StoreResult<String>;

    /// Read a stored object. Returns `Ok(None)` if the pid is unknown.
    fn read_properties(&self, pid: &str) -> StoreResult<Option<StoredConfig>>;

    /// Replace the properties and references of `pid`.
    ///
    /// Returns `true` if anything changed. Fails with
    /// [`StoreError::NotFound`](crate::StoreError::NotFound) for an unknown pid.
    fn write_properties(&self, pid: &str, properties: &Properties, references: &BTreeSet<ConfigId>) -> StoreResult<bool>;

    /// Delete a stored object. Returns `true` if it existed.
    fn delete(&self, pid: &str) -> StoreResult<bool>;

    /// Every stored object, placeholders included, ordered by pid.
    fn list_all(&self) -> StoreResult<Vec<StoredConfig>>;

    /// Stored objects matching `filter`.
    ///
    /// Default implementation filters [`list_all`](Self::list_all).
    fn list_by_filter(&self, filter: &StoreFilter) -> StoreResult<Vec<StoredConfig>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }
}
