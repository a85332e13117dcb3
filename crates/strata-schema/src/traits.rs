use std::sync::Arc;

use crate::entry::{AttributeDefinitions, RegistryEntry};

/// Read-only schema lookup consumed by the evaluation and delta engines.
///
/// Implementations must be thread-safe. Lookups never fail: an unknown pid
/// is simply absent, and callers decide whether that defers or skips work.
pub trait SchemaRegistry: Send + Sync {
    /// Look up an entry by pid.
    fn entry(&self, pid: &str) -> Option<Arc<RegistryEntry>>;

    /// Look up a top-level entry by pid or alias.
    fn entry_by_name(&self, name: &str) -> Option<Arc<RegistryEntry>>;

    /// Look up the entry registered under `child_alias` below `parent_pid`.
    fn entry_by_child_alias(&self, parent_pid: &str, child_alias: &str) -> Option<Arc<RegistryEntry>>;

    /// Entries whose `extends` names `pid` directly.
    fn extenders(&self, pid: &str) -> Vec<Arc<RegistryEntry>>;

    /// Entries exposing `service`.
    fn service_exposers(&self, service: &str) -> Vec<Arc<RegistryEntry>>;

    /// All entries.
    fn entries(&self) -> Vec<Arc<RegistryEntry>>;

    /// Returns `true` if `name` denotes a factory type.
    fn is_factory(&self, name: &str) -> bool {
        self.entry_by_name(name).map(|e| e.factory).unwrap_or(false)
    }

    /// Returns `true` if `name` denotes a singleton type.
    fn is_singleton(&self, name: &str) -> bool {
        self.entry_by_name(name).map(|e| !e.factory).unwrap_or(false)
    }

    /// The entry `pid` extends, if any.
    fn extends_parent(&self, pid: &str) -> Option<Arc<RegistryEntry>> {
        let base = self.entry(pid)?.extends.clone()?;
        self.entry(&base)
    }

    /// Canonical pid for an element name, or the name itself when unknown.
    fn resolve_pid(&self, name: &str) -> String {
        self.entry_by_name(name)
            .map(|e| e.pid.clone())
            .unwrap_or_else(|| name.to_string())
    }

    /// Entry for an element nested under `parent`: child alias first, then
    /// any top-level name.
    fn child_entry(&self, parent: &RegistryEntry, node_name: &str) -> Option<Arc<RegistryEntry>> {
        self.entry_by_child_alias(&parent.pid, node_name)
            .or_else(|| self.entry_by_name(node_name))
    }

    /// Hierarchy-complete attribute definitions of `pid`.
    ///
    /// Inherited definitions come first; a definition that renames an
    /// inherited attribute replaces it.
    fn attribute_map(&self, pid: &str) -> Option<AttributeDefinitions> {
        let entry = self.entry(pid)?;
        let mut chain = vec![entry];
        while let Some(base) = chain
            .last()
            .and_then(|e| e.extends.clone())
            .and_then(|b| self.entry(&b))
        {
            if chain.iter().any(|e| e.pid == base.pid) {
                tracing::warn!(pid, base = %base.pid, "extends cycle in schema registry");
                break;
            }
            chain.push(base);
        }

        let mut defs = AttributeDefinitions::new();
        for level in chain.iter().rev() {
            for def in level.attributes.iter() {
                if let Some(renamed) = &def.rename {
                    defs.remove(renamed);
                }
                defs.insert(def.clone());
            }
        }
        Some(defs)
    }
}
