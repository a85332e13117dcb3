use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strata_types::{ConfigId, Properties};

/// One configuration object as persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredConfig {
    /// Persistent id handed out by the store.
    pub pid: String,
    /// Logical identity the pid was created for.
    pub identity: ConfigId,
    /// Type name of factory instances, `None` for singletons.
    pub factory_pid: Option<String>,
    pub properties: Properties,
    /// Identities this object's properties point at.
    pub references: BTreeSet<ConfigId>,
    /// Incremented on every write that changed the stored properties.
    pub revision: u64,
}

impl StoredConfig {
    /// A fresh record with no properties written yet.
    pub fn new(pid: impl Into<String>, identity: ConfigId) -> Self {
        let factory_pid = (!identity.is_singleton() || identity.is_nested())
            .then(|| identity.type_name().to_string());
        Self {
            pid: pid.into(),
            identity,
            factory_pid,
            properties: Properties::new(),
            references: BTreeSet::new(),
            revision: 0,
        }
    }

    /// Returns `true` until the first write.
    pub fn is_placeholder(&self) -> bool {
        self.revision == 0
    }
}

/// Selects stored objects. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFilter {
    pub factory_pid: Option<String>,
    pub id: Option<String>,
}

impl StoreFilter {
    /// Every instance of one factory type.
    pub fn factory(factory_pid: impl Into<String>) -> Self {
        Self {
            factory_pid: Some(factory_pid.into()),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn matches(&self, record: &StoredConfig) -> bool {
        let factory_ok = match &self.factory_pid {
            Some(pid) => record.factory_pid.as_deref() == Some(pid.as_str()),
            None => true,
        };
        let id_ok = match &self.id {
            Some(id) => record.identity.id() == Some(id.as_str()),
            None => true,
        };
        factory_ok && id_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_pid_only_for_instances() {
        let singleton = StoredConfig::new("logging", ConfigId::singleton("logging"));
        assert_eq!(singleton.factory_pid, None);
        let instance = StoredConfig::new("httpEndpoint_1", ConfigId::factory("httpEndpoint", "a"));
        assert_eq!(instance.factory_pid.as_deref(), Some("httpEndpoint"));
        assert!(instance.is_placeholder());
    }

    #[test]
    fn filter_by_factory_and_id() {
        let record = StoredConfig::new("httpEndpoint_1", ConfigId::factory("httpEndpoint", "a"));
        assert!(StoreFilter::default().matches(&record));
        assert!(StoreFilter::factory("httpEndpoint").matches(&record));
        assert!(StoreFilter::factory("httpEndpoint").with_id("a").matches(&record));
        assert!(!StoreFilter::factory("httpEndpoint").with_id("b").matches(&record));
        assert!(!StoreFilter::factory("library").matches(&record));
    }

    #[test]
    fn record_serializes() {
        let record = StoredConfig::new("logging", ConfigId::singleton("logging"));
        let json = serde_json::to_string(&record).unwrap();
        let back: StoredConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
