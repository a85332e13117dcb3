//! Delta types produced by comparing two snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use strata_model::ConfigElement;
use strata_schema::RegistryEntry;
use strata_types::ConfigId;

/// How one object or variable changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeltaKind {
    Added,
    Removed,
    Modified,
}

impl fmt::Display for DeltaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeltaKind::Added => "ADDED",
            DeltaKind::Removed => "REMOVED",
            DeltaKind::Modified => "MODIFIED",
        };
        f.write_str(s)
    }
}

/// Why a modified element is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeltaReason {
    /// The element's own attributes changed, or a variable it reads did.
    PropertiesUpdate,
    /// Only elements nested below it changed.
    NestedUpdateOnly,
}

/// One changed configuration object, with the changes of its nested
/// elements.
///
/// `element` is the new merged element for added and modified objects and
/// the old one for removed objects; its nested keys point into the arena of
/// the snapshot it came from.
#[derive(Clone, Debug, Serialize)]
pub struct ConfigDelta {
    pub identity: ConfigId,
    pub kind: DeltaKind,
    pub reason: DeltaReason,
    #[serde(skip)]
    pub element: ConfigElement,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<ConfigDelta>,
    #[serde(skip)]
    pub entry: Option<Arc<RegistryEntry>>,
}

impl ConfigDelta {
    /// This delta and every nested delta, depth first.
    pub fn walk(&self) -> Vec<&ConfigDelta> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(delta) = stack.pop() {
            out.push(delta);
            stack.extend(delta.nested.iter().rev());
        }
        out
    }
}

/// Everything that changed between two snapshots.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SnapshotDelta {
    /// Variables whose fully resolved value changed, by name.
    pub variables: BTreeMap<String, DeltaKind>,
    /// Top-level element deltas, unsorted.
    pub elements: Vec<ConfigDelta>,
}

impl SnapshotDelta {
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.elements.is_empty()
    }

    /// Number of top-level element deltas.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Top-level delta for `identity`.
    pub fn find(&self, identity: &ConfigId) -> Option<&ConfigDelta> {
        self.elements.iter().find(|d| &d.identity == identity)
    }

    /// Top-level deltas of the given kind.
    pub fn of_kind(&self, kind: DeltaKind) -> impl Iterator<Item = &ConfigDelta> {
        self.elements.iter().filter(move |d| d.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(identity: ConfigId, kind: DeltaKind, nested: Vec<ConfigDelta>) -> ConfigDelta {
        ConfigDelta {
            element: ConfigElement::new(identity.type_name()),
            identity,
            kind,
            reason: DeltaReason::PropertiesUpdate,
            nested,
            entry: None,
        }
    }

    #[test]
    fn walk_visits_nested_in_order() {
        let app = ConfigId::factory("application", "app1");
        let host = ConfigId::nested(app.clone(), "host", Some("default-0".into()));
        let port = ConfigId::nested(host.clone(), "port", Some("default-0".into()));
        let tree = delta(
            app.clone(),
            DeltaKind::Removed,
            vec![delta(host.clone(), DeltaKind::Removed, vec![delta(port.clone(), DeltaKind::Removed, vec![])])],
        );
        let order: Vec<&ConfigId> = tree.walk().into_iter().map(|d| &d.identity).collect();
        assert_eq!(order, vec![&app, &host, &port]);
    }

    #[test]
    fn serializes_kinds_in_upper_case() {
        let d = delta(ConfigId::singleton("logging"), DeltaKind::Modified, vec![]);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "MODIFIED");
        assert_eq!(json["reason"], "PROPERTIES_UPDATE");
        assert!(json.get("nested").is_none());
    }
}
