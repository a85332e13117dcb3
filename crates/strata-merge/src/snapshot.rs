use std::collections::BTreeMap;

use strata_model::{ConfigElement, ElementArena, ElementKey, Value};
use strata_types::MergeBehavior;
use tracing::debug;

use crate::error::MergeResult;
use crate::merge::merge;

/// Node name of variable declarations stored in the arena.
pub const VARIABLE_TYPE: &str = "variable";

/// The authoritative definition of one file-level variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedVariable {
    pub name: String,
    pub value: Option<String>,
    pub default_value: Option<String>,
    /// Document of the winning definition.
    pub document: String,
}

/// Every raw candidate contributed by one load, unmerged.
///
/// A snapshot is built once per refresh and never changes after it is
/// handed out. Merged views are computed on request.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    arena: ElementArena,
    elements: BTreeMap<String, Vec<ElementKey>>,
    variables: BTreeMap<String, Vec<ElementKey>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage for every element of this snapshot, nested children included.
    pub fn arena(&self) -> &ElementArena {
        &self.arena
    }

    /// Store a nested element that is not itself a top-level candidate.
    pub fn insert_nested(&mut self, element: ConfigElement) -> ElementKey {
        self.arena.insert(element)
    }

    /// Mutable access for wiring nested children during loading.
    pub(crate) fn element_mut(&mut self, key: ElementKey) -> Option<&mut ConfigElement> {
        self.arena.get_mut(key)
    }

    /// Store a top-level candidate.
    pub fn add_candidate(&mut self, element: ConfigElement) -> ElementKey {
        let name = element.node_name().to_string();
        let key = self.arena.insert(element);
        self.elements.entry(name).or_default().push(key);
        key
    }

    /// Store a variable declaration.
    pub fn add_variable(&mut self, element: ConfigElement) -> Option<ElementKey> {
        let name = element.attribute("name")?.as_scalar()?.to_string();
        let key = self.arena.insert(element);
        self.variables.entry(name).or_default().push(key);
        Some(key)
    }

    /// Type names with at least one candidate.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.elements
            .iter()
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(name, _)| name.as_str())
    }

    /// Raw candidates written under `name`.
    pub fn candidates(&self, name: &str) -> &[ElementKey] {
        self.elements.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.elements.values().all(Vec::is_empty) && self.variables.is_empty()
    }

    /// Append every candidate and variable of `other`.
    pub fn add(&mut self, other: &Snapshot) -> MergeResult<()> {
        for (name, keys) in &other.elements {
            for key in keys {
                let imported = self.arena.import(&other.arena, *key)?;
                self.elements.entry(name.clone()).or_default().push(imported);
            }
        }
        for (name, keys) in &other.variables {
            for key in keys {
                let imported = self.arena.import(&other.arena, *key)?;
                self.variables.entry(name.clone()).or_default().push(imported);
            }
        }
        Ok(())
    }

    /// Drop every candidate that `other` contributed: same identity from the
    /// same document.
    pub fn remove(&mut self, other: &Snapshot) -> MergeResult<()> {
        for (name, keys) in &other.elements {
            let mut doomed = Vec::new();
            for key in keys {
                let el = other.arena.resolve(*key)?;
                doomed.push((el.identity(), el.document().to_string()));
            }
            if let Some(mine) = self.elements.get_mut(name) {
                let arena = &self.arena;
                mine.retain(|k| match arena.get(*k) {
                    Some(el) => !doomed
                        .iter()
                        .any(|(id, doc)| *id == el.identity() && doc == el.document()),
                    None => false,
                });
            }
        }
        for (name, keys) in &other.variables {
            let mut documents = Vec::new();
            for key in keys {
                documents.push(other.arena.resolve(*key)?.document().to_string());
            }
            if let Some(mine) = self.variables.get_mut(name) {
                let arena = &self.arena;
                mine.retain(|k| {
                    arena
                        .get(*k)
                        .is_some_and(|el| !documents.iter().any(|d| d == el.document()))
                });
            }
        }
        self.elements.retain(|_, keys| !keys.is_empty());
        self.variables.retain(|_, keys| !keys.is_empty());
        Ok(())
    }

    fn resolve_all(&self, names: &[&str]) -> MergeResult<Vec<ConfigElement>> {
        let mut out = Vec::new();
        let mut seen: Vec<&str> = Vec::new();
        for name in names {
            if seen.contains(name) {
                continue;
            }
            seen.push(name);
            for key in self.candidates(name) {
                out.push(self.arena.resolve(*key)?.clone());
            }
        }
        Ok(out)
    }

    /// Merged singleton written under any of `names` (pid and alias).
    pub fn merged_singleton(&self, names: &[&str]) -> MergeResult<Option<ConfigElement>> {
        let candidates = self.resolve_all(names)?;
        Ok(merge(apply_default_policies(candidates)))
    }

    /// Merged factory instances written under any of `names`, keyed by id.
    ///
    /// Top-level instances without an id are keyed `default-N` by their
    /// position among id-less instances.
    pub fn merged_factories(&self, names: &[&str]) -> MergeResult<BTreeMap<String, ConfigElement>> {
        let mut groups: BTreeMap<String, Vec<ConfigElement>> = BTreeMap::new();
        let mut anonymous = 0usize;
        for candidate in self.resolve_all(names)? {
            let id = match candidate.id() {
                Some(id) => id.to_string(),
                None => {
                    let id = format!("default-{}", anonymous);
                    anonymous += 1;
                    id
                }
            };
            groups.entry(id).or_default().push(candidate);
        }

        let mut merged = BTreeMap::new();
        for (id, candidates) in groups {
            if let Some(mut element) = merge(apply_default_policies(candidates)) {
                if element.id().is_none() {
                    element.set_attribute("id", Value::Scalar(id.clone()));
                }
                merged.insert(id, element);
            }
        }
        debug!(types = ?names, instances = merged.len(), "merged factory instances");
        Ok(merged)
    }

    /// One merged factory instance.
    pub fn merged_factory(&self, names: &[&str], id: &str) -> MergeResult<Option<ConfigElement>> {
        Ok(self.merged_factories(names)?.remove(id))
    }

    /// Merged file-level variables by name.
    pub fn merged_variables(&self) -> MergeResult<BTreeMap<String, MergedVariable>> {
        let mut out = BTreeMap::new();
        for (name, keys) in &self.variables {
            let mut candidates = Vec::with_capacity(keys.len());
            for key in keys {
                candidates.push(self.arena.resolve(*key)?.clone());
            }
            if let Some(merged) = merge(apply_default_policies(candidates)) {
                let text = |attr: &str| merged.attribute(attr).and_then(Value::as_scalar).map(str::to_string);
                out.insert(
                    name.clone(),
                    MergedVariable {
                        name: name.clone(),
                        value: text("value"),
                        default_value: text("defaultValue"),
                        document: merged.document().to_string(),
                    },
                );
            }
        }
        Ok(out)
    }
}

/// Drop default-document candidates whose participation depends on the
/// presence of a primary definition.
fn apply_default_policies(candidates: Vec<ConfigElement>) -> Vec<ConfigElement> {
    let has_primary = candidates.iter().any(|c| !c.is_default_config());
    candidates
        .into_iter()
        .filter(|c| {
            if !c.is_default_config() {
                return true;
            }
            match c.behavior() {
                MergeBehavior::MergeWhenExists => has_primary,
                MergeBehavior::MergeWhenMissing => !has_primary,
                _ => true,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_model::Provenance;

    fn candidate(name: &str, id: Option<&str>, doc: &str, seq: u64, attrs: &[(&str, &str)]) -> ConfigElement {
        let mut el = ConfigElement::new(name);
        if let Some(id) = id {
            el = el.with_id(id);
        }
        for (k, v) in attrs {
            el.set_attribute(k, Value::scalar(*v));
        }
        el.set_provenance(Provenance::root(doc));
        el.set_sequence(seq);
        el
    }

    fn default_candidate(name: &str, behavior: MergeBehavior, seq: u64, attrs: &[(&str, &str)]) -> ConfigElement {
        let mut el = candidate(name, None, "defaults.json", seq, attrs);
        el.set_provenance(Provenance::with_behavior("defaults.json", behavior));
        el.set_default_config(true);
        el
    }

    #[test]
    fn factories_grouped_by_id() {
        let mut snap = Snapshot::new();
        snap.add_candidate(candidate("httpEndpoint", Some("a"), "s", 1, &[("port", "80")]));
        snap.add_candidate(candidate("httpEndpoint", Some("b"), "s", 2, &[("port", "81")]));
        snap.add_candidate(candidate("httpEndpoint", Some("a"), "s", 3, &[("port", "82")]));
        let factories = snap.merged_factories(&["httpEndpoint"]).unwrap();
        assert_eq!(factories.len(), 2);
        assert_eq!(factories["a"].attribute("port"), Some(&Value::scalar("82")));
    }

    #[test]
    fn anonymous_factories_get_default_ids() {
        let mut snap = Snapshot::new();
        snap.add_candidate(candidate("library", None, "s", 1, &[]));
        snap.add_candidate(candidate("library", None, "s", 2, &[]));
        let factories = snap.merged_factories(&["library"]).unwrap();
        assert!(factories.contains_key("default-0"));
        assert_eq!(factories["default-1"].id(), Some("default-1"));
    }

    #[test]
    fn alias_and_pid_candidates_merge_together() {
        let mut snap = Snapshot::new();
        snap.add_candidate(candidate("com.example.logging", None, "s", 1, &[("a", "1")]));
        snap.add_candidate(candidate("logging", None, "s", 2, &[("b", "2")]));
        let merged = snap
            .merged_singleton(&["com.example.logging", "logging"])
            .unwrap()
            .unwrap();
        assert!(merged.attribute("a").is_some());
        assert!(merged.attribute("b").is_some());
    }

    #[test]
    fn merge_when_exists_needs_primary() {
        let mut snap = Snapshot::new();
        snap.add_candidate(default_candidate("a", MergeBehavior::MergeWhenExists, 1, &[("x", "d")]));
        assert!(snap.merged_singleton(&["a"]).unwrap().is_none());

        snap.add_candidate(candidate("a", None, "server.json", 2, &[("y", "p")]));
        let merged = snap.merged_singleton(&["a"]).unwrap().unwrap();
        assert_eq!(merged.attribute("x"), Some(&Value::scalar("d")));
        assert_eq!(merged.attribute("y"), Some(&Value::scalar("p")));
    }

    #[test]
    fn merge_when_missing_yields_to_primary() {
        let mut snap = Snapshot::new();
        snap.add_candidate(default_candidate("a", MergeBehavior::MergeWhenMissing, 1, &[("x", "d")]));
        let alone = snap.merged_singleton(&["a"]).unwrap().unwrap();
        assert_eq!(alone.attribute("x"), Some(&Value::scalar("d")));

        snap.add_candidate(candidate("a", None, "server.json", 2, &[("y", "p")]));
        let merged = snap.merged_singleton(&["a"]).unwrap().unwrap();
        assert!(merged.attribute("x").is_none());
    }

    #[test]
    fn add_and_remove_by_identity_and_document() {
        let mut base = Snapshot::new();
        base.add_candidate(candidate("a", None, "server.json", 1, &[("x", "1")]));

        let mut defaults = Snapshot::new();
        defaults.add_candidate(candidate("a", None, "defaults.json", 0, &[("z", "9")]));
        defaults.add_candidate(candidate("b", None, "defaults.json", 0, &[]));

        base.add(&defaults).unwrap();
        assert_eq!(base.candidates("a").len(), 2);
        assert_eq!(base.type_names().count(), 2);

        base.remove(&defaults).unwrap();
        assert_eq!(base.candidates("a").len(), 1);
        assert!(base.candidates("b").is_empty());
        let merged = base.merged_singleton(&["a"]).unwrap().unwrap();
        assert!(merged.attribute("z").is_none());
    }

    #[test]
    fn variables_merge_later_wins() {
        let mut snap = Snapshot::new();
        let mut first = ConfigElement::new(VARIABLE_TYPE)
            .with_attribute("name", "port")
            .with_attribute("value", "80");
        first.set_provenance(Provenance::root("server.json"));
        first.set_sequence(1);
        let mut second = ConfigElement::new(VARIABLE_TYPE)
            .with_attribute("name", "port")
            .with_attribute("defaultValue", "9080");
        second.set_provenance(Provenance::root("server.json"));
        second.set_sequence(2);
        snap.add_variable(first);
        snap.add_variable(second);

        let vars = snap.merged_variables().unwrap();
        let port = &vars["port"];
        assert_eq!(port.value.as_deref(), Some("80"));
        assert_eq!(port.default_value.as_deref(), Some("9080"));
    }
}
