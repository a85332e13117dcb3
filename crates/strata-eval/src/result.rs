use std::collections::{BTreeMap, BTreeSet};

use serde::{Serialize, Serializer};
use strata_types::{ConfigId, Properties};

/// A reference that could not be turned into a persistent id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnresolvedReference {
    /// No stored object exists for `target` yet.
    Reference { attribute: String, target: ConfigId },
    /// `count` exposers matched the service; exactly one is required.
    Service {
        attribute: String,
        service: String,
        count: usize,
    },
    /// A `*` default over `target`. The set of instances changes whenever
    /// the target type does, so this never resolves for good.
    Wildcard { attribute: String, target: String },
}

impl UnresolvedReference {
    pub fn attribute(&self) -> &str {
        match self {
            UnresolvedReference::Reference { attribute, .. }
            | UnresolvedReference::Service { attribute, .. }
            | UnresolvedReference::Wildcard { attribute, .. } => attribute,
        }
    }

    /// Returns `true` for wildcard placeholders.
    pub fn is_permanent(&self) -> bool {
        matches!(self, UnresolvedReference::Wildcard { .. })
    }
}

/// Outcome of evaluating one element and, recursively, its nested elements.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub identity: ConfigId,
    /// Persistent id of the evaluated object.
    pub pid: String,
    pub properties: Properties,
    /// Every identity a property of this element points at.
    pub references: BTreeSet<ConfigId>,
    pub unresolved: Vec<UnresolvedReference>,
    #[serde(serialize_with = "nested_as_list")]
    pub nested: BTreeMap<ConfigId, EvaluationResult>,
    /// Registry variables read while evaluating.
    pub variables: BTreeSet<String>,
    pub warnings: Vec<String>,
    /// `false` when a required attribute has no value.
    pub valid: bool,
}

fn nested_as_list<S: Serializer>(nested: &BTreeMap<ConfigId, EvaluationResult>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(nested.values())
}

impl EvaluationResult {
    pub fn new(identity: ConfigId, pid: impl Into<String>) -> Self {
        Self {
            identity,
            pid: pid.into(),
            properties: Properties::new(),
            references: BTreeSet::new(),
            unresolved: Vec::new(),
            nested: BTreeMap::new(),
            variables: BTreeSet::new(),
            warnings: Vec::new(),
            valid: true,
        }
    }

    /// Returns `true` while a reference may still resolve on a later pass.
    pub fn is_deferred(&self) -> bool {
        self.walk()
            .iter()
            .any(|r| r.unresolved.iter().any(|u| !u.is_permanent()))
    }

    /// This result followed by every nested result, depth first.
    pub fn walk(&self) -> Vec<&EvaluationResult> {
        let mut out = Vec::new();
        let mut pending = vec![self];
        while let Some(result) = pending.pop() {
            out.push(result);
            pending.extend(result.nested.values().rev());
        }
        out
    }

    /// Variables read by this result or any nested result.
    pub fn all_variables(&self) -> BTreeSet<String> {
        self.walk()
            .into_iter()
            .flat_map(|r| r.variables.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(type_name: &str, id: &str) -> EvaluationResult {
        EvaluationResult::new(ConfigId::factory(type_name, id), format!("{}_1", type_name))
    }

    #[test]
    fn walk_visits_nested_depth_first() {
        let mut root = result("dataSource", "ds");
        let mut pool = result("connectionManager", "a");
        let leaf = result("leaf", "x");
        pool.nested.insert(leaf.identity.clone(), leaf);
        root.nested.insert(pool.identity.clone(), pool);
        root.nested.insert(ConfigId::factory("props", "b"), result("props", "b"));

        let order: Vec<&str> = root.walk().iter().map(|r| r.identity.type_name()).collect();
        assert_eq!(order, vec!["dataSource", "connectionManager", "leaf", "props"]);
    }

    #[test]
    fn wildcards_do_not_defer() {
        let mut r = result("app", "a");
        r.unresolved.push(UnresolvedReference::Wildcard {
            attribute: "libs".into(),
            target: "library".into(),
        });
        assert!(!r.is_deferred());
        r.unresolved.push(UnresolvedReference::Reference {
            attribute: "lib".into(),
            target: ConfigId::factory("library", "x"),
        });
        assert!(r.is_deferred());
    }

    #[test]
    fn nested_serializes_as_list() {
        let mut root = result("dataSource", "ds");
        let child = result("props", "p");
        root.nested.insert(child.identity.clone(), child);
        let json = serde_json::to_value(&root).unwrap();
        assert!(json["nested"].is_array());
        assert_eq!(json["nested"].as_array().unwrap().len(), 1);
    }
}
