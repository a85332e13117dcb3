//! Variable delta: compare every variable by its fully resolved value.

use std::collections::{BTreeMap, BTreeSet};

use strata_vars::{NoScope, ResolutionCache, VariableRegistry, VariableResolver};
use tracing::debug;

use crate::delta::DeltaKind;
use crate::error::DiffResult;

/// Resolved value of every variable defined in `registry`.
///
/// Fails on the first variable whose resolution cycles.
pub fn resolved_variables(registry: &VariableRegistry) -> DiffResult<BTreeMap<String, String>> {
    let resolver = VariableResolver::new(registry);
    let mut cache = ResolutionCache::new();
    let mut out = BTreeMap::new();
    for name in registry.names() {
        if let Some(value) = resolver.resolve_named(&name, &NoScope, &mut cache)? {
            out.insert(name, value);
        }
    }
    Ok(out)
}

/// Variables that were added, removed or resolve to a different value.
///
/// Comparing resolved values means a change to `a` also reports every
/// variable defined in terms of `a`.
pub fn diff_variables(old: &VariableRegistry, new: &VariableRegistry) -> DiffResult<BTreeMap<String, DeltaKind>> {
    let old_values = resolved_variables(old)?;
    let new_values = resolved_variables(new)?;

    let names: BTreeSet<&String> = old_values.keys().chain(new_values.keys()).collect();
    let mut out = BTreeMap::new();
    for name in names {
        let kind = match (old_values.get(name), new_values.get(name)) {
            (Some(_), None) => DeltaKind::Removed,
            (None, Some(_)) => DeltaKind::Added,
            (Some(a), Some(b)) if a != b => DeltaKind::Modified,
            _ => continue,
        };
        debug!(variable = %name, kind = %kind, "variable changed");
        out.insert(name.clone(), kind);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use strata_vars::MapEnvironment;

    use super::*;
    use crate::error::DiffError;

    fn registry(values: &[(&str, &str)]) -> VariableRegistry {
        let mut vars = VariableRegistry::with_environment(Arc::new(MapEnvironment::new()));
        for (name, value) in values {
            vars.set_file_value(*name, *value).unwrap();
        }
        vars
    }

    #[test]
    fn reports_added_removed_and_modified() {
        let old = registry(&[("host", "a"), ("port", "80"), ("gone", "x")]);
        let new = registry(&[("host", "a"), ("port", "8080"), ("fresh", "y")]);
        let delta = diff_variables(&old, &new).unwrap();
        assert_eq!(delta.len(), 3);
        assert_eq!(delta["port"], DeltaKind::Modified);
        assert_eq!(delta["gone"], DeltaKind::Removed);
        assert_eq!(delta["fresh"], DeltaKind::Added);
    }

    #[test]
    fn indirect_change_is_reported() {
        let old = registry(&[("base", "/opt"), ("logs", "${base}/logs")]);
        let new = registry(&[("base", "/srv"), ("logs", "${base}/logs")]);
        let delta = diff_variables(&old, &new).unwrap();
        assert_eq!(delta["logs"], DeltaKind::Modified);
    }

    #[test]
    fn rewritten_but_equal_value_is_unchanged() {
        let old = registry(&[("base", "/opt"), ("logs", "/opt/logs")]);
        let new = registry(&[("base", "/opt"), ("logs", "${base}/logs")]);
        assert!(diff_variables(&old, &new).unwrap().is_empty());
    }

    #[test]
    fn cycle_fails_the_delta() {
        let old = registry(&[]);
        let new = registry(&[("a", "${b}"), ("b", "${a}")]);
        match diff_variables(&old, &new) {
            Err(DiffError::Cycle(cycle)) => {
                assert!(cycle.chain.contains(&"a".to_string()));
                assert!(cycle.chain.contains(&"b".to_string()));
            }
            other => panic!("expected Cycle, got {:?}", other),
        }
    }
}
