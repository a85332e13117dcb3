//! Two-phase merge of candidates sharing one logical identity.
//!
//! Phase 1 walks candidates newest to oldest and folds every candidate into
//! its predecessor when the two are related through the include graph: same
//! document, or the predecessor's document encloses the newer candidate's.
//! What is left is a list of mutually unrelated alternatives.
//!
//! Phase 2 folds the alternatives oldest to newest with [`override_element`].

use strata_model::ConfigElement;
use strata_types::{AttributeOp, MergeBehavior};
use tracing::debug;

/// Merge raw candidates for one identity into the authoritative element.
///
/// Returns `None` only for an empty candidate list. Candidates carrying the
/// same sequence number and document are the same parsed element and count
/// once, which makes merging an already-merged element with itself a no-op.
pub fn merge(mut candidates: Vec<ConfigElement>) -> Option<ConfigElement> {
    candidates.sort_by_key(|c| c.sequence());
    candidates.dedup_by(|a, b| a.sequence() == b.sequence() && a.document() == b.document());
    let alternatives = flatten_conflict_chain(candidates);
    override_chain(alternatives)
}

fn flatten_conflict_chain(sorted: Vec<ConfigElement>) -> Vec<ConfigElement> {
    let mut alternatives = Vec::new();
    let mut current: Option<ConfigElement> = None;

    for predecessor in sorted.into_iter().rev() {
        current = Some(match current.take() {
            None => predecessor,
            Some(newer) => match conflict_policy(&predecessor, &newer) {
                Some(behavior) => combine(predecessor, newer, behavior),
                None => {
                    alternatives.push(newer);
                    predecessor
                }
            },
        });
    }
    alternatives.extend(current);
    alternatives.reverse();
    alternatives
}

/// Policy under which `newer` folds into `predecessor`, or `None` when the
/// two are unrelated alternatives.
fn conflict_policy(predecessor: &ConfigElement, newer: &ConfigElement) -> Option<MergeBehavior> {
    if predecessor.document() == newer.document() {
        return Some(MergeBehavior::Merge);
    }
    // The include edge leaving the predecessor's document on the way down to
    // the newer candidate decides. For an immediate child document this is
    // the newer candidate's own top-level behavior.
    let provenance = newer.provenance();
    let depth = provenance.ancestor_depth(predecessor.document())?;
    provenance.behavior_at(depth + 1)
}

fn combine(older: ConfigElement, newer: ConfigElement, behavior: MergeBehavior) -> ConfigElement {
    match behavior {
        MergeBehavior::Ignore => {
            debug!(
                node = older.node_name(),
                ignored = newer.document(),
                "ignoring conflicting included definition"
            );
            older
        }
        _ => override_element(older, &newer, behavior.default_op()),
    }
}

fn override_chain(alternatives: Vec<ConfigElement>) -> Option<ConfigElement> {
    let base_index = alternatives
        .iter()
        .position(|a| a.behavior() != MergeBehavior::Ignore)
        .unwrap_or(0);

    let mut base: Option<ConfigElement> = None;
    let mut rest = Vec::with_capacity(alternatives.len());
    for (i, alt) in alternatives.into_iter().enumerate() {
        if i == base_index {
            base = Some(alt);
        } else if i > base_index {
            rest.push(alt);
        } else {
            debug!(node = alt.node_name(), document = alt.document(), "dropping ignored alternative");
        }
    }

    let mut merged = base?;
    for candidate in rest {
        if candidate.behavior() == MergeBehavior::Ignore && candidate.document() != merged.document() {
            debug!(
                node = candidate.node_name(),
                document = candidate.document(),
                "dropping ignored alternative"
            );
            continue;
        }
        let op = candidate.behavior().default_op();
        merged = override_element(merged, &candidate, op);
    }
    Some(merged)
}

/// Apply `candidate` on top of `base`.
///
/// Each candidate attribute uses its explicit operation, else `default_op`.
/// APPEND concatenates when both sides are lists; every other case replaces.
/// Parent link, provenance and sequence come from the candidate, which wins.
pub fn override_element(base: ConfigElement, candidate: &ConfigElement, default_op: AttributeOp) -> ConfigElement {
    let mut merged = base;
    let mut attributes = merged.attributes().clone();

    for attr in candidate.attributes().iter() {
        let op = attr.op.unwrap_or(default_op);
        let value = match (op, attributes.get(&attr.name)) {
            (AttributeOp::Append, Some(existing)) if existing.is_list() && attr.value.is_list() => {
                existing.concat(&attr.value)
            }
            _ => attr.value.clone(),
        };
        attributes.insert_with_op(attr.name.clone(), value, attr.op);
    }

    let default_config = merged.is_default_config() && candidate.is_default_config();
    merged.set_attributes(attributes);
    merged.set_parent(candidate.parent());
    merged.set_provenance(candidate.provenance().clone());
    merged.set_sequence(candidate.sequence());
    if candidate.text().is_some() {
        merged.set_text(candidate.text().map(str::to_string));
    }
    merged.set_default_config(default_config);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strata_model::{Provenance, Value};

    fn element(doc: Provenance, seq: u64, attrs: &[(&str, Value)]) -> ConfigElement {
        let mut el = ConfigElement::new("a");
        for (name, value) in attrs {
            el.set_attribute(name, value.clone());
        }
        el.set_provenance(doc);
        el.set_sequence(seq);
        el
    }

    fn root() -> Provenance {
        Provenance::root("server.json")
    }

    #[test]
    fn same_document_later_wins() {
        let first = element(root(), 1, &[("x", Value::scalar("1"))]);
        let second = element(root(), 2, &[("x", Value::scalar("2"))]);
        let merged = merge(vec![second, first]).unwrap();
        assert_eq!(merged.attribute("x"), Some(&Value::scalar("2")));
        assert_eq!(merged.sequence(), 2);
    }

    #[test]
    fn replace_include_replaces_scalars_and_lists() {
        let base = element(
            root(),
            1,
            &[("x", Value::scalar("1")), ("hosts", Value::strings(["a"])), ("keep", Value::scalar("k"))],
        );
        let inc = element(
            root().push("inc.json", MergeBehavior::Replace),
            2,
            &[("x", Value::scalar("2")), ("hosts", Value::strings(["b"]))],
        );
        let merged = merge(vec![base, inc]).unwrap();
        assert_eq!(merged.attribute("x"), Some(&Value::scalar("2")));
        assert_eq!(merged.attribute("hosts"), Some(&Value::strings(["b"])));
        assert_eq!(merged.attribute("keep"), Some(&Value::scalar("k")));
        assert_eq!(merged.document(), "inc.json");
    }

    #[test]
    fn merge_include_concatenates_lists_in_document_order() {
        let base = element(root(), 1, &[("hosts", Value::strings(["a"]))]);
        let inc = element(
            root().push("inc.json", MergeBehavior::Merge),
            2,
            &[("hosts", Value::strings(["b"]))],
        );
        let merged = merge(vec![inc, base]).unwrap();
        assert_eq!(merged.attribute("hosts"), Some(&Value::strings(["a", "b"])));
    }

    #[test]
    fn explicit_set_overrides_append() {
        let base = element(root(), 1, &[("hosts", Value::strings(["a"]))]);
        let mut inc = element(
            root().push("inc.json", MergeBehavior::Merge),
            2,
            &[("hosts", Value::strings(["b"]))],
        );
        inc.attributes_mut().set_op("hosts", AttributeOp::Set);
        let merged = merge(vec![base, inc]).unwrap();
        assert_eq!(merged.attribute("hosts"), Some(&Value::strings(["b"])));
    }

    #[test]
    fn ignore_include_never_surfaces() {
        let base = element(root(), 1, &[("x", Value::scalar("1"))]);
        let inc = element(
            root().push("inc.json", MergeBehavior::Ignore),
            2,
            &[("x", Value::scalar("2")), ("extra", Value::scalar("e"))],
        );
        let merged = merge(vec![base, inc]).unwrap();
        assert_eq!(merged.attribute("x"), Some(&Value::scalar("1")));
        assert!(merged.attribute("extra").is_none());
    }

    #[test]
    fn ignore_include_before_primary_is_dropped() {
        let inc = element(
            root().push("inc.json", MergeBehavior::Ignore),
            1,
            &[("x", Value::scalar("2")), ("extra", Value::scalar("e"))],
        );
        let primary = element(root(), 2, &[("x", Value::scalar("1"))]);
        let merged = merge(vec![inc, primary]).unwrap();
        assert_eq!(merged.attribute("x"), Some(&Value::scalar("1")));
        assert!(merged.attribute("extra").is_none());
    }

    #[test]
    fn ignore_alone_surfaces() {
        let inc = element(
            root().push("inc.json", MergeBehavior::Ignore),
            1,
            &[("x", Value::scalar("2"))],
        );
        let merged = merge(vec![inc]).unwrap();
        assert_eq!(merged.attribute("x"), Some(&Value::scalar("2")));
    }

    #[test]
    fn nested_include_uses_policy_at_stack_depth() {
        // server.json includes a.json with REPLACE, a.json includes b.json with MERGE.
        let base = element(root(), 1, &[("hosts", Value::strings(["root"]))]);
        let deep = element(
            root()
                .push("a.json", MergeBehavior::Replace)
                .push("b.json", MergeBehavior::Merge),
            2,
            &[("hosts", Value::strings(["deep"]))],
        );
        let merged = merge(vec![base, deep]).unwrap();
        assert_eq!(merged.attribute("hosts"), Some(&Value::strings(["deep"])));
    }

    #[test]
    fn unrelated_alternatives_merge_in_sequence_order() {
        let a = element(
            Provenance::with_behavior("defaults.json", MergeBehavior::Merge),
            1,
            &[("x", Value::scalar("d")), ("only", Value::scalar("o"))],
        );
        let b = element(root(), 2, &[("x", Value::scalar("r"))]);
        let merged = merge(vec![b, a]).unwrap();
        assert_eq!(merged.attribute("x"), Some(&Value::scalar("r")));
        assert_eq!(merged.attribute("only"), Some(&Value::scalar("o")));
        assert_eq!(merged.provenance().depth(), 1);
        assert_eq!(merged.document(), "server.json");
    }

    #[test]
    fn empty_is_none() {
        assert!(merge(Vec::new()).is_none());
    }

    proptest! {
        #[test]
        fn merging_result_with_itself_is_noop(
            values in proptest::collection::vec(("[a-c]", "[0-9]{1,3}", any::<bool>()), 1..6)
        ) {
            let candidates: Vec<ConfigElement> = values
                .iter()
                .enumerate()
                .map(|(i, (name, value, included))| {
                    let doc = if *included {
                        root().push("inc.json", MergeBehavior::Merge)
                    } else {
                        root()
                    };
                    element(doc, i as u64, &[(name.as_str(), Value::strings([value.clone()]))])
                })
                .collect();
            let merged = merge(candidates).unwrap();
            let again = merge(vec![merged.clone(), merged.clone()]).unwrap();
            prop_assert_eq!(again, merged);
        }
    }
}
