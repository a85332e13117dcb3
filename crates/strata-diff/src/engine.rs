//! Element delta: compare two merged snapshots type by type.
//!
//! Singletons are compared directly, factory instances are matched by id
//! and nested elements are matched by their nested identity under the same
//! parent. Disabled elements count as absent. Attribute maps are compared
//! structurally, with nested elements compared by identity only so that a
//! change below an element is reported on the nested delta rather than on
//! the element itself.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use strata_merge::Snapshot;
use strata_model::{ConfigElement, ElementArena, Value};
use strata_schema::{RegistryEntry, SchemaRegistry};
use strata_types::ConfigId;
use strata_vars::{referenced_variables, VariableRegistry};
use tracing::{debug, info};

use crate::delta::{ConfigDelta, DeltaKind, DeltaReason, SnapshotDelta};
use crate::error::DiffResult;
use crate::variables::diff_variables;

/// Compute the variable delta and the element delta tree between two
/// snapshots.
///
/// `old_vars` and `new_vars` hold the variables in effect for each snapshot.
pub fn compute_delta(
    old: &Snapshot,
    old_vars: &VariableRegistry,
    new: &Snapshot,
    new_vars: &VariableRegistry,
    registry: &dyn SchemaRegistry,
) -> DiffResult<SnapshotDelta> {
    let variables = diff_variables(old_vars, new_vars)?;
    let changed: BTreeSet<String> = variables.keys().cloned().collect();
    let comparator = Comparator {
        registry,
        old: old.arena(),
        new: new.arena(),
        changed: &changed,
    };
    let elements = comparator.compare_snapshots(old, new)?;
    info!(
        variables = variables.len(),
        elements = elements.len(),
        "computed snapshot delta"
    );
    Ok(SnapshotDelta { variables, elements })
}

/// Which snapshot an element belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Old,
    New,
}

/// Comparable form of a raw value: nested elements reduce to their identity.
#[derive(Debug, PartialEq, Eq)]
enum Shape {
    Scalar(String),
    Reference(ConfigId),
    Nested(String, Option<String>),
    List(Vec<Shape>),
}

/// A nested element found under a parent, with its nested identity.
struct Child<'e> {
    identity: ConfigId,
    element: &'e ConfigElement,
    entry: Option<Arc<RegistryEntry>>,
}

struct Comparator<'a> {
    registry: &'a dyn SchemaRegistry,
    old: &'a ElementArena,
    new: &'a ElementArena,
    changed: &'a BTreeSet<String>,
}

impl Comparator<'_> {
    fn arena(&self, side: Side) -> &ElementArena {
        match side {
            Side::Old => self.old,
            Side::New => self.new,
        }
    }

    fn compare_snapshots(&self, old: &Snapshot, new: &Snapshot) -> DiffResult<Vec<ConfigDelta>> {
        let names: BTreeSet<&str> = old.type_names().chain(new.type_names()).collect();
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for name in names {
            let entry = self.registry.entry_by_name(name);
            let pid = entry.as_ref().map_or_else(|| name.to_string(), |e| e.pid.clone());
            if !seen.insert(pid.clone()) {
                continue;
            }
            let aliases: Vec<&str> = match &entry {
                Some(e) => std::iter::once(e.pid.as_str()).chain(e.alias.as_deref()).collect(),
                None => vec![name],
            };
            let singleton = match &entry {
                Some(e) => e.is_singleton(),
                None => !has_ids(old, &aliases)? && !has_ids(new, &aliases)?,
            };

            if singleton {
                let identity = ConfigId::singleton(pid.clone());
                let before = old.merged_singleton(&aliases)?;
                let after = new.merged_singleton(&aliases)?;
                if let Some(delta) = self.compare_top(identity, before.as_ref(), after.as_ref(), entry)? {
                    out.push(delta);
                }
            } else {
                let before = old.merged_factories(&aliases)?;
                let after = new.merged_factories(&aliases)?;
                let ids: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
                for id in ids {
                    let identity = ConfigId::factory(pid.clone(), id.clone());
                    if let Some(delta) = self.compare(identity, before.get(id), after.get(id), entry.clone())? {
                        out.push(delta);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Top-level singletons with complete required defaults are never
    /// removed: they fall back to an element carrying only defaults.
    fn compare_top(
        &self,
        identity: ConfigId,
        old: Option<&ConfigElement>,
        new: Option<&ConfigElement>,
        entry: Option<Arc<RegistryEntry>>,
    ) -> DiffResult<Option<ConfigDelta>> {
        let old_enabled = old.filter(|e| e.is_enabled());
        let new_enabled = new.filter(|e| e.is_enabled());
        if let (Some(removed), None, Some(e)) = (old_enabled, new_enabled, entry.as_ref()) {
            if self.defaults_complete(e) {
                debug!(identity = %identity, "removed singleton falls back to defaults");
                let nested = self
                    .children(&identity, Some(&**e), removed, Side::Old)?
                    .into_iter()
                    .map(|c| self.whole(c.identity, c.element, c.entry, DeltaKind::Removed, Side::Old))
                    .collect::<DiffResult<Vec<_>>>()?;
                return Ok(Some(ConfigDelta {
                    identity,
                    kind: DeltaKind::Modified,
                    reason: DeltaReason::PropertiesUpdate,
                    element: ConfigElement::new(e.element_name()),
                    nested,
                    entry,
                }));
            }
        }
        self.compare(identity, old, new, entry)
    }

    fn defaults_complete(&self, entry: &RegistryEntry) -> bool {
        self.registry
            .attribute_map(&entry.pid)
            .is_some_and(|defs| defs.has_all_required_defaults())
    }

    fn compare(
        &self,
        identity: ConfigId,
        old: Option<&ConfigElement>,
        new: Option<&ConfigElement>,
        entry: Option<Arc<RegistryEntry>>,
    ) -> DiffResult<Option<ConfigDelta>> {
        let old = old.filter(|e| e.is_enabled());
        let new = new.filter(|e| e.is_enabled());
        let delta = match (old, new) {
            (None, None) => None,
            (None, Some(added)) => Some(self.whole(identity, added, entry, DeltaKind::Added, Side::New)?),
            (Some(removed), None) => Some(self.whole(identity, removed, entry, DeltaKind::Removed, Side::Old)?),
            (Some(before), Some(after)) => {
                let nested = self.nested_deltas(&identity, entry.as_deref(), before, after)?;
                let changed = !self.same(before, after)? || self.variable_driven(after, entry.as_deref());
                let hidden = entry.as_ref().is_some_and(|e| e.supports_hidden_extensions);
                let reason = if changed {
                    DeltaReason::PropertiesUpdate
                } else if !nested.is_empty() && !hidden {
                    DeltaReason::NestedUpdateOnly
                } else {
                    return Ok(None);
                };
                Some(ConfigDelta {
                    identity,
                    kind: DeltaKind::Modified,
                    reason,
                    element: after.clone(),
                    nested,
                    entry,
                })
            }
        };
        if let Some(d) = &delta {
            debug!(identity = %d.identity, kind = %d.kind, reason = ?d.reason, "element changed");
        }
        Ok(delta)
    }

    /// An added or removed element: every enabled nested element goes with it.
    fn whole(
        &self,
        identity: ConfigId,
        element: &ConfigElement,
        entry: Option<Arc<RegistryEntry>>,
        kind: DeltaKind,
        side: Side,
    ) -> DiffResult<ConfigDelta> {
        let mut nested = Vec::new();
        for child in self.children(&identity, entry.as_deref(), element, side)? {
            nested.push(self.whole(child.identity, child.element, child.entry, kind, side)?);
        }
        Ok(ConfigDelta {
            identity,
            kind,
            reason: DeltaReason::PropertiesUpdate,
            element: element.clone(),
            nested,
            entry,
        })
    }

    fn nested_deltas(
        &self,
        parent: &ConfigId,
        entry: Option<&RegistryEntry>,
        before: &ConfigElement,
        after: &ConfigElement,
    ) -> DiffResult<Vec<ConfigDelta>> {
        let old_children = self.children(parent, entry, before, Side::Old)?;
        let new_children = self.children(parent, entry, after, Side::New)?;
        let mut out = Vec::new();

        for old_child in &old_children {
            let matching = new_children.iter().find(|c| c.identity == old_child.identity);
            let entry = matching.map_or_else(|| old_child.entry.clone(), |c| c.entry.clone());
            if let Some(delta) = self.compare(
                old_child.identity.clone(),
                Some(old_child.element),
                matching.map(|c| c.element),
                entry,
            )? {
                out.push(delta);
            }
        }
        for new_child in &new_children {
            if old_children.iter().any(|c| c.identity == new_child.identity) {
                continue;
            }
            if let Some(delta) = self.compare(
                new_child.identity.clone(),
                None,
                Some(new_child.element),
                new_child.entry.clone(),
            )? {
                out.push(delta);
            }
        }
        Ok(out)
    }

    /// Enabled nested elements of `element`, in attribute order.
    ///
    /// Children without an id are identified by their position within the
    /// attribute; children of a singleton type carry no id.
    fn children<'e>(
        &'e self,
        parent: &ConfigId,
        entry: Option<&RegistryEntry>,
        element: &ConfigElement,
        side: Side,
    ) -> DiffResult<Vec<Child<'e>>> {
        let arena = self.arena(side);
        let mut out = Vec::new();
        for attr in element.attributes().iter() {
            for (index, key) in attr.value.nested_keys().into_iter().enumerate() {
                let child = arena.resolve(key)?;
                if !child.is_enabled() {
                    continue;
                }
                let node = child.node_name();
                let child_entry = match entry {
                    Some(p) => self.registry.child_entry(p, node),
                    None => self.registry.entry_by_name(node),
                };
                let type_name = child_entry.as_ref().map_or_else(|| node.to_string(), |e| e.pid.clone());
                let id = match &child_entry {
                    Some(e) if e.is_singleton() => None,
                    _ => Some(
                        child
                            .id()
                            .map_or_else(|| format!("default-{}", index), str::to_string),
                    ),
                };
                out.push(Child {
                    identity: ConfigId::nested(parent.clone(), type_name, id),
                    element: child,
                    entry: child_entry,
                });
            }
        }
        Ok(out)
    }

    /// Structural equality of node name, id, text and attributes.
    fn same(&self, before: &ConfigElement, after: &ConfigElement) -> DiffResult<bool> {
        if before.node_name() != after.node_name() || before.id() != after.id() || before.text() != after.text() {
            return Ok(false);
        }
        Ok(self.shape(before, Side::Old)? == self.shape(after, Side::New)?)
    }

    fn shape(&self, element: &ConfigElement, side: Side) -> DiffResult<BTreeMap<String, Shape>> {
        let arena = self.arena(side);
        let mut out = BTreeMap::new();
        for attr in element.attributes().iter() {
            match shape_of(&attr.value, arena)? {
                Some(Shape::List(items)) if items.is_empty() => {}
                Some(shape) => {
                    out.insert(attr.name.to_ascii_lowercase(), shape);
                }
                None => {}
            }
        }
        Ok(out)
    }

    /// Whether `element` reads a changed variable through an attribute
    /// value, its text, a schema default or a variable extension.
    fn variable_driven(&self, element: &ConfigElement, entry: Option<&RegistryEntry>) -> bool {
        if self.changed.is_empty() {
            return false;
        }
        let names_changed = |text: &str| referenced_variables(text).iter().any(|v| self.changed.contains(v));

        let in_attributes = element
            .attributes()
            .iter()
            .any(|attr| attr.value.scalars().into_iter().any(|s| names_changed(s)));
        if in_attributes || element.text().is_some_and(|t| names_changed(t)) {
            return true;
        }

        let Some(defs) = entry.and_then(|e| self.registry.attribute_map(&e.pid)) else {
            return false;
        };
        let in_definitions = defs.iter().any(|def| {
            def.variable.as_ref().is_some_and(|v| self.changed.contains(v))
                || def
                    .default_values
                    .iter()
                    .flatten()
                    .any(|d| names_changed(d.as_str()))
        });
        in_definitions
    }
}

fn shape_of(value: &Value, arena: &ElementArena) -> DiffResult<Option<Shape>> {
    Ok(match value {
        Value::Scalar(s) => Some(Shape::Scalar(s.clone())),
        Value::Reference(target) => Some(Shape::Reference(target.clone())),
        Value::Nested(key) => {
            let child = arena.resolve(*key)?;
            child
                .is_enabled()
                .then(|| Shape::Nested(child.node_name().to_string(), child.id().map(str::to_string)))
        }
        Value::List(items) => {
            let mut shapes = Vec::with_capacity(items.len());
            for item in items {
                if let Some(shape) = shape_of(item, arena)? {
                    shapes.push(shape);
                }
            }
            Some(Shape::List(shapes))
        }
    })
}

fn has_ids(snapshot: &Snapshot, names: &[&str]) -> DiffResult<bool> {
    for name in names {
        for key in snapshot.candidates(name) {
            if snapshot.arena().resolve(*key)?.id().is_some() {
                return Ok(true);
            }
        }
    }
    Ok(false)
}
